//! The problem contract consumed by every strategy.
//!
//! A problem knows which node ids a sequence must permute, how far apart two
//! nodes are, and how to evaluate a complete sequence. Everything else
//! (population handling, neighborhoods, convergence) lives in the engine and
//! the strategies.

use crate::solution::Solution;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Cost and feasibility of one sequence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub cost: f64,
    pub feasible: bool,
}

/// A sequencing problem.
///
/// Sequences are permutations of [`Problem::nodes`]. Constructive strategies
/// (ant colony, particle swarm) start from [`Problem::origin`], which is a row
/// of the distance matrix but never part of a sequence.
pub trait Problem: Sync {
    fn name(&self) -> &str;

    /// Size hint used to scale default iteration counts and population sizes
    fn difficulty(&self) -> usize;

    fn n_jobs(&self) -> usize;

    fn n_maintenance(&self) -> usize {
        0
    }

    fn n_nodes(&self) -> usize {
        self.n_jobs() + self.n_maintenance()
    }

    /// Node ids a complete sequence must contain, in natural order
    fn nodes(&self) -> Vec<usize> {
        (1..=self.n_nodes()).collect()
    }

    fn origin(&self) -> usize {
        0
    }

    /// Entry of the distance matrix
    fn distance(&self, from: usize, to: usize) -> f64;

    fn evaluate(&self, sequence: &[usize]) -> Evaluation;

    /// Wrap a raw sequence into an evaluated solution
    fn solution(&self, sequence: Vec<usize>) -> Solution {
        let evaluation = self.evaluate(&sequence);
        Solution::new(sequence, evaluation)
    }

    /// A random sequence; the default shuffles the node set and does not
    /// check feasibility
    fn random_sequence<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        let mut sequence = self.nodes();
        sequence.shuffle(rng);
        sequence
    }

    fn random_solution<R: Rng + ?Sized>(&self, rng: &mut R) -> Solution {
        let sequence = self.random_sequence(rng);
        self.solution(sequence)
    }

    /// Statistics of the evaluation cache, if the problem has one
    fn cache_info(&self) -> Option<CacheInfo> {
        None
    }
}

/// Hit/miss counters of a [`MemoizedProblem`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInfo {
    pub hits: usize,
    pub misses: usize,
    pub size: usize,
}

impl std::fmt::Display for CacheInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "hits={} misses={} size={}", self.hits, self.misses, self.size)
    }
}

/// Wraps a problem with a thread-safe evaluation cache keyed by sequence.
///
/// The cache lives as long as the wrapper, so wrapping once per run gives a
/// per-run cache.
pub struct MemoizedProblem<P> {
    inner: P,
    cache: Mutex<HashMap<Vec<usize>, Evaluation>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<P: Problem> MemoizedProblem<P> {
    pub fn new(inner: P) -> Self {
        MemoizedProblem {
            inner,
            cache: Mutex::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn clear(&self) {
        self.lock().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Vec<usize>, Evaluation>> {
        // A panic while holding the lock cannot leave a half-written entry
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<P: Problem> Problem for MemoizedProblem<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn difficulty(&self) -> usize {
        self.inner.difficulty()
    }

    fn n_jobs(&self) -> usize {
        self.inner.n_jobs()
    }

    fn n_maintenance(&self) -> usize {
        self.inner.n_maintenance()
    }

    fn n_nodes(&self) -> usize {
        self.inner.n_nodes()
    }

    fn nodes(&self) -> Vec<usize> {
        self.inner.nodes()
    }

    fn origin(&self) -> usize {
        self.inner.origin()
    }

    fn distance(&self, from: usize, to: usize) -> f64 {
        self.inner.distance(from, to)
    }

    fn evaluate(&self, sequence: &[usize]) -> Evaluation {
        if let Some(evaluation) = self.lock().get(sequence) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return *evaluation;
        }
        // Evaluate outside the lock so workers do not serialize on cost
        let evaluation = self.inner.evaluate(sequence);
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(sequence.to_vec(), evaluation);
        evaluation
    }

    fn random_sequence<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        self.inner.random_sequence(rng)
    }

    fn cache_info(&self) -> Option<CacheInfo> {
        Some(CacheInfo {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.lock().len(),
        })
    }
}

/// A borrowed problem is a problem; lets several caches share one instance
impl<P: Problem> Problem for &P {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn difficulty(&self) -> usize {
        (**self).difficulty()
    }

    fn n_jobs(&self) -> usize {
        (**self).n_jobs()
    }

    fn n_maintenance(&self) -> usize {
        (**self).n_maintenance()
    }

    fn n_nodes(&self) -> usize {
        (**self).n_nodes()
    }

    fn nodes(&self) -> Vec<usize> {
        (**self).nodes()
    }

    fn origin(&self) -> usize {
        (**self).origin()
    }

    fn distance(&self, from: usize, to: usize) -> f64 {
        (**self).distance(from, to)
    }

    fn evaluate(&self, sequence: &[usize]) -> Evaluation {
        (**self).evaluate(sequence)
    }

    fn random_sequence<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        (**self).random_sequence(rng)
    }

    fn cache_info(&self) -> Option<CacheInfo> {
        (**self).cache_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::RoutingInstance;

    #[test]
    fn test_memoized_counts_hits() {
        let problem = MemoizedProblem::new(RoutingInstance::square());
        let a = problem.evaluate(&[1, 2, 3]);
        let b = problem.evaluate(&[1, 2, 3]);
        problem.evaluate(&[3, 2, 1]);

        assert_eq!(a, b);
        let info = problem.cache_info().unwrap();
        assert_eq!(info.hits, 1);
        assert_eq!(info.misses, 2);
        assert_eq!(info.size, 2);

        problem.clear();
        assert_eq!(problem.cache_info().unwrap().size, 0);
    }

    #[test]
    fn test_caches_over_one_borrowed_instance_are_independent() {
        let instance = RoutingInstance::square();
        let first = MemoizedProblem::new(&instance);
        first.evaluate(&[1, 2, 3]);
        first.evaluate(&[1, 2, 3]);

        let second = MemoizedProblem::new(&instance);
        assert_eq!(second.evaluate(&[1, 2, 3]), instance.evaluate(&[1, 2, 3]));
        assert_eq!(second.cache_info(), Some(CacheInfo { hits: 0, misses: 1, size: 1 }));
        assert_eq!(first.cache_info(), Some(CacheInfo { hits: 1, misses: 1, size: 1 }));
        assert_eq!(second.name(), "square");
    }

    #[test]
    fn test_default_random_sequence_is_permutation() {
        use rand::SeedableRng;
        let problem = RoutingInstance::square();
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
        let mut seq = problem.random_sequence(&mut rng);
        seq.sort_unstable();
        assert_eq!(seq, problem.nodes());
    }
}
