//! Primitive operators shared by the strategies.
//!
//! - Perturbation moves (the "search operator") producing neighbors
//! - Order-preserving crossovers
//! - Roulette-wheel sampling and the weight transforms feeding it

use crate::error::SearchError;
use crate::problem::Problem;
use crate::solution::Solution;
use rand::distributions::{Distribution, WeightedIndex};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Perturbation move applied to a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Perturbation {
    /// Swap two random positions ("pitch")
    #[default]
    Swap,
    /// Reverse a random segment
    Inversion,
    /// Move a random element to a random position
    Insertion,
    /// Swap two adjacent positions
    Adjacent,
    /// Shuffle a random segment
    Scramble,
}

impl Perturbation {
    /// Apply the move once, without looking at feasibility
    pub fn perturb<R: Rng + ?Sized>(&self, sequence: &[usize], rng: &mut R) -> Vec<usize> {
        let mut seq = sequence.to_vec();
        let n = seq.len();
        if n < 2 {
            return seq;
        }

        match self {
            Perturbation::Swap => {
                let i = rng.gen_range(0..n);
                let mut j = rng.gen_range(0..n - 1);
                if j >= i {
                    j += 1;
                }
                seq.swap(i, j);
            }
            Perturbation::Inversion => {
                let i = rng.gen_range(0..n - 1);
                let j = rng.gen_range(i + 1..n);
                seq[i..=j].reverse();
            }
            Perturbation::Insertion => {
                let from = rng.gen_range(0..n);
                let mut to = rng.gen_range(0..n - 1);
                if to >= from {
                    to += 1;
                }
                let node = seq.remove(from);
                seq.insert(to, node);
            }
            Perturbation::Adjacent => {
                let i = rng.gen_range(0..n - 1);
                seq.swap(i, i + 1);
            }
            Perturbation::Scramble => {
                let start = rng.gen_range(0..n - 1);
                let end = rng.gen_range(start + 1..n);
                seq[start..=end].shuffle(rng);
            }
        }

        seq
    }

    /// A feasible neighbor of `solution`.
    ///
    /// Every attempt restarts from `solution`; fails once `max_attempts`
    /// moves in a row produced infeasible sequences.
    pub fn neighbor<P: Problem, R: Rng + ?Sized>(
        &self,
        problem: &P,
        solution: &Solution,
        rng: &mut R,
        max_attempts: usize,
    ) -> Result<Solution, SearchError> {
        for _ in 0..max_attempts.max(1) {
            let candidate = problem.solution(self.perturb(solution.sequence(), rng));
            if candidate.is_feasible() {
                return Ok(candidate);
            }
        }
        Err(SearchError::InfeasibleConstruction {
            what: "neighbor",
            attempts: max_attempts.max(1),
        })
    }
}

/// Order-preserving crossover producing two offspring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Crossover {
    /// Keep the parent's middle segment and fill around it with the other
    /// parent's remaining values in their order
    #[default]
    DiscreteOrder,
    /// Exchange the middle segments as they are; offspring may contain
    /// repeated values and rely on the feasibility check to be rejected
    ContinuousOrder,
}

impl Crossover {
    pub fn apply<R: Rng + ?Sized>(
        &self,
        p1: &[usize],
        p2: &[usize],
        rng: &mut R,
    ) -> (Vec<usize>, Vec<usize>) {
        match cut_points(p1.len(), rng) {
            Some((cut1, cut2)) => self.apply_with_cuts(p1, p2, cut1, cut2),
            None => (p1.to_vec(), p2.to_vec()),
        }
    }

    /// Crossover with explicit cut points, `0 < cut1 < cut2 <= len`
    pub fn apply_with_cuts(
        &self,
        p1: &[usize],
        p2: &[usize],
        cut1: usize,
        cut2: usize,
    ) -> (Vec<usize>, Vec<usize>) {
        match self {
            Crossover::DiscreteOrder => (
                order_fill(&p1[cut1..cut2], p2, cut1),
                order_fill(&p2[cut1..cut2], p1, cut1),
            ),
            Crossover::ContinuousOrder => {
                let mut o1 = p2[..cut1].to_vec();
                o1.extend_from_slice(&p1[cut1..cut2]);
                o1.extend_from_slice(&p2[cut2..]);

                let mut o2 = p1[..cut1].to_vec();
                o2.extend_from_slice(&p2[cut1..cut2]);
                o2.extend_from_slice(&p1[cut2..]);
                (o1, o2)
            }
        }
    }
}

/// Random cut points: the first in the lower half, the second in the upper half
fn cut_points<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Option<(usize, usize)> {
    if n < 3 {
        return None;
    }
    let high = n - 1;
    let mid = high / 2;
    let cut1 = rng.gen_range(1..=mid);
    let cut2 = rng.gen_range(mid + 1..=high);
    Some((cut1, cut2))
}

fn order_fill(center: &[usize], donor: &[usize], cut1: usize) -> Vec<usize> {
    let kept: HashSet<usize> = center.iter().copied().collect();
    let remainder: Vec<usize> = donor.iter().copied().filter(|v| !kept.contains(v)).collect();
    let split = cut1.min(remainder.len());

    let mut child = Vec::with_capacity(donor.len());
    child.extend_from_slice(&remainder[..split]);
    child.extend_from_slice(center);
    child.extend_from_slice(&remainder[split..]);
    child
}

/// Ordered weighted sampling of `size` distinct indices.
///
/// Each draw picks one of the remaining indices with probability proportional
/// to its weight. Negative or non-finite weights count as zero; when every
/// remaining weight is zero the draw is uniform.
pub fn roulette_wheel<R: Rng + ?Sized>(weights: &[f64], size: usize, rng: &mut R) -> Vec<usize> {
    let size = size.min(weights.len());
    let mut remaining: Vec<usize> = (0..weights.len()).collect();
    let mut picked = Vec::with_capacity(size);

    while picked.len() < size {
        let current: Vec<f64> = remaining.iter().map(|&i| sanitize(weights[i])).collect();
        let pick = match WeightedIndex::new(&current) {
            Ok(dist) => dist.sample(rng),
            Err(_) => rng.gen_range(0..remaining.len()),
        };
        picked.push(remaining.swap_remove(pick));
    }

    picked
}

/// One weighted draw; `None` for an empty slice
pub fn weighted_choice<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Option<usize> {
    roulette_wheel(weights, 1, rng).first().copied()
}

#[inline]
fn sanitize(w: f64) -> f64 {
    if w.is_finite() && w > 0.0 {
        w
    } else {
        0.0
    }
}

/// Selection weights favoring low cost.
///
/// Costs are normalized to [0, 1] over the population and mapped through
/// `exp(-x)`, so the best member weighs 1 and the worst `1/e`. Infinite
/// costs weigh 0.
pub fn fitness_weights(population: &[Solution]) -> Vec<f64> {
    let finite = population.iter().map(Solution::cost).filter(|c| c.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
        (lo.min(c), hi.max(c))
    });
    let range = max - min;

    population
        .iter()
        .map(|s| {
            if !s.cost().is_finite() {
                0.0
            } else if range > 0.0 {
                (-(s.cost() - min) / range).exp()
            } else {
                1.0
            }
        })
        .collect()
}

/// `exp(v)` normalized to sum 1, computed with the max subtracted
pub fn softmax(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|v| (v - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Consecutive pairs `(s[i], s[i+1])` for `i = 0, step, 2*step, ...`
pub fn pairwise<T>(items: &[T], step: usize) -> impl Iterator<Item = (&T, &T)> {
    items.windows(2).step_by(step.max(1)).map(|w| (&w[0], &w[1]))
}

/// Preference for moving to a node at distance `d`; zero when the distance
/// is not strictly positive (self loops, duplicated coordinates)
#[inline]
pub fn distance_preference(weight: f64, d: f64) -> f64 {
    if d > 0.0 && d.is_finite() {
        weight / d
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::RoutingInstance;
    use rand_chacha::ChaCha8Rng;

    fn sorted(mut v: Vec<usize>) -> Vec<usize> {
        v.sort_unstable();
        v
    }

    #[test]
    fn test_perturbations_keep_permutation() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let seq: Vec<usize> = (1..=8).collect();
        for op in [
            Perturbation::Swap,
            Perturbation::Inversion,
            Perturbation::Insertion,
            Perturbation::Adjacent,
            Perturbation::Scramble,
        ] {
            for _ in 0..50 {
                assert_eq!(sorted(op.perturb(&seq, &mut rng)), seq, "{:?}", op);
            }
        }
    }

    #[test]
    fn test_swap_always_moves() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let seq = vec![1, 2];
        for _ in 0..20 {
            assert_eq!(Perturbation::Swap.perturb(&seq, &mut rng), vec![2, 1]);
        }
    }

    #[test]
    fn test_neighbor_is_feasible() {
        let problem = RoutingInstance::square();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let start = problem.solution(vec![1, 2, 3]);
        let next = Perturbation::Swap.neighbor(&problem, &start, &mut rng, 10).unwrap();
        assert!(next.is_feasible());
        assert_ne!(next, start);
    }

    #[test]
    fn test_discrete_order_crossover() {
        let p1 = vec![1, 2, 3, 4, 5, 6];
        let p2 = vec![6, 5, 4, 3, 2, 1];
        let (o1, o2) = Crossover::DiscreteOrder.apply_with_cuts(&p1, &p2, 2, 4);
        // center of p1 is [3, 4], p2 without it is [6, 5, 2, 1]
        assert_eq!(o1, vec![6, 5, 3, 4, 2, 1]);
        // center of p2 is [4, 3], p1 without it is [1, 2, 5, 6]
        assert_eq!(o2, vec![1, 2, 4, 3, 5, 6]);
    }

    #[test]
    fn test_continuous_order_crossover() {
        let p1 = vec![1, 2, 3, 4];
        let p2 = vec![4, 3, 2, 1];
        let (o1, o2) = Crossover::ContinuousOrder.apply_with_cuts(&p1, &p2, 1, 3);
        assert_eq!(o1, vec![4, 2, 3, 1]);
        assert_eq!(o2, vec![1, 3, 2, 4]);
    }

    #[test]
    fn test_crossover_short_parents_are_copied() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let (o1, o2) = Crossover::DiscreteOrder.apply(&[1, 2], &[2, 1], &mut rng);
        assert_eq!(o1, vec![1, 2]);
        assert_eq!(o2, vec![2, 1]);
    }

    #[test]
    fn test_random_cut_points_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for n in 3..12 {
            for _ in 0..20 {
                let (c1, c2) = cut_points(n, &mut rng).unwrap();
                assert!(c1 >= 1 && c1 < c2 && c2 < n);
            }
        }
    }

    #[test]
    fn test_roulette_wheel_distinct() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let order = roulette_wheel(&[1.0, 5.0, 0.0, 2.0], 4, &mut rng);
        assert_eq!(sorted(order), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_roulette_wheel_favors_heavy() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let hits = (0..1000)
            .filter(|_| roulette_wheel(&[1.0, 9.0], 1, &mut rng)[0] == 1)
            .count();
        assert!(hits > 800, "heavy index picked {} times", hits);
    }

    #[test]
    fn test_roulette_wheel_all_zero_is_uniform() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let order = roulette_wheel(&[0.0, f64::NAN, -1.0], 3, &mut rng);
        assert_eq!(sorted(order), vec![0, 1, 2]);
    }

    #[test]
    fn test_fitness_weights_favor_low_cost() {
        let problem = RoutingInstance::square();
        let good = problem.solution(vec![1, 2, 3]);
        let bad = problem.solution(vec![2, 1, 3]);
        let w = fitness_weights(&[bad, good]);
        assert!((w[1] - 1.0).abs() < 1e-12);
        assert!((w[0] - (-1.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(&[0.0, 1.0, 1000.0]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(p[2] > 0.99);
    }

    #[test]
    fn test_pairwise() {
        let items = [1, 2, 3, 4, 5];
        let step2: Vec<_> = pairwise(&items, 2).map(|(a, b)| (*a, *b)).collect();
        assert_eq!(step2, vec![(1, 2), (3, 4)]);
        let step1: Vec<_> = pairwise(&items, 1).map(|(a, b)| (*a, *b)).collect();
        assert_eq!(step1.len(), 4);
    }

    #[test]
    fn test_distance_preference_guards_zero() {
        assert_eq!(distance_preference(1.0, 0.0), 0.0);
        assert_eq!(distance_preference(2.0, 4.0), 0.5);
    }
}
