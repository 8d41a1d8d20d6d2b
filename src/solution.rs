//! Solution representation and population helpers.
//!
//! A [`Solution`] is an immutable sequence of node/job identifiers whose cost
//! and feasibility are evaluated once, when the solution is created. Equality
//! and hashing look at the sequence only, ordering looks at the cost only.

use crate::problem::Evaluation;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::ops::Sub;

/// A candidate sequence with its memoized evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    sequence: Vec<usize>,
    cost: f64,
    feasible: bool,
}

impl Solution {
    /// Wrap a sequence with an already computed evaluation
    pub fn new(sequence: Vec<usize>, evaluation: Evaluation) -> Self {
        Solution {
            sequence,
            cost: evaluation.cost,
            feasible: evaluation.feasible,
        }
    }

    #[inline]
    pub fn sequence(&self) -> &[usize] {
        &self.sequence
    }

    #[inline]
    pub fn cost(&self) -> f64 {
        self.cost
    }

    #[inline]
    pub fn is_feasible(&self) -> bool {
        self.feasible
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn into_sequence(self) -> Vec<usize> {
        self.sequence
    }

    /// Total order by cost; solutions with equal cost compare `Equal`
    pub fn cmp_cost(&self, other: &Solution) -> Ordering {
        OrderedFloat(self.cost).cmp(&OrderedFloat(other.cost))
    }

    /// Strictly lower cost
    #[inline]
    pub fn is_better_than(&self, other: &Solution) -> bool {
        self.cost < other.cost
    }
}

impl PartialEq for Solution {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for Solution {}

impl Hash for Solution {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sequence.hash(state);
    }
}

/// Cost difference `self.cost - other.cost`
impl Sub for &Solution {
    type Output = f64;

    fn sub(self, other: &Solution) -> f64 {
        self.cost - other.cost
    }
}

impl std::fmt::Display for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} - {:.2}", self.sequence, self.cost)?;
        if !self.feasible {
            write!(f, " (infeasible)")?;
        }
        Ok(())
    }
}

/// Lowest-cost member of a population
pub fn best_of(population: &[Solution]) -> Option<&Solution> {
    population.iter().min_by(|a, b| a.cmp_cost(b))
}

/// Highest-cost member of a population
pub fn worst_of(population: &[Solution]) -> Option<&Solution> {
    population.iter().max_by(|a, b| a.cmp_cost(b))
}

/// Index of the lowest-cost member (first one on ties)
pub fn argmin(population: &[Solution]) -> Option<usize> {
    population
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp_cost(b))
        .map(|(i, _)| i)
}

/// Index of the highest-cost member (first one on ties)
pub fn argmax(population: &[Solution]) -> Option<usize> {
    let mut best: Option<(usize, &Solution)> = None;
    for (i, s) in population.iter().enumerate() {
        match best {
            Some((_, b)) if s.cmp_cost(b) != Ordering::Greater => {}
            _ => best = Some((i, s)),
        }
    }
    best.map(|(i, _)| i)
}

/// Duplicate density of a population in [0, 1].
///
/// 0 when every member is distinct (or the population has a single member),
/// 1 when all members are identical.
pub fn uniqueness(population: &[Solution]) -> f64 {
    let l = population.len();
    if l <= 1 {
        return 0.0;
    }
    let distinct: HashSet<&Solution> = population.iter().collect();
    (l - distinct.len()) as f64 / (l - 1) as f64
}
