//! Exhaustive enumeration of every sequence, for small instances.

use crate::engine::{RunSummary, Solver};
use crate::error::SearchError;
use crate::problem::Problem;
use crate::solution::Solution;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use log::{debug, info};
use std::time::{Duration, Instant};

/// Tries all permutations of the problem's node set
pub struct ExhaustiveSearch<'p, P> {
    problem: &'p P,
    /// Every strict improvement, in enumeration order
    history: Vec<Solution>,
    evaluated: usize,
    duration: Duration,
    started_at: DateTime<Utc>,
}

impl<'p, P: Problem> ExhaustiveSearch<'p, P> {
    pub fn new(problem: &'p P) -> Self {
        ExhaustiveSearch {
            problem,
            history: Vec::new(),
            evaluated: 0,
            duration: Duration::ZERO,
            started_at: Utc::now(),
        }
    }

    /// Enumerate and return the best feasible sequence
    pub fn run(&mut self) -> Result<&Solution, SearchError> {
        let nodes = self.problem.nodes();
        info!("Enumerating {} nodes of {}", nodes.len(), self.problem.name());

        self.history.clear();
        self.evaluated = 0;
        self.started_at = Utc::now();
        let start = Instant::now();

        for sequence in nodes.iter().copied().permutations(nodes.len()) {
            self.evaluated += 1;
            let candidate = self.problem.solution(sequence);
            if !candidate.is_feasible() {
                continue;
            }
            if self.history.last().map_or(true, |best| candidate.is_better_than(best)) {
                debug!("Permutation {}: new best {:.4}", self.evaluated, candidate.cost());
                self.history.push(candidate);
            }
        }
        self.duration = start.elapsed();

        let best = self.history.last().ok_or(SearchError::NoFeasibleSolution)?;
        info!(
            "Exhaustive search finished: {} permutations in {:.2}s (best {:.4})",
            self.evaluated,
            self.duration.as_secs_f64(),
            best.cost()
        );
        Ok(best)
    }

    pub fn best_solution(&self) -> Option<&Solution> {
        self.history.last()
    }

    pub fn history(&self) -> &[Solution] {
        &self.history
    }

    /// Permutations evaluated by the last run
    pub fn evaluated(&self) -> usize {
        self.evaluated
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn summary(&self) -> RunSummary {
        let best = self.best_solution();
        let secs = self.duration.as_secs_f64();
        RunSummary {
            solver: "ExhaustiveSearch".to_string(),
            instance: self.problem.name().to_string(),
            seed: None,
            best_cost: best.map_or(f64::INFINITY, Solution::cost),
            best_sequence: best.map(|s| s.sequence().to_vec()).unwrap_or_default(),
            feasible: best.map_or(false, Solution::is_feasible),
            iterations: self.evaluated,
            aborted: false,
            duration_secs: secs,
            rate: if secs > 0.0 { self.evaluated as f64 / secs } else { 0.0 },
            started_at: self.started_at,
            cache: self.problem.cache_info(),
            best_costs: self.history.iter().map(Solution::cost).collect(),
        }
    }
}

impl<'p, P: Problem> Solver for ExhaustiveSearch<'p, P> {
    fn name(&self) -> &str {
        "ExhaustiveSearch"
    }

    fn solve(&mut self) -> Result<RunSummary, SearchError> {
        self.run()?;
        Ok(self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{MaintenanceInstance, RoutingInstance};

    #[test]
    fn test_matches_brute_force() {
        let problem = MaintenanceInstance::three_jobs();
        let sequences = [
            [1, 2, 3],
            [1, 3, 2],
            [2, 1, 3],
            [2, 3, 1],
            [3, 1, 2],
            [3, 2, 1],
        ];
        let optimum = sequences
            .iter()
            .map(|s| problem.evaluate(s).cost)
            .fold(f64::INFINITY, f64::min);

        let mut search = ExhaustiveSearch::new(&problem);
        let best = search.run().unwrap();
        assert_eq!(best.cost(), optimum);
        assert_eq!(search.evaluated(), 6);
    }

    #[test]
    fn test_history_strictly_improves() {
        let problem = RoutingInstance::circle(6);
        let mut search = ExhaustiveSearch::new(&problem);
        search.run().unwrap();
        let costs: Vec<f64> = search.history().iter().map(Solution::cost).collect();
        assert!(!costs.is_empty());
        assert!(costs.windows(2).all(|w| w[1] < w[0]));
        assert_eq!(search.evaluated(), 720);
    }

    #[test]
    fn test_no_feasible_sequence() {
        // A lone job next to a maintenance slot: the slot is always first or last
        let problem = MaintenanceInstance::random(1, 1, 0);
        let mut search = ExhaustiveSearch::new(&problem);
        assert!(matches!(search.run(), Err(SearchError::NoFeasibleSolution)));
    }

    #[test]
    fn test_solver_summary() {
        let problem = MaintenanceInstance::three_jobs();
        let mut search = ExhaustiveSearch::new(&problem);
        let summary = search.solve().unwrap();
        assert_eq!(summary.solver, "ExhaustiveSearch");
        assert_eq!(summary.iterations, 6);
        assert!(summary.feasible);
        assert_eq!(Some(summary.best_cost), summary.best_costs.last().copied());
    }
}
