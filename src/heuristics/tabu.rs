//! Tabu search over a single trajectory.

use crate::engine::{SearchContext, Strategy};
use crate::error::SearchError;
use crate::problem::Problem;
use crate::solution::Solution;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Tabu search configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabuSearchConfig {
    /// Neighbors generated per step
    pub neighborhood_size: usize,
    /// Bound of the tabu queue
    pub tabu_list_length: usize,
}

impl Default for TabuSearchConfig {
    fn default() -> Self {
        TabuSearchConfig::for_difficulty(1)
    }
}

impl TabuSearchConfig {
    pub fn for_difficulty(difficulty: usize) -> Self {
        let difficulty = difficulty.max(1);
        TabuSearchConfig {
            neighborhood_size: 2 * difficulty,
            tabu_list_length: 4 * difficulty,
        }
    }
}

/// Tabu search strategy
#[derive(Debug, Clone)]
pub struct TabuSearch {
    config: TabuSearchConfig,
    tabu_list: VecDeque<Solution>,
}

impl TabuSearch {
    pub fn new(config: TabuSearchConfig) -> Self {
        TabuSearch {
            tabu_list: VecDeque::with_capacity(config.tabu_list_length + 1),
            config,
        }
    }

    /// Recently selected solutions, oldest first
    pub fn tabu_list(&self) -> &VecDeque<Solution> {
        &self.tabu_list
    }

    fn remember(&mut self, solution: Solution) {
        self.tabu_list.push_back(solution);
        while self.tabu_list.len() > self.config.tabu_list_length {
            self.tabu_list.pop_front();
        }
    }
}

impl<P: Problem> Strategy<P> for TabuSearch {
    fn name(&self) -> &'static str {
        "TabuSearch"
    }

    fn population_size(&self) -> Option<usize> {
        Some(1)
    }

    fn validate(&self) -> Result<(), SearchError> {
        if self.config.neighborhood_size == 0 {
            return Err(SearchError::InvalidConfig("neighborhood_size must be positive".into()));
        }
        Ok(())
    }

    fn prepare(&mut self, _ctx: &mut SearchContext<'_, P>) -> Result<(), SearchError> {
        self.tabu_list.clear();
        Ok(())
    }

    fn transition(&mut self, ctx: &mut SearchContext<'_, P>) -> Result<Vec<Solution>, SearchError> {
        let current = ctx.population[0].clone();

        let mut best_neighbor: Option<Solution> = None;
        for _ in 0..self.config.neighborhood_size {
            let new = ctx.neighbor(&current)?;
            if self.tabu_list.contains(&new) {
                continue;
            }
            if best_neighbor.as_ref().map_or(true, |b| new.is_better_than(b)) {
                best_neighbor = Some(new);
            }
        }

        // The best non-tabu neighbor is always remembered, accepted only if it improves
        if let Some(best) = best_neighbor {
            self.remember(best.clone());
            if best.is_better_than(&current) {
                return Ok(vec![best]);
            }
        }
        Ok(vec![current])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::config;
    use crate::engine::Metaheuristic;
    use crate::instance::RoutingInstance;

    fn two_nodes() -> RoutingInstance {
        RoutingInstance::from_coordinates("line", &[(0.0, 0.0), (1.0, 0.0), (3.0, 0.0)])
    }

    #[test]
    fn test_queue_is_bounded_fifo() {
        let problem = RoutingInstance::square();
        let mut tabu =
            TabuSearch::new(TabuSearchConfig { neighborhood_size: 2, tabu_list_length: 2 });
        tabu.remember(problem.solution(vec![1, 2, 3]));
        tabu.remember(problem.solution(vec![2, 1, 3]));
        tabu.remember(problem.solution(vec![3, 2, 1]));

        let kept: Vec<Vec<usize>> =
            tabu.tabu_list().iter().map(|s| s.sequence().to_vec()).collect();
        assert_eq!(kept, vec![vec![2, 1, 3], vec![3, 2, 1]]);
    }

    #[test]
    fn test_queue_never_exceeds_bound() {
        let problem = RoutingInstance::circle(7);
        let tabu = TabuSearch::new(TabuSearchConfig { neighborhood_size: 6, tabu_list_length: 3 });
        let mut engine = Metaheuristic::new(&problem, tabu, config(200, 1)).unwrap();
        while !engine.step().unwrap().terminated {
            assert!(engine.strategy().tabu_list().len() <= 3);
        }
    }

    #[test]
    fn test_whole_neighborhood_tabu() {
        let problem = two_nodes();
        let mut ctx = SearchContext::new(&problem, config(10, 1));
        ctx.population = vec![problem.solution(vec![1, 2])];
        ctx.best_population = ctx.population.clone();

        let mut tabu = TabuSearch::new(TabuSearchConfig::default());
        // Swapping [1, 2] can only give [2, 1]
        tabu.remember(problem.solution(vec![2, 1]));

        let next = tabu.transition(&mut ctx).unwrap();
        assert_eq!(next, ctx.population);
        assert_eq!(tabu.tabu_list().len(), 1);
        assert_eq!(tabu.tabu_list()[0].sequence(), &[2, 1]);
    }

    #[test]
    fn test_non_improving_neighbor_is_remembered() {
        let problem = two_nodes();
        let mut ctx = SearchContext::new(&problem, config(10, 1));
        // On a line both directions cost the same
        ctx.population = vec![problem.solution(vec![1, 2])];
        ctx.best_population = ctx.population.clone();

        let mut tabu = TabuSearch::new(TabuSearchConfig::default());
        let next = tabu.transition(&mut ctx).unwrap();
        assert_eq!(next[0].sequence(), &[1, 2]);
        assert_eq!(tabu.tabu_list().len(), 1);
    }

    #[test]
    fn test_best_cost_never_increases() {
        let problem = RoutingInstance::circle(8);
        let tabu = TabuSearch::new(TabuSearchConfig::for_difficulty(8));
        let mut engine = Metaheuristic::new(&problem, tabu, config(300, 1)).unwrap();
        engine.run().unwrap();
        assert!(engine.best_costs().windows(2).all(|w| w[1] <= w[0]));
    }
}
