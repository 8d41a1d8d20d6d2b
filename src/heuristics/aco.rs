//! Ant colony optimization.
//!
//! One ant per step builds a sequence from the problem origin, choosing the
//! next node with probability proportional to `tau^alpha * (1/d)^beta`. Trails
//! evaporate by `ro` and the ant's edges are reinforced by `q / d` whenever it
//! beats the running best.

use crate::engine::{SearchContext, Strategy};
use crate::error::SearchError;
use crate::operators::{pairwise, weighted_choice};
use crate::problem::Problem;
use crate::solution::Solution;
use serde::{Deserialize, Serialize};

/// ACO configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcoConfig {
    /// Pheromone deposit factor
    pub q: f64,
    /// Fraction of pheromone kept on evaporation
    pub ro: f64,
    /// Pheromone importance
    pub alpha: f64,
    /// Distance importance
    pub beta: f64,
    /// Initial pheromone level
    pub pher_init: f64,
    /// Evaporate on every step, not only on improvement
    pub always_evaporate: bool,
}

impl Default for AcoConfig {
    fn default() -> Self {
        AcoConfig {
            q: 2.0,
            ro: 0.9,
            alpha: 1.0,
            beta: 5.0,
            pher_init: 0.1,
            always_evaporate: false,
        }
    }
}

/// Ant colony optimization solver
#[derive(Debug, Clone)]
pub struct AntColonyOptimization {
    config: AcoConfig,
    /// `pheromone[a][b]` for `a` in origin and nodes, `b` in nodes
    pheromone: Vec<Vec<f64>>,
    nodes: Vec<usize>,
    /// Stand-in for non-positive distances
    min_distance: f64,
}

impl Default for AntColonyOptimization {
    fn default() -> Self {
        AntColonyOptimization::new(AcoConfig::default())
    }
}

impl AntColonyOptimization {
    pub fn new(config: AcoConfig) -> Self {
        AntColonyOptimization {
            config,
            pheromone: Vec::new(),
            nodes: Vec::new(),
            min_distance: 1.0,
        }
    }

    /// Trail on the ordered pair `(a, b)`; 0 outside the table
    pub fn pheromone(&self, a: usize, b: usize) -> f64 {
        self.pheromone.get(a).and_then(|row| row.get(b)).copied().unwrap_or(0.0)
    }

    fn distance<P: Problem>(&self, problem: &P, a: usize, b: usize) -> f64 {
        let d = problem.distance(a, b);
        if d > 0.0 && d.is_finite() {
            d
        } else {
            self.min_distance
        }
    }

    fn seed_trails<P: Problem>(&mut self, problem: &P) {
        let origin = problem.origin();
        self.nodes = problem.nodes();
        let size = self.nodes.iter().copied().chain(std::iter::once(origin)).max().unwrap_or(0) + 1;

        self.pheromone = vec![vec![0.0; size]; size];
        for &a in self.nodes.iter().chain(std::iter::once(&origin)) {
            for &b in &self.nodes {
                self.pheromone[a][b] = self.config.pher_init;
            }
        }

        self.min_distance = self
            .nodes
            .iter()
            .chain(std::iter::once(&origin))
            .flat_map(|&a| self.nodes.iter().map(move |&b| problem.distance(a, b)))
            .filter(|d| *d > 0.0 && d.is_finite())
            .fold(f64::INFINITY, f64::min);
        if !self.min_distance.is_finite() {
            self.min_distance = 1.0;
        }
    }

    /// Construct a sequence for one ant
    fn construct<P: Problem>(&self, ctx: &mut SearchContext<'_, P>) -> Solution {
        let problem = ctx.problem;
        let mut visited = vec![false; self.pheromone.len()];
        let mut sequence = Vec::with_capacity(self.nodes.len());
        let mut current = problem.origin();

        while sequence.len() < self.nodes.len() {
            let candidates: Vec<usize> =
                self.nodes.iter().copied().filter(|&n| !visited[n]).collect();
            let weights: Vec<f64> = candidates
                .iter()
                .map(|&n| {
                    let tau = self.pheromone[current][n].powf(self.config.alpha);
                    let eta = (1.0 / self.distance(problem, current, n)).powf(self.config.beta);
                    tau * eta
                })
                .collect();

            let Some(pick) = weighted_choice(&weights, &mut ctx.rng) else {
                break;
            };
            current = candidates[pick];
            visited[current] = true;
            sequence.push(current);
        }

        problem.solution(sequence)
    }

    /// A feasible ant, built at most `max_attempts` times
    pub fn move_ant<P: Problem>(
        &self,
        ctx: &mut SearchContext<'_, P>,
    ) -> Result<Solution, SearchError> {
        for _ in 0..ctx.config.max_attempts {
            let ant = self.construct(ctx);
            if ant.is_feasible() {
                return Ok(ant);
            }
        }
        Err(SearchError::InfeasibleConstruction {
            what: "ant",
            attempts: ctx.config.max_attempts,
        })
    }

    pub fn evaporate(&mut self) {
        for row in &mut self.pheromone {
            for tau in row.iter_mut() {
                *tau *= self.config.ro;
            }
        }
    }

    /// Reinforce every consecutive pair of `solution`
    pub fn deposit<P: Problem>(&mut self, problem: &P, solution: &Solution) {
        for (&a, &b) in pairwise(solution.sequence(), 1) {
            let amount = self.config.q / self.distance(problem, a, b);
            if let Some(tau) = self.pheromone.get_mut(a).and_then(|row| row.get_mut(b)) {
                *tau += amount;
            }
        }
    }
}

impl<P: Problem> Strategy<P> for AntColonyOptimization {
    fn name(&self) -> &'static str {
        "AntColonyOptimization"
    }

    fn population_size(&self) -> Option<usize> {
        Some(1)
    }

    fn validate(&self) -> Result<(), SearchError> {
        let c = &self.config;
        if !(0.0..=1.0).contains(&c.ro) {
            return Err(SearchError::InvalidConfig(format!("ro must lie in [0, 1], got {}", c.ro)));
        }
        if !(c.q >= 0.0 && c.pher_init >= 0.0) {
            return Err(SearchError::InvalidConfig("q and pher_init must be non-negative".into()));
        }
        if !(c.alpha.is_finite() && c.beta.is_finite()) {
            return Err(SearchError::InvalidConfig("alpha and beta must be finite".into()));
        }
        Ok(())
    }

    fn prepare(&mut self, ctx: &mut SearchContext<'_, P>) -> Result<(), SearchError> {
        self.seed_trails(ctx.problem);
        Ok(())
    }

    fn transition(&mut self, ctx: &mut SearchContext<'_, P>) -> Result<Vec<Solution>, SearchError> {
        let ant = self.move_ant(ctx)?;

        let mut evaporated = false;
        if self.config.always_evaporate {
            self.evaporate();
            evaporated = true;
        }

        if ant.cost() < ctx.best_cost() {
            if !evaporated {
                self.evaporate();
            }
            self.deposit(ctx.problem, &ant);
        }

        Ok(vec![ant])
    }
}
