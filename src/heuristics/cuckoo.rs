//! Cuckoo search with Levy flights.
//!
//! A flight chains `levy_length` neighbor moves, where the length follows a
//! power law. [`ModifiedCuckooSearch`] keeps a starting point per nest, favors
//! stagnant nests and accepts non-improving flights through an [`Annealing`]
//! schedule.

use crate::engine::{SearchContext, Strategy};
use crate::error::SearchError;
use crate::heuristics::annealing::{Annealing, AnnealingConfig};
use crate::operators::{fitness_weights, softmax, weighted_choice};
use crate::problem::Problem;
use crate::solution::{best_of, Solution};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Cuckoo search configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CuckooSearchConfig {
    /// Tail exponent of the flight length
    pub levy_alpha: f64,
    /// Shortest flight
    pub levy_min: usize,
    /// Longest flight
    pub max_flight: usize,
    /// Stop a flight as soon as it beats its start
    pub abort_flight: bool,
    /// Chain moves from the latest point instead of the start
    pub real_flight: bool,
    /// Fraction of the population regenerated every step (taken from the tail)
    pub p_rgn: f64,
    /// Probability of trying a random nest when the flown one is not beaten
    pub p_replace_random: f64,
}

impl Default for CuckooSearchConfig {
    fn default() -> Self {
        CuckooSearchConfig::for_difficulty(1)
    }
}

impl CuckooSearchConfig {
    pub fn for_difficulty(difficulty: usize) -> Self {
        let levy_min = 2 * difficulty.max(1);
        CuckooSearchConfig {
            levy_alpha: 2.0,
            levy_min,
            max_flight: 100 * levy_min,
            abort_flight: true,
            real_flight: true,
            p_rgn: 0.1,
            p_replace_random: 1.0,
        }
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        if !(self.levy_alpha > 0.0) {
            return Err(SearchError::InvalidConfig("levy_alpha must be positive".into()));
        }
        if self.levy_min == 0 || self.max_flight < self.levy_min {
            return Err(SearchError::InvalidConfig(format!(
                "flight bounds must satisfy 1 <= levy_min <= max_flight, got {} and {}",
                self.levy_min, self.max_flight
            )));
        }
        for (name, p) in [("p_rgn", self.p_rgn), ("p_replace_random", self.p_replace_random)] {
            if !(0.0..=1.0).contains(&p) {
                return Err(SearchError::InvalidConfig(format!(
                    "{} must lie in [0, 1], got {}",
                    name, p
                )));
            }
        }
        Ok(())
    }
}

/// Cuckoo search strategy
#[derive(Debug, Clone, Default)]
pub struct CuckooSearch {
    config: CuckooSearchConfig,
}

impl CuckooSearch {
    pub fn new(config: CuckooSearchConfig) -> Self {
        CuckooSearch { config }
    }

    pub fn config(&self) -> &CuckooSearchConfig {
        &self.config
    }

    /// Power-law flight length in `[levy_min, max_flight]`
    pub fn levy_length<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let u: f64 = rng.gen();
        let length = self.config.levy_min as f64 * (1.0 - u).powf(-1.0 / self.config.levy_alpha);
        if length.is_finite() {
            (length.floor() as usize).clamp(1, self.config.max_flight)
        } else {
            self.config.max_flight
        }
    }

    /// Points visited by one flight from `start`
    pub fn fly<P: Problem>(
        &self,
        ctx: &mut SearchContext<'_, P>,
        start: &Solution,
    ) -> Result<Vec<Solution>, SearchError> {
        let length = self.levy_length(&mut ctx.rng);
        let mut flight = Vec::with_capacity(length);
        let mut current = start.clone();

        for _ in 0..length {
            let new = ctx.neighbor(&current)?;
            if self.config.real_flight {
                current = new.clone();
            }
            if self.config.abort_flight && new.is_better_than(start) {
                return Ok(vec![new]);
            }
            flight.push(new);
        }
        Ok(flight)
    }

    /// Best point of one flight from `start`
    pub fn best_flight<P: Problem>(
        &self,
        ctx: &mut SearchContext<'_, P>,
        start: &Solution,
    ) -> Result<Solution, SearchError> {
        let flight = self.fly(ctx, start)?;
        best_of(&flight).cloned().ok_or(SearchError::InfeasibleConstruction {
            what: "flight",
            attempts: 0,
        })
    }
}

impl<P: Problem> Strategy<P> for CuckooSearch {
    fn name(&self) -> &'static str {
        "CuckooSearch"
    }

    fn validate(&self) -> Result<(), SearchError> {
        self.config.validate()
    }

    fn transition(&mut self, ctx: &mut SearchContext<'_, P>) -> Result<Vec<Solution>, SearchError> {
        let mut population = ctx.population.clone();
        let n = population.len();

        let which = weighted_choice(&fitness_weights(&population), &mut ctx.rng).unwrap_or(0);
        let new = self.best_flight(ctx, &population[which])?;

        if new.is_better_than(&population[which]) {
            population[which] = new;
        } else if ctx.rng.gen::<f64>() < self.config.p_replace_random {
            let i = ctx.rng.gen_range(0..n);
            if new.is_better_than(&population[i]) {
                population[i] = new;
            }
        }

        let regenerated = (self.config.p_rgn * n as f64).floor() as usize;
        for slot in n - regenerated.min(n)..n {
            population[slot] = ctx.random_solution()?;
        }
        Ok(population)
    }
}

/// Modified cuckoo search configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModifiedCuckooSearchConfig {
    pub cuckoo: CuckooSearchConfig,
    pub annealing: AnnealingConfig,
    /// Fraction of leading nests perturbed at each epoch
    pub p_split: f64,
    /// Iterations between two perturbations of the leading nests
    pub epoch: usize,
}

impl Default for ModifiedCuckooSearchConfig {
    fn default() -> Self {
        ModifiedCuckooSearchConfig::for_difficulty(1)
    }
}

impl ModifiedCuckooSearchConfig {
    pub fn for_difficulty(difficulty: usize) -> Self {
        ModifiedCuckooSearchConfig {
            cuckoo: CuckooSearchConfig::for_difficulty(difficulty),
            annealing: AnnealingConfig::default(),
            p_split: 0.1,
            epoch: 500,
        }
    }
}

/// Cuckoo search with per-nest starting points and annealed acceptance
#[derive(Debug, Clone)]
pub struct ModifiedCuckooSearch {
    cuckoo: CuckooSearch,
    annealing: Annealing,
    p_split: f64,
    epoch: usize,
    starting_points: Vec<Solution>,
    useless_attempts: Vec<usize>,
}

impl ModifiedCuckooSearch {
    pub fn new(config: ModifiedCuckooSearchConfig) -> Self {
        ModifiedCuckooSearch {
            cuckoo: CuckooSearch::new(config.cuckoo),
            annealing: Annealing::new(config.annealing),
            p_split: config.p_split,
            epoch: config.epoch,
            starting_points: Vec::new(),
            useless_attempts: Vec::new(),
        }
    }

    pub fn starting_points(&self) -> &[Solution] {
        &self.starting_points
    }

    /// Flights since each nest last improved
    pub fn useless_attempts(&self) -> &[usize] {
        &self.useless_attempts
    }

    pub fn annealing(&self) -> &Annealing {
        &self.annealing
    }

    fn pick_nest<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        if self.useless_attempts.iter().all(|&c| c == 0) {
            return rng.gen_range(0..self.useless_attempts.len());
        }
        let counts: Vec<f64> = self.useless_attempts.iter().map(|&c| c as f64).collect();
        weighted_choice(&softmax(&counts), rng).unwrap_or(0)
    }
}

impl<P: Problem> Strategy<P> for ModifiedCuckooSearch {
    fn name(&self) -> &'static str {
        "ModifiedCuckooSearch"
    }

    fn validate(&self) -> Result<(), SearchError> {
        self.cuckoo.config.validate()?;
        self.annealing.config().validate()?;
        if !(0.0..=1.0).contains(&self.p_split) {
            return Err(SearchError::InvalidConfig(format!(
                "p_split must lie in [0, 1], got {}",
                self.p_split
            )));
        }
        if self.epoch == 0 {
            return Err(SearchError::InvalidConfig("epoch must be positive".into()));
        }
        Ok(())
    }

    fn prepare(&mut self, ctx: &mut SearchContext<'_, P>) -> Result<(), SearchError> {
        self.starting_points = ctx.population.clone();
        self.useless_attempts = vec![0; ctx.population.len()];
        self.annealing.calibrate(ctx)
    }

    fn transition(&mut self, ctx: &mut SearchContext<'_, P>) -> Result<Vec<Solution>, SearchError> {
        let mut population = ctx.population.clone();
        let n = population.len();

        if ctx.iteration % self.epoch == 0 {
            let split = (n as f64 * self.p_split).floor() as usize;
            for i in 0..split {
                let new = ctx.neighbor(&population[i])?;
                let slot = n - split + i;
                population[slot] = new.clone();
                self.starting_points[slot] = new;
            }
        }

        let which = self.pick_nest(&mut ctx.rng);
        let start = self.starting_points[which].clone();
        let new = self.cuckoo.best_flight(ctx, &start)?;
        self.useless_attempts[which] += 1;

        if new.is_better_than(&population[which]) {
            population[which] = new.clone();
            self.starting_points[which] = new;
            self.useless_attempts[which] = 0;
        } else if self.annealing.accept(ctx.best_cost(), new.cost(), ctx.iteration, &mut ctx.rng) {
            self.starting_points[which] = new;
        }

        Ok(population)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::config;
    use crate::engine::Metaheuristic;
    use crate::instance::{MaintenanceInstance, RoutingInstance};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_levy_length_bounds() {
        let cuckoo = CuckooSearch::new(CuckooSearchConfig {
            levy_min: 3,
            max_flight: 20,
            ..CuckooSearchConfig::default()
        });
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let lengths: Vec<usize> = (0..2000).map(|_| cuckoo.levy_length(&mut rng)).collect();

        assert!(lengths.iter().all(|&l| (3..=20).contains(&l)));
        // Heavy tail: the cap is reached now and then
        assert!(lengths.iter().any(|&l| l == 20));
    }

    #[test]
    fn test_flight_from_fixed_start() {
        let problem = RoutingInstance::circle(6);
        let mut ctx = SearchContext::new(&problem, config(10, 1));
        let start = problem.solution(vec![1, 2, 3, 4, 5, 6]);

        let cuckoo = CuckooSearch::new(CuckooSearchConfig {
            abort_flight: false,
            real_flight: false,
            ..CuckooSearchConfig::default()
        });
        let flight = cuckoo.fly(&mut ctx, &start).unwrap();

        assert!(flight.len() >= 2);
        for point in &flight {
            let moved =
                point.sequence().iter().zip(start.sequence()).filter(|(a, b)| a != b).count();
            assert_eq!(moved, 2);
        }
    }

    #[test]
    fn test_aborted_flight_returns_the_improvement() {
        let problem = RoutingInstance::circle(6);
        // Zig-zag tour, far from the circle order
        let start = problem.solution(vec![1, 4, 2, 5, 3, 6]);
        let fixed = CuckooSearchConfig {
            levy_min: 200,
            max_flight: 200,
            ..CuckooSearchConfig::default()
        };

        // Same seed, so both flights draw the same moves
        let full = CuckooSearch::new(CuckooSearchConfig { abort_flight: false, ..fixed.clone() });
        let mut ctx = SearchContext::new(&problem, config(10, 1));
        let flight = full.fly(&mut ctx, &start).unwrap();
        assert_eq!(flight.len(), 200);
        let first = flight.iter().position(|p| p.is_better_than(&start)).unwrap();
        assert!(first < 199);

        let aborted = CuckooSearch::new(fixed);
        let mut ctx = SearchContext::new(&problem, config(10, 1));
        let flight_aborted = aborted.fly(&mut ctx, &start).unwrap();
        assert_eq!(flight_aborted.len(), 1);
        assert!(flight_aborted[0].is_better_than(&start));
        assert_eq!(flight_aborted[0], flight[first]);
    }

    #[test]
    fn test_population_size_is_kept() {
        let problem = RoutingInstance::circle(7);
        let cuckoo =
            CuckooSearch::new(CuckooSearchConfig { p_rgn: 0.5, ..CuckooSearchConfig::default() });
        let mut engine = Metaheuristic::new(&problem, cuckoo, config(30, 6)).unwrap();
        for _ in 0..10 {
            engine.step().unwrap();
            assert_eq!(engine.population().len(), 6);
            assert!(engine.population().iter().all(Solution::is_feasible));
        }
    }

    #[test]
    fn test_modified_bookkeeping() {
        let problem = RoutingInstance::circle(7);
        let mut engine = Metaheuristic::new(
            &problem,
            ModifiedCuckooSearch::new(ModifiedCuckooSearchConfig::for_difficulty(2)),
            config(200, 6),
        )
        .unwrap();

        assert_eq!(engine.strategy().starting_points(), engine.population());
        assert!(engine.strategy().useless_attempts().iter().all(|&c| c == 0));

        engine.step().unwrap();
        assert!(engine.strategy().useless_attempts().iter().sum::<usize>() <= 1);
        assert_eq!(engine.strategy().starting_points().len(), 6);
    }

    #[test]
    fn test_best_cost_never_increases() {
        let problem = MaintenanceInstance::random(6, 2, 21);

        let cuckoo = CuckooSearch::new(CuckooSearchConfig::for_difficulty(2));
        let mut engine = Metaheuristic::new(&problem, cuckoo, config(150, 5)).unwrap();
        engine.run().unwrap();
        assert!(engine.best_costs().windows(2).all(|w| w[1] <= w[0]));

        let modified = ModifiedCuckooSearch::new(ModifiedCuckooSearchConfig {
            epoch: 10,
            p_split: 0.4,
            ..ModifiedCuckooSearchConfig::for_difficulty(2)
        });
        let mut engine = Metaheuristic::new(&problem, modified, config(150, 5)).unwrap();
        engine.run().unwrap();
        assert!(engine.best_costs().windows(2).all(|w| w[1] <= w[0]));
        assert!(engine.best_solution().unwrap().is_feasible());
    }
}
