//! Simulated annealing.
//!
//! The cooling schedule ([`Annealing`]) is calibrated once per run from an
//! exploratory walk and then decreases linearly with the iteration. It is a
//! standalone value so other strategies can reuse the acceptance rule.

use crate::engine::{SearchContext, Strategy};
use crate::error::SearchError;
use crate::problem::Problem;
use crate::solution::Solution;
use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Cooling schedule configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealingConfig {
    /// Acceptance probability of an average worsening move at the start
    pub startprob: f64,
    /// Acceptance probability of a one-sigma worsening move at the end
    pub endprob: f64,
    /// Length of the calibration walk (defaults to `n_iters`)
    pub calibration_iters: Option<usize>,
    /// Initial temperature used when calibration yields no usable statistics
    pub fallback_temperature: f64,
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        AnnealingConfig {
            startprob: 0.1,
            endprob: 0.02,
            calibration_iters: None,
            fallback_temperature: 1.0,
        }
    }
}

impl AnnealingConfig {
    pub fn validate(&self) -> Result<(), SearchError> {
        for (name, p) in [("startprob", self.startprob), ("endprob", self.endprob)] {
            if !(p > 0.0 && p < 1.0) {
                return Err(SearchError::InvalidConfig(format!(
                    "{} must lie in (0, 1), got {}",
                    name, p
                )));
            }
        }
        if !(self.fallback_temperature > 0.0 && self.fallback_temperature.is_finite()) {
            return Err(SearchError::InvalidConfig(
                "fallback_temperature must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Linear cooling schedule `T(k) = ti - dt * k`
#[derive(Debug, Clone, Default)]
pub struct Annealing {
    config: AnnealingConfig,
    ti: f64,
    tf: f64,
    dt: f64,
}

impl Annealing {
    /// An uncalibrated schedule (zero temperature)
    pub fn new(config: AnnealingConfig) -> Self {
        Annealing {
            config,
            ti: 0.0,
            tf: 0.0,
            dt: 0.0,
        }
    }

    /// A schedule with explicit end points
    pub fn with_schedule(config: AnnealingConfig, ti: f64, tf: f64, n_iters: usize) -> Self {
        let tf = tf.min(ti);
        Annealing {
            config,
            ti,
            tf,
            dt: (ti - tf) / n_iters.max(1) as f64,
        }
    }

    pub fn config(&self) -> &AnnealingConfig {
        &self.config
    }

    pub fn ti(&self) -> f64 {
        self.ti
    }

    pub fn tf(&self) -> f64 {
        self.tf
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Fit the schedule on a greedy walk from a random solution.
    ///
    /// Worsening neighbors are recorded and discarded, improving ones become
    /// the current point.
    pub fn calibrate<P: Problem>(
        &mut self,
        ctx: &mut SearchContext<'_, P>,
    ) -> Result<(), SearchError> {
        let n_iters = ctx.config.n_iters;
        let samples = self.config.calibration_iters.unwrap_or(n_iters);

        let mut current = ctx.random_solution()?;
        let mut costs = Vec::with_capacity(samples + 1);
        let mut deltas = Vec::new();
        costs.push(current.cost());

        for _ in 0..samples {
            let new = ctx.neighbor(&current)?;
            costs.push(new.cost());
            if new.cost() > current.cost() {
                deltas.push(&new - &current);
            } else {
                current = new;
            }
        }

        self.fit(&deltas, &costs, n_iters);
        Ok(())
    }

    fn fit(&mut self, deltas: &[f64], costs: &[f64], n_iters: usize) {
        let sigma = if costs.len() >= 2 { costs.std_dev() } else { f64::NAN };
        let mu = if deltas.is_empty() { sigma } else { deltas.mean() };

        let mut ti = -mu / self.config.startprob.ln();
        let mut tf = -sigma / self.config.endprob.ln();

        if !(ti.is_finite() && tf.is_finite() && ti > 0.0) {
            warn!(
                "Unusable annealing calibration on {} points (mu={}, sigma={}), T starts at {}",
                costs.len(),
                mu,
                sigma,
                self.config.fallback_temperature
            );
            ti = self.config.fallback_temperature;
            tf = 0.0;
        }

        *self = Annealing::with_schedule(self.config.clone(), ti, tf, n_iters);
        debug!("Annealing schedule ti={:.4} tf={:.4} dt={:.6}", self.ti, self.tf, self.dt);
    }

    /// Temperature at iteration `k`
    #[inline]
    pub fn temperature(&self, k: usize) -> f64 {
        self.ti - self.dt * k as f64
    }

    /// Metropolis test of `candidate` against `best` at iteration `k`
    pub fn accept<R: Rng + ?Sized>(
        &self,
        best: f64,
        candidate: f64,
        k: usize,
        rng: &mut R,
    ) -> bool {
        let t = self.temperature(k);
        if t <= 0.0 {
            return false;
        }
        rng.gen::<f64>() < ((best - candidate) / t).exp()
    }
}

/// Simulated annealing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedAnnealingConfig {
    /// Neighbors generated per step
    pub neighborhood_size: usize,
    /// Walk from the latest neighbor instead of always from the current point
    pub recursive: bool,
    pub annealing: AnnealingConfig,
}

impl Default for SimulatedAnnealingConfig {
    fn default() -> Self {
        SimulatedAnnealingConfig::for_difficulty(1)
    }
}

impl SimulatedAnnealingConfig {
    pub fn for_difficulty(difficulty: usize) -> Self {
        SimulatedAnnealingConfig {
            neighborhood_size: 2 * difficulty.max(1),
            recursive: false,
            annealing: AnnealingConfig::default(),
        }
    }
}

/// Single-trajectory annealed hill climbing
#[derive(Debug, Clone)]
pub struct SimulatedAnnealing {
    config: SimulatedAnnealingConfig,
    annealing: Annealing,
}

impl SimulatedAnnealing {
    pub fn new(config: SimulatedAnnealingConfig) -> Self {
        let annealing = Annealing::new(config.annealing.clone());
        SimulatedAnnealing { config, annealing }
    }

    pub fn annealing(&self) -> &Annealing {
        &self.annealing
    }
}

impl<P: Problem> Strategy<P> for SimulatedAnnealing {
    fn name(&self) -> &'static str {
        "SimulatedAnnealing"
    }

    fn population_size(&self) -> Option<usize> {
        Some(1)
    }

    fn validate(&self) -> Result<(), SearchError> {
        if self.config.neighborhood_size == 0 {
            return Err(SearchError::InvalidConfig("neighborhood_size must be positive".into()));
        }
        self.config.annealing.validate()
    }

    fn prepare(&mut self, ctx: &mut SearchContext<'_, P>) -> Result<(), SearchError> {
        self.annealing.calibrate(ctx)
    }

    fn transition(&mut self, ctx: &mut SearchContext<'_, P>) -> Result<Vec<Solution>, SearchError> {
        let start = ctx.population[0].clone();
        let best = ctx.best_cost();

        let mut current = start.clone();
        let mut best_neighbor: Option<Solution> = None;
        for _ in 0..self.config.neighborhood_size {
            let new = ctx.neighbor(&current)?;
            if new.cost() < best {
                return Ok(vec![new]);
            }
            if self.config.recursive {
                current = new.clone();
            }
            if best_neighbor.as_ref().map_or(true, |b| new.is_better_than(b)) {
                best_neighbor = Some(new);
            }
        }

        let iteration = ctx.iteration;
        match best_neighbor {
            Some(candidate)
                if self.annealing.accept(best, candidate.cost(), iteration, &mut ctx.rng) =>
            {
                Ok(vec![candidate])
            }
            _ => Ok(vec![start]),
        }
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
    fn test_calibrated_schedule() {
        let problem = RoutingInstance::circle(8);
        let engine = Metaheuristic::new(
            &problem,
            SimulatedAnnealing::new(SimulatedAnnealingConfig::for_difficulty(8)),
            config(500, 1),
        )
        .unwrap();
        let annealing = engine.strategy().annealing();

        assert!(annealing.ti() > 0.0);
        assert!(annealing.tf() <= annealing.ti());
        assert!((annealing.dt() - (annealing.ti() - annealing.tf()) / 500.0).abs() < 1e-12);
    }

    #[test]
    fn test_temperature_is_linear_and_non_increasing() {
        let annealing = Annealing::with_schedule(AnnealingConfig::default(), 10.0, 2.0, 8);
        assert_eq!(annealing.dt(), 1.0);
        for k in 0..=8 {
            assert_eq!(annealing.temperature(k), 10.0 - k as f64);
        }
        assert!((0..8).all(|k| annealing.temperature(k + 1) <= annealing.temperature(k)));
    }

    #[test]
    fn test_final_temperature_clamped_to_initial() {
        let annealing = Annealing::with_schedule(AnnealingConfig::default(), 1.0, 5.0, 10);
        assert_eq!(annealing.tf(), 1.0);
        assert_eq!(annealing.dt(), 0.0);
    }

    #[test]
    fn test_calibration_fallback() {
        let problem = MaintenanceInstance::three_jobs();
        let mut ctx = SearchContext::new(&problem, config(100, 1));
        let mut annealing = Annealing::new(AnnealingConfig {
            calibration_iters: Some(0),
            ..AnnealingConfig::default()
        });
        annealing.calibrate(&mut ctx).unwrap();

        assert_eq!(annealing.ti(), 1.0);
        assert_eq!(annealing.tf(), 0.0);
        assert!((annealing.dt() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_accept() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let annealing = Annealing::with_schedule(AnnealingConfig::default(), 1.0, 0.0, 10);

        // Improvements always pass while the temperature is positive
        assert!((0..50).all(|_| annealing.accept(5.0, 4.0, 3, &mut rng)));
        // Non-positive temperature rejects everything
        assert!(!annealing.accept(5.0, 4.0, 11, &mut rng));
        // Huge worsening is practically never accepted
        assert!(!(0..50).any(|_| annealing.accept(0.0, 1000.0, 0, &mut rng)));
    }

    #[test]
    fn test_best_cost_never_increases() {
        let problem = RoutingInstance::circle(8);
        for recursive in [false, true] {
            let sa = SimulatedAnnealing::new(SimulatedAnnealingConfig {
                recursive,
                ..SimulatedAnnealingConfig::for_difficulty(8)
            });
            let mut engine = Metaheuristic::new(&problem, sa, config(400, 1)).unwrap();
            engine.run().unwrap();

            assert_eq!(engine.population().len(), 1);
            assert!(engine.best_costs().windows(2).all(|w| w[1] <= w[0]));
        }
    }

    #[test]
    fn test_population_forced_to_one() {
        let problem = RoutingInstance::square();
        let sa = SimulatedAnnealing::new(SimulatedAnnealingConfig::default());
        let engine = Metaheuristic::new(&problem, sa, config(10, 5)).unwrap();
        assert_eq!(engine.config().pop_size, 1);
    }
}
