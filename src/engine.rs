//! Iteration and convergence engine shared by every strategy.
//!
//! A [`Metaheuristic`] owns the run state (population, best population,
//! counters, clock, history) inside a [`SearchContext`] and delegates the
//! population transition of each step to a [`Strategy`]. The engine alone
//! decides improvement and termination:
//!
//! - the best population is replaced only when a step strictly improves on
//!   the running best, so the best cost never increases
//! - the run aborts once `abort_threshold` consecutive steps brought no
//!   improvement, and stops anyway after `n_iters` steps

use crate::error::SearchError;
use crate::operators::Perturbation;
use crate::problem::{CacheInfo, Problem};
use crate::solution::{best_of, uniqueness, worst_of, Solution};
use chrono::{DateTime, Utc};
use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Settings shared by every strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of steps
    pub n_iters: usize,
    /// Population size (forced to 1 by single-trajectory strategies)
    pub pop_size: usize,
    /// Fraction of `n_iters` without improvement that aborts the run
    pub abort_iter: f64,
    /// Seed of the run's generator; drawn from entropy when absent
    pub seed: Option<u64>,
    /// Perturbation used to build neighbors and mutations
    pub operator: Perturbation,
    /// Cap of every rejection-sampling loop
    pub max_attempts: usize,
    /// Keep every population and best of the run
    pub record_history: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::for_difficulty(1)
    }
}

impl EngineConfig {
    /// Defaults scaled by a problem difficulty
    pub fn for_difficulty(difficulty: usize) -> Self {
        let difficulty = difficulty.max(1);
        EngineConfig {
            n_iters: 5000 * difficulty,
            pop_size: difficulty,
            abort_iter: 0.2,
            seed: None,
            operator: Perturbation::Swap,
            max_attempts: 1000,
            record_history: true,
        }
    }

    pub fn for_problem<P: Problem>(problem: &P) -> Self {
        EngineConfig::for_difficulty(problem.difficulty())
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        if self.n_iters == 0 {
            return Err(SearchError::InvalidConfig("n_iters must be positive".into()));
        }
        if self.pop_size == 0 {
            return Err(SearchError::InvalidConfig("pop_size must be positive".into()));
        }
        if !(self.abort_iter > 0.0 && self.abort_iter <= 1.0) {
            return Err(SearchError::InvalidConfig(format!(
                "abort_iter must lie in (0, 1], got {}",
                self.abort_iter
            )));
        }
        if self.max_attempts == 0 {
            return Err(SearchError::InvalidConfig("max_attempts must be positive".into()));
        }
        Ok(())
    }

    /// Consecutive non-improving steps that abort the run
    pub fn abort_threshold(&self) -> usize {
        ((self.abort_iter * self.n_iters as f64).floor() as usize).max(1)
    }
}

/// Overlay the fields named in a JSON object on top of `base`.
///
/// Used to apply partial config files on top of difficulty-scaled defaults.
pub fn with_overrides<T>(base: T, overrides: &serde_json::Value) -> Result<T, SearchError>
where
    T: Serialize + DeserializeOwned,
{
    let mut merged = serde_json::to_value(base)?;
    match (merged.is_object(), overrides.is_object()) {
        (true, true) => merge(&mut merged, overrides),
        (_, false) if overrides.is_null() => {}
        _ => {
            return Err(SearchError::InvalidConfig(
                "configuration overrides must be a JSON object".into(),
            ))
        }
    }
    Ok(serde_json::from_value(merged)?)
}

/// Nested objects are overlaid key by key, anything else is replaced
fn merge(target: &mut serde_json::Value, source: &serde_json::Value) {
    match (target, source) {
        (serde_json::Value::Object(target), serde_json::Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}

/// Mutable state of a run, handed to the strategy on every step
pub struct SearchContext<'p, P> {
    pub problem: &'p P,
    pub config: EngineConfig,
    pub rng: ChaCha8Rng,
    pub population: Vec<Solution>,
    /// Snapshot of the population at the last improving step
    pub best_population: Vec<Solution>,
    pub iteration: usize,
    pub no_improvement: usize,
}

impl<'p, P: Problem> SearchContext<'p, P> {
    /// An empty context; populations are filled by [`SearchContext::populate`]
    pub fn new(problem: &'p P, config: EngineConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        SearchContext {
            problem,
            config,
            rng,
            population: Vec::new(),
            best_population: Vec::new(),
            iteration: 0,
            no_improvement: 0,
        }
    }

    /// A random feasible solution, drawn at most `max_attempts` times
    pub fn random_solution(&mut self) -> Result<Solution, SearchError> {
        for _ in 0..self.config.max_attempts {
            let candidate = self.problem.random_solution(&mut self.rng);
            if candidate.is_feasible() {
                return Ok(candidate);
            }
        }
        Err(SearchError::InfeasibleConstruction {
            what: "random solution",
            attempts: self.config.max_attempts,
        })
    }

    /// Fill the population with `pop_size` random solutions and take it as
    /// the first best population
    pub fn populate(&mut self) -> Result<(), SearchError> {
        let population = (0..self.config.pop_size)
            .map(|_| self.random_solution())
            .collect::<Result<Vec<_>, _>>()?;
        self.best_population = population.clone();
        self.population = population;
        Ok(())
    }

    /// Feasible neighbor through the configured perturbation
    pub fn neighbor(&mut self, solution: &Solution) -> Result<Solution, SearchError> {
        let operator = self.config.operator;
        operator.neighbor(self.problem, solution, &mut self.rng, self.config.max_attempts)
    }

    /// One unchecked perturbation, feasible or not
    pub fn perturb(&mut self, solution: &Solution) -> Solution {
        let sequence = self.config.operator.perturb(solution.sequence(), &mut self.rng);
        self.problem.solution(sequence)
    }

    pub fn best_solution(&self) -> Option<&Solution> {
        best_of(&self.best_population)
    }

    pub fn worst_solution(&self) -> Option<&Solution> {
        worst_of(&self.best_population)
    }

    /// Cost of the running best, infinite before the first population
    pub fn best_cost(&self) -> f64 {
        self.best_solution().map_or(f64::INFINITY, Solution::cost)
    }

    /// Duplicate density of the current population
    pub fn saturation(&self) -> f64 {
        uniqueness(&self.population)
    }
}

/// The population transition of one metaheuristic.
///
/// `prepare` runs once per reset, after the population exists; `transition`
/// returns the population of the next step.
pub trait Strategy<P: Problem> {
    fn name(&self) -> &'static str;

    /// Fixed population size, for single-trajectory strategies
    fn population_size(&self) -> Option<usize> {
        None
    }

    /// Check strategy-specific settings
    fn validate(&self) -> Result<(), SearchError> {
        Ok(())
    }

    fn prepare(&mut self, _ctx: &mut SearchContext<'_, P>) -> Result<(), SearchError> {
        Ok(())
    }

    fn transition(&mut self, ctx: &mut SearchContext<'_, P>) -> Result<Vec<Solution>, SearchError>;
}

/// Outcome of one call to [`Metaheuristic::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub iteration: usize,
    pub improved: bool,
    pub terminated: bool,
}

/// Serializable outcome of a complete run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub solver: String,
    pub instance: String,
    pub seed: Option<u64>,
    pub best_cost: f64,
    pub best_sequence: Vec<usize>,
    pub feasible: bool,
    pub iterations: usize,
    pub aborted: bool,
    pub duration_secs: f64,
    /// Individuals processed per second
    pub rate: f64,
    pub started_at: DateTime<Utc>,
    pub cache: Option<CacheInfo>,
    /// Running best cost after each step
    pub best_costs: Vec<f64>,
}

/// Anything that can be run to completion and summarized
pub trait Solver {
    fn name(&self) -> &str;

    fn solve(&mut self) -> Result<RunSummary, SearchError>;
}

/// A strategy driven by the shared engine
pub struct Metaheuristic<'p, P: Problem, S: Strategy<P>> {
    strategy: S,
    ctx: SearchContext<'p, P>,
    aborted: bool,
    terminated: bool,
    start: Instant,
    duration: Option<Duration>,
    started_at: DateTime<Utc>,
    processed: usize,
    history: Vec<Vec<Solution>>,
    bests: Vec<Solution>,
    best_costs: Vec<f64>,
}

impl<'p, P: Problem, S: Strategy<P>> Metaheuristic<'p, P, S> {
    /// Validate the settings and initialize the first population
    pub fn new(problem: &'p P, strategy: S, mut config: EngineConfig) -> Result<Self, SearchError> {
        if let Some(pop_size) = strategy.population_size() {
            config.pop_size = pop_size;
        }
        config.validate()?;
        strategy.validate()?;

        let mut engine = Metaheuristic {
            strategy,
            ctx: SearchContext::new(problem, config),
            aborted: false,
            terminated: false,
            start: Instant::now(),
            duration: None,
            started_at: Utc::now(),
            processed: 0,
            history: Vec::new(),
            bests: Vec::new(),
            best_costs: Vec::new(),
        };
        engine.reset()?;
        Ok(engine)
    }

    /// Start over with a fresh random population; the generator keeps its
    /// state, so consecutive runs differ
    pub fn reset(&mut self) -> Result<(), SearchError> {
        self.ctx.iteration = 0;
        self.ctx.no_improvement = 0;
        self.aborted = false;
        self.terminated = false;
        self.duration = None;
        self.processed = 0;
        self.history.clear();
        self.bests.clear();
        self.best_costs.clear();

        self.ctx.populate()?;
        self.strategy.prepare(&mut self.ctx)?;

        self.start = Instant::now();
        self.started_at = Utc::now();
        Ok(())
    }

    /// Advance by one step; a no-op once terminated
    pub fn step(&mut self) -> Result<Step, SearchError> {
        if self.terminated {
            return Ok(Step {
                iteration: self.ctx.iteration,
                improved: false,
                terminated: true,
            });
        }

        self.ctx.iteration += 1;
        self.ctx.no_improvement += 1;

        let population = self.strategy.transition(&mut self.ctx)?;
        let improved = best_of(&population).map_or(false, |s| s.cost() < self.ctx.best_cost());
        self.processed += population.len();
        self.ctx.population = population;

        if improved {
            self.ctx.no_improvement = 0;
            self.ctx.best_population = self.ctx.population.clone();
            debug!(
                "{} iteration {}: new best {:.4}",
                self.strategy.name(),
                self.ctx.iteration,
                self.ctx.best_cost()
            );
        }

        self.best_costs.push(self.ctx.best_cost());
        if self.ctx.config.record_history {
            self.history.push(self.ctx.population.clone());
            if let Some(best) = self.ctx.best_solution() {
                self.bests.push(best.clone());
            }
        }

        self.aborted = self.ctx.no_improvement >= self.abort_threshold();
        if self.aborted || self.ctx.iteration >= self.ctx.config.n_iters {
            self.terminated = true;
            self.duration = Some(self.start.elapsed());
            info!(
                "{} finished after {} iterations{} (best {:.4})",
                self.strategy.name(),
                self.ctx.iteration,
                if self.aborted { ", aborted" } else { "" },
                self.ctx.best_cost()
            );
        }

        Ok(Step {
            iteration: self.ctx.iteration,
            improved,
            terminated: self.terminated,
        })
    }

    /// Step until termination
    pub fn run(&mut self) -> Result<&Self, SearchError> {
        info!(
            "Running {} on {} ({} iterations, population {})",
            self.strategy.name(),
            self.ctx.problem.name(),
            self.ctx.config.n_iters,
            self.ctx.config.pop_size
        );
        while !self.step()?.terminated {}
        Ok(self)
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn context(&self) -> &SearchContext<'p, P> {
        &self.ctx
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub fn population(&self) -> &[Solution] {
        &self.ctx.population
    }

    pub fn best_population(&self) -> &[Solution] {
        &self.ctx.best_population
    }

    pub fn best_solution(&self) -> Option<&Solution> {
        self.ctx.best_solution()
    }

    pub fn worst_solution(&self) -> Option<&Solution> {
        self.ctx.worst_solution()
    }

    pub fn saturation(&self) -> f64 {
        self.ctx.saturation()
    }

    pub fn iteration(&self) -> usize {
        self.ctx.iteration
    }

    pub fn no_improvement(&self) -> usize {
        self.ctx.no_improvement
    }

    pub fn aborted(&self) -> bool {
        self.aborted
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn abort_threshold(&self) -> usize {
        self.ctx.config.abort_threshold()
    }

    /// Final duration once terminated, elapsed time so far otherwise
    pub fn duration(&self) -> Duration {
        self.duration.unwrap_or_else(|| self.start.elapsed())
    }

    /// Individuals processed per second
    pub fn rate(&self) -> f64 {
        let secs = self.duration().as_secs_f64();
        if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            0.0
        }
    }

    /// Populations of every step, when history is recorded
    pub fn history(&self) -> &[Vec<Solution>] {
        &self.history
    }

    /// Running best after every step, when history is recorded
    pub fn bests(&self) -> &[Solution] {
        &self.bests
    }

    pub fn best_costs(&self) -> &[f64] {
        &self.best_costs
    }

    /// Distinct solutions seen over the recorded history
    pub fn unique_solutions(&self) -> HashSet<&Solution> {
        self.history.iter().flatten().collect()
    }

    pub fn summary(&self) -> RunSummary {
        let best = self.best_solution();
        RunSummary {
            solver: self.strategy.name().to_string(),
            instance: self.ctx.problem.name().to_string(),
            seed: self.ctx.config.seed,
            best_cost: best.map_or(f64::INFINITY, Solution::cost),
            best_sequence: best.map(|s| s.sequence().to_vec()).unwrap_or_default(),
            feasible: best.map_or(false, Solution::is_feasible),
            iterations: self.ctx.iteration,
            aborted: self.aborted,
            duration_secs: self.duration().as_secs_f64(),
            rate: self.rate(),
            started_at: self.started_at,
            cache: self.ctx.problem.cache_info(),
            best_costs: self.best_costs.clone(),
        }
    }
}

impl<'p, P: Problem, S: Strategy<P>> Solver for Metaheuristic<'p, P, S> {
    fn name(&self) -> &str {
        self.strategy.name()
    }

    fn solve(&mut self) -> Result<RunSummary, SearchError> {
        if self.terminated {
            self.reset()?;
        }
        self.run()?;
        Ok(self.summary())
    }
}

impl<'p, P: Problem, S: Strategy<P>> std::fmt::Display for Metaheuristic<'p, P, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.strategy.name())?;
        writeln!(f, "Duration: {:.2} sec", self.duration().as_secs_f64())?;
        writeln!(f, "Rate: {:.2} individuals/sec", self.rate())?;
        if let Some(cache) = self.ctx.problem.cache_info() {
            writeln!(f, "Cache: {}", cache)?;
        }
        write!(f, "Iterations: {}/{}", self.ctx.iteration, self.ctx.config.n_iters)?;
        if self.aborted {
            write!(f, " (aborted @ {})", self.abort_threshold())?;
        }
        writeln!(f)?;
        writeln!(f, "Best population:")?;
        let best = self.best_solution();
        for s in &self.ctx.best_population {
            if Some(s) == best {
                writeln!(f, "  {} *", s)?;
            } else {
                writeln!(f, "  {}", s)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::instance::RoutingInstance;
    use crate::problem::Evaluation;

    /// Returns the population unchanged
    pub(crate) struct Stagnant;

    impl<P: Problem> Strategy<P> for Stagnant {
        fn name(&self) -> &'static str {
            "Stagnant"
        }

        fn transition(
            &mut self,
            ctx: &mut SearchContext<'_, P>,
        ) -> Result<Vec<Solution>, SearchError> {
            Ok(ctx.population.clone())
        }
    }

    /// Improves by one unit every step
    struct Descending;

    impl<P: Problem> Strategy<P> for Descending {
        fn name(&self) -> &'static str {
            "Descending"
        }

        fn transition(
            &mut self,
            ctx: &mut SearchContext<'_, P>,
        ) -> Result<Vec<Solution>, SearchError> {
            let seq = ctx.population[0].sequence().to_vec();
            let cost = -(ctx.iteration as f64);
            Ok(vec![Solution::new(seq, Evaluation { cost, feasible: true })])
        }
    }

    pub(crate) fn config(n_iters: usize, pop_size: usize) -> EngineConfig {
        EngineConfig {
            n_iters,
            pop_size,
            seed: Some(42),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_for_difficulty_defaults() {
        let config = EngineConfig::for_difficulty(3);
        assert_eq!(config.n_iters, 15000);
        assert_eq!(config.pop_size, 3);
        assert_eq!(config.abort_threshold(), 3000);
        assert_eq!(config.max_attempts, 1000);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(EngineConfig { n_iters: 0, ..EngineConfig::default() }.validate().is_err());
        assert!(EngineConfig { abort_iter: 1.5, ..EngineConfig::default() }.validate().is_err());
        let config = EngineConfig { abort_iter: f64::NAN, ..EngineConfig::default() };
        assert!(config.validate().is_err());
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_abort_threshold_at_least_one() {
        let config = EngineConfig { n_iters: 3, abort_iter: 0.2, ..EngineConfig::default() };
        assert_eq!(config.abort_threshold(), 1);
    }

    #[test]
    fn test_with_overrides() {
        let base = EngineConfig::for_difficulty(2);
        let overrides = serde_json::json!({ "pop_size": 7, "seed": 3 });
        let config = with_overrides(base, &overrides).unwrap();
        assert_eq!(config.pop_size, 7);
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.n_iters, 10000);

        assert!(with_overrides(EngineConfig::default(), &serde_json::json!([1, 2])).is_err());
    }

    #[test]
    fn test_nested_overrides_keep_sibling_fields() {
        use crate::heuristics::ModifiedCuckooSearchConfig;

        let base = ModifiedCuckooSearchConfig::for_difficulty(10);
        let (levy_min, max_flight) = (base.cuckoo.levy_min, base.cuckoo.max_flight);
        let overrides = serde_json::json!({ "cuckoo": { "levy_alpha": 3.0 } });
        let merged = with_overrides(base, &overrides).unwrap();

        assert_eq!(merged.cuckoo.levy_alpha, 3.0);
        assert_eq!(merged.cuckoo.levy_min, levy_min);
        assert_eq!(merged.cuckoo.max_flight, max_flight);
        assert_ne!(levy_min, ModifiedCuckooSearchConfig::for_difficulty(1).cuckoo.levy_min);
    }

    #[test]
    fn test_initial_population() {
        let problem = RoutingInstance::square();
        let engine = Metaheuristic::new(&problem, Stagnant, config(10, 4)).unwrap();
        assert_eq!(engine.population().len(), 4);
        assert_eq!(engine.best_population(), engine.population());
        assert_eq!(engine.iteration(), 0);
        assert!(engine.population().iter().all(Solution::is_feasible));
    }

    #[test]
    fn test_population_construction_is_capped() {
        // One job and one maintenance slot: the slot always lands first or last
        let problem = crate::instance::MaintenanceInstance::random(1, 1, 0);
        let config = EngineConfig { max_attempts: 5, ..config(10, 2) };
        let result = Metaheuristic::new(&problem, Stagnant, config);
        assert!(matches!(
            result,
            Err(SearchError::InfeasibleConstruction { what: "random solution", attempts: 5 })
        ));
    }

    #[test]
    fn test_abort_exactly_at_threshold() {
        let problem = RoutingInstance::square();
        let mut engine = Metaheuristic::new(&problem, Stagnant, config(100, 2)).unwrap();
        assert_eq!(engine.abort_threshold(), 20);

        for k in 1..20 {
            let step = engine.step().unwrap();
            assert_eq!(step.iteration, k);
            assert!(!step.terminated);
        }
        let step = engine.step().unwrap();
        assert!(step.terminated);
        assert!(engine.aborted());
        assert_eq!(engine.iteration(), 20);
        assert_eq!(engine.no_improvement(), 20);
    }

    #[test]
    fn test_step_after_termination_is_noop() {
        let problem = RoutingInstance::square();
        let mut engine = Metaheuristic::new(&problem, Stagnant, config(10, 1)).unwrap();
        engine.run().unwrap();
        let iteration = engine.iteration();
        let history = engine.history().len();

        let step = engine.step().unwrap();
        assert!(step.terminated);
        assert_eq!(engine.iteration(), iteration);
        assert_eq!(engine.history().len(), history);
    }

    #[test]
    fn test_runs_to_n_iters_when_improving() {
        let problem = RoutingInstance::square();
        let mut engine = Metaheuristic::new(&problem, Descending, config(50, 1)).unwrap();
        engine.run().unwrap();

        assert!(!engine.aborted());
        assert_eq!(engine.iteration(), 50);
        assert_eq!(engine.no_improvement(), 0);
        assert_eq!(engine.history().len(), 50);
        assert_eq!(engine.bests().len(), 50);
        assert_eq!(engine.best_solution().unwrap().cost(), -50.0);
        assert!(engine.best_costs().windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_reset_clears_run_state() {
        let problem = RoutingInstance::square();
        let mut engine = Metaheuristic::new(&problem, Descending, config(5, 1)).unwrap();
        engine.run().unwrap();
        engine.reset().unwrap();

        assert_eq!(engine.iteration(), 0);
        assert!(!engine.is_terminated());
        assert!(engine.history().is_empty());
        assert!(engine.best_costs().is_empty());
    }

    #[test]
    fn test_history_can_be_disabled() {
        let problem = RoutingInstance::square();
        let config = EngineConfig { record_history: false, ..config(10, 2) };
        let mut engine = Metaheuristic::new(&problem, Stagnant, config).unwrap();
        engine.run().unwrap();
        assert!(engine.history().is_empty());
        assert!(engine.unique_solutions().is_empty());
        assert_eq!(engine.best_costs().len(), 2);
    }

    #[test]
    fn test_summary_and_solver() {
        let problem = RoutingInstance::square();
        let mut engine = Metaheuristic::new(&problem, Stagnant, config(10, 3)).unwrap();
        let summary = engine.solve().unwrap();

        assert_eq!(summary.solver, "Stagnant");
        assert_eq!(summary.iterations, 2);
        assert!(summary.aborted);
        assert!(summary.feasible);
        assert_eq!(summary.best_sequence.len(), 3);
        assert!(summary.cache.is_none());

        let text = engine.to_string();
        assert!(text.contains("Iterations: 2/10 (aborted @ 2)"));
    }
}
