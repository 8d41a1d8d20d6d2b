//! Metaheuristics Library
//!
//! Population-based stochastic search for combinatorial sequencing problems:
//! job sequencing on a deteriorating machine with maintenance slots, and
//! TSP-like routing.
//!
//! # Features
//!
//! - A shared engine owning the population, the best population, stagnation
//!   abort and run statistics
//! - Genetic algorithm, simulated annealing, tabu search
//! - Harmony search and two hybrids with genetic recovery
//! - Cuckoo search and a hybrid with annealed nests
//! - Ant colony optimization, sequential and parallel particle swarms
//! - Exhaustive enumeration for small instances
//! - Races between solvers with CSV export
//!
//! # Example
//!
//! ```no_run
//! use metaheuristics::engine::{EngineConfig, Metaheuristic};
//! use metaheuristics::heuristics::{SimulatedAnnealing, SimulatedAnnealingConfig};
//! use metaheuristics::instance::RoutingInstance;
//! use metaheuristics::problem::Problem;
//!
//! let instance = RoutingInstance::from_file("instance.tsp").unwrap();
//! let config = EngineConfig { seed: Some(42), ..EngineConfig::for_problem(&instance) };
//! let sa_config = SimulatedAnnealingConfig::for_difficulty(instance.difficulty());
//! let sa = SimulatedAnnealing::new(sa_config);
//!
//! let mut engine = Metaheuristic::new(&instance, sa, config).unwrap();
//! engine.run().unwrap();
//! println!("{}", engine);
//! ```

pub mod benchmark;
pub mod engine;
pub mod error;
pub mod heuristics;
pub mod instance;
pub mod operators;
pub mod problem;
pub mod solution;

pub use engine::{EngineConfig, Metaheuristic, RunSummary, SearchContext, Solver, Strategy};
pub use error::SearchError;
pub use instance::{MaintenanceInstance, RoutingInstance};
pub use problem::{Evaluation, MemoizedProblem, Problem};
pub use solution::Solution;
