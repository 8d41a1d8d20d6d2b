//! Search strategies.
//!
//! Every population-based method implements [`crate::engine::Strategy`] and
//! is driven by [`crate::engine::Metaheuristic`]. Hybrids reuse the plain
//! strategies by composition. [`ExhaustiveSearch`] stands apart and only
//! implements [`crate::engine::Solver`].

pub mod aco;
pub mod annealing;
pub mod cuckoo;
pub mod exhaustive;
pub mod genetic;
pub mod harmony;
pub mod swarm;
pub mod tabu;

pub use aco::{AcoConfig, AntColonyOptimization};
pub use annealing::{Annealing, AnnealingConfig, SimulatedAnnealing, SimulatedAnnealingConfig};
pub use cuckoo::{
    CuckooSearch, CuckooSearchConfig, ModifiedCuckooSearch, ModifiedCuckooSearchConfig,
};
pub use exhaustive::ExhaustiveSearch;
pub use genetic::{Genetic, GeneticConfig};
pub use harmony::{
    HarmonySearch, HarmonySearchConfig, ModifiedHarmonySearch, ModifiedHarmonySearchConfig,
    ModifiedHarmonySearchV2, RecoveryConfig,
};
pub use swarm::{ParallelParticleSwarm, ParticleSwarm, ParticleSwarmConfig, SwarmState};
pub use tabu::{TabuSearch, TabuSearchConfig};
