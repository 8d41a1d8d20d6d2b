//! Grouped particle swarm for sequences.
//!
//! Every particle rebuilds its sequence node by node from the problem
//! origin. At each position it considers the node held there by its own
//! sequence, its personal best and its group best, weighted by
//! `weight / distance(current, node)`.
//!
//! [`ParallelParticleSwarm`] moves all particles of a step on a rayon pool
//! against a snapshot of the swarm. Workers only return candidates; personal,
//! group and global bests are updated afterwards, in particle order.

use crate::engine::{SearchContext, Strategy};
use crate::error::SearchError;
use crate::operators::{distance_preference, roulette_wheel, Perturbation};
use crate::problem::Problem;
use crate::solution::{best_of, Solution};
use log::debug;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Particle swarm configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleSwarmConfig {
    /// Attraction of the particle's own sequence, its personal best and its
    /// group best
    pub weights: [f64; 3],
    /// Number of groups; `max(1, pop_size / 5)` when absent
    pub n_groups: Option<usize>,
    /// Probability of perturbing a rebuilt particle
    pub prob_mutation: f64,
    /// Worker threads of the parallel variant
    pub workers: usize,
}

impl Default for ParticleSwarmConfig {
    fn default() -> Self {
        ParticleSwarmConfig {
            weights: [1.0, 1.0, 1.0],
            n_groups: None,
            prob_mutation: 0.2,
            workers: 6,
        }
    }
}

impl ParticleSwarmConfig {
    fn validate(&self) -> Result<(), SearchError> {
        if self.weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
            return Err(SearchError::InvalidConfig(
                "weights must be finite and non-negative".into(),
            ));
        }
        if self.n_groups == Some(0) {
            return Err(SearchError::InvalidConfig("n_groups must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.prob_mutation) {
            return Err(SearchError::InvalidConfig(format!(
                "prob_mutation must lie in [0, 1], got {}",
                self.prob_mutation
            )));
        }
        Ok(())
    }
}

/// Personal, group and global bests of a swarm
#[derive(Debug, Clone, Default)]
pub struct SwarmState {
    personal_bests: Vec<Solution>,
    group_of: Vec<usize>,
    group_bests: Vec<Option<Solution>>,
    global_best: Option<Solution>,
}

impl SwarmState {
    /// Random group assignment; every best starts from the population
    fn new<R: Rng + ?Sized>(population: &[Solution], n_groups: usize, rng: &mut R) -> Self {
        let group_of: Vec<usize> = population.iter().map(|_| rng.gen_range(0..n_groups)).collect();

        let mut group_bests: Vec<Option<Solution>> = vec![None; n_groups];
        for (particle, &group) in population.iter().zip(&group_of) {
            let slot = &mut group_bests[group];
            if slot.as_ref().map_or(true, |best| particle.is_better_than(best)) {
                *slot = Some(particle.clone());
            }
        }

        SwarmState {
            personal_bests: population.to_vec(),
            group_of,
            group_bests,
            global_best: best_of(population).cloned(),
        }
    }

    pub fn personal_bests(&self) -> &[Solution] {
        &self.personal_bests
    }

    pub fn group_of(&self) -> &[usize] {
        &self.group_of
    }

    pub fn global_best(&self) -> Option<&Solution> {
        self.global_best.as_ref()
    }

    /// Best of particle `i`'s group
    pub fn group_best(&self, i: usize) -> &Solution {
        self.group_bests[self.group_of[i]]
            .as_ref()
            .unwrap_or(&self.personal_bests[i])
    }

    fn update(&mut self, i: usize, moved: &Solution) {
        if moved.is_better_than(&self.personal_bests[i]) {
            self.personal_bests[i] = moved.clone();
        }
        let group = &mut self.group_bests[self.group_of[i]];
        if group.as_ref().map_or(true, |best| moved.is_better_than(best)) {
            *group = Some(moved.clone());
        }
        if self.global_best.as_ref().map_or(true, |best| moved.is_better_than(best)) {
            self.global_best = Some(moved.clone());
        }
    }
}

/// Settings a particle move needs, shared read-only with the workers
#[derive(Debug, Clone, Copy)]
struct MoveRules {
    weights: [f64; 3],
    prob_mutation: f64,
    operator: Perturbation,
    max_attempts: usize,
}

impl MoveRules {
    fn new(config: &ParticleSwarmConfig, operator: Perturbation, max_attempts: usize) -> Self {
        MoveRules {
            weights: config.weights,
            prob_mutation: config.prob_mutation,
            operator,
            max_attempts,
        }
    }

    /// New position of a particle; the particle itself when no feasible
    /// sequence is found within `max_attempts`
    fn apply<P: Problem, R: Rng + ?Sized>(
        &self,
        problem: &P,
        particle: &Solution,
        personal: &Solution,
        group: &Solution,
        rng: &mut R,
    ) -> Solution {
        let sources = [particle.sequence(), personal.sequence(), group.sequence()];
        let len = particle.len();

        for _ in 0..self.max_attempts {
            let mut sequence = self.rebuild(problem, &sources, len, rng);
            if rng.gen::<f64>() < self.prob_mutation {
                sequence = self.operator.perturb(&sequence, rng);
            }
            let candidate = problem.solution(sequence);
            if candidate.is_feasible() {
                return candidate;
            }
        }
        particle.clone()
    }

    fn rebuild<P: Problem, R: Rng + ?Sized>(
        &self,
        problem: &P,
        sources: &[&[usize]; 3],
        len: usize,
        rng: &mut R,
    ) -> Vec<usize> {
        let mut used = HashSet::with_capacity(len);
        let mut sequence = Vec::with_capacity(len);
        let mut current = problem.origin();

        for pos in 0..len {
            let nodes: Vec<Option<usize>> = sources.iter().map(|s| s.get(pos).copied()).collect();
            let preferences: Vec<f64> = nodes
                .iter()
                .zip(self.weights)
                .map(|(node, w)| {
                    node.map_or(0.0, |n| distance_preference(w, problem.distance(current, n)))
                })
                .collect();

            let preferred = roulette_wheel(&preferences, nodes.len(), rng)
                .into_iter()
                .filter_map(|k| nodes[k])
                .find(|n| !used.contains(n));

            let next = match preferred {
                Some(node) => node,
                None => {
                    // Random node of a random source among those still free
                    let free: Vec<usize> = sources
                        .iter()
                        .flat_map(|s| s.iter().copied())
                        .filter(|n| !used.contains(n))
                        .collect();
                    match free.choose(rng) {
                        Some(&node) => node,
                        None => break,
                    }
                }
            };

            used.insert(next);
            sequence.push(next);
            current = next;
        }
        sequence
    }
}

fn default_groups(pop_size: usize) -> usize {
    (pop_size / 5).max(1)
}

/// Sequential particle swarm
#[derive(Debug, Clone, Default)]
pub struct ParticleSwarm {
    config: ParticleSwarmConfig,
    state: SwarmState,
}

impl ParticleSwarm {
    pub fn new(config: ParticleSwarmConfig) -> Self {
        ParticleSwarm {
            config,
            state: SwarmState::default(),
        }
    }

    pub fn state(&self) -> &SwarmState {
        &self.state
    }
}

impl<P: Problem> Strategy<P> for ParticleSwarm {
    fn name(&self) -> &'static str {
        "ParticleSwarm"
    }

    fn validate(&self) -> Result<(), SearchError> {
        self.config.validate()
    }

    fn prepare(&mut self, ctx: &mut SearchContext<'_, P>) -> Result<(), SearchError> {
        let n_groups = self.config.n_groups.unwrap_or_else(|| default_groups(ctx.population.len()));
        self.state = SwarmState::new(&ctx.population, n_groups, &mut ctx.rng);
        Ok(())
    }

    fn transition(&mut self, ctx: &mut SearchContext<'_, P>) -> Result<Vec<Solution>, SearchError> {
        let rules = MoveRules::new(&self.config, ctx.config.operator, ctx.config.max_attempts);
        let mut particles = ctx.population.clone();

        for i in 0..particles.len() {
            let moved = rules.apply(
                ctx.problem,
                &particles[i],
                &self.state.personal_bests[i],
                self.state.group_best(i),
                &mut ctx.rng,
            );
            self.state.update(i, &moved);
            particles[i] = moved;
        }
        Ok(particles)
    }
}

/// Particle swarm moving all particles of a step in parallel
#[derive(Debug)]
pub struct ParallelParticleSwarm {
    config: ParticleSwarmConfig,
    state: SwarmState,
    pool: rayon::ThreadPool,
}

impl ParallelParticleSwarm {
    pub fn new(config: ParticleSwarmConfig) -> Result<Self, SearchError> {
        if config.workers == 0 {
            return Err(SearchError::InvalidConfig("workers must be positive".into()));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .build()
            .map_err(|e| SearchError::ThreadPool(e.to_string()))?;
        debug!("Particle swarm pool with {} workers", config.workers);

        Ok(ParallelParticleSwarm {
            config,
            state: SwarmState::default(),
            pool,
        })
    }

    pub fn state(&self) -> &SwarmState {
        &self.state
    }
}

impl<P: Problem> Strategy<P> for ParallelParticleSwarm {
    fn name(&self) -> &'static str {
        "ParallelParticleSwarm"
    }

    fn validate(&self) -> Result<(), SearchError> {
        self.config.validate()
    }

    fn prepare(&mut self, ctx: &mut SearchContext<'_, P>) -> Result<(), SearchError> {
        let n_groups = self.config.n_groups.unwrap_or_else(|| default_groups(ctx.population.len()));
        self.state = SwarmState::new(&ctx.population, n_groups, &mut ctx.rng);
        Ok(())
    }

    fn transition(&mut self, ctx: &mut SearchContext<'_, P>) -> Result<Vec<Solution>, SearchError> {
        let rules = MoveRules::new(&self.config, ctx.config.operator, ctx.config.max_attempts);
        let seeds: Vec<u64> = ctx.population.iter().map(|_| ctx.rng.gen()).collect();
        let problem = ctx.problem;
        let snapshot = &ctx.population;
        let state = &self.state;

        let moved: Vec<Solution> = self.pool.install(|| {
            seeds
                .par_iter()
                .enumerate()
                .map(|(i, &seed)| {
                    let mut rng = ChaCha8Rng::seed_from_u64(seed);
                    rules.apply(
                        problem,
                        &snapshot[i],
                        &state.personal_bests[i],
                        state.group_best(i),
                        &mut rng,
                    )
                })
                .collect()
        });

        for (i, particle) in moved.iter().enumerate() {
            self.state.update(i, particle);
        }
        Ok(moved)
    }
}
