//! Harmony search and its genetic hybrids.
//!
//! The population is read as a harmony memory: position `p` of a new
//! candidate is drawn from the values the members hold at `p`. The hybrids
//! own a [`HarmonySearch`] and a [`Genetic`] and switch to genetic
//! recombination with a probability driven by the population saturation.

use crate::engine::{SearchContext, Strategy};
use crate::error::SearchError;
use crate::heuristics::genetic::{Genetic, GeneticConfig};
use crate::operators::{fitness_weights, pairwise, roulette_wheel};
use crate::problem::Problem;
use crate::solution::{argmax, Solution};
use log::trace;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Harmony search configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonySearchConfig {
    /// Pitch adjustment rate
    pub par: f64,
}

impl Default for HarmonySearchConfig {
    fn default() -> Self {
        HarmonySearchConfig { par: 0.1 }
    }
}

/// Plain harmony search
#[derive(Debug, Clone, Default)]
pub struct HarmonySearch {
    config: HarmonySearchConfig,
}

impl HarmonySearch {
    pub fn new(config: HarmonySearchConfig) -> Self {
        HarmonySearch { config }
    }

    /// Build a feasible candidate position by position from `memory`.
    ///
    /// Positions are visited from a random rotation offset. At each position
    /// the members are roulette-ordered by fitness and the first value not yet
    /// used is taken; when every member's value is used, a random unused node
    /// is taken instead.
    pub fn harmony_memory_consideration<P: Problem>(
        &self,
        ctx: &mut SearchContext<'_, P>,
        memory: &[Solution],
    ) -> Result<Solution, SearchError> {
        let nodes = ctx.problem.nodes();
        let end = memory.first().map_or(0, Solution::len);
        if end == 0 {
            return Err(SearchError::InfeasibleConstruction { what: "harmony", attempts: 0 });
        }
        let weights = fitness_weights(memory);

        for _ in 0..ctx.config.max_attempts {
            let start = ctx.rng.gen_range(0..end);
            let mut used = HashSet::with_capacity(end);
            let mut harmony = Vec::with_capacity(end);

            for pos in (start..end).chain(0..start) {
                let order = roulette_wheel(&weights, memory.len(), &mut ctx.rng);
                let note = order
                    .iter()
                    .filter_map(|&i| memory[i].sequence().get(pos).copied())
                    .find(|note| !used.contains(note));

                let note = match note {
                    Some(note) => note,
                    None => {
                        let free: Vec<usize> =
                            nodes.iter().copied().filter(|n| !used.contains(n)).collect();
                        match free.choose(&mut ctx.rng) {
                            Some(&note) => note,
                            None => break,
                        }
                    }
                };
                used.insert(note);
                harmony.push(note);
            }

            // harmony[0] holds position `start`
            let len = harmony.len().max(1);
            harmony.rotate_right(start % len);
            let candidate = ctx.problem.solution(harmony);
            if candidate.is_feasible() {
                return Ok(candidate);
            }
        }

        Err(SearchError::InfeasibleConstruction {
            what: "harmony",
            attempts: ctx.config.max_attempts,
        })
    }

    /// One harmony step: the new harmony replaces the worst member if better
    pub fn improvise<P: Problem>(
        &self,
        ctx: &mut SearchContext<'_, P>,
    ) -> Result<Vec<Solution>, SearchError> {
        let mut memory = ctx.population.clone();
        let mut harmony = self.harmony_memory_consideration(ctx, &memory)?;

        if ctx.rng.gen::<f64>() < self.config.par {
            harmony = ctx.neighbor(&harmony)?;
        }

        if let Some(worst) = argmax(&memory) {
            if harmony.is_better_than(&memory[worst]) {
                memory[worst] = harmony;
            }
        }
        Ok(memory)
    }
}

impl<P: Problem> Strategy<P> for HarmonySearch {
    fn name(&self) -> &'static str {
        "HarmonySearch"
    }

    fn validate(&self) -> Result<(), SearchError> {
        validate_probability("par", self.config.par)
    }

    fn transition(&mut self, ctx: &mut SearchContext<'_, P>) -> Result<Vec<Solution>, SearchError> {
        self.improvise(ctx)
    }
}

fn validate_probability(name: &str, p: f64) -> Result<(), SearchError> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(SearchError::InvalidConfig(format!("{} must lie in [0, 1], got {}", name, p)))
    }
}

/// Saturation thresholds and rates of the large-portion recovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub low_lprr: f64,
    pub high_lprr: f64,
    pub low_sat: f64,
    pub high_sat: f64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        RecoveryConfig {
            low_lprr: 0.09,
            high_lprr: 0.9,
            low_sat: 0.2,
            high_sat: 0.8,
        }
    }
}

impl RecoveryConfig {
    fn validate(&self) -> Result<(), SearchError> {
        validate_probability("low_lprr", self.low_lprr)?;
        validate_probability("high_lprr", self.high_lprr)?;
        if !(0.0 < self.low_sat && self.low_sat < self.high_sat && self.high_sat <= 1.0) {
            return Err(SearchError::InvalidConfig(format!(
                "saturation thresholds must satisfy 0 < low_sat < high_sat <= 1, got {} and {}",
                self.low_sat, self.high_sat
            )));
        }
        Ok(())
    }
}

/// Configuration shared by both hybrids
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModifiedHarmonySearchConfig {
    pub harmony: HarmonySearchConfig,
    pub genetic: GeneticConfig,
    pub recovery: RecoveryConfig,
}

/// Harmony search that falls back to a genetic generation with a
/// saturation-dependent step probability
#[derive(Debug, Clone, Default)]
pub struct ModifiedHarmonySearch {
    harmony: HarmonySearch,
    genetic: Genetic,
    recovery: RecoveryConfig,
}

impl ModifiedHarmonySearch {
    pub fn new(config: ModifiedHarmonySearchConfig) -> Self {
        ModifiedHarmonySearch {
            harmony: HarmonySearch::new(config.harmony),
            genetic: Genetic::new(config.genetic),
            recovery: config.recovery,
        }
    }

    /// Large-portion recovery rate
    pub fn lprr(&self, saturation: f64) -> f64 {
        let r = &self.recovery;
        if saturation < r.low_sat {
            r.low_lprr
        } else if saturation > r.high_sat {
            0.0
        } else {
            r.high_lprr
        }
    }
}

impl<P: Problem> Strategy<P> for ModifiedHarmonySearch {
    fn name(&self) -> &'static str {
        "ModifiedHarmonySearch"
    }

    fn validate(&self) -> Result<(), SearchError> {
        <HarmonySearch as Strategy<P>>::validate(&self.harmony)?;
        <Genetic as Strategy<P>>::validate(&self.genetic)?;
        self.recovery.validate()
    }

    fn transition(&mut self, ctx: &mut SearchContext<'_, P>) -> Result<Vec<Solution>, SearchError> {
        if ctx.rng.gen::<f64>() < self.lprr(ctx.saturation()) {
            trace!("iteration {}: large-portion recovery", ctx.iteration);
            let population = ctx.population.clone();
            self.genetic.recombine(ctx, &population)
        } else {
            self.harmony.improvise(ctx)
        }
    }
}

/// Hybrid with a cubic recovery rate that only rebreeds duplicate members
#[derive(Debug, Clone)]
pub struct ModifiedHarmonySearchV2 {
    harmony: HarmonySearch,
    genetic: Genetic,
    recovery: RecoveryConfig,
    c: f64,
    m: f64,
}

impl Default for ModifiedHarmonySearchV2 {
    fn default() -> Self {
        ModifiedHarmonySearchV2::new(ModifiedHarmonySearchConfig::default())
    }
}

impl ModifiedHarmonySearchV2 {
    pub fn new(config: ModifiedHarmonySearchConfig) -> Self {
        let recovery = config.recovery;
        let r = (recovery.low_sat / recovery.high_sat).powi(3);
        let c = (recovery.low_lprr - r) / (1.0 - r);
        let m = (1.0 / recovery.high_sat.powi(3)) * ((1.0 - recovery.low_lprr) / (1.0 - r));

        ModifiedHarmonySearchV2 {
            harmony: HarmonySearch::new(config.harmony),
            genetic: Genetic::new(config.genetic),
            recovery,
            c,
            m,
        }
    }

    /// `c + m * saturation^3` strictly between the thresholds, 0 outside
    pub fn lprr(&self, saturation: f64) -> f64 {
        if self.recovery.low_sat < saturation && saturation < self.recovery.high_sat {
            self.c + self.m * saturation.powi(3)
        } else {
            0.0
        }
    }

    /// Breed the distinct members and overwrite the duplicate slots with the
    /// children, in order. Distinct members keep their place.
    pub fn large_portion_recovery<P: Problem>(
        &self,
        ctx: &mut SearchContext<'_, P>,
    ) -> Result<Vec<Solution>, SearchError> {
        let mut population = ctx.population.clone();

        let mut seen = HashSet::with_capacity(population.len());
        let mut duplicates = Vec::new();
        let mut pool = Vec::new();
        for (i, member) in population.iter().enumerate() {
            if seen.insert(member) {
                pool.push(member.clone());
            } else {
                duplicates.push(i);
            }
        }
        if duplicates.is_empty() {
            return Ok(population);
        }

        let n_uniques = pool.len();
        let repeat = ((duplicates.len() as f64 / n_uniques as f64).round() as usize).max(1);
        let order = roulette_wheel(&fitness_weights(&pool), n_uniques, &mut ctx.rng).repeat(repeat);

        let mut children = Vec::with_capacity(order.len());
        for (&i, &j) in pairwise(&order, 2) {
            let (c, d) = self.genetic.mate(ctx, &pool[i], &pool[j])?;
            children.push(c);
            children.push(d);
        }

        for (slot, child) in duplicates.into_iter().zip(children) {
            population[slot] = child;
        }
        Ok(population)
    }
}

impl<P: Problem> Strategy<P> for ModifiedHarmonySearchV2 {
    fn name(&self) -> &'static str {
        "ModifiedHarmonySearchV2"
    }

    fn validate(&self) -> Result<(), SearchError> {
        <HarmonySearch as Strategy<P>>::validate(&self.harmony)?;
        <Genetic as Strategy<P>>::validate(&self.genetic)?;
        self.recovery.validate()
    }

    fn transition(&mut self, ctx: &mut SearchContext<'_, P>) -> Result<Vec<Solution>, SearchError> {
        if ctx.rng.gen::<f64>() < self.lprr(ctx.saturation()) {
            trace!("iteration {}: large-portion recovery", ctx.iteration);
            self.large_portion_recovery(ctx)
        } else {
            self.harmony.improvise(ctx)
        }
    }
}
