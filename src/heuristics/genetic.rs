//! Genetic search.
//!
//! Each generation builds a mating pool by roulette-wheel ordering of the
//! whole population (lower cost weighs more), mates consecutive pairs with an
//! order-preserving crossover and mutates every offspring independently.

use crate::engine::{SearchContext, Strategy};
use crate::error::SearchError;
use crate::operators::{fitness_weights, pairwise, roulette_wheel, Crossover};
use crate::problem::Problem;
use crate::solution::Solution;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Genetic search configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticConfig {
    /// Probability of mutating each offspring
    pub prob_mutation: f64,
    /// Crossover operator
    pub crossover: Crossover,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        GeneticConfig {
            prob_mutation: 0.2,
            crossover: Crossover::DiscreteOrder,
        }
    }
}

/// Genetic search strategy
#[derive(Debug, Clone, Default)]
pub struct Genetic {
    config: GeneticConfig,
}

impl Genetic {
    pub fn new(config: GeneticConfig) -> Self {
        Genetic { config }
    }

    pub fn config(&self) -> &GeneticConfig {
        &self.config
    }

    /// Two feasible offspring of `p1` and `p2`.
    ///
    /// Crossover and mutation are retried together until both children are
    /// feasible, at most `max_attempts` times.
    pub fn mate<P: Problem>(
        &self,
        ctx: &mut SearchContext<'_, P>,
        p1: &Solution,
        p2: &Solution,
    ) -> Result<(Solution, Solution), SearchError> {
        for _ in 0..ctx.config.max_attempts {
            let (s1, s2) = self.config.crossover.apply(p1.sequence(), p2.sequence(), &mut ctx.rng);
            let (o1, o2) = (ctx.problem.solution(s1), ctx.problem.solution(s2));
            let o1 = self.mutate(ctx, o1);
            let o2 = self.mutate(ctx, o2);

            if o1.is_feasible() && o2.is_feasible() {
                return Ok((o1, o2));
            }
        }
        Err(SearchError::InfeasibleConstruction {
            what: "offspring",
            attempts: ctx.config.max_attempts,
        })
    }

    fn mutate<P: Problem>(&self, ctx: &mut SearchContext<'_, P>, offspring: Solution) -> Solution {
        if ctx.rng.gen::<f64>() < self.config.prob_mutation {
            ctx.perturb(&offspring)
        } else {
            offspring
        }
    }

    /// A new generation of the same size as `population`
    pub fn recombine<P: Problem>(
        &self,
        ctx: &mut SearchContext<'_, P>,
        population: &[Solution],
    ) -> Result<Vec<Solution>, SearchError> {
        let size = population.len();
        let weights = fitness_weights(population);
        let mut pool = roulette_wheel(&weights, size, &mut ctx.rng);
        if size % 2 == 1 {
            // The odd one out pairs with the first
            pool.push(pool[0]);
        }

        let mut offspring = Vec::with_capacity(pool.len());
        for (&i, &j) in pairwise(&pool, 2) {
            let (c, d) = self.mate(ctx, &population[i], &population[j])?;
            offspring.push(c);
            offspring.push(d);
        }
        offspring.truncate(size);
        Ok(offspring)
    }
}

impl<P: Problem> Strategy<P> for Genetic {
    fn name(&self) -> &'static str {
        "Genetic"
    }

    fn validate(&self) -> Result<(), SearchError> {
        if !(0.0..=1.0).contains(&self.config.prob_mutation) {
            return Err(SearchError::InvalidConfig(format!(
                "prob_mutation must lie in [0, 1], got {}",
                self.config.prob_mutation
            )));
        }
        Ok(())
    }

    fn transition(&mut self, ctx: &mut SearchContext<'_, P>) -> Result<Vec<Solution>, SearchError> {
        let population = ctx.population.clone();
        self.recombine(ctx, &population)
    }
}
