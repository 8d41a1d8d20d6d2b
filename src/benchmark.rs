//! Races between solvers.
//!
//! A [`Race`] runs every entry `n` times with seeds `0..n`, serially or on
//! the rayon pool, and compares the best costs the entries reach. Results are
//! kept as flat [`RaceRecord`] rows so they export straight to CSV.

use crate::engine::{RunSummary, Solver};
use crate::error::SearchError;
use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Builds a fresh solver for one seeded run
pub type SolverFactory<'p> =
    Box<dyn Fn(u64) -> Result<Box<dyn Solver + 'p>, SearchError> + Sync + 'p>;

/// A named contender
pub struct RaceEntry<'p> {
    name: String,
    factory: SolverFactory<'p>,
}

impl<'p> RaceEntry<'p> {
    pub fn new<F>(name: &str, factory: F) -> Self
    where
        F: Fn(u64) -> Result<Box<dyn Solver + 'p>, SearchError> + Sync + 'p,
    {
        RaceEntry {
            name: name.to_string(),
            factory: Box::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Result of one run of one entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceRecord {
    /// Entry name
    pub solver: String,
    pub seed: u64,
    pub instance: String,
    pub best_cost: f64,
    pub feasible: bool,
    pub iterations: usize,
    pub aborted: bool,
    /// Computation time in seconds
    pub duration_secs: f64,
    pub rate: f64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Best sequence, ids joined by `-`
    pub best_sequence: String,
}

impl RaceRecord {
    fn from_summary(solver: &str, seed: u64, summary: &RunSummary) -> Self {
        let best_sequence = summary
            .best_sequence
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("-");
        RaceRecord {
            solver: solver.to_string(),
            seed,
            instance: summary.instance.clone(),
            best_cost: summary.best_cost,
            feasible: summary.feasible,
            iterations: summary.iterations,
            aborted: summary.aborted,
            duration_secs: summary.duration_secs,
            rate: summary.rate,
            started_at: summary.started_at,
            best_sequence,
        }
    }
}

/// Aggregated best costs of one entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceStatistics {
    pub solver: String,
    /// Runs with a feasible best
    pub runs: usize,
    pub min: f64,
    pub mean: f64,
    /// Sample standard deviation, 0 for a single run
    pub std_dev: f64,
    pub mean_duration: f64,
}

/// Repeated seeded runs of several solvers
pub struct Race<'p> {
    entries: Vec<RaceEntry<'p>>,
    records: Vec<RaceRecord>,
}

impl<'p> Race<'p> {
    pub fn new(entries: Vec<RaceEntry<'p>>) -> Self {
        Race {
            entries,
            records: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[RaceEntry<'p>] {
        &self.entries
    }

    /// Run every entry with seeds `0..n`; previous records are replaced
    pub fn run(&mut self, n: usize, parallel: bool) -> Result<&[RaceRecord], SearchError> {
        info!(
            "Racing {} solvers, {} runs each{}",
            self.entries.len(),
            n,
            if parallel { " in parallel" } else { "" }
        );

        let jobs: Vec<(usize, u64)> = (0..self.entries.len())
            .flat_map(|e| (0..n as u64).map(move |seed| (e, seed)))
            .collect();
        let entries = &self.entries;
        let run_one = |&(e, seed): &(usize, u64)| -> Result<RaceRecord, SearchError> {
            let entry = &entries[e];
            let mut solver = (entry.factory)(seed)?;
            let summary = solver.solve()?;
            Ok(RaceRecord::from_summary(&entry.name, seed, &summary))
        };

        self.records = if parallel {
            jobs.par_iter().map(run_one).collect::<Result<Vec<_>, _>>()?
        } else {
            jobs.iter().map(run_one).collect::<Result<Vec<_>, _>>()?
        };
        Ok(&self.records)
    }

    pub fn records(&self) -> &[RaceRecord] {
        &self.records
    }

    /// Statistics per entry, in entry order; entries without any feasible
    /// run are left out
    pub fn statistics(&self) -> Vec<RaceStatistics> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let feasible: Vec<&RaceRecord> = self
                    .records
                    .iter()
                    .filter(|r| r.solver == entry.name && r.feasible)
                    .collect();
                if feasible.is_empty() {
                    return None;
                }

                let costs: Vec<f64> = feasible.iter().map(|r| r.best_cost).collect();
                let durations: Vec<f64> = feasible.iter().map(|r| r.duration_secs).collect();
                let std_dev = if costs.len() >= 2 {
                    Statistics::std_dev(&costs)
                } else {
                    0.0
                };

                Some(RaceStatistics {
                    solver: entry.name.clone(),
                    runs: feasible.len(),
                    min: Statistics::min(&costs),
                    mean: Statistics::mean(&costs),
                    std_dev,
                    mean_duration: Statistics::mean(&durations),
                })
            })
            .collect()
    }

    pub fn write_records<W: Write>(&self, out: W) -> Result<(), SearchError> {
        let mut writer = csv::Writer::from_writer(out);
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_statistics<W: Write>(&self, out: W) -> Result<(), SearchError> {
        let mut writer = csv::Writer::from_writer(out);
        for stat in self.statistics() {
            writer.serialize(stat)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Export every run to CSV
    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), SearchError> {
        self.write_records(File::create(path)?)
    }

    /// Export per-entry statistics to CSV
    pub fn export_statistics_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), SearchError> {
        self.write_statistics(File::create(path)?)
    }

    /// Plain-text ranking by mean best cost
    pub fn report(&self) -> String {
        let mut stats = self.statistics();
        stats.sort_by(|a, b| a.mean.total_cmp(&b.mean));

        let mut report = String::new();
        report.push_str(&format!(
            "{:<28} {:>6} {:>12} {:>12} {:>12} {:>10}\n",
            "Solver", "Runs", "Min", "Mean", "Std", "Time (s)"
        ));
        report.push_str(&"-".repeat(84));
        report.push('\n');
        for stat in &stats {
            report.push_str(&format!(
                "{:<28} {:>6} {:>12.2} {:>12.2} {:>12.2} {:>10.4}\n",
                stat.solver, stat.runs, stat.min, stat.mean, stat.std_dev, stat.mean_duration
            ));
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::config;
    use crate::engine::{EngineConfig, Metaheuristic};
    use crate::heuristics::{ExhaustiveSearch, Genetic, TabuSearch, TabuSearchConfig};
    use crate::instance::{MaintenanceInstance, RoutingInstance};

    fn boxed<'p, S: Solver + 'p>(solver: S) -> Box<dyn Solver + 'p> {
        Box::new(solver)
    }

    fn race(problem: &RoutingInstance) -> Race<'_> {
        Race::new(vec![
            RaceEntry::new("tabu", move |seed| {
                let config = EngineConfig { seed: Some(seed), ..config(100, 1) };
                let tabu = TabuSearch::new(TabuSearchConfig::for_difficulty(4));
                Ok(boxed(Metaheuristic::new(problem, tabu, config)?))
            }),
            RaceEntry::new("genetic", move |seed| {
                let config = EngineConfig { seed: Some(seed), ..config(50, 4) };
                Ok(boxed(Metaheuristic::new(problem, Genetic::default(), config)?))
            }),
        ])
    }

    #[test]
    fn test_records_per_entry_and_seed() {
        let problem = RoutingInstance::circle(6);
        let mut race = race(&problem);
        let records = race.run(3, false).unwrap();
        assert_eq!(records.len(), 6);
        assert_eq!(records[0].solver, "tabu");
        assert_eq!(records[5].solver, "genetic");
        assert_eq!(records.iter().map(|r| r.seed).collect::<Vec<_>>(), vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let problem = RoutingInstance::circle(6);
        let mut serial = race(&problem);
        let mut parallel = race(&problem);
        let a: Vec<f64> = serial.run(3, false).unwrap().iter().map(|r| r.best_cost).collect();
        let b: Vec<f64> = parallel.run(3, true).unwrap().iter().map(|r| r.best_cost).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_statistics() {
        let problem = RoutingInstance::circle(6);
        let mut race = race(&problem);
        race.run(4, false).unwrap();
        let stats = race.statistics();
        assert_eq!(stats.len(), 2);
        for stat in &stats {
            assert_eq!(stat.runs, 4);
            assert!(stat.min <= stat.mean);
            assert!(stat.std_dev >= 0.0);
        }
    }

    #[test]
    fn test_single_run_has_zero_deviation() {
        let problem = MaintenanceInstance::three_jobs();
        let mut race = Race::new(vec![RaceEntry::new("exhaustive", |_| {
            Ok(boxed(ExhaustiveSearch::new(&problem)))
        })]);
        race.run(1, false).unwrap();
        let stats = race.statistics();
        assert_eq!(stats[0].std_dev, 0.0);
        assert_eq!(stats[0].min, stats[0].mean);
    }

    #[test]
    fn test_failing_entry_is_reported() {
        let problem = MaintenanceInstance::random(1, 1, 0);
        let mut race = Race::new(vec![RaceEntry::new("exhaustive", |_| {
            Ok(boxed(ExhaustiveSearch::new(&problem)))
        })]);
        assert!(matches!(race.run(2, true), Err(SearchError::NoFeasibleSolution)));
    }

    #[test]
    fn test_csv_export() {
        let problem = RoutingInstance::circle(5);
        let mut race = race(&problem);
        race.run(2, false).unwrap();

        let mut records = Vec::new();
        race.write_records(&mut records).unwrap();
        let text = String::from_utf8(records).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("solver,seed,instance,best_cost"));
        assert_eq!(lines.count(), 4);

        let mut stats = Vec::new();
        race.write_statistics(&mut stats).unwrap();
        let text = String::from_utf8(stats).unwrap();
        assert_eq!(text.lines().next().unwrap(), "solver,runs,min,mean,std_dev,mean_duration");
        assert!(race.report().contains("genetic"));
    }
}
