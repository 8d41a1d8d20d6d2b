//! Metaheuristics - Command Line Interface
//!
//! Solve a routing or maintenance-scheduling instance with one strategy, race
//! several strategies over seeded runs, or print instance statistics.

use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use metaheuristics::benchmark::{Race, RaceEntry};
use metaheuristics::engine::{
    with_overrides, EngineConfig, Metaheuristic, RunSummary, Solver, Strategy,
};
use metaheuristics::error::SearchError;
use metaheuristics::heuristics::*;
use metaheuristics::instance::{MaintenanceInstance, RoutingInstance};
use metaheuristics::problem::{MemoizedProblem, Problem};
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "metaheuristics")]
#[command(version = "1.0")]
#[command(about = "Stochastic search for job sequencing and routing problems")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve an instance with one algorithm
    Solve {
        /// Path to the instance file
        #[arg(short, long)]
        instance: PathBuf,

        /// Algorithm to use
        #[arg(short, long, value_enum, default_value = "sa")]
        algorithm: Algorithm,

        #[command(flatten)]
        run: RunArgs,

        /// Write the run summary to a JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// No progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Run several algorithms repeatedly and compare their best costs
    Race {
        /// Path to the instance file
        #[arg(short, long)]
        instance: PathBuf,

        /// Comma-separated algorithms
        #[arg(
            short,
            long,
            value_enum,
            value_delimiter = ',',
            default_values = ["ga", "sa", "tabu"]
        )]
        algorithms: Vec<Algorithm>,

        /// Runs per algorithm, seeded 0..runs
        #[arg(short, long, default_value = "5")]
        runs: usize,

        /// Spread the runs over all cores
        #[arg(long)]
        parallel: bool,

        #[command(flatten)]
        run: RunArgs,

        /// Output directory for CSV results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,
    },

    /// Analyze an instance
    Analyze {
        /// Path to the instance file
        #[arg(short, long)]
        instance: PathBuf,

        #[arg(long, value_enum)]
        format: Option<Format>,
    },
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Instance format, guessed from the extension when absent
    #[arg(long, value_enum)]
    format: Option<Format>,

    /// Maximum iterations (default 5000 x difficulty)
    #[arg(long)]
    n_iters: Option<usize>,

    /// Population size (default: difficulty)
    #[arg(long)]
    pop_size: Option<usize>,

    /// Random seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// JSON overrides: an `engine` object plus one object per algorithm key
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cache evaluated sequences
    #[arg(long)]
    memoize: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Format {
    /// TSPLIB coordinates
    Tsplib,
    /// Maintenance scheduling JSON
    Json,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Algorithm {
    /// Genetic algorithm
    Ga,
    /// Simulated annealing
    Sa,
    /// Tabu search
    Tabu,
    /// Harmony search
    Hs,
    /// Harmony search with genetic recovery
    Mhs,
    /// Harmony search with cubic duplicate recovery
    MhsV2,
    /// Cuckoo search
    Cuckoo,
    /// Cuckoo search with annealed nests
    ModifiedCuckoo,
    /// Ant colony optimization
    Aco,
    /// Particle swarm
    Pso,
    /// Particle swarm on a worker pool
    ParallelPso,
    /// Every permutation
    Exhaustive,
}

impl Algorithm {
    /// Key of the algorithm's section in a config file
    fn key(self) -> &'static str {
        match self {
            Algorithm::Ga => "ga",
            Algorithm::Sa => "sa",
            Algorithm::Tabu => "tabu",
            Algorithm::Hs => "hs",
            Algorithm::Mhs => "mhs",
            Algorithm::MhsV2 => "mhs-v2",
            Algorithm::Cuckoo => "cuckoo",
            Algorithm::ModifiedCuckoo => "modified-cuckoo",
            Algorithm::Aco => "aco",
            Algorithm::Pso => "pso",
            Algorithm::ParallelPso => "parallel-pso",
            Algorithm::Exhaustive => "exhaustive",
        }
    }
}

enum Instance {
    Routing(RoutingInstance),
    Maintenance(MaintenanceInstance),
}

/// Bind `$p` to the loaded problem, memoized or not, and evaluate `$body`
macro_rules! with_problem {
    ($instance:expr, $memoize:expr, |$p:ident| $body:expr) => {
        match ($instance, $memoize) {
            (Instance::Routing(inner), true) => {
                let $p = &MemoizedProblem::new(inner);
                $body
            }
            (Instance::Routing(inner), false) => {
                let $p = &inner;
                $body
            }
            (Instance::Maintenance(inner), true) => {
                let $p = &MemoizedProblem::new(inner);
                $body
            }
            (Instance::Maintenance(inner), false) => {
                let $p = &inner;
                $body
            }
        }
    };
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Solve { instance, algorithm, run, output, quiet } => {
            solve_instance(&instance, algorithm, &run, output.as_deref(), quiet)
        }
        Commands::Race { instance, algorithms, runs, parallel, run, output } => {
            race_instance(&instance, &algorithms, runs, parallel, &run, &output)
        }
        Commands::Analyze { instance, format } => analyze_instance(&instance, format),
    };

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_instance(path: &Path, format: Option<Format>) -> Result<Instance, SearchError> {
    let format = format.unwrap_or_else(|| match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Format::Json,
        _ => Format::Tsplib,
    });
    info!("Loading {:?} instance from {:?}", format, path);
    Ok(match format {
        Format::Tsplib => Instance::Routing(RoutingInstance::from_file(path)?),
        Format::Json => Instance::Maintenance(MaintenanceInstance::from_file(path)?),
    })
}

fn load_overrides(path: Option<&Path>) -> Result<Value, SearchError> {
    match path {
        Some(path) => Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?),
        None => Ok(Value::Null),
    }
}

fn engine_config<P: Problem>(
    problem: &P,
    run: &RunArgs,
    overrides: &Value,
) -> Result<EngineConfig, SearchError> {
    let mut config = with_overrides(EngineConfig::for_problem(problem), &overrides["engine"])?;
    if let Some(n_iters) = run.n_iters {
        config.n_iters = n_iters;
    }
    if let Some(pop_size) = run.pop_size {
        config.pop_size = pop_size;
    }
    if run.seed.is_some() {
        config.seed = run.seed;
    }
    Ok(config)
}

/// Run a strategy to completion, with a progress bar when `progress` is set
fn drive<P: Problem, S: Strategy<P>>(
    problem: &P,
    strategy: S,
    config: EngineConfig,
    progress: bool,
) -> Result<RunSummary, SearchError> {
    let mut engine = Metaheuristic::new(problem, strategy, config)?;
    if !progress {
        return engine.solve();
    }

    let bar = ProgressBar::new(engine.config().n_iters as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    while !engine.step()?.terminated {
        bar.set_position(engine.iteration() as u64);
        bar.set_message(format!("best {:.4}", engine.context().best_cost()));
    }
    bar.finish_and_clear();
    Ok(engine.summary())
}

fn run_algorithm<P: Problem>(
    problem: &P,
    algorithm: Algorithm,
    config: EngineConfig,
    overrides: &Value,
    progress: bool,
) -> Result<RunSummary, SearchError> {
    let d = problem.difficulty();
    let custom = &overrides[algorithm.key()];

    match algorithm {
        Algorithm::Ga => {
            let genetic = Genetic::new(with_overrides(GeneticConfig::default(), custom)?);
            drive(problem, genetic, config, progress)
        }
        Algorithm::Sa => {
            let sa_config = with_overrides(SimulatedAnnealingConfig::for_difficulty(d), custom)?;
            let sa = SimulatedAnnealing::new(sa_config);
            drive(problem, sa, config, progress)
        }
        Algorithm::Tabu => {
            let tabu_config = with_overrides(TabuSearchConfig::for_difficulty(d), custom)?;
            let tabu = TabuSearch::new(tabu_config);
            drive(problem, tabu, config, progress)
        }
        Algorithm::Hs => {
            let hs = HarmonySearch::new(with_overrides(HarmonySearchConfig::default(), custom)?);
            drive(problem, hs, config, progress)
        }
        Algorithm::Mhs => {
            let mhs_config = with_overrides(ModifiedHarmonySearchConfig::default(), custom)?;
            let mhs = ModifiedHarmonySearch::new(mhs_config);
            drive(problem, mhs, config, progress)
        }
        Algorithm::MhsV2 => {
            let mhs_config = with_overrides(ModifiedHarmonySearchConfig::default(), custom)?;
            let mhs = ModifiedHarmonySearchV2::new(mhs_config);
            drive(problem, mhs, config, progress)
        }
        Algorithm::Cuckoo => {
            let cs_config = with_overrides(CuckooSearchConfig::for_difficulty(d), custom)?;
            let cs = CuckooSearch::new(cs_config);
            drive(problem, cs, config, progress)
        }
        Algorithm::ModifiedCuckoo => {
            let mcs_config = with_overrides(ModifiedCuckooSearchConfig::for_difficulty(d), custom)?;
            let mcs = ModifiedCuckooSearch::new(mcs_config);
            drive(problem, mcs, config, progress)
        }
        Algorithm::Aco => {
            let aco = AntColonyOptimization::new(with_overrides(AcoConfig::default(), custom)?);
            drive(problem, aco, config, progress)
        }
        Algorithm::Pso => {
            let pso = ParticleSwarm::new(with_overrides(ParticleSwarmConfig::default(), custom)?);
            drive(problem, pso, config, progress)
        }
        Algorithm::ParallelPso => {
            let pso_config = with_overrides(ParticleSwarmConfig::default(), custom)?;
            let pso = ParallelParticleSwarm::new(pso_config)?;
            drive(problem, pso, config, progress)
        }
        Algorithm::Exhaustive => ExhaustiveSearch::new(problem).solve(),
    }
}

/// One algorithm with fixed settings, as a race contender
struct Contender<'p, P> {
    problem: &'p P,
    algorithm: Algorithm,
    config: EngineConfig,
    overrides: &'p Value,
    /// Evaluate through a cache of its own for each run
    memoize: bool,
}

impl<'p, P: Problem> Solver for Contender<'p, P> {
    fn name(&self) -> &str {
        self.algorithm.key()
    }

    fn solve(&mut self) -> Result<RunSummary, SearchError> {
        let config = self.config.clone();
        if self.memoize {
            let cached = MemoizedProblem::new(self.problem);
            run_algorithm(&cached, self.algorithm, config, self.overrides, false)
        } else {
            run_algorithm(self.problem, self.algorithm, config, self.overrides, false)
        }
    }
}

fn contender<'p, P: Problem>(
    problem: &'p P,
    algorithm: Algorithm,
    config: EngineConfig,
    overrides: &'p Value,
    memoize: bool,
) -> Box<dyn Solver + 'p> {
    Box::new(Contender { problem, algorithm, config, overrides, memoize })
}

fn print_summary(summary: &RunSummary) {
    println!("\n========== Results ==========");
    println!("Algorithm: {}", summary.solver);
    println!("Instance: {}", summary.instance);
    println!("Cost: {:.4}", summary.best_cost);
    println!("Feasible: {}", summary.feasible);
    let aborted = if summary.aborted { " (aborted)" } else { "" };
    println!("Iterations: {}{}", summary.iterations, aborted);
    println!("Time: {:.4}s ({:.0} solutions/s)", summary.duration_secs, summary.rate);
    if let Some(cache) = summary.cache {
        println!("Cache: {}", cache);
    }
    println!("\nSequence: {:?}", summary.best_sequence);
}

fn solve_instance(
    path: &Path,
    algorithm: Algorithm,
    run: &RunArgs,
    output: Option<&Path>,
    quiet: bool,
) -> Result<(), SearchError> {
    let overrides = load_overrides(run.config.as_deref())?;
    let instance = load_instance(path, run.format)?;

    let summary = with_problem!(instance, run.memoize, |problem| {
        let config = engine_config(problem, run, &overrides)?;
        println!("Solving {} with {:?}...", problem.name(), algorithm);
        run_algorithm(problem, algorithm, config, &overrides, !quiet)?
    });

    print_summary(&summary);

    if let Some(out_path) = output {
        serde_json::to_writer_pretty(BufWriter::new(File::create(out_path)?), &summary)?;
        println!("\nSummary saved to {:?}", out_path);
    }
    Ok(())
}

fn race_instance(
    path: &Path,
    algorithms: &[Algorithm],
    runs: usize,
    parallel: bool,
    run: &RunArgs,
    output: &Path,
) -> Result<(), SearchError> {
    let overrides = load_overrides(run.config.as_deref())?;
    let instance = load_instance(path, run.format)?;
    std::fs::create_dir_all(output)?;

    let report = match &instance {
        Instance::Routing(problem) => {
            race_problem(problem, algorithms, runs, parallel, run, &overrides, output)?
        }
        Instance::Maintenance(problem) => {
            race_problem(problem, algorithms, runs, parallel, run, &overrides, output)?
        }
    };

    println!("\n{}", report);
    Ok(())
}

/// Race on one problem; with `--memoize` every run gets a fresh cache
fn race_problem<P: Problem>(
    problem: &P,
    algorithms: &[Algorithm],
    runs: usize,
    parallel: bool,
    run: &RunArgs,
    overrides: &Value,
    output: &Path,
) -> Result<String, SearchError> {
    let base = engine_config(problem, run, overrides)?;
    let memoize = run.memoize;
    let entries = algorithms
        .iter()
        .map(|&algorithm| {
            let base = base.clone();
            RaceEntry::new(algorithm.key(), move |seed| {
                let config = EngineConfig { seed: Some(seed), ..base.clone() };
                Ok(contender(problem, algorithm, config, overrides, memoize))
            })
        })
        .collect();

    let mut race = Race::new(entries);
    race.run(runs, parallel)?;

    let results_path = output.join("race_results.csv");
    race.export_to_csv(&results_path)?;
    println!("Results exported to {:?}", results_path);

    let stats_path = output.join("race_statistics.csv");
    race.export_statistics_csv(&stats_path)?;
    println!("Statistics exported to {:?}", stats_path);

    Ok(race.report())
}

fn analyze_instance(path: &Path, format: Option<Format>) -> Result<(), SearchError> {
    println!("========== Instance Analysis ==========\n");
    match load_instance(path, format)? {
        Instance::Routing(instance) => println!("{}", instance.statistics()),
        Instance::Maintenance(instance) => println!("{}", instance.statistics()),
    }
    Ok(())
}
