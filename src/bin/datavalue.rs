//! datavalue CLI: value the training points of a dataset.
//!
//! Data comes either from a JSON file (see [`datavalue::data::RawDataset`])
//! or from a synthetic generator. Results are written as JSON to a file or
//! to stdout.
//!
//! Examples:
//!   datavalue shapley --synthetic 30 --mode permutation_montecarlo --max-updates 200
//!   datavalue -vv --config run.json shapley --data points.json --out values.json
//!   datavalue loo --data points.json
//!   datavalue least-core --synthetic 10 --mode exact
//!   datavalue knn --synthetic 200 --n-neighbors 5

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use datavalue::data::load_json;
use datavalue::model::{KNeighborsClassifier, LinearRegression};
use datavalue::testing::data::{synthetic_classification, synthetic_regression};
use datavalue::value::{
    compute_least_core_values, compute_shapley_values, naive_loo, LeastCoreMode, ShapleyMode,
};
use datavalue::{
    Dataset, ParallelConfig, Scorer, SupervisedModel, Utility, ValuationConfig, ValuationResult,
    Verbosity,
};

/// Data valuation for supervised learning
#[derive(Parser, Debug)]
#[command(name = "datavalue")]
#[command(version)]
#[command(about, long_about = None)]
struct Cli {
    /// Verbosity (-v warnings, -vv progress, -vvv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON valuation config; command line flags override its fields
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Shapley values with any exact, Monte Carlo or Owen algorithm
    Shapley {
        #[command(flatten)]
        data: DataArgs,

        /// Algorithm, e.g. truncated_montecarlo, permutation_exact, owen
        #[arg(short, long)]
        mode: Option<String>,

        /// Stop after this many updates of the most updated value
        #[arg(long)]
        max_updates: Option<usize>,

        /// Stop once every standard error is below this threshold
        #[arg(long)]
        value_tolerance: Option<f64>,

        /// Stop after this many seconds
        #[arg(long)]
        max_time: Option<f64>,

        /// Samples per q (Owen sampling)
        #[arg(long)]
        n_iterations: Option<usize>,

        /// Number of q values (Owen sampling)
        #[arg(long)]
        max_q: Option<usize>,

        /// Independent repetitions, merged into one result
        #[arg(long)]
        num_runs: Option<usize>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Leave-one-out values
    Loo {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Least core values
    LeastCore {
        #[command(flatten)]
        data: DataArgs,

        /// exact or montecarlo
        #[arg(short, long, default_value = "montecarlo")]
        mode: String,

        /// Sampled subsets (Monte Carlo)
        #[arg(long)]
        n_iterations: Option<usize>,

        /// Relaxation of the coalition constraints
        #[arg(long)]
        epsilon: Option<f64>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Closed form Shapley values of a K nearest neighbours classifier
    Knn {
        #[command(flatten)]
        data: DataArgs,

        /// Number of neighbours
        #[arg(short = 'k', long, default_value = "5")]
        n_neighbors: usize,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args, Debug)]
struct DataArgs {
    /// Dataset as JSON
    #[arg(long, value_name = "FILE", conflicts_with = "synthetic")]
    data: Option<PathBuf>,

    /// Generate this many training points instead of reading a file
    #[arg(long, value_name = "ROWS")]
    synthetic: Option<usize>,

    /// Features of synthetic regression data (classification data has one)
    #[arg(long, default_value = "3")]
    features: usize,

    /// Test points of synthetic data
    #[arg(long, default_value = "20")]
    test_size: usize,

    /// Noise amplitude of synthetic regression targets
    #[arg(long, default_value = "0.1")]
    noise: f64,

    /// Seed of the train/test split and of synthetic data
    #[arg(long, default_value = "42")]
    data_seed: u64,

    /// Scorer: r2, neg_mean_squared_error, accuracy, ...
    #[arg(long)]
    scorer: Option<String>,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Worker threads (0 = all CPUs)
    #[arg(short = 'j', long)]
    num_jobs: Option<usize>,

    /// Base random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Write the result here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open config {}", path.display()))?;
            ValuationConfig::from_json_reader(file)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => ValuationConfig::default(),
    };
    if cli.verbose > 0 {
        config.verbosity = Verbosity::from_count(cli.verbose);
    }

    match cli.command {
        Commands::Shapley {
            data,
            mode,
            max_updates,
            value_tolerance,
            max_time,
            n_iterations,
            max_q,
            num_runs,
            run,
        } => {
            if let Some(mode) = mode {
                config.mode = mode.parse::<ShapleyMode>()?;
            }
            config.max_updates = max_updates.or(config.max_updates);
            config.value_tolerance = value_tolerance.or(config.value_tolerance);
            config.max_time = max_time.or(config.max_time);
            config.n_iterations = n_iterations.or(config.n_iterations);
            config.max_q = max_q.or(config.max_q);
            config.n_runs = num_runs.unwrap_or(config.n_runs);
            apply_run_args(&mut config, &run)?;

            let u = utility(LinearRegression::new(), load_data(&data, false)?, &data, &config)?;
            let mut result = ValuationResult::empty(config.mode.as_str());
            for r in 0..config.n_runs {
                let mut params = config.shapley_params()?;
                params.seed = config.run_seed(r);
                info!(run = r, mode = %config.mode, "computing shapley values");
                result = result.merge(&compute_shapley_values(&u, config.mode, &params)?)?;
            }
            write_result(&result, run.out)
        }
        Commands::Loo { data, run } => {
            apply_run_args(&mut config, &run)?;
            let u = utility(LinearRegression::new(), load_data(&data, false)?, &data, &config)?;
            let result = naive_loo(&u, config.parallel.n_jobs(), config.verbosity)?;
            write_result(&result, run.out)
        }
        Commands::LeastCore {
            data,
            mode,
            n_iterations,
            epsilon,
            run,
        } => {
            let mode = mode.parse::<LeastCoreMode>()?;
            config.n_iterations = n_iterations.or(config.n_iterations);
            config.epsilon = epsilon.unwrap_or(config.epsilon);
            apply_run_args(&mut config, &run)?;

            let u = utility(LinearRegression::new(), load_data(&data, false)?, &data, &config)?;
            let mut params = config.least_core_params();
            if mode == LeastCoreMode::MonteCarlo && params.n_iterations.is_none() {
                let n = u.len();
                params.n_iterations = Some(n.saturating_mul(n).max(n));
                info!(n_iterations = params.n_iterations, "defaulting to n^2 sampled subsets");
            }
            let result = compute_least_core_values(&u, mode, &params)?;
            write_result(&result, run.out)
        }
        Commands::Knn {
            data,
            n_neighbors,
            run,
        } => {
            apply_run_args(&mut config, &run)?;
            let u = utility(
                KNeighborsClassifier::new(n_neighbors)?,
                load_data(&data, true)?,
                &data,
                &config,
            )?;
            let result = compute_shapley_values(&u, ShapleyMode::Knn, &config.shapley_params()?)?;
            write_result(&result, run.out)
        }
    }
}

/// `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "error",
        1 => "warn",
        2 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn apply_run_args(config: &mut ValuationConfig, run: &RunArgs) -> Result<()> {
    if let Some(n) = run.num_jobs {
        config.parallel = if n == 1 {
            ParallelConfig::sequential()
        } else {
            ParallelConfig::threads(n)
        };
    }
    config.seed = run.seed.or(config.seed);
    config.validate()?;
    Ok(())
}

fn load_data(args: &DataArgs, classification: bool) -> Result<Dataset> {
    match (&args.data, args.synthetic) {
        (Some(path), _) => load_json(path, args.data_seed)
            .with_context(|| format!("failed to load dataset {}", path.display())),
        (None, Some(rows)) if classification => {
            Ok(synthetic_classification(rows, args.test_size, args.data_seed))
        }
        (None, Some(rows)) => Ok(synthetic_regression(
            rows,
            args.test_size,
            args.features,
            args.noise,
            args.data_seed,
        )),
        (None, None) => bail!("either --data or --synthetic is required"),
    }
}

fn utility<M: SupervisedModel>(
    model: M,
    data: Dataset,
    args: &DataArgs,
    config: &ValuationConfig,
) -> Result<Utility<M>> {
    let scorer = args.scorer.as_deref().map(Scorer::from_name).transpose()?;
    Ok(Utility::builder()
        .model(model)
        .data(data)
        .maybe_scorer(scorer)
        .maybe_cache_config(config.cache.clone())
        .show_warnings(config.verbosity >= Verbosity::Warning)
        .build())
}

fn write_result(result: &ValuationResult, out: Option<PathBuf>) -> Result<()> {
    info!(
        algorithm = result.algorithm(),
        status = %result.status(),
        n = result.len(),
        "valuation finished"
    );
    match out {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            result.to_json_writer(&mut writer)?;
            writer.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            result.to_json_writer(&mut writer)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}
