use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use eyre::WrapErr;
use tierjit::{CompileMode, TieringConfig};
use tierjit_bench::{
    simulation::run,
    types::{CompilerProfile, Workload},
};
use tracing::Level;
use tracing_subscriber::{EnvFilter, filter::Directive};

#[derive(Parser)]
#[command(name = "tierjit-bench", about = "Tiered dispatch simulation runner")]
struct Cli {
    /// Default log level; RUST_LOG directives take precedence
    #[arg(long, default_value_t = Level::WARN, global = true)]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Blocking,
    NonBlocking,
}

impl From<ModeArg> for CompileMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Blocking => CompileMode::Blocking,
            ModeArg::NonBlocking => CompileMode::NonBlocking,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run a synthetic hot/cold workload and output a JSON report
    Run {
        /// Number of distinct methods
        #[arg(long, default_value = "1000")]
        methods: u64,

        /// Total calls across all caller threads
        #[arg(long, default_value = "1000000")]
        calls: u64,

        /// Number of caller threads
        #[arg(long, default_value = "8")]
        threads: usize,

        /// Size of the hot method set
        #[arg(long, default_value = "10")]
        hot_methods: u64,

        /// Probability that a call targets the hot set
        #[arg(long, default_value = "0.9")]
        hot_ratio: f64,

        /// Compiler worker threads (overrides the config file)
        #[arg(long)]
        workers: Option<usize>,

        /// Whether callers wait for compiles (overrides the config file)
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// T1 promotion threshold (overrides the config file)
        #[arg(long)]
        t1_threshold: Option<u64>,

        /// T2 promotion threshold (overrides the config file)
        #[arg(long)]
        t2_threshold: Option<u64>,

        /// Simulated compile latency in milliseconds
        #[arg(long, default_value = "5")]
        compile_latency_ms: u64,

        /// Probability that a simulated compile fails
        #[arg(long, default_value = "0.0")]
        failure_rate: f64,

        /// TOML file with tiering configuration
        #[arg(long)]
        config: Option<PathBuf>,

        /// RNG seed for the workload and the simulated compiler
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output JSON file path (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(log_level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(Directive::from(log_level))
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    match cli.command {
        Command::Run {
            methods,
            calls,
            threads,
            hot_methods,
            hot_ratio,
            workers,
            mode,
            t1_threshold,
            t2_threshold,
            compile_latency_ms,
            failure_rate,
            config,
            seed,
            output,
        } => {
            let mut tiering = match &config {
                Some(path) => TieringConfig::load(path)?,
                None => TieringConfig::default(),
            };
            if let Some(workers) = workers {
                tiering = tiering.with_workers(workers);
            }
            if let Some(mode) = mode {
                tiering = tiering.with_mode(mode.into());
            }
            let t1 = t1_threshold.unwrap_or(tiering.t1_threshold);
            let t2 = t2_threshold.unwrap_or(tiering.t2_threshold);
            tiering = tiering.with_thresholds(t1, t2);
            tiering.validate()?;

            let workload = Workload {
                methods,
                calls,
                threads,
                hot_methods,
                hot_ratio,
                seed,
            };
            let profile = CompilerProfile {
                latency_ms: compile_latency_ms,
                failure_rate,
            };

            let report = run(tiering, workload, profile)?;
            let json = serde_json::to_string_pretty(&report)?;

            match output {
                Some(path) => {
                    fs::write(&path, &json)
                        .wrap_err_with(|| format!("failed to write {}", path.display()))?;
                    eprintln!("Results written to {}", path.display());
                }
                None => println!("{json}"),
            }
        }
    }

    Ok(())
}
