/*!
 * shield-bench - Workload Driver Entry Point
 *
 * Runs one throughput measurement and prints it as a CSV row or JSON object:
 * - flat: one shared lock per operation
 * - nested: the same lock re-entered `depth` times
 * - hierarchical: one random lock per level across `depth` levels
 *
 * Configuration and shield errors are rendered through miette's report
 * handler, so their codes and help text reach the terminal.
 */

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use lock_shield::core::limits::{
    DEFAULT_HIERARCHY_LEVELS, DEFAULT_ITERATIONS, DEFAULT_LOCKS_PER_LEVEL,
    DEFAULT_WARMUP_ITERATIONS,
};
use lock_shield::shield::{install_pool_config, ShieldConfig, StrategyType};
use lock_shield::workload::{self, BenchConfig, BenchReport, DriverError, LockMode, Workload};
use lock_shield::{init_tracing, ShieldError};
use tracing::info;

/// Lock shield throughput driver
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(subcommand)]
    workload: WorkloadCommand,

    /// Worker threads
    #[clap(short, long, global = true)]
    threads: Option<usize>,

    /// Timed operations, split across threads
    #[clap(short, long, global = true, default_value_t = DEFAULT_ITERATIONS)]
    iterations: u64,

    /// Untimed operations per thread
    #[clap(long, global = true, default_value_t = DEFAULT_WARMUP_ITERATIONS)]
    warmup: u64,

    /// Busy-work units per operation
    #[clap(short, long, global = true, default_value_t = 0)]
    work: u32,

    #[clap(short, long, global = true, value_enum, default_value_t = LockMode::ShieldedReentrant)]
    mode: LockMode,

    /// Directory strategy for shielded modes [default: SHIELD_STRATEGY or auto]
    #[clap(short, long, global = true, value_enum)]
    strategy: Option<StrategyType>,

    /// Pin each worker to one CPU
    #[clap(long, global = true)]
    pin: bool,

    #[clap(long, global = true, default_value_t = 0x5eed)]
    seed: u64,

    #[clap(long, global = true, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    /// Print the CSV header before the row
    #[clap(long, global = true)]
    header: bool,
}

#[derive(Subcommand)]
enum WorkloadCommand {
    /// Acquire and release one shared lock
    Flat,

    /// Re-enter one shared lock
    Nested {
        #[clap(long, default_value_t = 4)]
        depth: usize,
    },

    /// Walk a lock hierarchy in level order
    Hierarchical {
        #[clap(long, default_value_t = 10)]
        depth: usize,

        #[clap(long, default_value_t = DEFAULT_HIERARCHY_LEVELS)]
        levels: usize,

        #[clap(long, default_value_t = DEFAULT_LOCKS_PER_LEVEL)]
        locks_per_level: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

impl From<&WorkloadCommand> for Workload {
    fn from(cmd: &WorkloadCommand) -> Self {
        match *cmd {
            WorkloadCommand::Flat => Workload::Flat,
            WorkloadCommand::Nested { depth } => Workload::Nested { depth },
            WorkloadCommand::Hierarchical {
                depth,
                levels,
                locks_per_level,
            } => Workload::Hierarchical {
                levels,
                locks_per_level,
                depth,
            },
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    install_report_handler()?;
    let cli = Cli::parse();

    let shield_config = ShieldConfig::from_env()
        .map_err(render)
        .context("reading SHIELD_* environment")?;

    let defaults = BenchConfig::default();
    let config = BenchConfig {
        threads: cli.threads.unwrap_or(defaults.threads),
        iterations: cli.iterations,
        warmup_iterations: cli.warmup,
        work_amount: cli.work,
        mode: cli.mode,
        workload: Workload::from(&cli.workload),
        strategy: cli.strategy.unwrap_or(shield_config.strategy),
        pin_threads: cli.pin,
        seed: cli.seed,
    };

    // Hierarchical walks hold `depth` locks at once; size the pool to avoid
    // dynamic nodes on every operation
    let mut pool = shield_config.pool;
    if let Workload::Hierarchical { depth, .. } = config.workload {
        pool.pool_size = pool.pool_size.max(depth);
    }
    install_pool_config(pool).map_err(render)?;
    info!(?config, ?pool, strategy = ?config.directory_strategy(), "configuration loaded");

    let report = workload::run(&config)
        .map_err(|e| match e {
            DriverError::Shield(e) => render(e),
            other => anyhow::Error::new(other),
        })
        .context("workload run failed")?;
    print_report(&report, cli.format, cli.header)
}

fn install_report_handler() -> anyhow::Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(false)
                .context_lines(2)
                .build(),
        )
    }))?;
    Ok(())
}

/// Carry a shield error's diagnostic rendering into the anyhow chain
fn render(err: ShieldError) -> anyhow::Error {
    anyhow::anyhow!("{:?}", miette::Report::new(err))
}

fn print_report(report: &BenchReport, format: OutputFormat, header: bool) -> anyhow::Result<()> {
    match format {
        OutputFormat::Csv => {
            if header {
                println!("{}", BenchReport::CSV_HEADER);
            }
            println!("{}", report.to_csv());
        }
        OutputFormat::Json => println!("{}", report.to_json()?),
    }
    Ok(())
}
