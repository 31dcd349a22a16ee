//! DeFi Yield Tracker - Main Entry Point

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use defi_yield_tracker::config::Config;
use defi_yield_tracker::pipeline::{ApyJob, BalancesJob, Dataset, Pipeline};
use defi_yield_tracker::provider::{BalanceClient, OpportunityClient};
use defi_yield_tracker::scheduler::{Fire, Scheduler};
use defi_yield_tracker::storage::{BlobBackend, TableStore};
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// DeFi Yield Tracker CLI
#[derive(Parser)]
#[command(name = "defi-yield-tracker")]
#[command(version, about = "Scheduled collector for DeFi balances and APYs")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run collections on the configured schedule (default)
    Run,

    /// Run a single collection now
    Once {
        /// Dataset to collect
        #[arg(short, long, value_enum, default_value_t = DatasetArg::All)]
        dataset: DatasetArg,
    },

    /// Show a stored table
    Show {
        /// Dataset to show
        #[arg(short, long, value_enum)]
        dataset: DatasetArg,

        /// Number of trailing rows to print
        #[arg(short, long, default_value = "10")]
        tail: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DatasetArg {
    Balances,
    Apy,
    All,
}

impl DatasetArg {
    fn datasets(self) -> Vec<Dataset> {
        match self {
            DatasetArg::Balances => vec![Dataset::Balances],
            DatasetArg::Apy => vec![Dataset::Apy],
            DatasetArg::All => Dataset::ALL.to_vec(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_scheduled(&config).await,
        Commands::Once { dataset } => run_once(&config, &dataset.datasets()).await,
        Commands::Show { dataset, tail } => show_tables(&config, &dataset.datasets(), tail).await,
    }
}

fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let backend =
        BlobBackend::from_connection_string(&config.storage.connection_string, &config.storage.container)?;
    Ok(Pipeline::new(TableStore::new(backend, config.storage.on_read_error)))
}

/// Run the given datasets one after another; a failure does not stop the rest.
///
/// Returns the number of failed datasets.
async fn collect(config: &Config, pipeline: &Pipeline, datasets: &[Dataset]) -> usize {
    let mut failures = 0;

    for &dataset in datasets {
        let outcome = match dataset {
            Dataset::Balances => match BalanceClient::new(config) {
                Ok(client) => {
                    let job = BalancesJob::new(client, &config.balances.address, &config.balances.network);
                    pipeline.run(&job).await.map(|_| ()).map_err(anyhow::Error::from)
                }
                Err(e) => Err(e),
            },
            Dataset::Apy => match OpportunityClient::new(config) {
                Ok(client) => pipeline
                    .run(&ApyJob::new(client))
                    .await
                    .map(|_| ())
                    .map_err(anyhow::Error::from),
                Err(e) => Err(e),
            },
        };

        if let Err(e) = outcome {
            // pipeline errors are already logged with their stage
            warn!(%dataset, "Collection failed: {:#}", e);
            failures += 1;
        }
    }

    failures
}

async fn run_once(config: &Config, datasets: &[Dataset]) -> Result<()> {
    config.validate(datasets)?;
    let pipeline = build_pipeline(config)?;

    let failures = collect(config, &pipeline, datasets).await;
    anyhow::ensure!(failures == 0, "{} of {} collections failed", failures, datasets.len());
    Ok(())
}

async fn run_scheduled(config: &Config) -> Result<()> {
    let datasets = Dataset::ALL;
    config.validate(&datasets)?;
    let pipeline = build_pipeline(config)?;

    let scheduler = Scheduler::new(
        &config.schedule.cron,
        config.schedule.run_on_startup,
        Duration::from_secs(config.schedule.past_due_grace_secs),
    )?;

    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║            DeFi Yield Tracker v{}                       ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");
    log_config(config);

    scheduler
        .run(|fire: Fire| {
            let pipeline = &pipeline;
            async move {
                let failures = collect(config, pipeline, &datasets).await;
                if failures > 0 {
                    error!(failures, past_due = fire.past_due, "Scheduled collection finished with failures");
                } else {
                    info!(past_due = fire.past_due, "Scheduled collection finished");
                }
            }
        })
        .await;

    Ok(())
}

async fn show_tables(config: &Config, datasets: &[Dataset], tail: usize) -> Result<()> {
    anyhow::ensure!(
        !config.storage.connection_string.is_empty(),
        "storage.connection_string is required"
    );
    let pipeline = build_pipeline(config)?;

    for &dataset in datasets {
        let table = pipeline.store().load_existing(dataset).await?;
        println!(
            "{} ({}/{}): {} rows",
            dataset,
            config.storage.container,
            dataset.object_name(),
            table.len()
        );
        if table.columns().is_empty() {
            continue;
        }
        println!("  {}", table.columns().join(" | "));
        let skip = table.len().saturating_sub(tail);
        for record in table.records().iter().skip(skip) {
            println!("  {}", record.join(" | "));
        }
    }

    Ok(())
}

/// Initialize logging to stdout and a daily rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::daily("logs", "defi-yield-tracker.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("defi_yield_tracker=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup, without secrets.
fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!("   Wallet: {} on {}", config.balances.address, config.balances.network);
    info!("   Balances API: {}", config.balances.base_url);
    info!("   Opportunities API: {}", config.opportunities.endpoint);
    info!("   Container: {}", config.storage.container);
    info!("   Unreadable table policy: {:?}", config.storage.on_read_error);
    info!(
        "   Schedule: '{}' (run on startup: {})",
        config.schedule.cron, config.schedule.run_on_startup
    );
    info!("   Settle delay: {}s", config.http.settle_delay_secs);
}
