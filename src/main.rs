#![allow(dead_code)]

mod config;
mod db;
mod fees;
mod policy;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::Config;
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "dynamic-fees",
    about = "Recompute channel opening fee policies from live fee estimates"
)]
struct Cli {
    /// Path to the params SQLite database
    #[arg(long, env = "DATABASE_PATH", default_value = "dynamicfees.db")]
    database: PathBuf,

    /// Base URL of the mempool.space-compatible fee estimator
    #[arg(long, env = "MEMPOOL_API_BASE_URL", default_value = "")]
    mempool_api_base_url: String,

    /// Base URL of the whatthefee.io-compatible fee estimator
    #[arg(long, env = "WHATTHEFEE_API_BASE_URL", default_value = "")]
    whatthefee_api_base_url: String,

    /// Interpreter operation budget per script execution
    #[arg(long, env = "MAX_SCRIPT_OPS", default_value_t = 100_000)]
    max_script_ops: u64,

    /// Logging level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a single policy evaluation run and exit (default)
    Run,
    /// Print stored tokens and their parameter sets
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config {
        database_path: cli.database,
        mempool_api_base_url: cli.mempool_api_base_url,
        whatthefee_api_base_url: cli.whatthefee_api_base_url,
        max_script_ops: cli.max_script_ops,
        log_level: cli.log_level,
    };

    env_logger::Builder::new()
        .filter_level(config.log_level.parse().unwrap_or(log::LevelFilter::Info))
        .format_timestamp_secs()
        .init();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config).await,
        Commands::Status => print_status(&config),
    }
}

/// One evaluation run: fetch both snapshots, load the full params view,
/// evaluate every (token, validity) pair, report.
///
/// Config and snapshot failures are fatal and happen before the store is
/// opened; from there on only whole-load failures abort the run.
async fn run(config: &Config) -> anyhow::Result<()> {
    config.validate()?;

    info!("dynamic-fees v{} starting", env!("CARGO_PKG_VERSION"));

    let mempool_fees = fees::mempoolspace::fetch(&config.mempool_api_base_url)
        .await
        .context("mempool.space snapshot fetch failed")?;
    let curve_fees = fees::whatthefee::fetch(&config.whatthefee_api_base_url)
        .await
        .context("whatthefee snapshot fetch failed")?;
    info!(
        "snapshots fetched: fastest {} sat/vB, curve {}x{}",
        mempool_fees.fastest_fee,
        curve_fees.index.len(),
        curve_fees.columns.len()
    );

    let db = db::Database::open(&config.database_path)?;
    let all_params = db.load_all()?;
    info!("loaded {} tokens from the store", all_params.len());

    let summary = policy::run(
        &db,
        &all_params,
        &mempool_fees,
        &curve_fees,
        config.max_script_ops,
    );
    info!(
        "run complete: {} pairs evaluated, {} updated, {} script failures, {} store failures",
        summary.evaluated, summary.updated, summary.script_failures, summary.store_failures
    );

    Ok(())
}

fn print_status(config: &Config) -> anyhow::Result<()> {
    let db = db::Database::open(&config.database_path)?;
    let all_params = db.load_all()?;

    println!("Dynamic Fees Status");
    println!("===================");
    println!("Tokens: {}", all_params.len());
    for (token, params) in &all_params {
        println!(
            "  {} (script: {}, validities: {})",
            token,
            if params.script.is_empty() { "no" } else { "yes" },
            params.opening_params.len()
        );
        for (validity, op) in &params.opening_params {
            println!(
                "    validity {}: min_msat={:?} proportional={:?}",
                validity, op.min_msat, op.proportional
            );
        }
    }

    Ok(())
}
