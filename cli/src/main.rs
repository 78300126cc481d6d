//! RichScan CLI: scans a Blockbook-style indexer into a ranked rich list and
//! serves it over HTTP.
//!
//! # Commands
//! ```text
//! richscan run      --indexer-url <url>   # serve + startup scan + daily schedule
//! richscan scan     --indexer-url <url>   # one pass, then exit
//! richscan serve                          # snapshot API only
//! richscan profile  --indexer-url <url>   # show the pacing profile that would apply
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use richscan_core::{classify, profile_for_endpoint, ScanOutcome};

mod config;
mod logging;
mod runner;
mod schedule;

use config::{IndexerArgs, ScanArgs, ScheduleArgs, ServeArgs};
use logging::{init_tracing, parse_components, LogConfig};

#[derive(Parser)]
#[command(
    name = "richscan",
    about = "Incremental rich-list scanner and snapshot server",
    long_about = "
RichScan walks a Blockbook-style indexer block by block, keeps a running
balance per address, checkpoints its progress, and publishes a ranked rich
list that the built-in HTTP API serves.

Every flag can also be set through the environment variable shown in --help.
",
    version
)]
struct Cli {
    /// Log level when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Emit JSON logs
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    /// Per-component level, e.g. `richscan-http=debug` (repeatable or comma separated)
    #[arg(long = "log-component", env = "LOG_COMPONENTS", value_delimiter = ',', global = true)]
    log_components: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the rich list and keep it fresh on a daily schedule
    Run {
        #[command(flatten)]
        indexer: IndexerArgs,
        #[command(flatten)]
        scan: ScanArgs,
        #[command(flatten)]
        serve: ServeArgs,
        #[command(flatten)]
        schedule: ScheduleArgs,
    },

    /// Run a single scan pass and exit
    Scan {
        #[command(flatten)]
        indexer: IndexerArgs,
        #[command(flatten)]
        scan: ScanArgs,
        /// Print the pass outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Serve the last published rich list without scanning
    Serve {
        #[command(flatten)]
        scan: ScanArgs,
        #[command(flatten)]
        serve: ServeArgs,
    },

    /// Show how an indexer URL is classified and which profile applies
    Profile {
        #[command(flatten)]
        indexer: IndexerArgs,
        #[command(flatten)]
        scan: ScanArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&LogConfig {
        level: cli.log_level.clone(),
        components: parse_components(&cli.log_components)?,
        json: cli.log_json,
    });

    match cli.command {
        Commands::Run {
            indexer,
            scan,
            serve,
            schedule,
        } => {
            let shutdown = shutdown_on_ctrl_c();
            runner::run_daemon(&indexer, &scan, &serve, schedule, shutdown).await
        }

        Commands::Scan { indexer, scan, json } => {
            let outcome = runner::scan_once(&indexer, &scan, shutdown_on_ctrl_c()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            }
            if let ScanOutcome::Interrupted { height } = outcome {
                bail!("scan interrupted after block {height}; rerun to resume from the checkpoint");
            }
            Ok(())
        }

        Commands::Serve { scan, serve } => runner::serve(&scan, &serve, shutdown_on_ctrl_c()).await,

        Commands::Profile { indexer, scan } => {
            let overrides = scan.overrides();
            for url in indexer.endpoints() {
                let profile = profile_for_endpoint(&url, &overrides);
                println!("{url}");
                println!("  class:               {:?}", classify(&url));
                println!("  mode:                {}", profile.mode);
                println!("  timeout_ms:          {}", profile.timeout_ms);
                println!("  retry_limit:         {}", profile.retry_limit);
                println!("  batch_size:          {}", profile.batch_size);
                println!("  throttle_delay_ms:   {}", profile.throttle_delay_ms);
                println!("  checkpoint_interval: {}", profile.checkpoint_interval);
            }
            Ok(())
        }
    }
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutdown requested");
                trigger.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for ctrl-c"),
        }
    });
    token
}
