use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sitepulse_common::Config;
use sitepulse_scout::Scout;

#[derive(Parser)]
#[command(name = "sitepulse-scout", about = "Sitemap monitoring and keyword metrics pipeline")]
struct Cli {
    /// Comma-separated sitemap URLs (overrides SITEMAP_URLS).
    #[arg(long)]
    sitemap_urls: Option<String>,

    /// Sitemap worker count (overrides SITEMAP_WORKERS).
    #[arg(long)]
    workers: Option<usize>,

    /// Keywords per metrics-call batch (overrides BATCH_SIZE).
    #[arg(long)]
    batch_size: Option<usize>,

    /// Verbose logging (same as DEBUG=1).
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full monitoring pipeline once (the default).
    Run,
    /// Diff the two most recent snapshots of a domain.
    Diff { domain: String },
    /// List snapshot history for a domain.
    History {
        domain: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.debug || std::env::var("DEBUG").is_ok() {
        "sitepulse=debug"
    } else {
        "sitepulse=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Sitepulse scout starting...");

    // Config loading panics on missing required vars; that is a
    // configuration error, not a crash.
    let mut config = match std::panic::catch_unwind(Config::from_env) {
        Ok(config) => config,
        Err(_) => return ExitCode::from(1),
    };
    apply_overrides(&mut config, &cli);
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return ExitCode::from(1);
    }
    config.log_redacted();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to start runtime");
            return ExitCode::from(1);
        }
    };

    let outcome = runtime.block_on(run_command(config, cli.command));
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Run failed");
            ExitCode::from(1)
        }
    }
}

async fn run_command(config: Config, command: Option<Command>) -> anyhow::Result<()> {
    let scout = Scout::new(config)?;

    match command.unwrap_or(Command::Run) {
        Command::Run => {
            // The pipeline runs in its own task so a panic anywhere inside
            // is recovered here at the orchestrator boundary.
            let scout = std::sync::Arc::new(scout);
            let runner = scout.clone();
            let handle = tokio::spawn(async move { runner.run().await });
            match handle.await {
                Ok(Ok(stats)) => {
                    info!("{stats}");
                    Ok(())
                }
                Ok(Err(e)) => Err(e),
                Err(join_err) if join_err.is_panic() => {
                    anyhow::bail!("pipeline panicked; see log for details")
                }
                Err(join_err) => Err(join_err.into()),
            }
        }
        Command::Diff { domain } => scout.diff_domain(&domain).await,
        Command::History { domain, limit } => scout.print_history(&domain, limit).await,
    }
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(urls) = &cli.sitemap_urls {
        config.sitemap_urls = urls
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(workers) = cli.workers {
        config.sitemap_workers = workers;
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    if cli.debug {
        config.debug = true;
    }
}
