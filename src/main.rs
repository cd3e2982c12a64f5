use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use ragindex::cli::commands::{
    handle_ask, handle_config, handle_ingest, handle_rebuild, handle_remove, handle_search,
    handle_status,
};
use ragindex::cli::{Cli, Commands};
use ragindex::models::{Config, OutputFormat};

/// Log to stderr so command output on stdout stays machine-readable.
fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "info" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    tokio::select! {
        result = run_command(cli) => {
            result?;
        }
        _ = shutdown_signal() => {
            eprintln!("\nReceived shutdown signal; the saved index was left unchanged.");
        }
    }

    Ok(())
}

async fn run_command(cli: Cli) -> Result<()> {
    let verbose = cli.verbose;

    if let Commands::Config(cmd) = cli.command {
        return handle_config(cmd, cli.format.unwrap_or_default(), verbose).await;
    }

    let mut config = Config::load()?;
    if let Some(dir) = cli.index_dir {
        config.indexing.index_dir = Some(dir);
    }
    let format: OutputFormat = cli.format.unwrap_or(config.retrieval.default_format);

    match cli.command {
        Commands::Ingest(args) => handle_ingest(args, &config, format, verbose).await?,
        Commands::Search(args) => handle_search(args, &config, format, verbose).await?,
        Commands::Ask(args) => handle_ask(args, &config, format, verbose).await?,
        Commands::Remove(args) => handle_remove(args, &config, format, verbose).await?,
        Commands::Rebuild(args) => handle_rebuild(args, &config, format, verbose).await?,
        Commands::Status => handle_status(&config, format, verbose).await?,
        Commands::Config(_) => {}
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
