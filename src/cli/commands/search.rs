use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;

use super::open_retriever;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(long, short = 'n', help = "Maximum number of results to return")]
    pub limit: Option<u32>,

    #[arg(long, help = "Drop hits farther than this squared L2 distance")]
    pub max_distance: Option<f32>,
}

/// Resolve the result limit and distance cutoff against the config defaults.
pub(super) fn resolve_limits(
    config: &Config,
    limit: Option<u32>,
    max_distance: Option<f32>,
) -> Result<(usize, Config)> {
    let limit = limit.unwrap_or(config.retrieval.default_top_k);
    if limit == 0 {
        anyhow::bail!("limit must be at least 1");
    }

    let mut config = config.clone();
    if let Some(distance) = max_distance {
        if !distance.is_finite() || distance < 0.0 {
            anyhow::bail!("max_distance must be a non-negative number");
        }
        config.retrieval.max_distance = Some(distance);
    }
    Ok((limit as usize, config))
}

pub async fn handle_search(
    args: SearchArgs,
    config: &Config,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }

    let formatter = get_formatter(format);
    let (limit, config) = resolve_limits(config, args.limit, args.max_distance)?;
    let start_time = Instant::now();

    if verbose {
        eprintln!("Query: \"{query}\"");
        eprintln!("  Limit: {limit}");
        if let Some(distance) = config.retrieval.max_distance {
            eprintln!("  Max distance: {distance:.4}");
        }
    }

    let (retriever, _) = open_retriever(&config)?;
    let retrieval = retriever.retrieve(query, limit).await.context("search failed")?;

    if verbose {
        eprintln!("Timing:");
        eprintln!("  Retrieval: {}ms", retrieval.duration_ms);
        eprintln!("  Total: {}ms", start_time.elapsed().as_millis());
        eprintln!();
    }

    print!("{}", formatter.format_retrieval(&retrieval));

    Ok(())
}
