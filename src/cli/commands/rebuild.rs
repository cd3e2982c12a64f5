use anyhow::{Context, Result};
use clap::Args;

use super::open_retriever;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::IndexKind;

#[derive(Debug, Args)]
pub struct RebuildArgs {
    /// Switch to another index variant: flat, lsh, ivf, ivfpq or hnsw
    #[arg(long, short = 'k')]
    pub kind: Option<IndexKind>,
}

pub async fn handle_rebuild(
    args: RebuildArgs,
    config: &Config,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let formatter = get_formatter(format);
    let (retriever, dir) = open_retriever(config)?;

    let before = retriever.stats().await;
    if verbose {
        eprintln!(
            "Rebuilding {} index: {} live chunks, {} tombstones",
            before.variant, before.live_chunks, before.tombstones
        );
    }

    let after = match args.kind {
        Some(kind) => retriever.rebuild_as(kind, &config.index).await,
        None => retriever.rebuild().await,
    }
    .context("rebuild failed")?;

    retriever
        .save(&dir)
        .await
        .with_context(|| format!("failed to save index to {}", dir.display()))?;

    println!(
        "{}",
        formatter.format_message(&format!(
            "Rebuilt {} index with {} chunks ({} tombstones dropped)",
            after.variant, after.live_chunks, before.tombstones
        ))
    );

    Ok(())
}
