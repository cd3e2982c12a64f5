use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use super::open_retriever;
use crate::cli::output::get_formatter;
use crate::models::{Config, Document, OutputFormat};
use crate::services::Retriever;
use crate::utils::file::collect_files;

#[derive(Debug, Args)]
pub struct RemoveArgs {
    /// Document ids, or paths of files and directories that were ingested
    #[arg(required = true)]
    pub targets: Vec<String>,

    /// Show what would be removed without removing
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub force: bool,
}

/// Map a target to stored document ids: a known id, or every ingested file under a path.
async fn resolve_target(retriever: &Retriever, target: &str) -> Result<Vec<String>> {
    if retriever.contains_document(target).await {
        return Ok(vec![target.to_string()]);
    }

    let path = Path::new(target);
    if !path.exists() {
        anyhow::bail!("no document or path named '{target}'");
    }
    let path = path
        .canonicalize()
        .with_context(|| format!("invalid path: {target}"))?;

    let mut ids = Vec::new();
    for file in collect_files(&path, &[]).context("failed to walk directory")? {
        let id = Document::generate_id(&file.to_string_lossy());
        if retriever.contains_document(&id).await {
            ids.push(id);
        }
    }
    Ok(ids)
}

pub async fn handle_remove(
    args: RemoveArgs,
    config: &Config,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let formatter = get_formatter(format);
    let (retriever, dir) = open_retriever(config)?;

    let mut ids = Vec::new();
    for target in &args.targets {
        for id in resolve_target(&retriever, target).await? {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    if ids.is_empty() {
        println!("{}", formatter.format_message("No indexed documents matched."));
        return Ok(());
    }

    if args.dry_run {
        println!(
            "{}",
            formatter.format_message(&format!("Dry run: would remove {} document(s)", ids.len()))
        );
        for id in &ids {
            println!("  {id}");
        }
        return Ok(());
    }

    if !args.force {
        println!("This will remove {} document(s) from the index. Continue? [y/N]", ids.len());
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("{}", formatter.format_message("Cancelled."));
            return Ok(());
        }
    }

    let mut chunks = 0;
    for id in &ids {
        let removed = retriever.remove_document(id).await?;
        if verbose {
            eprintln!("Removed {id} ({removed} chunks)");
        }
        chunks += removed;
    }
    retriever
        .save(&dir)
        .await
        .with_context(|| format!("failed to save index to {}", dir.display()))?;

    println!(
        "{}",
        formatter.format_message(&format!(
            "Removed {} document(s), {chunks} chunk(s). Run `ragindex rebuild` to compact.",
            ids.len()
        ))
    );

    Ok(())
}
