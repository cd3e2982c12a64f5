//! Ingest command implementation.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use super::open_retriever;
use crate::cli::output::get_formatter;
use crate::error::IngestError;
use crate::models::{Config, Document, DocumentStatus, IngestStats, OutputFormat};
use crate::services::{ContentKind, ExtractorRegistry, Retriever};
use crate::utils::file::collect_files;

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Files or directories to ingest
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// File patterns to exclude (can be specified multiple times)
    #[arg(long, short = 'e')]
    pub exclude: Vec<String>,

    /// Re-ingest documents that are already indexed
    #[arg(long)]
    pub replace: bool,

    /// Show what would be ingested without indexing
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn handle_ingest(
    args: IngestArgs,
    config: &Config,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let formatter = get_formatter(format);
    let start_time = Instant::now();
    let registry = ExtractorRegistry::default();

    let exclude: Vec<String> = args
        .exclude
        .iter()
        .chain(&config.indexing.exclude_patterns)
        .cloned()
        .collect();

    let mut scanned = 0u64;
    let mut files = Vec::new();
    for path in &args.paths {
        let path = path
            .canonicalize()
            .with_context(|| format!("invalid path: {}", path.display()))?;
        for file in collect_files(&path, &exclude).context("failed to walk directory")? {
            scanned += 1;
            if registry.supports(&ContentKind::from_path(&file)) {
                files.push(file);
            } else if verbose {
                eprintln!("Skipping unsupported file: {}", file.display());
            }
        }
    }

    if files.is_empty() {
        println!("{}", formatter.format_message("No supported files found to ingest."));
        return Ok(());
    }

    if args.dry_run {
        println!(
            "{}",
            formatter.format_message(&format!("Dry run: would ingest {} files", files.len()))
        );
        for file in &files {
            println!("  {}", file.display());
        }
        return Ok(());
    }

    let (retriever, dir) = open_retriever(config)?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut stats = IngestStats {
        files_scanned: scanned,
        ..Default::default()
    };
    let mut statuses = Vec::with_capacity(files.len());

    for file in &files {
        pb.inc(1);
        let status = match registry.load_document(file, config.indexing.max_file_size) {
            Ok(document) => ingest_one(&retriever, &document, args.replace).await?,
            Err(e) => {
                let uri = file.to_string_lossy().to_string();
                DocumentStatus::failed(Document::generate_id(&uri), uri, e.to_string())
            }
        };

        if verbose && !status.success {
            pb.println(format!(
                "Failed {}: {}",
                status.source_uri,
                status.reason.as_deref().unwrap_or("unknown error")
            ));
        }
        stats.record(&status);
        statuses.push(status);
    }
    pb.finish_and_clear();

    if stats.documents_ingested > 0 {
        retriever
            .save(&dir)
            .await
            .with_context(|| format!("failed to save index to {}", dir.display()))?;
    }

    stats.duration_ms = start_time.elapsed().as_millis() as u64;
    print!("{}", formatter.format_ingest(&stats, &statuses));

    Ok(())
}

/// Add one document, turning per-document failures into a status.
async fn ingest_one(retriever: &Retriever, document: &Document, replace: bool) -> Result<DocumentStatus> {
    if replace && retriever.contains_document(&document.id).await {
        retriever
            .remove_document(&document.id)
            .await
            .context("failed to remove previous version")?;
    }

    let status = match retriever.add_document(document).await {
        Ok(report) => DocumentStatus::succeeded(&document.source_uri, report),
        Err(IngestError::DuplicateDocument(_)) => DocumentStatus::failed(
            &document.id,
            &document.source_uri,
            "already indexed (use --replace to re-ingest)",
        ),
        Err(e) => DocumentStatus::failed(&document.id, &document.source_uri, e.to_string()),
    };
    Ok(status)
}
