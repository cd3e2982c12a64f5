//! Command-line driver over the retrieval library.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Chunk, index and query local documents for retrieval-augmented generation.
#[derive(Debug, Parser)]
#[command(name = "ragindex")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(long, short = 'f', global = true, help = "Output format: text or json")]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        env = "RAGINDEX_INDEX_DIR",
        help = "Directory holding the persisted index"
    )]
    pub index_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Extract, chunk, embed and index files or directories
    Ingest(commands::IngestArgs),

    /// Retrieve the chunks closest to a query
    Search(commands::SearchArgs),

    /// Retrieve context and ask the answer service
    Ask(commands::AskArgs),

    /// Remove documents by id or path
    Remove(commands::RemoveArgs),

    /// Compact the index, optionally switching variant
    Rebuild(commands::RebuildArgs),

    /// Show index and embedding service status
    Status,

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
