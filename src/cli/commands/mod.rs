mod ask;
mod config;
mod ingest;
mod rebuild;
mod remove;
mod search;
mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::models::Config;
use crate::services::{Retriever, create_provider};

pub use ask::AskArgs;
pub use config::ConfigCommand;
pub use ingest::IngestArgs;
pub use rebuild::RebuildArgs;
pub use remove::RemoveArgs;
pub use search::SearchArgs;

pub use ask::handle_ask;
pub use config::handle_config;
pub use ingest::handle_ingest;
pub use rebuild::handle_rebuild;
pub use remove::handle_remove;
pub use search::handle_search;
pub use status::handle_status;

fn index_dir(config: &Config) -> Result<PathBuf> {
    config
        .indexing
        .resolve_index_dir()
        .context("could not determine index directory; set indexing.index_dir or --index-dir")
}

/// Open the persisted index, or an empty one when nothing has been saved yet.
fn open_retriever(config: &Config) -> Result<(Retriever, PathBuf)> {
    let dir = index_dir(config)?;
    let provider = create_provider(&config.embedding).context("failed to create embedding provider")?;
    let retriever = Retriever::open(&dir, config, provider)
        .with_context(|| format!("failed to open index at {}", dir.display()))?;
    Ok((retriever, dir))
}
