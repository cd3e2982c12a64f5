use anyhow::Result;

use super::open_retriever;
use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, EmbeddingProviderKind, OutputFormat};
use crate::services::index::INFO_FILE;
use crate::services::HttpEmbeddingClient;

pub async fn handle_status(config: &Config, format: OutputFormat, _verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);
    let (retriever, dir) = open_retriever(config)?;

    let (embedding_url, embedding_healthy) = match config.embedding.provider {
        EmbeddingProviderKind::Http => {
            let healthy = match HttpEmbeddingClient::new(&config.embedding) {
                Ok(client) => client.health_check().await.is_ok(),
                Err(_) => false,
            };
            (Some(config.embedding.url.clone()), Some(healthy))
        }
        EmbeddingProviderKind::Mock => (None, None),
    };

    let status = StatusInfo {
        index_dir: dir.display().to_string(),
        saved: dir.join(INFO_FILE).exists(),
        index: retriever.stats().await,
        embedding_provider: retriever.provider().name().to_string(),
        embedding_url,
        embedding_healthy,
        answer_configured: config.answer.url.is_some(),
    };

    print!("{}", formatter.format_status(&status));

    if embedding_healthy == Some(false) {
        eprintln!();
        eprintln!(
            "Warning: embedding server not reachable at {}. Start it or set embedding.provider = \"mock\".",
            config.embedding.url
        );
    }

    Ok(())
}
