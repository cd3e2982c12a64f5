use anyhow::{Context, Result};
use clap::Args;

use super::open_retriever;
use super::search::resolve_limits;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat, RetrievalStatus};
use crate::services::{AnswerSynthesizer, HttpAnswerSynthesizer};

#[derive(Debug, Args)]
pub struct AskArgs {
    #[arg(required = true, help = "Question to answer from the indexed documents")]
    pub query: String,

    #[arg(long, short = 'n', help = "Number of context chunks to send")]
    pub limit: Option<u32>,

    #[arg(long, help = "Drop context farther than this squared L2 distance")]
    pub max_distance: Option<f32>,
}

pub async fn handle_ask(args: AskArgs, config: &Config, format: OutputFormat, verbose: bool) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("question cannot be empty");
    }

    let formatter = get_formatter(format);
    let (limit, config) = resolve_limits(config, args.limit, args.max_distance)?;
    // Fail on a missing answer service before spending time on retrieval
    let synthesizer = HttpAnswerSynthesizer::new(&config.answer)
        .context("answer service unavailable; set answer.url in the config")?;

    let (retriever, _) = open_retriever(&config)?;
    let retrieval = retriever.retrieve(query, limit).await.context("retrieval failed")?;

    if retrieval.status != RetrievalStatus::Matched {
        print!("{}", formatter.format_retrieval(&retrieval));
        return Ok(());
    }

    if verbose {
        eprintln!("Sending {} context chunks to {}", retrieval.len(), synthesizer.base_url());
    }

    let answer = synthesizer
        .generate(query, &retrieval.context_chunks())
        .await
        .context("answer generation failed")?;

    print!("{}", formatter.format_answer(&retrieval, &answer));

    Ok(())
}
