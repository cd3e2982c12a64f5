use std::fmt::{self, Write as FmtWrite};

use serde::Serialize;

use crate::models::{DocumentStatus, IngestStats, OutputFormat, Retrieval, RetrievalStatus};
use crate::services::RetrieverStats;

const PREVIEW_CHARS: usize = 200;

pub trait Formatter {
    fn format_retrieval(&self, retrieval: &Retrieval) -> String;
    fn format_answer(&self, retrieval: &Retrieval, answer: &str) -> String;
    fn format_ingest(&self, stats: &IngestStats, statuses: &[DocumentStatus]) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub index_dir: String,
    pub saved: bool,
    pub index: RetrieverStats,
    pub embedding_provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_healthy: Option<bool>,
    pub answer_configured: bool,
}

fn preview(text: &str) -> String {
    let head: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        format!("{head}...")
    } else {
        head
    }
}

fn write_hits(out: &mut String, retrieval: &Retrieval) -> fmt::Result {
    for (i, hit) in retrieval.hits.iter().enumerate() {
        writeln!(out, "{}. [Distance: {:.4}]", i + 1, hit.distance)?;
        if let Some(source) = hit.chunk.metadata.get("source") {
            writeln!(out, "   Source: {source}")?;
        }
        writeln!(
            out,
            "   Chunk:  {} ({}/{})",
            hit.chunk.id,
            hit.chunk.sequence_index + 1,
            hit.chunk.total_chunks_in_document
        )?;
        writeln!(out, "   ---")?;
        for line in preview(&hit.chunk.text).lines() {
            writeln!(out, "   {line}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn write_retrieval(out: &mut String, retrieval: &Retrieval) -> fmt::Result {
    match retrieval.status {
        RetrievalStatus::NotIngested => {
            writeln!(out, "Nothing has been ingested yet. Run `ragindex ingest <path>` first.")
        }
        RetrievalStatus::NoMatch => writeln!(out, "No relevant results for: {}", retrieval.query),
        RetrievalStatus::Matched => {
            writeln!(out, "Results for: \"{}\"", retrieval.query)?;
            writeln!(out, "Found {} results in {}ms\n", retrieval.len(), retrieval.duration_ms)?;
            write_hits(out, retrieval)
        }
    }
}

fn write_ingest(out: &mut String, stats: &IngestStats, statuses: &[DocumentStatus]) -> fmt::Result {
    writeln!(out, "Ingestion Complete")?;
    writeln!(out, "------------------")?;
    writeln!(out, "Files scanned:      {}", stats.files_scanned)?;
    writeln!(out, "Documents ingested: {}", stats.documents_ingested)?;
    writeln!(out, "Documents failed:   {}", stats.documents_failed)?;
    writeln!(out, "Chunks indexed:     {}", stats.chunks_indexed)?;
    if stats.chunks_failed > 0 {
        writeln!(out, "Chunks failed:      {}", stats.chunks_failed)?;
    }
    writeln!(out, "Duration:           {}ms", stats.duration_ms)?;

    let failures: Vec<&DocumentStatus> = statuses.iter().filter(|s| !s.success).collect();
    if !failures.is_empty() {
        writeln!(out, "\nFailed:")?;
        for status in failures {
            writeln!(
                out,
                "  {}: {}",
                status.source_uri,
                status.reason.as_deref().unwrap_or("unknown error")
            )?;
        }
    }
    Ok(())
}

fn write_status(out: &mut String, status: &StatusInfo) -> fmt::Result {
    writeln!(out, "Status")?;
    writeln!(out, "------")?;
    let saved = if status.saved { "[SAVED]" } else { "[EMPTY]" };
    writeln!(out, "Index:         {} {}", status.index_dir, saved)?;
    writeln!(out, "  Variant:     {}", status.index.variant)?;
    writeln!(out, "  Dimension:   {}", status.index.dimension)?;
    writeln!(out, "  Documents:   {}", status.index.documents)?;
    writeln!(out, "  Chunks:      {}", status.index.live_chunks)?;
    if status.index.tombstones > 0 {
        writeln!(
            out,
            "  Tombstones:  {} (run `ragindex rebuild` to compact)",
            status.index.tombstones
        )?;
    }
    writeln!(out, "  Built:       {}", status.index.built_at.to_rfc3339())?;
    writeln!(out)?;

    let health = match status.embedding_healthy {
        Some(true) => " [CONNECTED]",
        Some(false) => " [DISCONNECTED]",
        None => "",
    };
    writeln!(out, "Embedding:     {}{}", status.embedding_provider, health)?;
    if let Some(url) = &status.embedding_url {
        writeln!(out, "  URL:         {url}")?;
    }
    let answer = if status.answer_configured {
        "configured"
    } else {
        "not configured"
    };
    writeln!(out, "Answer:        {answer}")
}

fn render(write: impl FnOnce(&mut String) -> fmt::Result) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write(&mut out);
    out
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_retrieval(&self, retrieval: &Retrieval) -> String {
        render(|out| write_retrieval(out, retrieval))
    }

    fn format_answer(&self, retrieval: &Retrieval, answer: &str) -> String {
        render(|out| {
            writeln!(out, "{}\n", answer.trim())?;
            writeln!(out, "Sources:")?;
            for hit in &retrieval.hits {
                match hit.chunk.metadata.get("source") {
                    Some(source) => writeln!(out, "  - {source} ({})", hit.chunk.id)?,
                    None => writeln!(out, "  - {}", hit.chunk.id)?,
                }
            }
            Ok(())
        })
    }

    fn format_ingest(&self, stats: &IngestStats, statuses: &[DocumentStatus]) -> String {
        render(|out| write_ingest(out, stats, statuses))
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        render(|out| write_status(out, status))
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {error}")
    }
}

pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn to_json<T: Serialize + ?Sized>(&self, value: &T) -> String {
        let encoded = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        encoded.unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
    }
}

impl Formatter for JsonFormatter {
    fn format_retrieval(&self, retrieval: &Retrieval) -> String {
        self.to_json(retrieval) + "\n"
    }

    fn format_answer(&self, retrieval: &Retrieval, answer: &str) -> String {
        self.to_json(&serde_json::json!({
            "query": retrieval.query,
            "answer": answer,
            "sources": retrieval.hits,
        })) + "\n"
    }

    fn format_ingest(&self, stats: &IngestStats, statuses: &[DocumentStatus]) -> String {
        self.to_json(&serde_json::json!({
            "stats": stats,
            "documents": statuses,
        })) + "\n"
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.to_json(status) + "\n"
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({ "message": message }).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({ "error": error }).to_string()
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, IngestReport, Metadata, MetadataValue, RetrievedChunk};

    fn hit(id: &str, distance: f32) -> RetrievedChunk {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), MetadataValue::from("notes.md"));
        RetrievedChunk {
            chunk: Chunk {
                id: id.to_string(),
                document_id: "d".to_string(),
                text: "x".repeat(300),
                sequence_index: 0,
                total_chunks_in_document: 2,
                metadata,
            },
            distance,
        }
    }

    #[test]
    fn test_text_retrieval_statuses() {
        let text = TextFormatter;
        assert!(
            text.format_retrieval(&Retrieval::not_ingested("q"))
                .contains("Nothing has been ingested")
        );
        assert!(
            text.format_retrieval(&Retrieval::from_hits("q", vec![], 1))
                .contains("No relevant results")
        );

        let out = text.format_retrieval(&Retrieval::from_hits("q", vec![hit("d_0", 0.25)], 3));
        assert!(out.contains("1. [Distance: 0.2500]"));
        assert!(out.contains("Source: notes.md"));
        assert!(out.contains("..."));
    }

    #[test]
    fn test_json_retrieval_is_parseable() {
        let json = JsonFormatter::new(false);
        let out = json.format_retrieval(&Retrieval::from_hits("q", vec![hit("d_0", 0.5)], 3));
        let value: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["status"], "matched");
        assert_eq!(value["hits"][0]["chunk"]["id"], "d_0");
    }

    #[test]
    fn test_ingest_lists_failures() {
        let statuses = vec![
            DocumentStatus::succeeded(
                "a.txt",
                IngestReport {
                    document_id: "a".into(),
                    chunk_ids: vec!["a_0".into()],
                    failed: vec![],
                },
            ),
            DocumentStatus::failed("b", "b.txt", "no usable text"),
        ];
        let mut stats = IngestStats::default();
        statuses.iter().for_each(|s| stats.record(s));

        let out = TextFormatter.format_ingest(&stats, &statuses);
        assert!(out.contains("Documents ingested: 1"));
        assert!(out.contains("b.txt: no usable text"));
    }
}
