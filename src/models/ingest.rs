//! Ingestion outcome models.

use serde::{Deserialize, Serialize};

/// A chunk that could not be inserted into the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedChunk {
    pub chunk_id: String,
    pub reason: String,
}

/// Result of adding one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,
    /// Chunk ids that are now searchable, in sequence order.
    pub chunk_ids: Vec<String>,
    /// Chunks dropped after the one-at-a-time fallback.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<FailedChunk>,
}

impl IngestReport {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Per-document status for batch ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentStatus {
    pub document_id: String,
    pub source_uri: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<IngestReport>,
}

impl DocumentStatus {
    pub fn succeeded(source_uri: impl Into<String>, report: IngestReport) -> Self {
        Self {
            document_id: report.document_id.clone(),
            source_uri: source_uri.into(),
            success: true,
            reason: None,
            report: Some(report),
        }
    }

    pub fn failed(
        document_id: impl Into<String>,
        source_uri: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            source_uri: source_uri.into(),
            success: false,
            reason: Some(reason.into()),
            report: None,
        }
    }
}

/// Counters reported after a CLI ingestion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    pub files_scanned: u64,
    pub documents_ingested: u64,
    pub documents_failed: u64,
    pub chunks_indexed: u64,
    pub chunks_failed: u64,
    pub duration_ms: u64,
}

impl IngestStats {
    pub fn record(&mut self, status: &DocumentStatus) {
        if status.success {
            self.documents_ingested += 1;
        } else {
            self.documents_failed += 1;
        }
        if let Some(report) = &status.report {
            self.chunks_indexed += report.chunk_ids.len() as u64;
            self.chunks_failed += report.failed.len() as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_record() {
        let mut stats = IngestStats::default();
        let report = IngestReport {
            document_id: "d".into(),
            chunk_ids: vec!["d_0".into(), "d_1".into()],
            failed: vec![FailedChunk {
                chunk_id: "d_2".into(),
                reason: "nan".into(),
            }],
        };
        assert!(report.is_partial());
        stats.record(&DocumentStatus::succeeded("a.txt", report));
        stats.record(&DocumentStatus::failed("e", "b.pdf", "no extractor"));
        assert_eq!(stats.documents_ingested, 1);
        assert_eq!(stats.documents_failed, 1);
        assert_eq!(stats.chunks_indexed, 2);
        assert_eq!(stats.chunks_failed, 1);
    }
}
