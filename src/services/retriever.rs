//! Ingestion and query orchestration over a single vector index.
//!
//! Readers share the index behind a `RwLock`. Writers are serialized by a
//! separate gate so that a training variant can be rebuilt off-lock while
//! queries keep running against the previous index, then swapped in.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::chunker::TextChunker;
use super::embedding::{EmbeddingProvider, check_inputs, validate_batch};
use super::index::{
    AnyIndex, INFO_FILE, IndexInfo, IndexKind, Neighbor, VectorIndex, check_vector, load_index,
    save_index,
};
use crate::error::{ConfigError, EmbeddingError, ExtractionError, IndexError, IngestError, RetrievalError};
use crate::models::{
    Chunk, Config, Document, DocumentStatus, FailedChunk, IndexConfig, IndexEntry, IngestReport,
    Retrieval, RetrievalConfig, RetrievedChunk,
};
use crate::utils::file::write_atomic;

pub const STORE_FILE: &str = "store.json";
pub const ENTRIES_FILE: &str = "entries.bin";

/// Query-time knobs.
#[derive(Debug, Clone)]
pub struct RetrieverOptions {
    pub max_distance: Option<f32>,
    pub embed_timeout: Duration,
    pub search_timeout: Duration,
}

impl Default for RetrieverOptions {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for RetrieverOptions {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            max_distance: config.max_distance,
            embed_timeout: Duration::from_secs(config.embed_timeout_secs),
            search_timeout: Duration::from_millis(config.search_timeout_ms),
        }
    }
}

/// Counters describing the current index.
#[derive(Debug, Clone, Serialize)]
pub struct RetrieverStats {
    pub variant: IndexKind,
    pub dimension: usize,
    pub documents: usize,
    pub live_chunks: usize,
    pub positions: usize,
    pub tombstones: usize,
    pub is_built: bool,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
    position: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    documents: Vec<Document>,
    chunks: Vec<Chunk>,
}

struct IndexState {
    index: AnyIndex,
    /// `positions[p]` is the chunk stored at index position `p`, `None` once deleted.
    positions: Vec<Option<String>>,
    entries: HashMap<String, Entry>,
    documents: BTreeMap<String, Document>,
    built_at: DateTime<Utc>,
}

impl IndexState {
    /// Write the side store, then the index files, into `dir`.
    fn write_to(&self, dir: &Path) -> Result<IndexInfo, IndexError> {
        std::fs::create_dir_all(dir)?;

        let mut chunks: Vec<Chunk> = self.entries.values().map(|e| e.chunk.clone()).collect();
        chunks.sort_by(|a, b| {
            a.document_id
                .cmp(&b.document_id)
                .then(a.sequence_index.cmp(&b.sequence_index))
        });
        let store = StoreFile {
            documents: self.documents.values().cloned().collect(),
            chunks,
        };

        let mut entries: Vec<IndexEntry> = self
            .entries
            .iter()
            .map(|(id, e)| IndexEntry {
                chunk_id: id.clone(),
                position: e.position,
                vector: e.vector.clone(),
            })
            .collect();
        entries.sort_by_key(|e| e.position);

        write_atomic(&dir.join(STORE_FILE), &serde_json::to_vec(&store)?)?;
        write_atomic(&dir.join(ENTRIES_FILE), &bincode::serialize(&entries)?)?;
        save_index(dir, &self.index, &self.positions, self.built_at)
    }

    fn empty(index: AnyIndex) -> Self {
        Self {
            index,
            positions: Vec::new(),
            entries: HashMap::new(),
            documents: BTreeMap::new(),
            built_at: Utc::now(),
        }
    }

    fn tombstones(&self) -> usize {
        self.positions.len().saturating_sub(self.entries.len())
    }

    /// Live chunk ids and their vectors, in position order.
    fn live(&self) -> (Vec<String>, Vec<Vec<f32>>) {
        self.positions
            .iter()
            .flatten()
            .filter_map(|id| self.entries.get(id).map(|e| (id.clone(), e.vector.clone())))
            .unzip()
    }

    /// Append accepted chunks at the end of the position map.
    fn append(&mut self, accepted: Vec<(Chunk, Vec<f32>)>) -> Vec<String> {
        let mut ids = Vec::with_capacity(accepted.len());
        for (chunk, vector) in accepted {
            let position = self.positions.len();
            self.positions.push(Some(chunk.id.clone()));
            ids.push(chunk.id.clone());
            self.entries.insert(
                chunk.id.clone(),
                Entry {
                    chunk,
                    vector,
                    position,
                },
            );
        }
        self.built_at = Utc::now();
        ids
    }

    /// Swap in a freshly built index holding exactly `ids` at positions `0..ids.len()`.
    fn install(&mut self, index: AnyIndex, ids: Vec<String>) {
        for (position, id) in ids.iter().enumerate() {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.position = position;
            }
        }
        self.positions = ids.into_iter().map(Some).collect();
        self.index = index;
        self.built_at = Utc::now();
    }

    fn hydrate(
        &self,
        neighbors: &[Neighbor],
        top_k: usize,
        max_distance: Option<f32>,
    ) -> Vec<RetrievedChunk> {
        neighbors
            .iter()
            .filter(|n| max_distance.is_none_or(|max| n.distance <= max))
            .filter_map(|n| {
                let id = self.positions.get(n.position)?.as_ref()?;
                let entry = self.entries.get(id)?;
                Some(RetrievedChunk {
                    chunk: entry.chunk.clone(),
                    distance: n.distance,
                })
            })
            .take(top_k)
            .collect()
    }

    fn stats(&self) -> RetrieverStats {
        RetrieverStats {
            variant: self.index.kind(),
            dimension: self.index.dimension(),
            documents: self.documents.len(),
            live_chunks: self.entries.len(),
            positions: self.positions.len(),
            tombstones: self.tombstones(),
            is_built: self.index.is_built(),
            built_at: self.built_at,
        }
    }
}

async fn build_off_lock(mut index: AnyIndex, vectors: Vec<Vec<f32>>) -> Result<AnyIndex, IngestError> {
    tokio::task::spawn_blocking(move || index.build(&vectors).map(|()| index))
        .await
        .map_err(|e| IngestError::Task(e.to_string()))?
        .map_err(IngestError::from)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Chunks, embeds, indexes and retrieves documents.
pub struct Retriever {
    state: Arc<RwLock<IndexState>>,
    writer: Mutex<()>,
    chunker: TextChunker,
    provider: Arc<dyn EmbeddingProvider>,
    options: RetrieverOptions,
}

impl Retriever {
    pub fn new(
        chunker: TextChunker,
        provider: Arc<dyn EmbeddingProvider>,
        index_config: &IndexConfig,
        options: RetrieverOptions,
    ) -> Result<Self, ConfigError> {
        let index = AnyIndex::from_config(provider.dimension(), index_config)?;
        Ok(Self::with_state(chunker, provider, IndexState::empty(index), options))
    }

    pub fn from_config(config: &Config, provider: Arc<dyn EmbeddingProvider>) -> Result<Self, ConfigError> {
        let chunker = TextChunker::from_config(&config.indexing)?;
        Self::new(
            chunker,
            provider,
            &config.index,
            RetrieverOptions::from(&config.retrieval),
        )
    }

    /// Load from `dir` when it holds a saved index, otherwise start empty.
    pub fn open(dir: &Path, config: &Config, provider: Arc<dyn EmbeddingProvider>) -> Result<Self, IndexError> {
        if !dir.join(INFO_FILE).exists() {
            debug!(dir = %dir.display(), "no saved index; starting empty");
            return Ok(Self::from_config(config, provider)?);
        }
        let saved = IndexInfo::read(dir)?.variant;
        if saved != config.index.kind {
            info!(saved = %saved, configured = %config.index.kind, "using saved index variant");
        }
        Self::load(
            dir,
            TextChunker::from_config(&config.indexing)?,
            provider,
            RetrieverOptions::from(&config.retrieval),
        )
    }

    fn with_state(
        chunker: TextChunker,
        provider: Arc<dyn EmbeddingProvider>,
        state: IndexState,
        options: RetrieverOptions,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            writer: Mutex::new(()),
            chunker,
            provider,
            options,
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn chunker(&self) -> &TextChunker {
        &self.chunker
    }

    pub async fn stats(&self) -> RetrieverStats {
        self.state.read().await.stats()
    }

    pub async fn contains_document(&self, document_id: &str) -> bool {
        self.state.read().await.documents.contains_key(document_id)
    }

    /// Stored documents in id order.
    pub async fn documents(&self) -> Vec<Document> {
        self.state.read().await.documents.values().cloned().collect()
    }

    /// Chunk, embed and index one document.
    pub async fn add_document(&self, document: &Document) -> Result<IngestReport, IngestError> {
        if self.contains_document(&document.id).await {
            return Err(IngestError::DuplicateDocument(document.id.clone()));
        }

        let chunks = self.chunker.chunk(document);
        if chunks.is_empty() {
            return Err(ExtractionError::NoUsableText(document.source_uri.clone()).into());
        }
        let vectors = self.embed_chunks(&chunks).await?;

        let _gate = self.writer.lock().await;
        // Another writer may have stored it while we were embedding
        if self.contains_document(&document.id).await {
            return Err(IngestError::DuplicateDocument(document.id.clone()));
        }

        let requires_training = self.state.read().await.index.requires_training();
        let report = if requires_training {
            self.insert_by_rebuild(document, chunks, vectors).await?
        } else {
            self.insert_incremental(document, chunks, vectors).await?
        };

        info!(
            document = %report.document_id,
            chunks = report.chunk_ids.len(),
            failed = report.failed.len(),
            "indexed document"
        );
        Ok(report)
    }

    /// Add many documents, reporting each outcome instead of stopping at the first error.
    pub async fn add_documents(&self, documents: &[Document]) -> Vec<DocumentStatus> {
        let mut statuses = Vec::with_capacity(documents.len());
        for document in documents {
            let status = match self.add_document(document).await {
                Ok(report) => DocumentStatus::succeeded(&document.source_uri, report),
                Err(e) => {
                    warn!(document = %document.id, error = %e, "failed to ingest document");
                    DocumentStatus::failed(&document.id, &document.source_uri, e.to_string())
                }
            };
            statuses.push(status);
        }
        statuses
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>, IngestError> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        check_inputs(&texts)?;

        let deadline = self.options.embed_timeout;
        let vectors = tokio::time::timeout(deadline, self.provider.embed_batch(&texts))
            .await
            .map_err(|_| IngestError::Timeout(millis(deadline)))??;

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::BatchMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            }
            .into());
        }
        Ok(vectors)
    }

    async fn insert_incremental(
        &self,
        document: &Document,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<IngestReport, IngestError> {
        let mut state = self.state.write().await;
        let mut accepted = Vec::with_capacity(chunks.len());
        let mut failed = Vec::new();
        let mut last_error = None;

        match state.index.add(&vectors) {
            Ok(()) => accepted.extend(chunks.into_iter().zip(vectors)),
            Err(bulk) => {
                warn!(document = %document.id, error = %bulk, "bulk insert failed; inserting chunks one at a time");
                for (chunk, vector) in chunks.into_iter().zip(vectors) {
                    match state.index.add(std::slice::from_ref(&vector)) {
                        Ok(()) => accepted.push((chunk, vector)),
                        Err(e) => {
                            failed.push(FailedChunk {
                                chunk_id: chunk.id,
                                reason: e.to_string(),
                            });
                            last_error = Some(e);
                        }
                    }
                }
            }
        }

        if accepted.is_empty()
            && let Some(e) = last_error
        {
            return Err(e.into());
        }

        let chunk_ids = state.append(accepted);
        state.documents.insert(document.id.clone(), document.clone());
        Ok(IngestReport {
            document_id: document.id.clone(),
            chunk_ids,
            failed,
        })
    }

    async fn insert_by_rebuild(
        &self,
        document: &Document,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<IngestReport, IngestError> {
        let (template, (live_ids, live_vectors)) = {
            let state = self.state.read().await;
            (state.index.empty_like(), state.live())
        };
        let dimension = template.dimension();
        let mut pending: Vec<(Chunk, Vec<f32>)> = chunks.into_iter().zip(vectors).collect();
        let mut failed = Vec::new();

        let training_set = |pending: &[(Chunk, Vec<f32>)]| -> Vec<Vec<f32>> {
            live_vectors
                .iter()
                .cloned()
                .chain(pending.iter().map(|(_, v)| v.clone()))
                .collect()
        };

        let index = match build_off_lock(template.clone(), training_set(&pending)).await {
            Ok(index) => index,
            Err(IngestError::Index(bulk)) => {
                warn!(document = %document.id, error = %bulk, "bulk rebuild failed; dropping rejected chunks");
                pending.retain(|(chunk, vector)| match check_vector(vector, dimension) {
                    Ok(()) => true,
                    Err(e) => {
                        failed.push(FailedChunk {
                            chunk_id: chunk.id.clone(),
                            reason: e.to_string(),
                        });
                        false
                    }
                });
                if failed.is_empty() || pending.is_empty() {
                    return Err(bulk.into());
                }
                build_off_lock(template, training_set(&pending)).await?
            }
            Err(other) => return Err(other),
        };

        let mut state = self.state.write().await;
        let mut ids = live_ids;
        let mut chunk_ids = Vec::with_capacity(pending.len());
        for (chunk, vector) in pending {
            ids.push(chunk.id.clone());
            chunk_ids.push(chunk.id.clone());
            state.entries.insert(
                chunk.id.clone(),
                Entry {
                    chunk,
                    vector,
                    position: 0,
                },
            );
        }
        state.install(index, ids);
        state.documents.insert(document.id.clone(), document.clone());

        Ok(IngestReport {
            document_id: document.id.clone(),
            chunk_ids,
            failed,
        })
    }

    /// Tombstone every chunk of a document. Returns how many chunks were removed.
    pub async fn remove_document(&self, document_id: &str) -> Result<usize, IngestError> {
        let _gate = self.writer.lock().await;
        let mut state = self.state.write().await;
        if state.documents.remove(document_id).is_none() {
            return Err(IngestError::UnknownDocument(document_id.to_string()));
        }

        let doomed: Vec<(String, usize)> = state
            .entries
            .iter()
            .filter(|(_, e)| e.chunk.document_id == document_id)
            .map(|(id, e)| (id.clone(), e.position))
            .collect();
        for (id, position) in &doomed {
            if let Some(slot) = state.positions.get_mut(*position) {
                *slot = None;
            }
            state.entries.remove(id);
        }

        info!(document = document_id, chunks = doomed.len(), "removed document");
        Ok(doomed.len())
    }

    /// Rebuild the current variant from live entries, dropping tombstones.
    pub async fn rebuild(&self) -> Result<RetrieverStats, IngestError> {
        let _gate = self.writer.lock().await;
        let template = self.state.read().await.index.empty_like();
        self.rebuild_into(template).await
    }

    /// Rebuild into a different variant.
    pub async fn rebuild_as(&self, kind: IndexKind, config: &IndexConfig) -> Result<RetrieverStats, IngestError> {
        let _gate = self.writer.lock().await;
        let template = AnyIndex::new(kind, self.provider.dimension(), config).map_err(IndexError::from)?;
        self.rebuild_into(template).await
    }

    async fn rebuild_into(&self, template: AnyIndex) -> Result<RetrieverStats, IngestError> {
        let (ids, vectors) = self.state.read().await.live();
        let index = if vectors.is_empty() {
            template
        } else {
            build_off_lock(template, vectors).await?
        };

        let mut state = self.state.write().await;
        let dropped = state.tombstones();
        state.install(index, ids);
        info!(variant = %state.index.kind(), live = state.entries.len(), dropped, "rebuilt index");
        Ok(state.stats())
    }

    /// Embed `query` and return up to `top_k` stored chunks, closest first.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Retrieval, RetrievalError> {
        if query.trim().is_empty() {
            return Err(RetrievalError::InvalidQuery("query is empty".to_string()));
        }
        if top_k == 0 {
            return Err(RetrievalError::InvalidQuery("top_k must be at least 1".to_string()));
        }
        let started = Instant::now();

        if self.state.read().await.entries.is_empty() {
            debug!("retrieve called with nothing ingested");
            return Ok(Retrieval::not_ingested(query));
        }

        let embed_deadline = self.options.embed_timeout;
        let vector = tokio::time::timeout(embed_deadline, self.provider.embed_query(query))
            .await
            .map_err(|_| RetrievalError::Timeout(millis(embed_deadline)))??;
        validate_batch(1, self.provider.dimension(), std::slice::from_ref(&vector))?;

        let state = Arc::clone(&self.state);
        let max_distance = self.options.max_distance;
        let search = tokio::task::spawn_blocking(move || {
            let state = state.blocking_read();
            // Over-fetch so tombstoned positions do not eat into k
            let fetch = (top_k + state.tombstones()).min(state.positions.len());
            let neighbors = state.index.search(&vector, fetch)?;
            Ok::<_, IndexError>(state.hydrate(&neighbors, top_k, max_distance))
        });

        let search_deadline = self.options.search_timeout;
        let hits = tokio::time::timeout(search_deadline, search)
            .await
            .map_err(|_| RetrievalError::Timeout(millis(search_deadline)))?
            .map_err(|e| RetrievalError::Task(e.to_string()))??;

        let duration_ms = millis(started.elapsed());
        debug!(query, hits = hits.len(), duration_ms, "retrieval complete");
        Ok(Retrieval::from_hits(query, hits, duration_ms))
    }

    /// Persist the index plus the chunk side store into `dir`.
    ///
    /// Encoding and file writes run on the blocking pool; readers keep going meanwhile.
    pub async fn save(&self, dir: &Path) -> Result<IndexInfo, IndexError> {
        let _gate = self.writer.lock().await;
        let state = Arc::clone(&self.state);
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || state.blocking_read().write_to(&dir))
            .await
            .map_err(|e| IndexError::Task(e.to_string()))?
    }

    /// Load a retriever saved by [`Retriever::save`].
    pub fn load(
        dir: &Path,
        chunker: TextChunker,
        provider: Arc<dyn EmbeddingProvider>,
        options: RetrieverOptions,
    ) -> Result<Self, IndexError> {
        let (index, positions, info) = load_index(dir, provider.dimension())?;
        let store: StoreFile = serde_json::from_slice(&std::fs::read(dir.join(STORE_FILE))?)?;
        let saved: Vec<IndexEntry> = bincode::deserialize(&std::fs::read(dir.join(ENTRIES_FILE))?)?;

        let mut chunks: HashMap<String, Chunk> =
            store.chunks.into_iter().map(|c| (c.id.clone(), c)).collect();
        let mut entries = HashMap::with_capacity(saved.len());
        for IndexEntry {
            chunk_id,
            position,
            vector,
        } in saved
        {
            if positions.get(position).and_then(Option::as_deref) != Some(chunk_id.as_str()) {
                return Err(IndexError::Corrupt(format!(
                    "chunk {chunk_id} is not at position {position}"
                )));
            }
            let chunk = chunks
                .remove(&chunk_id)
                .ok_or_else(|| IndexError::Corrupt(format!("chunk {chunk_id} missing from {STORE_FILE}")))?;
            entries.insert(
                chunk_id,
                Entry {
                    chunk,
                    vector,
                    position,
                },
            );
        }
        if entries.len() != positions.iter().flatten().count() {
            return Err(IndexError::Corrupt(format!(
                "{} live positions but {} stored entries",
                positions.iter().flatten().count(),
                entries.len()
            )));
        }

        let documents = store
            .documents
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();
        let state = IndexState {
            index,
            positions,
            entries,
            documents,
            built_at: info.build_timestamp,
        };
        Ok(Self::with_state(chunker, provider, state, options))
    }
}
