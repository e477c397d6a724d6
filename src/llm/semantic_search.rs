use anyhow::{Error, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use crate::database::store::check_model;
use crate::database::{Payload, ScoredRecord, VectorRecord, VectorStore};
use crate::document::Chunk;
use crate::llm::embeddings::check_dimension;
use crate::providers::traits::EmbeddingProvider;

pub const PREVIEW_CHARS: usize = 200;
const EMBED_BATCH: usize = 32;

/// A retrieved chunk, as shown to the model and cited to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceNode {
    pub id: String,
    pub text: String,
    pub score: f32,
    pub metadata: BTreeMap<String, String>,
}

impl SourceNode {
    fn from_record(record: ScoredRecord) -> Option<Self> {
        let text = record.payload.get("text")?.as_str()?.to_string();
        let metadata = record
            .payload
            .iter()
            .filter(|(key, _)| key.as_str() != "text")
            .filter_map(|(key, value)| match value {
                serde_json::Value::String(s) => Some((key.clone(), s.clone())),
                serde_json::Value::Number(n) => Some((key.clone(), n.to_string())),
                _ => None,
            })
            .collect();

        Some(Self { id: record.id, text, score: record.score, metadata })
    }

    /// `file_name` for local files, `title` for scraped pages.
    pub fn label(&self) -> &str {
        self.metadata
            .get("file_name")
            .or_else(|| self.metadata.get("title"))
            .map(String::as_str)
            .unwrap_or("Unknown")
    }
}

/// First 200 characters of the snippet followed by "...".
pub fn source_preview(node: &SourceNode) -> String {
    let head: String = node.text.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", head)
}

pub fn format_context(nodes: &[SourceNode]) -> String {
    if nodes.is_empty() {
        return "No relevant context was found in the knowledge base.".to_string();
    }

    nodes
        .iter()
        .map(|node| format!("[Source: {}]\n{}", node.label(), node.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Embeds queries and chunks against one collection of a [`VectorStore`].
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    collection: String,
    model_checked: Arc<AtomicBool>,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>, collection: &str) -> Self {
        Self {
            store,
            embedder,
            collection: collection.to_string(),
            model_checked: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    pub async fn ensure_collection(&self) -> Result<()> {
        self.store
            .ensure_collection(&self.collection, self.embedder.dimension(), self.embedder.model_id())
            .await?;
        self.model_checked.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Refuses to query a collection indexed by a different embedding model.
    async fn check_collection_model(&self) -> Result<()> {
        if self.model_checked.load(Ordering::Relaxed) {
            return Ok(());
        }
        let stored = self.store.collection_model(&self.collection).await?;
        check_model(stored.as_deref(), self.embedder.model_id())?;
        self.model_checked.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub async fn count(&self) -> Result<usize> {
        if !self.store.collection_exists(&self.collection).await? {
            return Ok(0);
        }
        Ok(self.store.count(&self.collection).await?)
    }

    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SourceNode>> {
        if top_k == 0 || !self.store.collection_exists(&self.collection).await? {
            return Ok(Vec::new());
        }
        self.check_collection_model().await?;

        let query_vector = self.embedder.embed(query).await?;
        check_dimension(&query_vector, self.embedder.dimension())?;

        let records = self
            .store
            .search(&self.collection, query_vector, top_k)
            .await
            .map_err(|e| Error::msg(format!("Failed to search: {}", e)))?;

        let nodes: Vec<SourceNode> = records.into_iter().filter_map(SourceNode::from_record).collect();
        log::debug!("Retrieved {} nodes for query", nodes.len());
        Ok(nodes)
    }

    /// Embeds chunks in batches and upserts them. Returns the number stored.
    pub async fn index_chunks(&self, chunks: &[Chunk], show_progress: bool) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        self.ensure_collection().await?;

        let progress = if show_progress {
            let bar = ProgressBar::new(chunks.len() as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta})")?
                    .progress_chars("#>-"),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        let mut stored = 0;
        for batch in chunks.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(Error::msg(format!(
                    "Embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }

            let records = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| VectorRecord::new(vector, chunk_payload(chunk)))
                .collect();

            stored += self
                .store
                .upsert(&self.collection, records)
                .await
                .map_err(|e| Error::msg(format!("Failed to index chunks: {}", e)))?;
            progress.inc(batch.len() as u64);
        }

        progress.finish_and_clear();
        Ok(stored)
    }
}

fn chunk_payload(chunk: &Chunk) -> Payload {
    let mut payload: Payload = chunk
        .metadata
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();
    payload.insert("text".to_string(), serde_json::Value::String(chunk.text.clone()));
    payload.insert("doc_id".to_string(), serde_json::Value::String(chunk.doc_id.clone()));
    payload.insert("position".to_string(), serde_json::Value::from(chunk.position as u64));
    payload
}
