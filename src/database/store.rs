use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorDBError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Operation failed: {0}")]
    Operation(String),
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    #[error("Dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Embedding model mismatch: collection was indexed with {expected}, got {actual}")]
    ModelMismatch { expected: String, actual: String },
}

pub type Payload = HashMap<String, Value>;

/// Fails with `ModelMismatch` when a collection recorded a different model.
/// Collections without a record are accepted.
pub fn check_model(stored: Option<&str>, model: &str) -> Result<(), VectorDBError> {
    match stored {
        Some(expected) if expected != model => Err(VectorDBError::ModelMismatch {
            expected: expected.to_string(),
            actual: model.to_string(),
        }),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

impl VectorRecord {
    pub fn new(vector: Vec<f32>, payload: Payload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            vector,
            payload,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub id: String,
    pub score: f32,
    pub payload: Payload,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short label for logs and `stats`.
    fn backend(&self) -> &'static str;

    async fn collection_exists(&self, collection: &str) -> Result<bool, VectorDBError>;

    /// Creates the collection with cosine distance, recording which embedding
    /// model it holds. An existing one is kept if dimension and model agree.
    async fn ensure_collection(&self, collection: &str, dimension: usize, model: &str) -> Result<(), VectorDBError>;

    /// Embedding model recorded for the collection. `None` when the
    /// collection is missing or predates model tracking.
    async fn collection_model(&self, collection: &str) -> Result<Option<String>, VectorDBError>;

    async fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<usize, VectorDBError>;

    /// Nearest neighbours, best score first.
    async fn search(
        &self,
        collection: &str,
        query_vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>, VectorDBError>;

    async fn count(&self, collection: &str) -> Result<usize, VectorDBError>;

    /// Removes every vector but keeps the (now empty) collection.
    async fn delete_all(&self, collection: &str) -> Result<(), VectorDBError>;
}
