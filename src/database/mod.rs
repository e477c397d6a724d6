pub mod local_store;
pub mod qdrant_config;
pub mod store;
pub mod vector_db;

pub use local_store::LocalVectorStore;
pub use store::{Payload, ScoredRecord, VectorDBError, VectorRecord, VectorStore};
pub use vector_db::VectorDB;

use std::sync::Arc;
use crate::config::AppConfig;

/// Connects to Qdrant, or falls back once to the local SQLite store.
pub async fn connect_vector_store(config: &AppConfig) -> Result<Arc<dyn VectorStore>, VectorDBError> {
    match VectorDB::new(&config.qdrant_url, config.qdrant_api_key.as_deref()).await {
        Ok(db) => Ok(Arc::new(db)),
        Err(e) => {
            log::warn!(
                "Primary vector store unavailable ({}); falling back to local store at {}",
                e,
                config.local_store_path.display()
            );
            let local = LocalVectorStore::open(&config.local_store_path).await?;
            Ok(Arc::new(local))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_qdrant_falls_back_to_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            qdrant_url: "http://127.0.0.1:9".to_string(),
            local_store_path: dir.path().join("vectors.db"),
            ..AppConfig::default()
        };

        let store = connect_vector_store(&config).await.unwrap();
        assert_eq!(store.backend(), "local");
        assert!(config.local_store_path.exists());
    }
}
