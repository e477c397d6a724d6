use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio_rusqlite::{params, Connection, OptionalExtension};
use crate::providers::utils::cosine_similarity;
use super::store::{check_model, Payload, ScoredRecord, VectorDBError, VectorRecord, VectorStore};

/// SQLite-backed vector store used when Qdrant is unreachable.
///
/// Vectors live as little-endian `f32` blobs and search is a full scan, which
/// is plenty for a few thousand chunks of tax-law text.
#[derive(Clone)]
pub struct LocalVectorStore {
    conn: Arc<Connection>,
}

impl From<tokio_rusqlite::Error> for VectorDBError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        VectorDBError::Operation(e.to_string())
    }
}

pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

pub fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

impl LocalVectorStore {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, VectorDBError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| VectorDBError::Connection(e.to_string()))?;
            }
        }

        let conn = Connection::open(path)
            .await
            .map_err(|e| VectorDBError::Connection(e.to_string()))?;
        Self::with_connection(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, VectorDBError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| VectorDBError::Connection(e.to_string()))?;
        Self::with_connection(conn).await
    }

    async fn with_connection(conn: Connection) -> Result<Self, VectorDBError> {
        let store = Self { conn: Arc::new(conn) };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<(), VectorDBError> {
        self.conn.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS collections (
                    name TEXT PRIMARY KEY,
                    dimension INTEGER NOT NULL,
                    model TEXT,
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
                );
                CREATE TABLE IF NOT EXISTS vectors (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    collection TEXT NOT NULL REFERENCES collections(name),
                    vector BLOB NOT NULL,
                    payload TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_vectors_collection ON vectors(collection);"
            )?;

            // Stores created before the model column existed.
            let has_model = conn
                .prepare("SELECT 1 FROM pragma_table_info('collections') WHERE name = 'model'")?
                .exists(params![])?;
            if !has_model {
                conn.execute("ALTER TABLE collections ADD COLUMN model TEXT", params![])?;
            }
            Ok(())
        })
        .await?;

        log::info!("Local vector store initialized");
        Ok(())
    }

    /// Dimension and model recorded for the collection, if it exists.
    async fn collection_row(&self, collection: &str) -> Result<Option<(usize, Option<String>)>, VectorDBError> {
        let name = collection.to_string();
        let row = self.conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT dimension, model FROM collections WHERE name = ?1",
                        params![name],
                        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?)),
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        Ok(row.map(|(dimension, model)| (dimension as usize, model)))
    }

    async fn dimension(&self, collection: &str) -> Result<Option<usize>, VectorDBError> {
        Ok(self.collection_row(collection).await?.map(|(dimension, _)| dimension))
    }

    async fn require_dimension(&self, collection: &str) -> Result<usize, VectorDBError> {
        self.dimension(collection)
            .await?
            .ok_or_else(|| VectorDBError::CollectionNotFound(collection.to_string()))
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, VectorDBError> {
        Ok(self.dimension(collection).await?.is_some())
    }

    async fn ensure_collection(&self, collection: &str, dimension: usize, model: &str) -> Result<(), VectorDBError> {
        let name = collection.to_string();
        let model = model.to_string();

        if let Some((expected, stored)) = self.collection_row(collection).await? {
            if expected != dimension {
                return Err(VectorDBError::DimensionMismatch { expected, actual: dimension });
            }
            check_model(stored.as_deref(), &model)?;
            if stored.is_none() {
                log::info!("Recording embedding model {} for collection {}", model, collection);
                self.conn
                    .call(move |conn| {
                        conn.execute(
                            "UPDATE collections SET model = ?1 WHERE name = ?2 AND model IS NULL",
                            params![model, name],
                        )?;
                        Ok(())
                    })
                    .await?;
            }
            log::info!("Collection {} already exists, skipping creation", collection);
            return Ok(());
        }

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO collections (name, dimension, model) VALUES (?1, ?2, ?3)",
                    params![name, dimension as i64, model],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn collection_model(&self, collection: &str) -> Result<Option<String>, VectorDBError> {
        Ok(self.collection_row(collection).await?.and_then(|(_, model)| model))
    }

    async fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<usize, VectorDBError> {
        let expected = self.require_dimension(collection).await?;
        if let Some(bad) = records.iter().find(|r| r.vector.len() != expected) {
            return Err(VectorDBError::DimensionMismatch { expected, actual: bad.vector.len() });
        }

        let rows = records
            .into_iter()
            .map(|record| {
                let payload = serde_json::to_string(&record.payload)
                    .map_err(|e| VectorDBError::Operation(e.to_string()))?;
                Ok((record.id, encode_vector(&record.vector), payload))
            })
            .collect::<Result<Vec<_>, VectorDBError>>()?;

        let name = collection.to_string();
        let stored = self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for (id, vector, payload) in &rows {
                    tx.execute(
                        "INSERT OR REPLACE INTO vectors (id, collection, vector, payload)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![id, name, vector, payload],
                    )?;
                }
                tx.commit()?;
                Ok(rows.len())
            })
            .await?;

        Ok(stored)
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>, VectorDBError> {
        let expected = self.require_dimension(collection).await?;
        if query_vector.len() != expected {
            return Err(VectorDBError::DimensionMismatch { expected, actual: query_vector.len() });
        }

        let name = collection.to_string();
        let rows = self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, vector, payload FROM vectors WHERE collection = ?1 ORDER BY seq"
                )?;
                let rows = stmt.query_map(params![name], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?;

                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for (id, blob, payload) in rows {
            let vector = decode_vector(&blob);
            let score = cosine_similarity(&query_vector, &vector)
                .map_err(|e| VectorDBError::Operation(e.to_string()))?;
            let payload: Payload = serde_json::from_str(&payload)
                .map_err(|e| VectorDBError::Operation(e.to_string()))?;
            scored.push(ScoredRecord { id, score, payload });
        }

        // Stable sort keeps insertion order for equal scores.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn count(&self, collection: &str) -> Result<usize, VectorDBError> {
        self.require_dimension(collection).await?;

        let name = collection.to_string();
        let count = self.conn
            .call(move |conn| {
                let count = conn.query_row(
                    "SELECT COUNT(*) FROM vectors WHERE collection = ?1",
                    params![name],
                    |row| row.get::<_, i64>(0),
                )?;
                Ok(count)
            })
            .await?;

        Ok(count as usize)
    }

    async fn delete_all(&self, collection: &str) -> Result<(), VectorDBError> {
        self.require_dimension(collection).await?;

        let name = collection.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM vectors WHERE collection = ?1", params![name])?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(vector: Vec<f32>, text: &str) -> VectorRecord {
        let mut payload = Payload::new();
        payload.insert("text".to_string(), json!(text));
        VectorRecord::new(vector, payload)
    }

    #[test]
    fn vector_blob_roundtrip_preserves_values() {
        let vector = vec![0.25, -1.5, 3.0e-7];
        assert_eq!(decode_vector(&encode_vector(&vector)), vector);
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity() {
        let store = LocalVectorStore::open_in_memory().await.unwrap();
        store.ensure_collection("laws", 2, "test-model").await.unwrap();
        store
            .upsert(
                "laws",
                vec![
                    record(vec![0.0, 1.0], "80D"),
                    record(vec![1.0, 0.1], "80C"),
                    record(vec![0.7, 0.7], "HRA"),
                ],
            )
            .await
            .unwrap();

        let results = store.search("laws", vec![1.0, 0.0], 2).await.unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.payload["text"].as_str().unwrap()).collect();
        assert_eq!(texts, vec!["80C", "HRA"]);
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn equal_scores_keep_insertion_order() {
        let store = LocalVectorStore::open_in_memory().await.unwrap();
        store.ensure_collection("laws", 2, "test-model").await.unwrap();
        store
            .upsert("laws", vec![record(vec![1.0, 0.0], "first"), record(vec![2.0, 0.0], "second")])
            .await
            .unwrap();

        let results = store.search("laws", vec![1.0, 0.0], 5).await.unwrap();
        assert_eq!(results[0].payload["text"], "first");
        assert_eq!(results[1].payload["text"], "second");
    }

    #[tokio::test]
    async fn rejects_dimension_mismatch() {
        let store = LocalVectorStore::open_in_memory().await.unwrap();
        store.ensure_collection("laws", 3, "test-model").await.unwrap();

        assert!(matches!(
            store.upsert("laws", vec![record(vec![1.0], "bad")]).await,
            Err(VectorDBError::DimensionMismatch { expected: 3, actual: 1 })
        ));
        assert!(matches!(
            store.search("laws", vec![1.0, 0.0], 1).await,
            Err(VectorDBError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            store.ensure_collection("laws", 4, "test-model").await,
            Err(VectorDBError::DimensionMismatch { expected: 3, actual: 4 })
        ));
    }

    #[tokio::test]
    async fn same_dimension_from_another_model_is_rejected() {
        let store = LocalVectorStore::open_in_memory().await.unwrap();
        store.ensure_collection("laws", 384, "fnv1a-hashing-384").await.unwrap();
        store.ensure_collection("laws", 384, "fnv1a-hashing-384").await.unwrap();

        let err = store
            .ensure_collection("laws", 384, "sentence-transformers/all-MiniLM-L6-v2")
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            VectorDBError::ModelMismatch { expected, actual }
                if expected == "fnv1a-hashing-384" && actual == "sentence-transformers/all-MiniLM-L6-v2"
        ));
        assert_eq!(
            store.collection_model("laws").await.unwrap().as_deref(),
            Some("fnv1a-hashing-384")
        );
        assert_eq!(store.collection_model("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn older_store_gains_model_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.db");

        {
            let conn = Connection::open(&path).await.unwrap();
            conn.call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE collections (
                        name TEXT PRIMARY KEY,
                        dimension INTEGER NOT NULL,
                        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
                    );
                    INSERT INTO collections (name, dimension) VALUES ('laws', 2);"
                )?;
                Ok(())
            })
            .await
            .unwrap();
        }

        let store = LocalVectorStore::open(&path).await.unwrap();
        assert_eq!(store.collection_model("laws").await.unwrap(), None);

        store.ensure_collection("laws", 2, "first-model").await.unwrap();
        assert_eq!(store.collection_model("laws").await.unwrap().as_deref(), Some("first-model"));
        assert!(matches!(
            store.ensure_collection("laws", 2, "other-model").await,
            Err(VectorDBError::ModelMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn delete_all_empties_collection_but_keeps_it() {
        let store = LocalVectorStore::open_in_memory().await.unwrap();
        store.ensure_collection("laws", 2, "test-model").await.unwrap();
        store.upsert("laws", vec![record(vec![1.0, 0.0], "a")]).await.unwrap();
        assert_eq!(store.count("laws").await.unwrap(), 1);

        store.delete_all("laws").await.unwrap();
        assert_eq!(store.count("laws").await.unwrap(), 0);
        assert!(store.collection_exists("laws").await.unwrap());
    }

    #[tokio::test]
    async fn missing_collection_is_reported() {
        let store = LocalVectorStore::open_in_memory().await.unwrap();
        assert!(!store.collection_exists("nope").await.unwrap());
        assert!(matches!(
            store.count("nope").await,
            Err(VectorDBError::CollectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.db");

        {
            let store = LocalVectorStore::open(&path).await.unwrap();
            store.ensure_collection("laws", 2, "test-model").await.unwrap();
            store.upsert("laws", vec![record(vec![0.0, 1.0], "kept")]).await.unwrap();
        }

        let reopened = LocalVectorStore::open(&path).await.unwrap();
        assert_eq!(reopened.count("laws").await.unwrap(), 1);
    }
}
