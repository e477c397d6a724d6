use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        point_id::PointIdOptions,
        vectors_config::Config as VectorsConfigKind,
        Condition, CountPointsBuilder, CreateCollectionBuilder, Distance, Filter, GetPointsBuilder,
        PointId, PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
    },
    Payload as QdrantPayload,
    Qdrant,
};
use std::sync::Arc;
use crate::database::qdrant_config::create_qdrant_client;
use super::store::{check_model, Payload, ScoredRecord, VectorDBError, VectorRecord, VectorStore};

/// Point that records which embedding model filled the collection. Search
/// and count never see it.
const MODEL_MARKER_ID: &str = "00000000-0000-4000-8000-0000000000e1";
const MODEL_KEY: &str = "embedding_model";

fn without_marker() -> Filter {
    Filter::must_not([Condition::has_id([PointId::from(MODEL_MARKER_ID.to_string())])])
}

/// Unit vector along the first axis; cosine distance rejects all-zero vectors.
fn marker_vector(dimension: usize) -> Vec<f32> {
    let mut vector = vec![0.0; dimension];
    if let Some(first) = vector.first_mut() {
        *first = 1.0;
    }
    vector
}

#[derive(Clone)]
pub struct VectorDB {
    client: Arc<Qdrant>,
}

impl VectorDB {
    pub async fn new(url: &str, api_key: Option<&str>) -> Result<Self, VectorDBError> {
        let client = create_qdrant_client(url, api_key).await?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    async fn collection_dimension(&self, name: &str) -> Result<usize, VectorDBError> {
        let info = self.client.collection_info(name)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        let size = info.result
            .and_then(|info| info.config)
            .and_then(|config| config.params)
            .and_then(|params| params.vectors_config)
            .and_then(|vectors| vectors.config)
            .and_then(|config| match config {
                VectorsConfigKind::Params(params) => Some(params.size),
                _ => None,
            })
            .ok_or_else(|| VectorDBError::Operation(format!("Collection {} has no single vector config", name)))?;

        Ok(size as usize)
    }

    async fn create_collection(&self, name: &str, vector_size: usize) -> Result<(), VectorDBError> {
        let request = CreateCollectionBuilder::new(name)
            .vectors_config(VectorParamsBuilder::new(vector_size as u64, Distance::Cosine));

        match self.client.create_collection(request).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("already exists") => {
                log::info!("Collection {} already exists, skipping creation", name);
                Ok(())
            }
            Err(e) => Err(VectorDBError::Operation(e.to_string())),
        }
    }

    async fn write_model_marker(&self, collection: &str, dimension: usize, model: &str) -> Result<(), VectorDBError> {
        let mut payload = QdrantPayload::new();
        payload.insert(MODEL_KEY, Value::from(model.to_string()));
        let marker = PointStruct::new(MODEL_MARKER_ID.to_string(), marker_vector(dimension), payload);

        self.client.upsert_points(UpsertPointsBuilder::new(collection, vec![marker]).wait(true))
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;
        log::info!("Collection {} holds {} embeddings", collection, model);
        Ok(())
    }
}

fn point_id_to_string(options: Option<PointIdOptions>) -> String {
    match options {
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

#[async_trait]
impl VectorStore for VectorDB {
    fn backend(&self) -> &'static str {
        "qdrant"
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, VectorDBError> {
        self.client.collection_exists(collection)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))
    }

    async fn ensure_collection(&self, collection: &str, dimension: usize, model: &str) -> Result<(), VectorDBError> {
        if self.collection_exists(collection).await? {
            let expected = self.collection_dimension(collection).await?;
            if expected != dimension {
                return Err(VectorDBError::DimensionMismatch { expected, actual: dimension });
            }
            let stored = self.collection_model(collection).await?;
            check_model(stored.as_deref(), model)?;
            if stored.is_none() {
                self.write_model_marker(collection, dimension, model).await?;
            }
            log::info!("Collection {} already exists, skipping creation", collection);
            return Ok(());
        }
        self.create_collection(collection, dimension).await?;
        self.write_model_marker(collection, dimension, model).await
    }

    async fn collection_model(&self, collection: &str) -> Result<Option<String>, VectorDBError> {
        if !self.collection_exists(collection).await? {
            return Ok(None);
        }

        let request = GetPointsBuilder::new(collection, vec![PointId::from(MODEL_MARKER_ID.to_string())])
            .with_payload(true);
        let response = self.client.get_points(request)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        Ok(response.result
            .into_iter()
            .next()
            .and_then(|point| point.payload.get(MODEL_KEY).cloned())
            .and_then(|value| serde_json::Value::from(value).as_str().map(str::to_string)))
    }

    async fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<usize, VectorDBError> {
        if records.is_empty() {
            return Ok(0);
        }

        let count = records.len();
        let points: Vec<PointStruct> = records.into_iter()
            .map(|record| {
                let mut payload = QdrantPayload::new();
                for (key, value) in record.payload {
                    payload.insert(key, Value::from(value));
                }
                PointStruct::new(record.id, record.vector, payload)
            })
            .collect();

        self.client.upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        Ok(count)
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>, VectorDBError> {
        let request = SearchPointsBuilder::new(collection, query_vector, limit as u64)
            .filter(without_marker())
            .with_payload(true);

        let results = self.client.search_points(request)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        let records = results.result
            .into_iter()
            .map(|point| {
                let id = point_id_to_string(point.id.and_then(|id| id.point_id_options));
                let payload: Payload = point.payload
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect();
                ScoredRecord { id, score: point.score, payload }
            })
            .collect();

        Ok(records)
    }

    async fn count(&self, collection: &str) -> Result<usize, VectorDBError> {
        if !self.collection_exists(collection).await? {
            return Err(VectorDBError::CollectionNotFound(collection.to_string()));
        }

        let response = self.client.count(CountPointsBuilder::new(collection).filter(without_marker()).exact(true))
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    async fn delete_all(&self, collection: &str) -> Result<(), VectorDBError> {
        if !self.collection_exists(collection).await? {
            return Err(VectorDBError::CollectionNotFound(collection.to_string()));
        }

        // Dropping and recreating is the cheapest "delete everything".
        let dimension = self.collection_dimension(collection).await?;
        let model = self.collection_model(collection).await?;
        self.client.delete_collection(collection)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;
        self.create_collection(collection, dimension).await?;
        match model {
            Some(model) => self.write_model_marker(collection, dimension, &model).await,
            None => Ok(()),
        }
    }
}
