use anyhow::{Result, anyhow};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use crate::config::{AppConfig, EmbeddingBackend};
use crate::error::AppError;
use crate::providers::gemini::gemini::GeminiEmbedding;
use crate::providers::huggingface::huggingface::HuggingFaceEmbedding;
use crate::providers::openai::openai::OpenAIEmbedding;
use crate::providers::traits::EmbeddingProvider;

pub const HASHING_DIMENSION: usize = 384;

/// Offline embedder: signed feature hashing over lowercase word tokens,
/// L2-normalised. Deterministic, so identical text always maps to the same
/// vector; useful without credentials and in tests.
#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimension: usize,
    model: String,
}

impl HashingEmbedding {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self { dimension, model: format!("fnv1a-hashing-{}", dimension) }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
        {
            let hash = fnv1a(token.as_bytes());
            let index = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashingEmbedding {
    fn default() -> Self {
        Self::new(HASHING_DIMENSION)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedding {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}

/// Remembers recent embeddings so repeated questions skip the network.
pub struct CachedEmbedding {
    inner: Arc<dyn EmbeddingProvider>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl CachedEmbedding {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbedding {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let hit = self.cache.lock().get(text).cloned();
        if let Some(hit) = hit {
            return Ok(hit);
        }

        let embedding = self.inner.embed(text).await?;
        self.cache.lock().put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // Indexing batches are rarely repeated; go straight to the backend.
        self.inner.embed_batch(texts).await
    }
}

/// Picks the embedding backend named in the config, wrapped in a query cache.
pub fn build_embedder(config: &AppConfig) -> Result<Arc<dyn EmbeddingProvider>, AppError> {
    let inner: Arc<dyn EmbeddingProvider> = match config.embedding_backend {
        EmbeddingBackend::HuggingFace => {
            let token = config
                .hf_api_token
                .clone()
                .ok_or(AppError::MissingCredential("HF_API_TOKEN"))?;
            Arc::new(HuggingFaceEmbedding::new(token))
        }
        EmbeddingBackend::OpenAI => {
            let key = config
                .openai_api_key
                .clone()
                .ok_or(AppError::MissingCredential("OPENAI_API_KEY"))?;
            Arc::new(OpenAIEmbedding::new(key))
        }
        EmbeddingBackend::Gemini => {
            let key = config.require_google_key()?.to_string();
            Arc::new(GeminiEmbedding::new(key))
        }
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedding::default()),
    };

    log::info!(
        "Using {:?} embeddings: {} ({} dimensions)",
        config.embedding_backend,
        inner.model_id(),
        inner.dimension()
    );
    Ok(Arc::new(CachedEmbedding::new(inner, 256)))
}

/// Checks a vector against the dimension the index was created with.
pub fn check_dimension(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(anyhow!(
            "Embedding has wrong size: {} (expected {})",
            vector.len(),
            expected
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::utils::cosine_similarity;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn hashing_embedding_is_deterministic_and_normalised() {
        let embedder = HashingEmbedding::default();
        let a = embedder.embed("House Rent Allowance").await.unwrap();
        let b = embedder.embed("house rent allowance").await.unwrap();

        assert_eq!(a.len(), HASHING_DIMENSION);
        assert_eq!(a, b);
        let norm = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hashing_embedding_prefers_overlapping_text() {
        let embedder = HashingEmbedding::default();
        let query = embedder.embed_sync("deduction for health insurance premium");
        let close = embedder.embed_sync("Section 80D deduction in respect of health insurance premia");
        let far = embedder.embed_sync("Principal repayment of housing loan under 80C");

        let close_score = cosine_similarity(&query, &close).unwrap();
        let far_score = cosine_similarity(&query, &far).unwrap();
        assert!(close_score > far_score);
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let embedder = HashingEmbedding::new(8);
        assert_eq!(embedder.embed_sync("  ...  "), vec![0.0; 8]);
    }

    struct CountingEmbedding {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedding {
        fn dimension(&self) -> usize {
            2
        }

        fn model_id(&self) -> &str {
            "counting"
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0])
        }
    }

    #[tokio::test]
    async fn cache_reuses_query_embeddings() {
        let inner = Arc::new(CountingEmbedding { calls: AtomicUsize::new(0) });
        let cached = CachedEmbedding::new(inner.clone(), 2);

        cached.embed("80C limit").await.unwrap();
        cached.embed("80C limit").await.unwrap();
        cached.embed("HRA").await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cached.cached_len(), 2);
    }

    #[test]
    fn hashing_backend_needs_no_credentials() {
        let config = AppConfig {
            embedding_backend: EmbeddingBackend::Hashing,
            ..AppConfig::default()
        };
        let embedder = build_embedder(&config).unwrap();
        assert_eq!(embedder.dimension(), HASHING_DIMENSION);

        assert_eq!(embedder.model_id(), "fnv1a-hashing-384");

        let config = AppConfig::default();
        assert!(matches!(
            build_embedder(&config),
            Err(AppError::MissingCredential("HF_API_TOKEN"))
        ));
    }

    #[test]
    fn dimension_check() {
        assert!(check_dimension(&[0.0; 3], 3).is_ok());
        assert!(check_dimension(&[0.0; 3], 384).is_err());
    }
}
