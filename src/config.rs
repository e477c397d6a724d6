use crate::error::AppError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_COLLECTION: &str = "indian-tax-bot";

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub model: String,
    pub api_url: String,
    pub temperature: f32,
}

impl ProviderConfig {
    pub fn from_env(provider: &str) -> Self {
        let prefix = provider.to_uppercase();

        let model = env::var(format!("{}_MODEL", prefix))
            .unwrap_or_else(|_| match provider {
                "gemini" => "gemini-2.0-flash".to_string(),
                "openai" => "gpt-4o-mini".to_string(),
                _ => String::new(),
            });

        let api_url = env::var(format!("{}_API_URL", prefix))
            .unwrap_or_else(|_| match provider {
                "gemini" => "https://generativelanguage.googleapis.com/v1beta".to_string(),
                "openai" => "https://api.openai.com/v1".to_string(),
                _ => String::new(),
            });

        let temperature = env::var(format!("{}_TEMPERATURE", prefix))
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(0.1);

        Self {
            model,
            api_url,
            temperature,
        }
    }
}

/// Which hosted (or offline) model turns text into vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    HuggingFace,
    OpenAI,
    Gemini,
    Hashing,
}

impl FromStr for EmbeddingBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            "openai" => Ok(Self::OpenAI),
            "gemini" | "google" => Ok(Self::Gemini),
            "hashing" | "offline" => Ok(Self::Hashing),
            other => Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Available: huggingface, openai, gemini, hashing",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub google_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub hf_api_token: Option<String>,
    pub embedding_backend: EmbeddingBackend,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub collection_name: String,
    pub local_store_path: PathBuf,
    pub data_dir: PathBuf,
    pub similarity_top_k: usize,
    pub memory_token_limit: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub scrape_timeout: Duration,
    pub scrape_delay: Duration,
}

impl AppConfig {
    /// Reads `.env` (if present) and the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        dotenv::dotenv().ok();

        let hf_api_token = non_empty("HF_API_TOKEN");
        let embedding_backend = match non_empty("EMBEDDING_PROVIDER") {
            Some(name) => name.parse()?,
            None if hf_api_token.is_some() => EmbeddingBackend::HuggingFace,
            None => {
                log::warn!("HF_API_TOKEN not set; using offline hashing embeddings");
                EmbeddingBackend::Hashing
            }
        };

        Ok(Self {
            google_api_key: non_empty("GOOGLE_API_KEY"),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            hf_api_token,
            embedding_backend,
            qdrant_url: non_empty("QDRANT_URL")
                .unwrap_or_else(|| "http://localhost:6333".to_string()),
            qdrant_api_key: non_empty("QDRANT_API_KEY"),
            collection_name: non_empty("COLLECTION_NAME")
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            local_store_path: non_empty("LOCAL_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/vector_store.db")),
            data_dir: non_empty("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            similarity_top_k: parse_or("SIMILARITY_TOP_K", 3)?,
            memory_token_limit: parse_or("MEMORY_TOKEN_LIMIT", 3000)?,
            chunk_size: parse_or("CHUNK_SIZE", 2000)?,
            chunk_overlap: parse_or("CHUNK_OVERLAP", 200)?,
            scrape_timeout: Duration::from_secs(parse_or("SCRAPE_TIMEOUT_SECS", 30)?),
            scrape_delay: Duration::from_secs(parse_or("SCRAPE_DELAY_SECS", 3)?),
        })
    }

    pub fn require_google_key(&self) -> Result<&str, AppError> {
        self.google_api_key
            .as_deref()
            .ok_or(AppError::MissingCredential("GOOGLE_API_KEY"))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            google_api_key: None,
            openai_api_key: None,
            hf_api_token: None,
            embedding_backend: EmbeddingBackend::HuggingFace,
            qdrant_url: "http://localhost:6333".to_string(),
            qdrant_api_key: None,
            collection_name: DEFAULT_COLLECTION.to_string(),
            local_store_path: PathBuf::from("data/vector_store.db"),
            data_dir: PathBuf::from("data"),
            similarity_top_k: 3,
            memory_token_limit: 3000,
            chunk_size: 2000,
            chunk_overlap: 200,
            scrape_timeout: Duration::from_secs(30),
            scrape_delay: Duration::from_secs(3),
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match non_empty(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}
