//! Offline ingestion: scrape or load documents, chunk, embed and store them.

use colored::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use crate::config::AppConfig;
use crate::database::{VectorDBError, VectorStore};
use crate::document::{load_directory, split_document, Document};
use crate::error::AppError;
use crate::llm::semantic_search::Retriever;
use crate::web_crawler::{FetchError, PageFetcher, Source, WebScraper};

pub const WIPE_CONFIRMATION: &str = "DELETE";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No data scraped")]
    NoData,
    #[error("No data found in {0}. Run `scrape` or `seed` first.")]
    NoDocuments(String),
    #[error("Indexing failed: {0}")]
    Index(#[from] anyhow::Error),
    #[error(transparent)]
    Store(#[from] VectorDBError),
    #[error(transparent)]
    App(#[from] AppError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub scraped: usize,
    pub failed: Vec<(String, String)>,
    pub chunks: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub enum WipeOutcome {
    Aborted,
    NotFound,
    Wiped { remaining: usize },
}

pub struct Pipeline {
    fetcher: Arc<dyn PageFetcher>,
    retriever: Retriever,
    delay: Duration,
    chunk_size: usize,
    chunk_overlap: usize,
    show_progress: bool,
}

impl Pipeline {
    pub fn new(retriever: Retriever, config: &AppConfig) -> Result<Self, PipelineError> {
        let scraper = WebScraper::new(config.scrape_timeout)?;
        Ok(Self {
            fetcher: Arc::new(scraper),
            retriever,
            delay: config.scrape_delay,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            show_progress: true,
        })
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// Fetches each source in turn. A failed source is reported and skipped;
    /// after every success we pause before hitting the next site.
    pub async fn scrape_sources(&self, sources: &[Source]) -> (Vec<Document>, Vec<(String, String)>) {
        let mut documents = Vec::new();
        let mut failed = Vec::new();

        for source in sources {
            println!("{} {}", "Scraping:".cyan(), source.title);
            match self.fetcher.scrape_url(&source.url).await {
                Ok(text) => {
                    println!("  {} ({} chars)", "Success".green(), text.chars().count());
                    documents.push(Document::from_source(text, &source.url, &source.title));
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                }
                Err(e) => {
                    println!("  {} {}", "Failed:".red(), e);
                    log::warn!("Skipping {}: {}", source.url, e);
                    failed.push((source.url.clone(), e.to_string()));
                }
            }
        }

        (documents, failed)
    }

    pub async fn run_pipeline(&self, sources: &[Source]) -> Result<PipelineReport, PipelineError> {
        let (documents, failed) = self.scrape_sources(sources).await;
        if documents.is_empty() {
            return Err(PipelineError::NoData);
        }

        let scraped = documents.len();
        let chunks = self.index_documents(&documents).await?;
        log::info!("Stored {} chunks from {} pages", chunks, scraped);

        Ok(PipelineReport { scraped, failed, chunks })
    }

    /// Splits, embeds and upserts. Returns the number of chunks stored.
    pub async fn index_documents(&self, documents: &[Document]) -> Result<usize, PipelineError> {
        let mut chunks = Vec::new();
        for doc in documents {
            chunks.extend(split_document(doc, self.chunk_size, self.chunk_overlap)?);
        }
        log::info!("Split {} documents into {} chunks", documents.len(), chunks.len());

        self.retriever.ensure_collection().await?;
        Ok(self.retriever.index_chunks(&chunks, self.show_progress).await?)
    }

    pub async fn index_directory(&self, dir: &Path) -> Result<usize, PipelineError> {
        let documents = load_directory(dir)?;
        if documents.is_empty() {
            return Err(PipelineError::NoDocuments(dir.display().to_string()));
        }
        self.index_documents(&documents).await
    }

    /// Fills an empty collection from `dir`. Returns the chunks stored, or
    /// `None` when the collection already had vectors.
    ///
    /// The directory may exist without holding any documents (the local
    /// store keeps its database file there), so only loaded documents count.
    pub async fn ensure_indexed(&self, dir: &Path) -> Result<Option<usize>, PipelineError> {
        if self.retriever.count().await? > 0 {
            return Ok(None);
        }
        if !dir.is_dir() {
            return Err(PipelineError::NoDocuments(dir.display().to_string()));
        }

        log::info!("Knowledge base is empty, indexing {}", dir.display());
        Ok(Some(self.index_directory(dir).await?))
    }
}

/// Deletes every vector in `collection`, but only when `confirm` is exactly
/// [`WIPE_CONFIRMATION`].
pub async fn wipe_database(
    store: &dyn VectorStore,
    collection: &str,
    confirm: &str,
) -> Result<WipeOutcome, PipelineError> {
    if confirm != WIPE_CONFIRMATION {
        return Ok(WipeOutcome::Aborted);
    }
    if !store.collection_exists(collection).await? {
        return Ok(WipeOutcome::NotFound);
    }

    store.delete_all(collection).await?;
    let remaining = store.count(collection).await?;
    log::info!("Wiped collection {} ({} vectors left)", collection, remaining);
    Ok(WipeOutcome::Wiped { remaining })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::LocalVectorStore;
    use crate::llm::embeddings::HashingEmbedding;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FakeWeb {
        pages: HashMap<String, String>,
    }

    #[async_trait]
    impl PageFetcher for FakeWeb {
        async fn scrape_url(&self, url: &str) -> Result<String, FetchError> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Blocked { status: 403, url: url.to_string() })
        }
    }

    async fn pipeline(pages: &[(&str, &str)]) -> (Pipeline, Arc<LocalVectorStore>) {
        let store = Arc::new(LocalVectorStore::open_in_memory().await.unwrap());
        let retriever = Retriever::new(store.clone(), Arc::new(HashingEmbedding::default()), "pipeline-test");
        let web = FakeWeb {
            pages: pages.iter().map(|(u, t)| (u.to_string(), t.to_string())).collect(),
        };
        let pipeline = Pipeline::new(retriever, &AppConfig::default())
            .unwrap()
            .with_fetcher(Arc::new(web))
            .with_delay(Duration::ZERO)
            .quiet();
        (pipeline, store)
    }

    #[tokio::test]
    async fn nothing_scraped_is_no_data() {
        let (pipeline, store) = pipeline(&[]).await;
        let sources = vec![Source::new("80C", "https://blocked.example/80c")];

        let err = pipeline.run_pipeline(&sources).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoData));
        assert_eq!(err.to_string(), "No data scraped");
        assert!(!store.collection_exists("pipeline-test").await.unwrap());
    }

    #[tokio::test]
    async fn failed_sources_are_skipped() {
        let (pipeline, store) = pipeline(&[(
            "https://ok.example/hra",
            "House Rent Allowance is exempt to the extent of the least of three amounts.",
        )])
        .await;
        let sources = vec![
            Source::new("blocked", "https://blocked.example/80d"),
            Source::new("HRA Exemptions", "https://ok.example/hra"),
        ];

        let report = pipeline.run_pipeline(&sources).await.unwrap();
        assert_eq!(report.scraped, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "https://blocked.example/80d");
        assert_eq!(report.chunks, 1);
        assert_eq!(store.count("pipeline-test").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn indexes_seeded_directory() {
        let (pipeline, store) = pipeline(&[]).await;
        let dir = tempfile::tempdir().unwrap();
        crate::document::generate_library(dir.path()).unwrap();

        let stored = pipeline.index_directory(dir.path()).await.unwrap();
        assert_eq!(stored, 4);
        assert_eq!(store.count("pipeline-test").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn data_dir_holding_only_the_local_store_asks_for_seed() {
        let root = tempfile::tempdir().unwrap();
        let data = root.path().join("data");
        let store = Arc::new(LocalVectorStore::open(data.join("vector_store.db")).await.unwrap());
        assert!(data.is_dir());

        let retriever = Retriever::new(store, Arc::new(HashingEmbedding::default()), "first-run");
        let pipeline = Pipeline::new(retriever, &AppConfig::default()).unwrap().quiet();

        let err = pipeline.ensure_indexed(&data).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoDocuments(_)));
        assert_eq!(
            err.to_string(),
            format!("No data found in {}. Run `scrape` or `seed` first.", data.display())
        );

        let missing = root.path().join("missing");
        assert!(matches!(
            pipeline.ensure_indexed(&missing).await,
            Err(PipelineError::NoDocuments(_))
        ));
    }

    #[tokio::test]
    async fn empty_collection_is_filled_once() {
        let (pipeline, store) = pipeline(&[]).await;
        let dir = tempfile::tempdir().unwrap();
        crate::document::generate_library(dir.path()).unwrap();

        assert_eq!(pipeline.ensure_indexed(dir.path()).await.unwrap(), Some(4));
        assert_eq!(pipeline.ensure_indexed(dir.path()).await.unwrap(), None);
        assert_eq!(store.count("pipeline-test").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn wipe_requires_exact_confirmation() {
        let (pipeline, store) = pipeline(&[]).await;

        let outcome = wipe_database(store.as_ref(), "pipeline-test", "DELETE").await.unwrap();
        assert_eq!(outcome, WipeOutcome::NotFound);

        let doc = Document::from_source("Section 24 interest deduction up to 2,00,000 rupees.", "u", "t");
        pipeline.index_documents(&[doc]).await.unwrap();

        for attempt in ["delete", "DELETE ", "yes", ""] {
            let outcome = wipe_database(store.as_ref(), "pipeline-test", attempt).await.unwrap();
            assert_eq!(outcome, WipeOutcome::Aborted);
        }
        assert_eq!(store.count("pipeline-test").await.unwrap(), 1);

        let outcome = wipe_database(store.as_ref(), "pipeline-test", "DELETE").await.unwrap();
        assert_eq!(outcome, WipeOutcome::Wiped { remaining: 0 });
    }
}
