use async_trait::async_trait;
use anyhow::Result;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use crate::config::ProviderConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Generated text, one delta per item.
pub type TokenStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn new(api_key: String, config: ProviderConfig) -> Result<Self>
    where
        Self: Sized;

    fn name(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream>;

    async fn get_model_info(&self) -> Result<String>;

    fn clone_box(&self) -> Box<dyn CompletionProvider>;
}

impl Clone for Box<dyn CompletionProvider> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimension(&self) -> usize;

    /// Name of the model behind the vectors. Two embedders with the same
    /// dimension but different models must not share a collection.
    fn model_id(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }
}
