use async_trait::async_trait;
use anyhow::{Result, anyhow};
use crate::config::{AppConfig, ProviderConfig};
use crate::error::AppError;
use crate::providers::gemini::gemini::GeminiProvider;
use crate::providers::openai::openai::OpenAIProvider;
use crate::providers::traits::{ChatMessage, CompletionProvider, TokenStream};

/// Tries each provider in order; the first success wins.
///
/// There is no retry of the same provider and no health probing: a failed
/// call simply moves on to the next backend.
#[derive(Clone)]
pub struct FallbackProvider {
    providers: Vec<Box<dyn CompletionProvider>>,
}

impl FallbackProvider {
    pub fn from_providers(providers: Vec<Box<dyn CompletionProvider>>) -> Result<Self> {
        if providers.is_empty() {
            return Err(anyhow!("At least one completion provider is required"));
        }
        Ok(Self { providers })
    }

    /// Gemini first (required), OpenAI as backup when its key is set.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let google_key = config.require_google_key()?.to_string();

        let mut providers: Vec<Box<dyn CompletionProvider>> = Vec::new();
        let primary = GeminiProvider::new(google_key, ProviderConfig::from_env("gemini"))
            .await
            .map_err(|e| AppError::Provider(e.to_string()))?;
        providers.push(Box::new(primary));

        if let Some(api_key) = &config.openai_api_key {
            match OpenAIProvider::new(api_key.clone(), ProviderConfig::from_env("openai")).await {
                Ok(provider) => providers.push(Box::new(provider)),
                Err(e) => log::warn!("OpenAI backup provider unavailable: {}", e),
            }
        }

        Self::from_providers(providers)
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }
}

#[async_trait]
impl CompletionProvider for FallbackProvider {
    async fn new(api_key: String, config: ProviderConfig) -> Result<Self> {
        let primary = GeminiProvider::new(api_key, config).await?;
        Self::from_providers(vec![Box::new(primary)])
    }

    fn name(&self) -> &str {
        self.providers.first().map(|p| p.name()).unwrap_or("none")
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut failures = Vec::new();
        for provider in &self.providers {
            match provider.complete(messages).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    log::warn!("Provider {} failed: {}", provider.name(), e);
                    failures.push(format!("{}: {}", provider.name(), e));
                }
            }
        }
        Err(anyhow!("All providers failed ({})", failures.join("; ")))
    }

    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        let mut failures = Vec::new();
        for provider in &self.providers {
            match provider.complete_stream(messages).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    log::warn!("Provider {} failed to start a stream: {}", provider.name(), e);
                    failures.push(format!("{}: {}", provider.name(), e));
                }
            }
        }
        Err(anyhow!("All providers failed ({})", failures.join("; ")))
    }

    async fn get_model_info(&self) -> Result<String> {
        let mut models = Vec::new();
        for provider in &self.providers {
            models.push(format!("{}:{}", provider.name(), provider.get_model_info().await?));
        }
        Ok(models.join(", "))
    }

    fn clone_box(&self) -> Box<dyn CompletionProvider> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::{Arc, Mutex};

    /// Replays a fixed answer and records every prompt it was given.
    #[derive(Clone)]
    pub(crate) struct ScriptedProvider {
        pub label: &'static str,
        pub answer: Option<String>,
        pub seen: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    }

    impl ScriptedProvider {
        pub fn answering(label: &'static str, answer: &str) -> Self {
            Self { label, answer: Some(answer.to_string()), seen: Arc::default() }
        }

        pub fn failing(label: &'static str) -> Self {
            Self { label, answer: None, seen: Arc::default() }
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn new(_api_key: String, _config: ProviderConfig) -> Result<Self> {
            Ok(Self::answering("scripted", "ok"))
        }

        fn name(&self) -> &str {
            self.label
        }

        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.answer.clone().ok_or_else(|| anyhow!("{} is down", self.label))
        }

        async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
            let answer = self.complete(messages).await?;
            let words: Vec<Result<String>> = answer
                .split_inclusive(' ')
                .map(|w| Ok(w.to_string()))
                .collect();
            Ok(futures::stream::iter(words).boxed())
        }

        async fn get_model_info(&self) -> Result<String> {
            Ok(format!("{}-model", self.label))
        }

        fn clone_box(&self) -> Box<dyn CompletionProvider> {
            Box::new(self.clone())
        }
    }

    #[tokio::test]
    async fn falls_back_to_secondary_provider() {
        let primary = ScriptedProvider::failing("gemini");
        let backup = ScriptedProvider::answering("openai", "backup answer");
        let fallback = FallbackProvider::from_providers(vec![
            Box::new(primary.clone()),
            Box::new(backup.clone()),
        ])
        .unwrap();

        let answer = fallback.complete(&[ChatMessage::user("hra?")]).await.unwrap();
        assert_eq!(answer, "backup answer");
        assert_eq!(primary.seen.lock().unwrap().len(), 1);
        assert_eq!(backup.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn primary_success_skips_backup() {
        let primary = ScriptedProvider::answering("gemini", "primary answer");
        let backup = ScriptedProvider::answering("openai", "backup answer");
        let fallback = FallbackProvider::from_providers(vec![
            Box::new(primary),
            Box::new(backup.clone()),
        ])
        .unwrap();

        let stream = fallback.complete_stream(&[ChatMessage::user("80c?")]).await.unwrap();
        let text: Vec<String> = stream.map(|t| t.unwrap()).collect().await;
        assert_eq!(text.concat(), "primary answer");
        assert!(backup.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reports_when_all_providers_fail() {
        let fallback = FallbackProvider::from_providers(vec![
            Box::new(ScriptedProvider::failing("gemini")),
            Box::new(ScriptedProvider::failing("openai")),
        ])
        .unwrap();

        let err = fallback.complete(&[ChatMessage::user("?")]).await.unwrap_err();
        assert!(err.to_string().starts_with("All providers failed"));
        assert_eq!(fallback.provider_names(), vec!["gemini", "openai"]);
    }

    #[test]
    fn empty_provider_list_is_rejected() {
        assert!(FallbackProvider::from_providers(Vec::new()).is_err());
    }
}
