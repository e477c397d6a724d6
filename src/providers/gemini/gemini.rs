use async_trait::async_trait;
use anyhow::{Result, anyhow};
use crate::config::ProviderConfig;
use crate::providers::traits::{ChatMessage, CompletionProvider, EmbeddingProvider, Role, TokenStream};
use crate::providers::utils::{gemini_sse_stream, gemini_text};
use reqwest::Client;
use serde_json::{json, Value};

#[derive(Clone)]
pub struct GeminiProvider {
    api_key: String,
    client: Client,
    config: ProviderConfig,
}

impl GeminiProvider {
    fn model_path(&self) -> String {
        let model = self.config.model.trim_start_matches("models/");
        format!("{}/models/{}", self.config.api_url.trim_end_matches('/'), model)
    }

    /// Gemini takes system text separately and calls the assistant `model`.
    pub fn request_body(&self, messages: &[ChatMessage]) -> Value {
        let system_text = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let contents: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = match m.role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut body = json!({
            "contents": contents,
            "generationConfig": { "temperature": self.config.temperature }
        });
        if !system_text.is_empty() {
            body["system_instruction"] = json!({ "parts": [{ "text": system_text }] });
        }
        body
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn new(api_key: String, config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            api_key,
            client: Client::new(),
            config,
        })
    }

    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self.client
            .post(format!("{}:generateContent", self.model_path()))
            .query(&[("key", self.api_key.as_str())])
            .json(&self.request_body(messages))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("API request failed: Status {}, Body: {}", status, error_text));
        }

        let response_json: Value = response.json().await?;

        if let Some(error) = response_json.get("error") {
            return Err(anyhow!("API returned error: {}", error));
        }

        gemini_text(&response_json)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| anyhow!("Invalid response format"))
    }

    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        let response = self.client
            .post(format!("{}:streamGenerateContent", self.model_path()))
            .query(&[("alt", "sse"), ("key", self.api_key.as_str())])
            .json(&self.request_body(messages))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("API request failed: Status {}, Body: {}", status, error_text));
        }

        Ok(gemini_sse_stream(response))
    }

    async fn get_model_info(&self) -> Result<String> {
        Ok(self.config.model.clone())
    }

    fn clone_box(&self) -> Box<dyn CompletionProvider> {
        Box::new(self.clone())
    }
}

#[derive(Clone)]
pub struct GeminiEmbedding {
    api_key: String,
    client: Client,
    api_url: String,
    model: String,
}

impl GeminiEmbedding {
    pub fn new(api_key: String) -> Self {
        let config = ProviderConfig::from_env("gemini");
        Self {
            api_key,
            client: Client::new(),
            api_url: config.api_url,
            model: std::env::var("GEMINI_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-004".to_string()),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    fn dimension(&self) -> usize {
        768
    }

    fn model_id(&self) -> &str {
        self.model.trim_start_matches("models/")
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = format!("models/{}", self.model.trim_start_matches("models/"));
        let response = self.client
            .post(format!("{}/{}:embedContent", self.api_url.trim_end_matches('/'), model))
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "model": model,
                "content": { "parts": [{ "text": text }] }
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("Embedding request failed: Status {}, Body: {}", status, error_text));
        }

        let response_json: Value = response.json().await?;
        let values = response_json["embedding"]["values"]
            .as_array()
            .ok_or_else(|| anyhow!("Invalid embedding response format"))?;

        Ok(values
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect())
    }
}
