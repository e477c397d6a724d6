use async_trait::async_trait;
use anyhow::{Result, anyhow};
use crate::config::ProviderConfig;
use crate::providers::traits::{ChatMessage, CompletionProvider, EmbeddingProvider, Role, TokenStream};
use async_openai::{
    types::{
        ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs,
        CreateEmbeddingRequestArgs,
        EmbeddingInput,
    },
    Client,
    config::OpenAIConfig,
};
use futures::StreamExt;
use std::env;

fn client_for(api_key: &str, api_url: &str) -> Client<OpenAIConfig> {
    let config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(api_url);
    Client::with_config(config)
}

#[derive(Clone)]
pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
    config: ProviderConfig,
}

impl OpenAIProvider {
    fn build_request(&self, messages: &[ChatMessage]) -> Result<CreateChatCompletionRequest> {
        let messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>>>()?;

        Ok(CreateChatCompletionRequestArgs::default()
            .model(&self.config.model)
            .temperature(self.config.temperature)
            .messages(messages)
            .build()?)
    }
}

fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
    let content = message.content.clone();
    let converted = match message.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
    };
    Ok(converted)
}

#[async_trait]
impl CompletionProvider for OpenAIProvider {
    async fn new(api_key: String, config: ProviderConfig) -> Result<Self> {
        let client = client_for(&api_key, &config.api_url);
        Ok(Self { client, config })
    }

    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = self.build_request(messages)?;
        let response = self.client.chat().create(request).await?;

        response.choices.first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow!("No response content"))
    }

    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        let request = self.build_request(messages)?;
        let stream = self.client.chat().create_stream(request).await?;

        let tokens = stream
            .filter_map(|chunk| async move {
                match chunk {
                    Ok(response) => response
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta.content)
                        .filter(|text| !text.is_empty())
                        .map(Ok),
                    Err(e) => Some(Err(anyhow!("Stream interrupted: {}", e))),
                }
            })
            .boxed();

        Ok(tokens)
    }

    async fn get_model_info(&self) -> Result<String> {
        Ok(self.config.model.clone())
    }

    fn clone_box(&self) -> Box<dyn CompletionProvider> {
        Box::new(self.clone())
    }
}

#[derive(Clone)]
pub struct OpenAIEmbedding {
    client: Client<OpenAIConfig>,
    embedding_model: String,
}

impl OpenAIEmbedding {
    pub fn new(api_key: String) -> Self {
        let config = ProviderConfig::from_env("openai");
        let embedding_model = env::var("OPENAI_EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());

        Self {
            client: client_for(&api_key, &config.api_url),
            embedding_model,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedding {
    fn dimension(&self) -> usize {
        match self.embedding_model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        }
    }

    fn model_id(&self) -> &str {
        &self.embedding_model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings.pop().ok_or_else(|| anyhow!("No embedding returned from OpenAI"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input(EmbeddingInput::StringArray(texts.to_vec()))
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        let mut data = response.data;
        data.sort_by_key(|embedding| embedding.index);
        if data.len() != texts.len() {
            return Err(anyhow!(
                "OpenAI returned {} embeddings for {} inputs",
                data.len(),
                texts.len()
            ));
        }
        Ok(data.into_iter().map(|embedding| embedding.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_request_in_message_order() {
        let config = ProviderConfig {
            model: "gpt-4o-mini".to_string(),
            api_url: "http://localhost:1/v1".to_string(),
            temperature: 0.0,
        };
        let provider = OpenAIProvider::new("key".to_string(), config).await.unwrap();
        let request = provider
            .build_request(&[
                ChatMessage::system("system"),
                ChatMessage::user("question"),
                ChatMessage::assistant("answer"),
            ])
            .unwrap();

        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.messages.len(), 3);
        assert!(matches!(request.messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(request.messages[1], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(request.messages[2], ChatCompletionRequestMessage::Assistant(_)));
    }
}
