use anyhow::Result;
use crate::config::AppConfig;
use crate::llm::memory::{ChatMemory, ChatSession};
use crate::llm::semantic_search::{format_context, Retriever, SourceNode};
use crate::providers::traits::{ChatMessage, CompletionProvider, TokenStream};

pub const SYSTEM_PROMPT: &str =
    "You are an Indian Tax Law Expert. Answer strictly based on the context provided.";

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub response: String,
    pub source_nodes: Vec<SourceNode>,
}

/// Tokens still to come, with the sources they were generated from.
pub struct StreamingResponse {
    pub tokens: TokenStream,
    pub source_nodes: Vec<SourceNode>,
}

/// Context-mode chat: every turn retrieves fresh passages and places them in
/// the system prompt, followed by the remembered conversation.
pub struct ChatEngine {
    provider: Box<dyn CompletionProvider>,
    retriever: Retriever,
    memory: ChatMemory,
    session: ChatSession,
    top_k: usize,
}

impl ChatEngine {
    pub fn new(provider: Box<dyn CompletionProvider>, retriever: Retriever, token_limit: usize, top_k: usize) -> Self {
        Self {
            provider,
            retriever,
            memory: ChatMemory::new(token_limit),
            session: ChatSession::new(),
            top_k,
        }
    }

    pub fn from_config(provider: Box<dyn CompletionProvider>, retriever: Retriever, config: &AppConfig) -> Self {
        Self::new(provider, retriever, config.memory_token_limit, config.similarity_top_k)
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn memory(&self) -> &ChatMemory {
        &self.memory
    }

    /// Forgets the conversation; the transcript restarts with the greeting.
    pub fn reset(&mut self) {
        self.memory.reset();
        self.session = ChatSession::new();
    }

    fn build_messages(&self, message: &str, nodes: &[SourceNode]) -> Vec<ChatMessage> {
        let system = format!(
            "{}\n\nContext information is below.\n--------------------\n{}\n--------------------\n",
            SYSTEM_PROMPT,
            format_context(nodes)
        );

        let mut messages = vec![ChatMessage::system(system)];
        messages.extend(self.memory.window());
        messages.push(ChatMessage::user(message));
        messages
    }

    fn remember(&mut self, message: &str, answer: &str) {
        self.memory.push(ChatMessage::user(message));
        self.memory.push(ChatMessage::assistant(answer));
        self.session.push_user(message);
        self.session.push_assistant(answer);
    }

    pub async fn chat(&mut self, message: &str) -> Result<ChatResponse> {
        let source_nodes = self.retriever.retrieve(message, self.top_k).await?;
        let messages = self.build_messages(message, &source_nodes);

        let response = self.provider.complete(&messages).await?;
        self.remember(message, &response);

        Ok(ChatResponse { response, source_nodes })
    }

    /// Starts a streamed answer. Nothing is remembered until the caller has
    /// drained the stream and handed the full text to [`Self::finish_stream`].
    pub async fn stream_chat(&mut self, message: &str) -> Result<StreamingResponse> {
        let source_nodes = self.retriever.retrieve(message, self.top_k).await?;
        let messages = self.build_messages(message, &source_nodes);

        let tokens = self.provider.complete_stream(&messages).await?;
        Ok(StreamingResponse { tokens, source_nodes })
    }

    pub fn finish_stream(&mut self, message: &str, answer: &str) {
        self.remember(message, answer);
    }
}
