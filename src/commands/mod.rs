use colored::Colorize;
use futures::StreamExt;
use std::io::Write;
use crate::llm::chat::ChatEngine;
use crate::llm::semantic_search::Retriever;

mod system;

pub use system::{print_greeting, print_help, print_sources};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct CommandHandler {
    engine: ChatEngine,
    retriever: Retriever,
    show_sources: bool,
    stream: bool,
}

impl CommandHandler {
    pub fn new(engine: ChatEngine, retriever: Retriever, stream: bool, show_sources: bool) -> Self {
        Self { engine, retriever, show_sources, stream }
    }

    pub fn engine(&self) -> &ChatEngine {
        &self.engine
    }

    pub fn show_sources(&self) -> bool {
        self.show_sources
    }

    pub fn streaming(&self) -> bool {
        self.stream
    }

    pub fn greet(&self) {
        print_greeting(self.engine.session());
    }

    pub async fn handle_command(&mut self, input: &str) -> Result<Flow, String> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Flow::Continue);
        }

        match input.to_lowercase().as_str() {
            "help" => print_help(),
            "exit" | "quit" => {
                println!("👋 Goodbye!");
                return Ok(Flow::Exit);
            }
            "sources" => {
                self.show_sources = !self.show_sources;
                system::print_toggle("Show sources:", self.show_sources);
            }
            "stream" => {
                self.stream = !self.stream;
                system::print_toggle("Streaming:", self.stream);
            }
            "reset" => {
                self.engine.reset();
                println!("🔄 Conversation cleared.");
                self.greet();
            }
            "history" => system::print_history(self.engine.session()),
            "stats" => self.print_stats().await?,
            _ => self.handle_chat(input).await?,
        }
        Ok(Flow::Continue)
    }

    async fn handle_chat(&mut self, input: &str) -> Result<(), String> {
        let nodes = if self.stream {
            let streaming = self
                .engine
                .stream_chat(input)
                .await
                .map_err(|e| format!("Failed to get AI response: {}", e))?;

            let mut tokens = streaming.tokens;
            let mut answer = String::new();
            while let Some(token) = tokens.next().await {
                let token = token.map_err(|e| format!("\nStream interrupted: {}", e))?;
                print!("{}", token.truecolor(255, 236, 179));
                let _ = std::io::stdout().flush();
                answer.push_str(&token);
            }
            println!("\n");

            self.engine.finish_stream(input, &answer);
            streaming.source_nodes
        } else {
            let response = self
                .engine
                .chat(input)
                .await
                .map_err(|e| format!("Failed to get AI response: {}", e))?;
            println!("{}\n", response.response.truecolor(255, 236, 179));
            response.source_nodes
        };

        if self.show_sources {
            print_sources(&nodes);
        }
        Ok(())
    }

    async fn print_stats(&self) -> Result<(), String> {
        let count = self
            .retriever
            .count()
            .await
            .map_err(|e| format!("Failed to read stats: {}", e))?;

        println!("\n📊 Knowledge base");
        println!("  Backend:    {}", self.retriever.store().backend().cyan());
        println!("  Collection: {}", self.retriever.collection().cyan());
        println!("  Vectors:    {}", count.to_string().cyan());
        println!("  Dimension:  {}", self.retriever.dimension().to_string().cyan());
        println!("  Embeddings: {}", self.retriever.model_id().cyan());
        println!("  Provider:   {}", self.engine.provider_name().cyan());
        println!();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::LocalVectorStore;
    use crate::llm::embeddings::HashingEmbedding;
    use crate::providers::fallback::tests::ScriptedProvider;
    use std::sync::Arc;

    async fn handler(stream: bool) -> CommandHandler {
        let store = Arc::new(LocalVectorStore::open_in_memory().await.unwrap());
        let retriever = Retriever::new(store, Arc::new(HashingEmbedding::default()), "repl-test");
        let provider = ScriptedProvider::answering("gemini", "Section 80C allows 1,50,000 rupees.");
        let engine = ChatEngine::new(Box::new(provider), retriever.clone(), 3000, 3);
        CommandHandler::new(engine, retriever, stream, false)
    }

    #[tokio::test]
    async fn toggles_and_exit() {
        let mut handler = handler(true).await;

        assert_eq!(handler.handle_command("sources").await.unwrap(), Flow::Continue);
        assert!(handler.show_sources());
        assert_eq!(handler.handle_command("STREAM").await.unwrap(), Flow::Continue);
        assert!(!handler.streaming());

        assert_eq!(handler.handle_command("quit").await.unwrap(), Flow::Exit);
        assert_eq!(handler.handle_command("exit").await.unwrap(), Flow::Exit);
    }

    #[tokio::test]
    async fn questions_go_to_the_engine_and_reset_clears_them() {
        for stream in [true, false] {
            let mut handler = handler(stream).await;
            handler.handle_command("What is the 80C limit?").await.unwrap();
            assert_eq!(handler.engine().memory().len(), 2);

            handler.handle_command("reset").await.unwrap();
            assert!(handler.engine().memory().is_empty());
        }
    }

    #[tokio::test]
    async fn provider_errors_are_returned_not_fatal() {
        let store = Arc::new(LocalVectorStore::open_in_memory().await.unwrap());
        let retriever = Retriever::new(store, Arc::new(HashingEmbedding::default()), "repl-test");
        let engine = ChatEngine::new(Box::new(ScriptedProvider::failing("gemini")), retriever.clone(), 3000, 3);
        let mut handler = CommandHandler::new(engine, retriever, false, false);

        let err = handler.handle_command("What is 80D?").await.unwrap_err();
        assert!(err.starts_with("Failed to get AI response"));
        assert_eq!(handler.handle_command("stats").await.unwrap(), Flow::Continue);
    }
}
