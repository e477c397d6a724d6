pub mod api;
pub mod commands;
pub mod config;
pub mod database;
pub mod document;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod providers;
pub mod web_crawler;

// Re-export commonly used items
pub use config::AppConfig;
pub use error::AppError;
pub use llm::{ChatEngine, Retriever};
