pub mod fallback;
pub mod gemini;
pub mod huggingface;
pub mod openai;
pub mod traits;
pub mod utils;

pub use fallback::FallbackProvider;
pub use traits::{ChatMessage, CompletionProvider, EmbeddingProvider, Role, TokenStream};
