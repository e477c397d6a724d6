pub mod chat;
pub mod embeddings;
pub mod memory;
pub mod semantic_search;

pub use chat::{ChatEngine, ChatResponse, StreamingResponse, SYSTEM_PROMPT};
pub use embeddings::{build_embedder, CachedEmbedding, HashingEmbedding};
pub use memory::{ChatMemory, ChatSession, GREETING};
pub use semantic_search::{format_context, source_preview, Retriever, SourceNode};
