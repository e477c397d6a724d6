use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use validator::Validate;

use crate::llm::chat::ChatEngine;
use crate::llm::semantic_search::{source_preview, Retriever, SourceNode};
use crate::providers::traits::CompletionProvider;

const MAX_CONCURRENT_REQUESTS: usize = 32;
pub const MAX_SESSIONS: usize = 256;

/// Open conversations, least recently used evicted first.
type SessionCache = LruCache<String, Arc<Mutex<ChatEngine>>>;

fn session_cache(capacity: usize) -> Arc<Mutex<SessionCache>> {
    let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
    Arc::new(Mutex::new(LruCache::new(capacity)))
}

#[derive(Clone)]
pub struct AppState {
    provider: Box<dyn CompletionProvider>,
    retriever: Retriever,
    token_limit: usize,
    top_k: usize,
    sessions: Arc<Mutex<SessionCache>>,
}

impl AppState {
    pub fn new(provider: Box<dyn CompletionProvider>, retriever: Retriever, token_limit: usize, top_k: usize) -> Self {
        Self {
            provider,
            retriever,
            token_limit,
            top_k,
            sessions: session_cache(MAX_SESSIONS),
        }
    }

    pub fn with_session_capacity(mut self, capacity: usize) -> Self {
        self.sessions = session_cache(capacity);
        self
    }

    fn new_engine(&self) -> ChatEngine {
        ChatEngine::new(self.provider.clone(), self.retriever.clone(), self.token_limit, self.top_k)
    }

    /// Looks up an existing session, or opens a fresh one when no id is given.
    /// Opening a session beyond capacity forgets the least recently used one.
    async fn session(&self, id: Option<&str>) -> Option<(String, Arc<Mutex<ChatEngine>>)> {
        let mut sessions = self.sessions.lock().await;
        match id {
            Some(id) => sessions.get(id).map(|engine| (id.to_string(), engine.clone())),
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                let engine = Arc::new(Mutex::new(self.new_engine()));
                if let Some((evicted, _)) = sessions.push(id.clone(), engine.clone()) {
                    log::info!("Closed idle chat session {}", evicted);
                }
                log::info!("Opened chat session {}", id);
                Some((id, engine))
            }
        }
    }
}

#[derive(Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 2000))]
    message: String,
    session_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct SourceInfo {
    label: String,
    snippet: String,
    score: f32,
}

impl From<&SourceNode> for SourceInfo {
    fn from(node: &SourceNode) -> Self {
        Self {
            label: node.label().to_string(),
            snippet: source_preview(node),
            score: node.score,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct ChatResponse {
    response: String,
    sources: Vec<SourceInfo>,
    session_id: String,
}

#[derive(Serialize, Deserialize)]
struct ApiResponse {
    status: String,
}

fn error_response(code: StatusCode, status: String) -> Response {
    (code, Json(ApiResponse { status })).into_response()
}

/// Create and configure the API router
pub fn create_api(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/chat", post(chat_handler))
        .route("/health", get(health_check))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("API listening on http://{}", addr);

    axum::serve(listener, create_api(state)).await?;
    Ok(())
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, format!("Invalid request: {}", rejection.body_text()))
        }
    };
    if let Err(e) = request.validate() {
        return error_response(StatusCode::BAD_REQUEST, format!("Invalid request: {}", e));
    }

    let (session_id, engine) = match state.session(request.session_id.as_deref()).await {
        Some(found) => found,
        None => return error_response(StatusCode::NOT_FOUND, "Unknown session_id".to_string()),
    };

    let mut engine = engine.lock().await;
    match engine.chat(&request.message).await {
        Ok(answer) => Json(ChatResponse {
            response: answer.response,
            sources: answer.source_nodes.iter().map(SourceInfo::from).collect(),
            session_id,
        })
        .into_response(),
        Err(e) => {
            log::error!("Chat failed for session {}: {}", session_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("AI error: {}", e))
        }
    }
}

async fn health_check() -> Response {
    Json(ApiResponse {
        status: "Server is running and healthy".to_string(),
    })
    .into_response()
}
