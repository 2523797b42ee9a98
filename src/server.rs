//! Web chat server.
//!
//! Serves the single-page chat UI and the JSON API it talks to. The page
//! keeps its own transcript and therapy type; the server is stateless apart
//! from the live knowledge base.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Chat UI |
//! | `POST` | `/chat` | Answer one message |
//! | `POST` | `/knowledge/reload` | Re-read the knowledge file and swap it in |
//! | `GET`  | `/health` | Health check (version, passage count, embedding model) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500). A failed generation
//! call is not an HTTP error: `/chat` answers 200 with the diagnostic as the
//! response text and `failed: true`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use panchakarma_core::Responder;

use crate::config::Config;
use crate::gemini::GeminiBackend;
use crate::knowledge;

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    responder: Arc<Responder>,
}

impl AppState {
    pub fn new(config: Config, responder: Responder) -> Self {
        Self {
            config: Arc::new(config),
            responder: Arc::new(responder),
        }
    }
}

/// Build the router with all routes, CORS and request tracing.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/chat", post(handle_chat))
        .route("/knowledge/reload", post(handle_reload))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Load the knowledge base, connect the Gemini backend and serve on
/// `[server].bind` until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let knowledge = knowledge::open_knowledge_base(config).await?;
    let backend = Arc::new(GeminiBackend::new(&config.generation)?);
    let responder = Responder::new(knowledge, backend, config.retrieval.top_k);

    let bind_addr = config.server.bind.clone();
    let app = router(AppState::new(config.clone(), responder));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "chat server listening");
    println!("Panchakarma chat UI on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET / ============

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    therapy_type: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    grounded: bool,
    sources: Vec<String>,
    failed: bool,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let reply = state
        .responder
        .answer(message, req.therapy_type.as_deref())
        .await;

    Ok(Json(ChatResponse {
        response: reply.text,
        grounded: reply.grounded,
        sources: reply.sources,
        failed: reply.failed,
    }))
}

// ============ POST /knowledge/reload ============

#[derive(Serialize)]
struct ReloadResponse {
    passages: usize,
}

async fn handle_reload(State(state): State<AppState>) -> Result<Json<ReloadResponse>, AppError> {
    let passages = knowledge::reload(&state.config, state.responder.knowledge())
        .await
        .map_err(|e| {
            tracing::warn!(error = %format!("{:#}", e), "knowledge reload failed");
            internal(format!("{:#}", e))
        })?;
    Ok(Json(ReloadResponse { passages }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    passages: usize,
    /// Embedding model the live index was built with.
    model: String,
    dims: usize,
    top_k: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let kb = state.responder.knowledge().snapshot();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        passages: kb.len(),
        model: kb.model_name().to_string(),
        dims: kb.dims(),
        top_k: state.responder.top_k(),
    })
}
