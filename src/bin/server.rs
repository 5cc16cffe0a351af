//! FormHelper HTTP server
//!
//! Run with: formhelper-server --port 8080

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use formhelper::{AssistantConfig, FormAssistant, FormHelperError, QueryRequest};

#[derive(Parser, Debug)]
#[command(name = "formhelper-server")]
#[command(about = "HTTP API for the medical-billing form assistant")]
struct Args {
    /// Config file (TOML)
    #[arg(long, env = "FORMHELPER_CONFIG")]
    config: Option<String>,

    /// Bind address
    #[arg(long, env = "FORMHELPER_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port
    #[arg(long, env = "FORMHELPER_PORT", default_value = "8080")]
    port: u16,

    /// SQLite memory database; omit to keep memory in-process
    #[arg(long, env = "FORMHELPER_DB_PATH")]
    db_path: Option<String>,

    /// Disable per-user memory
    #[arg(long)]
    no_memory: bool,

    /// API key for the remote reasoning service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_key: Option<String>,

    /// Remote model name
    #[arg(long, env = "FORMHELPER_MODEL")]
    model: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<(AssistantConfig, SocketAddr, bool)> {
        let mut config = AssistantConfig::load(self.config.as_deref())?;
        if self.openai_key.is_some() {
            config.remote.api_key = self.openai_key;
        }
        if let Some(model) = self.model {
            config.remote.model = model;
        }
        if let Some(path) = self.db_path {
            config.memory.db_path = Some(path);
        }
        if self.no_memory {
            config.memory.enabled = false;
        }
        let addr: SocketAddr = format!("{}:{}", self.host, self.port).parse()?;
        Ok((config, addr, self.log_json))
    }
}

type AppState = Arc<FormAssistant>;

/// Maps library errors onto HTTP statuses
struct ApiError(FormHelperError);

impl From<FormHelperError> for ApiError {
    fn from(e: FormHelperError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            FormHelperError::MemoryUnavailable(_) | FormHelperError::Timeout(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            FormHelperError::NotFound(_) => StatusCode::NOT_FOUND,
            FormHelperError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "error": self.0.to_string(),
            "code": self.0.code(),
            "retryable": self.0.is_retryable(),
        });
        (status, Json(body)).into_response()
    }
}

fn router(assistant: AppState) -> Router {
    Router::new()
        .route("/api/query", post(query_handler))
        .route("/api/classify", post(classify_handler))
        .route("/api/health", get(health_handler))
        .route("/api/stats/:user", get(stats_handler))
        .route("/api/memory/:user", delete(clear_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(assistant)
}

async fn query_handler(
    State(assistant): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Response, ApiError> {
    if request.text.len() > 10_000 {
        return Err(FormHelperError::InvalidInput("query text too long".to_string()).into());
    }
    let reply = assistant.process_query(request).await;
    Ok(Json(reply).into_response())
}

#[derive(Deserialize)]
struct ClassifyBody {
    text: String,
}

async fn classify_handler(
    State(assistant): State<AppState>,
    Json(body): Json<ClassifyBody>,
) -> impl IntoResponse {
    Json(assistant.classify(&body.text))
}

async fn health_handler(State(assistant): State<AppState>) -> impl IntoResponse {
    let window = assistant.router().gateway().window().snapshot().await;
    let memory_backend = assistant.overlay().store().map(|s| s.backend());
    Json(json!({
        "status": "ok",
        "version": formhelper::VERSION,
        "remote_configured": assistant.router().gateway().is_configured(),
        "rate_window": window,
        "memory": memory_backend,
        "interactions": assistant.interaction_stats(),
    }))
}

#[derive(Deserialize)]
struct StatsQuery {
    #[serde(default)]
    include_recent: bool,
}

async fn stats_handler(
    State(assistant): State<AppState>,
    Path(user): Path<String>,
    Query(query): Query<StatsQuery>,
) -> Result<Response, ApiError> {
    let stats = assistant.memory_stats(Some(&user)).await?;
    let mut body = json!({ "user_id": user, "memory": stats });
    if query.include_recent {
        let recent: Vec<_> = assistant
            .interaction_log()
            .recent(assistant.config().learning.capacity)
            .into_iter()
            .filter(|e| e.user_id.as_deref() == Some(user.as_str()))
            .collect();
        body["recent_interactions"] = json!(recent);
    }
    Ok(Json(body).into_response())
}

async fn clear_handler(
    State(assistant): State<AppState>,
    Path(user): Path<String>,
) -> Result<Response, ApiError> {
    let removed = assistant.clear_user(&user).await?;
    Ok(Json(json!({ "user_id": user, "removed": removed })).into_response())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let (config, addr, log_json) = args.into_config()?;

    // Logs go to stderr
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=debug"));
    if log_json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .with(filter)
            .init();
    }

    let assistant = Arc::new(FormAssistant::open(config)?);
    if !assistant.router().gateway().is_configured() {
        tracing::warn!("No API key configured; complex queries will be answered locally");
    }

    let app = router(assistant);
    tracing::info!("FormHelper server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
