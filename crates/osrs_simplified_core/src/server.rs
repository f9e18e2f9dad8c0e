use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::catalog::{CatalogEntry, Mode, SKILL_CATALOG, find_entry};
use crate::clean::{MarkupFormat, clean_markup};
use crate::error::{ErrorKind, error_kind};
use crate::jobs::{JobCommand, run_skill_jobs};
use crate::llm::CompletionApi;
use crate::query::{self, AboutInfo, PingStatus, SkillListing};
use crate::store::SkillStore;
use crate::summarize::summarize_content;
use crate::wiki::{WikiApi, fetch_with_fallback};

#[derive(Clone)]
pub struct AppState {
    pub store: SkillStore,
    pub wiki: Arc<dyn WikiApi>,
    pub llm: Option<Arc<dyn CompletionApi>>,
    pub format: MarkupFormat,
    pub jobs: JobCommand,
    pub catalog: &'static [CatalogEntry],
}

impl AppState {
    pub fn new(
        store: SkillStore,
        wiki: Arc<dyn WikiApi>,
        llm: Option<Arc<dyn CompletionApi>>,
        format: MarkupFormat,
        jobs: JobCommand,
    ) -> Self {
        Self {
            store,
            wiki,
            llm,
            format,
            jobs,
            catalog: SKILL_CATALOG,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppError {
    code: &'static str,
    message: String,
    status: StatusCode,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: "invalid_request",
            message: message.into(),
            status: StatusCode::BAD_REQUEST,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: "not_found",
            message: message.into(),
            status: StatusCode::NOT_FOUND,
        }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self {
            code: "service_unavailable",
            message: message.into(),
            status: StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: ErrorKind::Internal.as_str(),
            message: message.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn with_code(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        let kind = error_kind(&error);
        let status = match kind {
            ErrorKind::PageNotFound => StatusCode::NOT_FOUND,
            ErrorKind::RemoteService => StatusCode::BAD_GATEWAY,
            ErrorKind::Storage | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            code: kind.as_str(),
            message: format!("{error:#}"),
            status,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                code: self.code,
                message: self.message,
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct TrainingQuery {
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrainingResponse {
    pub skill: String,
    pub mode: Mode,
    pub page: String,
    pub summary: String,
}

#[derive(Debug, Serialize)]
pub struct JobsResponse {
    pub status: &'static str,
    pub message: &'static str,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/skills", get(list_skills))
        .route("/about", get(about))
        .route("/training/:skill", get(training))
        .route("/run-skill-scripts", post(run_skill_scripts))
        .with_state(state)
}

/// Allows `origin` with any method and header.
pub fn cors_layer(origin: &str) -> Result<CorsLayer> {
    let origin = HeaderValue::from_str(origin)
        .with_context(|| format!("invalid CORS origin: {origin}"))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

pub async fn serve(state: AppState, host: &str, port: u16, cors_origin: &str) -> Result<()> {
    let startup_store = state.store.clone();
    match tokio::task::spawn_blocking(move || startup_store.initialize()).await {
        Ok(Ok(())) => info!(database = %state.store.db_path().display(), "database ready"),
        Ok(Err(error)) => warn!("database initialization failed: {error:#}"),
        Err(error) => warn!("database initialization task failed: {error}"),
    }

    let app = router(state).layer(cors_layer(cors_origin)?);
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(address = %addr, "osrs_simplified server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated with an error")
}

async fn run_blocking<T, F>(task: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|error| AppError::internal(format!("blocking task failed: {error}")))?
        .map_err(AppError::from)
}

async fn ping(State(state): State<AppState>) -> Result<Json<PingStatus>, AppError> {
    let store = state.store.clone();
    match run_blocking(move || query::ping(&store)).await {
        Ok(status) => Ok(Json(status)),
        Err(error) => Err(AppError::with_code(
            ErrorKind::Storage.as_str(),
            format!("Database error: {}", error.message()),
        )),
    }
}

async fn list_skills(State(state): State<AppState>) -> Result<Json<SkillListing>, AppError> {
    let store = state.store.clone();
    let listing = run_blocking(move || query::list_skills(&store)).await?;
    Ok(Json(listing))
}

async fn about() -> Json<AboutInfo> {
    Json(query::about())
}

/// Fetches, cleans, and summarizes one guide on demand. Nothing is stored.
async fn training(
    State(state): State<AppState>,
    Path(skill): Path<String>,
    Query(params): Query<TrainingQuery>,
) -> Result<Json<TrainingResponse>, AppError> {
    let mode = match params.mode.as_deref() {
        Some(value) => Some(
            Mode::parse(value).map_err(|error| AppError::bad_request(format!("{error:#}")))?,
        ),
        None => None,
    };
    let entry = *find_entry(state.catalog, &skill, mode).ok_or_else(|| {
        AppError::not_found(format!("no training guide for skill: {skill}"))
    })?;
    let Some(llm) = state.llm.clone() else {
        return Err(AppError::service_unavailable(
            "summaries are disabled: OPENAI_API_KEY is not configured",
        ));
    };

    let wiki = Arc::clone(&state.wiki);
    let format = state.format;
    let response = run_blocking(move || {
        let resolved = fetch_with_fallback(wiki.as_ref(), entry.skill, entry.mode, entry.page)?;
        let content = clean_markup(&resolved.markup, format);
        let summary = summarize_content(llm.as_ref(), &content, entry.skill, entry.mode)?;
        Ok(TrainingResponse {
            skill: entry.skill.to_string(),
            mode: entry.mode,
            page: resolved.title,
            summary,
        })
    })
    .await?;
    Ok(Json(response))
}

async fn run_skill_scripts(State(state): State<AppState>) -> Result<Json<JobsResponse>, AppError> {
    let command = state.jobs.clone();
    match run_blocking(move || run_skill_jobs(&command)).await {
        Ok(_) => Ok(Json(JobsResponse {
            status: "success",
            message: "Scripts executed successfully.",
        })),
        Err(error) => {
            warn!("skill jobs failed: {}", error.message());
            Err(AppError::with_code(
                "job_failed",
                format!("Script failed: {}", error.message()),
            ))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!("failed to install SIGTERM handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
