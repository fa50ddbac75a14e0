//! HTTP control surface: run lifecycle, stepping, event queries, and
//! the territory inspector, over a single in-process engine.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use contracts::{
    ApiError, ColonyCommand, ErrorCode, Event, RunConfig, RunStatus, Snapshot, SCHEMA_VERSION_V1,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::persistence::SqliteColonyStore;
use crate::{EngineApi, PersistedRunSummary, PersistenceError};

const DEFAULT_PAGE_SIZE: usize = 500;
const MAX_PAGE_SIZE: usize = 5000;
const DEFAULT_SQLITE_PATH: &str = "colony_runs.sqlite";

#[derive(Debug)]
pub enum ServerError {
    Io(std::io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "server io error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug)]
struct HttpApiError {
    status: StatusCode,
    error: ApiError,
}

impl HttpApiError {
    fn run_not_found(requested_run_id: &str, active_run_id: Option<&str>) -> Self {
        let details = active_run_id
            .map(|active| format!("requested_run_id={requested_run_id} active_run_id={active}"));
        Self {
            status: StatusCode::NOT_FOUND,
            error: ApiError::new(
                ErrorCode::RunNotFound,
                "run_id does not match an active run",
                details,
            ),
        }
    }

    fn invalid_query(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::new(ErrorCode::InvalidQuery, message, details),
        }
    }

    fn tick_fault(details: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: ApiError::new(
                ErrorCode::TickFault,
                "fatal scheduling fault; the run is halted",
                Some(details),
            ),
        }
    }

    fn from_persistence(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotAttached => {
                Self::invalid_query("persistence store is not attached", None)
            }
            PersistenceError::RunAlreadyExists(run_id) => Self {
                status: StatusCode::CONFLICT,
                error: ApiError::new(
                    ErrorCode::RunStateConflict,
                    "run_id already exists; pass replace_existing=true to replace",
                    Some(format!("run_id={run_id}")),
                ),
            },
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                error: ApiError::new(
                    ErrorCode::InternalError,
                    "persistence operation failed",
                    Some(other.to_string()),
                ),
            },
        }
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

#[derive(Clone)]
struct AppState {
    inner: Arc<Mutex<AppInner>>,
}

struct AppInner {
    engine: Option<EngineApi>,
}

impl AppState {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(AppInner { engine: None })),
        }
    }
}

pub async fn serve(addr: SocketAddr) -> Result<(), ServerError> {
    let state = AppState::new();
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/runs", post(create_run).get(list_runs))
        .route("/api/v1/runs/{run_id}/start", post(start_run))
        .route("/api/v1/runs/{run_id}/pause", post(pause_run))
        .route("/api/v1/runs/{run_id}/step", post(step_run))
        .route("/api/v1/runs/{run_id}/run_to_tick", post(run_to_tick))
        .route("/api/v1/runs/{run_id}/status", get(get_status))
        .route("/api/v1/runs/{run_id}/events", get(get_events))
        .route("/api/v1/runs/{run_id}/snapshot", get(get_snapshot))
        .route("/api/v1/runs/{run_id}/commands", post(submit_command))
        .route(
            "/api/v1/runs/{run_id}/territory/{territory_id}",
            get(get_territory),
        )
        .with_state(state)
}

fn default_sqlite_path() -> String {
    std::env::var("COLONY_SQLITE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SQLITE_PATH.to_string())
}

/// Resolve the active engine for a run id under the caller's lock.
fn engine_for<'a>(
    inner: &'a mut AppInner,
    run_id: &str,
) -> Result<&'a mut EngineApi, HttpApiError> {
    match inner.engine.as_mut() {
        Some(engine) if engine.run_id() == run_id => Ok(engine),
        Some(engine) => Err(HttpApiError::run_not_found(run_id, Some(engine.run_id()))),
        None => Err(HttpApiError::run_not_found(run_id, None)),
    }
}

// ---------------------------------------------------------------------------
// Run lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CreateRunRequest {
    Config(RunConfig),
    WithOptions(CreateRunOptions),
}

#[derive(Debug, Deserialize)]
struct CreateRunOptions {
    config: RunConfig,
    auto_start: Option<bool>,
    sqlite_path: Option<String>,
    replace_existing: Option<bool>,
}

#[derive(Debug, Serialize)]
struct CreateRunResponse {
    schema_version: String,
    run_id: String,
    status: RunStatus,
    started: bool,
}

async fn create_run(
    State(state): State<AppState>,
    Json(request): Json<CreateRunRequest>,
) -> Result<Json<CreateRunResponse>, HttpApiError> {
    let (config, auto_start, sqlite_path, replace_existing) = match request {
        CreateRunRequest::Config(config) => (config, false, default_sqlite_path(), true),
        CreateRunRequest::WithOptions(options) => (
            options.config,
            options.auto_start.unwrap_or(false),
            options
                .sqlite_path
                .filter(|path| !path.trim().is_empty())
                .unwrap_or_else(default_sqlite_path),
            options.replace_existing.unwrap_or(false),
        ),
    };

    let mut engine = EngineApi::from_config(config);
    engine
        .attach_sqlite_store(&sqlite_path)
        .map_err(HttpApiError::from_persistence)?;
    engine
        .initialize_run_storage(replace_existing)
        .map_err(HttpApiError::from_persistence)?;

    if auto_start {
        engine.start();
    }
    let run_id = engine.run_id().to_string();
    let status = engine.status();

    let mut inner = state.inner.lock().await;
    inner.engine = Some(engine);

    Ok(Json(CreateRunResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        run_id,
        status,
        started: auto_start,
    }))
}

#[derive(Debug, Deserialize)]
struct ListRunsQuery {
    page_size: Option<usize>,
    sqlite_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct RunSummaryDto {
    run_id: String,
    status: RunStatus,
    updated_tick: u64,
}

#[derive(Debug, Serialize)]
struct ListRunsResponse {
    schema_version: String,
    active_run_id: Option<String>,
    runs: Vec<RunSummaryDto>,
}

async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<ListRunsResponse>, HttpApiError> {
    let page_size = query.page_size.unwrap_or(200).clamp(1, MAX_PAGE_SIZE);
    let sqlite_path = query
        .sqlite_path
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(default_sqlite_path);

    let active_run_id = {
        let inner = state.inner.lock().await;
        inner
            .engine
            .as_ref()
            .map(|engine| engine.run_id().to_string())
    };

    let store =
        SqliteColonyStore::open(sqlite_path).map_err(HttpApiError::from_persistence)?;
    let runs = store
        .list_runs(page_size)
        .map_err(HttpApiError::from_persistence)?
        .into_iter()
        .map(|summary: PersistedRunSummary| RunSummaryDto {
            run_id: summary.run_id,
            status: summary.status,
            updated_tick: summary.updated_tick,
        })
        .collect();

    Ok(Json(ListRunsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        active_run_id,
        runs,
    }))
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    schema_version: String,
    status: RunStatus,
    persistence_error: Option<String>,
}

async fn start_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<StatusResponse>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let engine = engine_for(&mut inner, &run_id)?;
    let status = engine.start();
    Ok(Json(StatusResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        status,
        persistence_error: engine.last_persistence_error().map(String::from),
    }))
}

async fn pause_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<StatusResponse>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let engine = engine_for(&mut inner, &run_id)?;
    let status = engine.pause();
    Ok(Json(StatusResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        status,
        persistence_error: engine.last_persistence_error().map(String::from),
    }))
}

async fn get_status(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<StatusResponse>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let engine = engine_for(&mut inner, &run_id)?;
    Ok(Json(StatusResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        status: engine.status(),
        persistence_error: engine.last_persistence_error().map(String::from),
    }))
}

// ---------------------------------------------------------------------------
// Stepping
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct StepRequest {
    ticks: Option<u64>,
}

#[derive(Debug, Serialize)]
struct StepResponse {
    schema_version: String,
    status: RunStatus,
    committed_ticks: u64,
}

async fn step_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Json(request): Json<StepRequest>,
) -> Result<Json<StepResponse>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let engine = engine_for(&mut inner, &run_id)?;
    let (status, committed_ticks) = engine
        .step(request.ticks.unwrap_or(1).max(1))
        .map_err(|fault| HttpApiError::tick_fault(fault.to_string()))?;
    Ok(Json(StepResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        status,
        committed_ticks,
    }))
}

#[derive(Debug, Deserialize)]
struct RunToTickRequest {
    tick: u64,
}

async fn run_to_tick(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Json(request): Json<RunToTickRequest>,
) -> Result<Json<StepResponse>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let engine = engine_for(&mut inner, &run_id)?;
    let (status, committed_ticks) = engine
        .run_to_tick(request.tick)
        .map_err(|fault| HttpApiError::tick_fault(fault.to_string()))?;
    Ok(Json(StepResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        status,
        committed_ticks,
    }))
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EventsQuery {
    after: Option<usize>,
    page_size: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EventsResponse {
    schema_version: String,
    next_index: usize,
    events: Vec<Event>,
}

async fn get_events(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let engine = engine_for(&mut inner, &run_id)?;

    let after = query.after.unwrap_or(0);
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let all = engine.events();
    if after > all.len() {
        return Err(HttpApiError::invalid_query(
            "after index is beyond the event log",
            Some(format!("after={after} log_len={}", all.len())),
        ));
    }
    let page: Vec<Event> = all[after..].iter().take(page_size).cloned().collect();
    let next_index = after + page.len();

    Ok(Json(EventsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        next_index,
        events: page,
    }))
}

#[derive(Debug, Serialize)]
struct SnapshotResponse {
    schema_version: String,
    snapshot: Snapshot,
}

async fn get_snapshot(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<SnapshotResponse>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let engine = engine_for(&mut inner, &run_id)?;
    Ok(Json(SnapshotResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        snapshot: engine.snapshot(),
    }))
}

async fn get_territory(
    State(state): State<AppState>,
    Path((run_id, territory_id)): Path<(String, String)>,
) -> Result<Json<Value>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let engine = engine_for(&mut inner, &run_id)?;
    engine
        .territory_inspector(&territory_id)
        .map(Json)
        .ok_or_else(|| {
            HttpApiError::invalid_query(
                "unknown territory",
                Some(format!("territory_id={territory_id}")),
            )
        })
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CommandResponse {
    schema_version: String,
    accepted: bool,
    status: RunStatus,
}

async fn submit_command(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Json(command): Json<ColonyCommand>,
) -> Result<Json<CommandResponse>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let engine = engine_for(&mut inner, &run_id)?;
    engine.apply_command(command);
    Ok(Json(CommandResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        accepted: true,
        status: engine.status(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_state_with_run(run_id: &str) -> AppState {
        let state = AppState::new();
        let config = RunConfig {
            run_id: run_id.to_string(),
            seed: 5,
            max_ticks: 20,
            territory_count: 2,
            ..RunConfig::default()
        };
        state.inner.lock().await.engine = Some(EngineApi::from_config(config));
        state
    }

    #[tokio::test]
    async fn unknown_run_is_a_404() {
        let state = test_state_with_run("run_active").await;
        let mut inner = state.inner.lock().await;
        let err = engine_for(&mut inner, "run_other").expect_err("mismatch");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.error.error_code, ErrorCode::RunNotFound);
    }

    #[tokio::test]
    async fn matching_run_passes_the_guard() {
        let state = test_state_with_run("run_active").await;
        let mut inner = state.inner.lock().await;
        assert!(engine_for(&mut inner, "run_active").is_ok());
    }
}
