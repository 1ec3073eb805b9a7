use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::dashboard::{build_dashboard_payload, DashboardPayload};
use crate::jsonl::append_line;
use crate::normalize::{coerce_productive, format_ts, parse_timestamp};
use crate::scheduler::{RunOutcome, Triggers};
use crate::store::MetricsStore;

#[derive(Clone)]
pub struct AppState {
    cfg: Arc<Config>,
    store: MetricsStore,
    triggers: Triggers,
    // Serializes appends to the classification log.
    append_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(cfg: Arc<Config>, store: MetricsStore, triggers: Triggers) -> Self {
        AppState {
            cfg,
            store,
            triggers,
            append_lock: Arc::new(Mutex::new(())),
        }
    }
}

#[derive(Serialize)]
struct OkResponse<T: Serialize> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

#[derive(Serialize)]
struct ErrResponse {
    ok: bool,
    error: &'static str,
}

fn ok<T: Serialize>(data: T) -> Response {
    Json(OkResponse {
        ok: true,
        data: Some(data),
    })
    .into_response()
}

fn err(status: StatusCode, error: &'static str) -> Response {
    (status, Json(ErrResponse { ok: false, error })).into_response()
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .route("/dashboard", get(get_dashboard))
        .route(
            "/classification",
            post(post_classification).options(options_ok),
        )
        .route("/tasks/:name/run", post(post_task_run).options(options_ok))
        .with_state(state)
        .layer(cors)
}

async fn options_ok() -> impl IntoResponse {
    StatusCode::OK
}

#[derive(Serialize)]
struct HealthInfo {
    service: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(OkResponse {
        ok: true,
        data: Some(HealthInfo {
            service: "tracklet_core",
            version: env!("CARGO_PKG_VERSION"),
        }),
    })
}

async fn get_dashboard(State(state): State<AppState>) -> Response {
    let AppState { cfg, store, .. } = state;
    match tokio::task::spawn_blocking(move || build_dashboard_payload(&cfg, &store)).await {
        Ok(payload) => ok::<DashboardPayload>(payload),
        Err(e) => {
            error!("dashboard build failed: {e}");
            err(StatusCode::INTERNAL_SERVER_ERROR, "internal")
        }
    }
}

#[derive(Serialize)]
struct TaskRun {
    task: String,
    outcome: RunOutcome,
}

/// Run one periodic task now. A task that is mid-cycle reports `skipped`.
async fn post_task_run(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.triggers.run(&name).await {
        Some(outcome) => ok(TaskRun { task: name, outcome }),
        None => err(StatusCode::NOT_FOUND, "unknown_task"),
    }
}

#[derive(Deserialize)]
struct ClassificationIn {
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    app_name: Option<String>,
    #[serde(default)]
    window_title: Option<String>,
    #[serde(default)]
    productive: Value,
}

/// One ClassificationLog line as written by the classifier endpoint.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ClassificationLine {
    pub timestamp: String,
    pub app_name: String,
    pub window_title: String,
    pub productive: Option<bool>,
}

/// Validate a classifier judgment. A missing timestamp means now, at second precision in
/// the local offset; a present but unparseable one is rejected.
fn classification_line(
    body: ClassificationIn,
    cfg: &Config,
    now: OffsetDateTime,
) -> Result<ClassificationLine, &'static str> {
    let ts = match body.timestamp.as_deref().map(str::trim) {
        None | Some("") => now.to_offset(cfg.tz_offset).replace_nanosecond(0).unwrap_or(now),
        Some(raw) => parse_timestamp(raw, cfg.tz_offset).ok_or("invalid_timestamp")?,
    };
    let text = |v: Option<String>| v.filter(|s| !s.trim().is_empty()).unwrap_or_else(|| "unknown".into());
    Ok(ClassificationLine {
        timestamp: format_ts(ts),
        app_name: text(body.app_name),
        window_title: text(body.window_title),
        productive: coerce_productive(&body.productive),
    })
}

async fn post_classification(State(state): State<AppState>, Json(payload): Json<Value>) -> Response {
    let body: ClassificationIn = match serde_json::from_value(payload) {
        Ok(v) => v,
        Err(_) => return err(StatusCode::BAD_REQUEST, "invalid_json"),
    };
    let line = match classification_line(body, &state.cfg, OffsetDateTime::now_utc()) {
        Ok(l) => l,
        Err(code) => return err(StatusCode::BAD_REQUEST, code),
    };

    let path = state.cfg.classification_log();
    let _guard = state.append_lock.lock().await;
    if let Err(e) = append_line(&path, &line) {
        error!("classification append failed: {e}");
        return err(StatusCode::INTERNAL_SERVER_ERROR, "write_failed");
    }
    info!(
        "classification recorded: {} productive={:?}",
        line.app_name, line.productive
    );
    ok(line)
}
