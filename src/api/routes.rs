//! API route definitions.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use super::state::AppState;
use crate::analysis::QueryContext;
use crate::dataset;
use crate::error::TelemetryError;
use crate::pipeline::RunStateRecord;
use crate::scheduler::RunTrigger;
use crate::storage::list_runs;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/runs/last", get(last_run))
        .route("/runs", get(run_history).post(trigger_run))
        .route("/ask", post(ask))
}

#[derive(Debug)]
enum ApiError {
    BadRequest(&'static str),
    NotFound(&'static str),
    Conflict(&'static str),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, *msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, *msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, *msg),
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "run_in_progress": state.runner.guard().is_running(),
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn last_run(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let path = &state.runner.paths().last_run_file;
    match RunStateRecord::read(path) {
        Ok(Some(record)) => Ok(Json(json!({ "data": record }))),
        Ok(None) => Err(ApiError::NotFound("no completed run yet")),
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn run_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let Some(pool) = state.runner.pool() else {
        return Ok(Json(json!({ "data": [], "meta": { "total": 0 } })));
    };
    let runs = list_runs(pool, query.limit.unwrap_or(50))
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({ "meta": { "total": runs.len() }, "data": runs })))
}

async fn trigger_run(State(state): State<AppState>) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Some(permit) = state.runner.guard().try_acquire() else {
        state.runner.skip(RunTrigger::Api);
        return Err(ApiError::Conflict("a nightly run is already in progress"));
    };
    let run_id = Uuid::new_v4();
    info!(%run_id, "nightly run requested over API");
    let runner = state.runner.clone();
    tokio::spawn(async move {
        runner.run_with(permit, RunTrigger::Api, run_id).await;
    });
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "data": { "run_id": run_id, "status": "started" } })),
    ))
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    question: String,
}

async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.question.trim().is_empty() {
        return Err(ApiError::BadRequest("question must not be empty"));
    }
    let paths = state.runner.paths().clone();
    let context = tokio::task::spawn_blocking(move || {
        let ds = dataset::load_or_decode(&paths.csv_file, &paths.bin_file)?;
        QueryContext::build(&ds)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?
    .map_err(|e| match e {
        TelemetryError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            ApiError::NotFound("no telemetry dataset yet")
        }
        TelemetryError::EmptyDataset { .. } => ApiError::NotFound("no telemetry dataset yet"),
        other => ApiError::Internal(other.to_string()),
    })?;

    let answer = state
        .runner
        .collaborators()
        .answer(&request.question, &context)
        .await;
    Ok(Json(json!({
        "data": {
            "question": request.question,
            "answer": answer,
            "schema": context.schema,
            "context_preview": context.preview(),
        }
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::router;
    use crate::collaborators::Collaborators;
    use crate::config::{Config, PathsConfig};
    use crate::pipeline::PipelineContext;
    use crate::scheduler::NightlyRunner;
    use crate::storage::open_pool;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt; // for `oneshot`

    fn state(root: &std::path::Path) -> AppState {
        let config = Config {
            paths: PathsConfig::under(root),
            ..Config::default()
        };
        let ctx = PipelineContext::from_config(&config).unwrap();
        let pool = open_pool(&config.paths.history_db).unwrap();
        AppState {
            runner: NightlyRunner::new(
                ctx,
                Collaborators::offline(),
                Some(pool),
                Duration::from_secs(60),
            ),
        }
    }

    async fn send(state: AppState, method: &str, uri: &str) -> (StatusCode, Value) {
        send_body(state, method, uri, Body::empty()).await
    }

    async fn send_body(state: AppState, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1_000_000)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let (status, json) = send(state(dir.path()), "GET", "/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "ok");
        assert_eq!(json["data"]["run_in_progress"], false);
    }

    #[tokio::test]
    async fn test_last_run_missing_then_present() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let (status, _) = send(state.clone(), "GET", "/api/v1/runs/last").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let record = RunStateRecord {
            timestamp: "2025-03-14 02:00:05 IST".to_string(),
            total_packets: 500,
            anomaly_count: 6,
            csv_file: "data/telemetry_packets.csv".to_string(),
            bin_file: "data/telemetry_packets.bin".to_string(),
            report_pdf: "reports/nightly_20250314_020005.txt".to_string(),
        };
        record.write_atomic(&state.runner.paths().last_run_file).unwrap();
        let (status, json) = send(state, "GET", "/api/v1/runs/last").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["anomaly_count"], 6);
    }

    #[tokio::test]
    async fn test_trigger_conflicts_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let held = state.runner.guard().try_acquire().unwrap();

        let (status, json) = send(state.clone(), "POST", "/api/v1/runs").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["error"].is_string());
        drop(held);

        let (status, json) = send(state, "GET", "/api/v1/runs").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["meta"]["total"], 1);
        assert_eq!(json["data"][0]["status"], "Skipped");
    }

    #[tokio::test]
    async fn test_ask_answers_from_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let question = || Body::from(r#"{"question":"Any thermal issues?"}"#);

        let (status, _) = send_body(state.clone(), "POST", "/api/v1/ask", question()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let mut generator =
            crate::generator::Generator::new(&crate::generator::NominalProfile::default(), Some(11)).unwrap();
        let packets = generator.generate(50, 1_700_000_000, 0.0, &[]);
        crate::packet::codec::write_packets(&state.runner.paths().bin_file, &packets).unwrap();

        let (status, json) = send_body(state.clone(), "POST", "/api/v1/ask", question()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["question"], "Any thermal issues?");
        assert!(json["data"]["answer"].as_str().unwrap().contains("temp_c"));
        assert_eq!(json["data"]["schema"].as_array().unwrap().len(), 8);
        assert!(json["data"]["context_preview"]
            .as_str()
            .unwrap()
            .starts_with("Total packets: 50"));

        let (status, _) =
            send_body(state, "POST", "/api/v1/ask", Body::from(r#"{"question":"  "}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
