/**
 * HTTP INTAKE - registration endpoints for the Chef handler
 *
 * Routes:
 *   POST /register, POST /unregister   decode the JSON body and enqueue a job
 *   GET  /health                       liveness, always open
 *   GET  /system/health                counters, queue depth, MQTT link
 *   GET  /                             404
 *
 * Intake answers as soon as the job is queued; the outcome of the job itself
 * only shows up in the logs and health counters.
 *
 * When `http.api_key` is set every route except /health requires a matching
 * `x-api-key` header.
 */

use crate::health::{AutomatorHealth, HealthTracker};
use crate::models::JobAction;
use crate::queue::JobQueue;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct AppState {
    pub queue: JobQueue,
    pub health_tracker: HealthTracker,
    pub api_key: Option<String>,
}

async fn require_api_key(
    State(app): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = app.api_key.as_deref().filter(|k| !k.is_empty()) else {
        return Ok(next.run(req).await);
    };
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        warn!(path = %req.uri().path(), "rejected request without valid api key");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { StatusCode::NOT_FOUND }))
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/register", post(register))
        .route("/unregister", post(unregister))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

// POST /register
async fn register(State(app): State<AppState>, body: String) -> (StatusCode, Json<Value>) {
    accept(&app, JobAction::Register, &body)
}

// POST /unregister
async fn unregister(State(app): State<AppState>, body: String) -> (StatusCode, Json<Value>) {
    accept(&app, JobAction::Unregister, &body)
}

fn accept(app: &AppState, action: JobAction, body: &str) -> (StatusCode, Json<Value>) {
    let queued = serde_json::from_str::<Value>(body)
        .map_err(|e| e.to_string())
        .and_then(|data| app.queue.enqueue(action.to_string(), data).map_err(|e| e.to_string()));

    match queued {
        Ok(job_id) => {
            debug!(job_id = %job_id, action = %action, "accepted job");
            (StatusCode::OK, Json(json!({ "success": true })))
        }
        Err(error) => {
            warn!(action = %action, error = %error, "rejected job");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": error })),
            )
        }
    }
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<AutomatorHealth> {
    Json(app.health_tracker.get_health(app.queue.depth()))
}
