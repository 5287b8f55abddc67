//! API route definitions and router builder.

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{InjectError, InjectResult};
use crate::scenarios::Scenario;
use crate::state::AppState;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/fault/scenario/{name}", post(trigger_scenario))
        .route("/api/fault/reset", post(reset_all))
        .route("/api/fault/scenarios", get(list_scenarios))
        .route("/api/fault/control/acquire", post(acquire_lock))
        .route("/api/fault/control/release", post(release_lock))
        .route("/api/fault/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Deserialize, Default)]
struct ScenarioParams {
    client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LockBody {
    client_id: String,
}

async fn trigger_scenario(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<ScenarioParams>,
) -> InjectResult<axum::Json<Value>> {
    let scenario =
        Scenario::from_name(&name).ok_or_else(|| InjectError::UnknownScenario(name.clone()))?;

    state.lock.permits(params.client_id.as_deref())?;

    let bus = state.bus_provider.open().await?;
    let result = scenario
        .run(&*bus, &state.codec, state.broker.as_deref())
        .await?;
    tracing::info!(scenario = scenario.name(), "scenario complete");

    Ok(axum::Json(json!({
        "scenario": scenario.name(),
        "result": result,
    })))
}

async fn reset_all(
    State(state): State<AppState>,
    Query(params): Query<ScenarioParams>,
) -> InjectResult<axum::Json<Value>> {
    state.lock.permits(params.client_id.as_deref())?;

    let bus = state.bus_provider.open().await?;
    let result = Scenario::Reset
        .run(&*bus, &state.codec, state.broker.as_deref())
        .await?;
    Ok(axum::Json(json!({ "result": result })))
}

async fn list_scenarios() -> axum::Json<Value> {
    let scenarios: serde_json::Map<String, Value> = Scenario::ALL
        .iter()
        .map(|s| (s.name().to_string(), Value::String(s.description().to_string())))
        .collect();
    axum::Json(json!({ "scenarios": scenarios }))
}

async fn acquire_lock(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<LockBody>,
) -> InjectResult<axum::Json<Value>> {
    let lock_state = state.lock.acquire(&body.client_id)?;
    tracing::info!(client_id = %body.client_id, "control lock acquired");
    Ok(axum::Json(serde_json::to_value(lock_state).unwrap_or_default()))
}

async fn release_lock(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<LockBody>,
) -> InjectResult<axum::Json<Value>> {
    let lock_state = state.lock.release(&body.client_id)?;
    tracing::info!(client_id = %body.client_id, "control lock released");
    Ok(axum::Json(serde_json::to_value(lock_state).unwrap_or_default()))
}

async fn health() -> axum::Json<Value> {
    axum::Json(json!({
        "status": "ok",
        "service": "sil-fault-inject",
        "can_channel": std::env::var("CAN_CHANNEL").unwrap_or_else(|_| "vcan0".to_string()),
    }))
}
