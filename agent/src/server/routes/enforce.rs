use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::{get, post};
use axum::{Json, Router};
use envelo_core::{Boundary, CheckOutcome, Parameters};
use serde::{Deserialize, Serialize};

use crate::engine::Enforcement;
use crate::registry::Registry;
use crate::runtime::AgentRuntime;
use crate::server::AppError;

const DEFAULT_ACTION_TYPE: &str = "action";

pub fn router<R: Registry>() -> Router<AgentRuntime<R>> {
    Router::new()
        .route("/v1/enforce", post(enforce_action::<R>))
        .route("/v1/check", post(check_parameter::<R>))
        .route("/v1/boundaries", get(list_boundaries::<R>))
}

#[derive(Debug, Deserialize)]
pub struct EnforceRequest {
    #[serde(default)]
    pub action_type: Option<String>,
    pub parameters: Parameters,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionLabel {
    Allowed,
    Blocked,
}

#[derive(Debug, Serialize)]
pub struct EnforceResponse {
    pub decision: DecisionLabel,
    #[serde(flatten)]
    pub enforcement: Enforcement,
}

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Serialize)]
pub struct BoundariesResponse {
    pub boundaries: Vec<Boundary>,
}

/// Evaluate and record one action.
///
/// A blocked action is a normal 200 outcome; the host branches on
/// `decision`. After the session has stopped every call is refused.
pub async fn enforce_action<R: Registry>(
    State(runtime): State<AgentRuntime<R>>,
    payload: Result<Json<EnforceRequest>, JsonRejection>,
) -> Result<Json<EnforceResponse>, AppError> {
    let state = runtime.state();
    if state.is_winding_down() {
        return Err(AppError::AgentStopped { state });
    }
    let Json(req) = payload?;

    let action_type = req
        .action_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_ACTION_TYPE);
    let enforcement = runtime.engine().enforce_params(action_type, &req.parameters);
    let decision = if enforcement.ok() {
        DecisionLabel::Allowed
    } else {
        DecisionLabel::Blocked
    };

    Ok(Json(EnforceResponse {
        decision,
        enforcement,
    }))
}

/// Evaluate one parameter without recording telemetry.
pub async fn check_parameter<R: Registry>(
    State(runtime): State<AgentRuntime<R>>,
    payload: Result<Json<CheckRequest>, JsonRejection>,
) -> Result<Json<CheckOutcome>, AppError> {
    let Json(req) = payload?;
    if req.name.trim().is_empty() {
        return Err(AppError::Validation {
            message: "name must not be empty".to_string(),
            field: Some("name".to_string()),
            docs_hint: Some("Send {\"name\": \"velocity_max\", \"value\": 12.5}".to_string()),
        });
    }
    Ok(Json(runtime.engine().check(&req.name, req.value)))
}

pub async fn list_boundaries<R: Registry>(
    State(runtime): State<AgentRuntime<R>>,
) -> Json<BoundariesResponse> {
    Json(BoundariesResponse {
        boundaries: runtime.engine().boundaries(),
    })
}
