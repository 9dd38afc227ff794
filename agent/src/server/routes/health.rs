use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router, routing::get};
use envelo_core::StatsSnapshot;
use serde::Serialize;
use uuid::Uuid;

use crate::registry::Registry;
use crate::runtime::AgentRuntime;
use crate::session::SessionState;

pub fn router<R: Registry>() -> Router<AgentRuntime<R>> {
    Router::new().route("/health", get(health_check::<R>))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub session_id: Uuid,
    pub certificate_id: String,
    pub state: SessionState,
    pub stats: StatsSnapshot,
    pub journal_depth: usize,
    pub version: &'static str,
}

/// Session health. 503 once the session is winding down, since the host is
/// no longer protected.
pub async fn health_check<R: Registry>(
    State(runtime): State<AgentRuntime<R>>,
) -> impl IntoResponse {
    let state = runtime.state();
    let (http_status, status) = match state {
        SessionState::Running => (StatusCode::OK, "ok"),
        SessionState::Unstarted | SessionState::Starting => (StatusCode::OK, "starting"),
        SessionState::Stopping | SessionState::Stopped => {
            (StatusCode::SERVICE_UNAVAILABLE, "stopped")
        }
    };

    (
        http_status,
        Json(HealthResponse {
            status,
            session_id: runtime.session_id(),
            certificate_id: runtime.settings().certificate_id.clone(),
            state,
            stats: runtime.engine().stats(),
            journal_depth: runtime.engine().journal().len(),
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use envelo_core::BoundaryCatalog;
    use tower::ServiceExt;

    use crate::autostart::NoAutostart;
    use crate::config::RuntimeSettings;
    use crate::runtime::AgentRuntime;
    use crate::server::router;
    use crate::session::ShutdownReason;
    use crate::testing::ScriptedRegistry;

    async fn get_health(runtime: &AgentRuntime<ScriptedRegistry>) -> (StatusCode, serde_json::Value) {
        let response = router(runtime.clone())
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        (status, serde_json::from_slice(&bytes).expect("body should be JSON"))
    }

    #[tokio::test]
    async fn running_session_reports_ok_then_503_after_stop() {
        let runtime = AgentRuntime::new(
            RuntimeSettings::new("ODD-2026-0042"),
            ScriptedRegistry::new(),
            BoundaryCatalog::default(),
            Box::new(NoAutostart),
        );
        runtime.start().await.unwrap();

        let (status, body) = get_health(&runtime).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["state"], "RUNNING");
        assert_eq!(body["certificate_id"], "ODD-2026-0042");
        assert_eq!(body["session_id"], runtime.session_id().to_string());

        runtime.shutdown(ShutdownReason::Requested).await;
        let (status, body) = get_health(&runtime).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["state"], "STOPPED");
    }
}
