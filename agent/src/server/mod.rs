//! Loopback HTTP surface so out-of-process hosts can reach the engine.

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::registry::Registry;
use crate::runtime::AgentRuntime;

mod error;
mod routes;

pub use error::AppError;

pub fn router<R: Registry>(runtime: AgentRuntime<R>) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::enforce::router())
        .layer(TraceLayer::new_for_http())
        .with_state(runtime)
}

/// Serve until the runtime reaches STOPPED.
pub async fn serve<R: Registry>(
    listener: TcpListener,
    runtime: AgentRuntime<R>,
) -> std::io::Result<()> {
    let app = router(runtime.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { runtime.wait_stopped().await })
        .await
}
