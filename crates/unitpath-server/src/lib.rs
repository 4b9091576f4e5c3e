//! unitpath-server: HTTP/JSON interface to the learning engine.
//!
//! Student identity comes from the `x-student-id` header set by the auth
//! gateway; the session correlation id from `x-session-id`.

pub mod context;
pub mod envelope;
pub mod handlers;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use unitpath_core::engine::LearningEngine;

pub use envelope::{ApiError, ApiResponse};

/// Build the application router.
pub fn build_router(engine: Arc<LearningEngine>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/answers", post(handlers::submit_answer))
        .route("/api/answers/skip", post(handlers::skip))
        .route("/api/units/batch-unlock", post(handlers::batch_unlock))
        .route("/api/units/:unit_id/progress", get(handlers::unit_progress))
        .route(
            "/api/tracks/:subject_code/access",
            get(handlers::track_access),
        )
        .route("/api/placement", post(handlers::start_placement))
        .route(
            "/api/placement/:plan_id/answers",
            post(handlers::answer_placement),
        )
        .route(
            "/api/placement/:plan_id/finish",
            post(handlers::finish_placement),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(engine: Arc<LearningEngine>, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        addr = %listener.local_addr()?,
        store = engine.store_name(),
        content = engine.content_name(),
        "unitpath server listening"
    );

    axum::serve(listener, build_router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
