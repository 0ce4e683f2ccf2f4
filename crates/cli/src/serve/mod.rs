//! `tierstore serve` -- HTTP JSON API over the two tiers.
//!
//! Endpoints:
//! - GET  /health        - Server status
//! - GET  /records/{id}  - Tier-transparent lookup; the serving tier is
//!   reported in the `x-tierstore-tier` header
//! - POST /migrations    - Run one migration cycle, optionally with
//!   `{"cutoff": "<rfc3339>"}`, and return its report
//!
//! All responses use Content-Type: application/json.

mod handlers;
mod state;

use std::path::Path;
use std::sync::Arc;

use axum::http::{HeaderName, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tierstore_storage::{ArchiveStore, PrimaryStore};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use self::handlers::{handle_get_record, handle_health, handle_not_found, handle_run_migration};
use self::state::AppState;
use crate::commands::CmdResult;
use crate::tiers::Tiers;

/// Response header naming the tier that served a record.
pub(crate) const TIER_HEADER: &str = "x-tierstore-tier";

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

pub(crate) fn router<P: PrimaryStore, A: ArchiveStore>(state: Arc<AppState<P, A>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(TIER_HEADER)]);

    Router::new()
        .route("/health", get(handle_health))
        .route("/records/{id}", get(handle_get_record::<P, A>))
        .route("/migrations", post(handle_run_migration::<P, A>))
        .fallback(handle_not_found)
        .layer(cors)
        .with_state(state)
}

/// Open the configured tiers and serve until Ctrl-C.
pub(crate) async fn start_server(config: Option<&Path>, port: u16) -> CmdResult {
    let tiers = Tiers::open(config).await?;
    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState::new(
        tiers.resolver(),
        tiers.engine(),
        shutdown.clone(),
    ));
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("tierstore listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("server shut down");
    Ok(())
}

/// Wait for Ctrl-C, then stop any running migration cycle.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal");
    shutdown.cancel();
}
