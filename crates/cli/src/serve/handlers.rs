//! HTTP route handlers: health, record lookup, migration trigger.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tierstore_engine::TieringError;
use tierstore_storage::{ArchiveStore, PrimaryStore};
use time::OffsetDateTime;
use tracing::{info, warn};

use super::state::AppState;
use super::{json_error, TIER_HEADER};

/// Body of `POST /migrations`. An empty body means "use the configured
/// retention".
#[derive(Debug, Default, Deserialize)]
pub(crate) struct MigrationRequest {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub(crate) cutoff: Option<OffsetDateTime>,
}

fn status_for(err: &TieringError) -> StatusCode {
    match err {
        TieringError::InvalidId { .. } => StatusCode::BAD_REQUEST,
        TieringError::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        TieringError::Storage { .. } | TieringError::Corrupt { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: &TieringError) -> Response {
    json_error(status_for(err), &err.to_string()).into_response()
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

/// GET /records/{id}
pub(crate) async fn handle_get_record<P: PrimaryStore, A: ArchiveStore>(
    State(state): State<Arc<AppState<P, A>>>,
    Path(id): Path<String>,
) -> Response {
    match state.resolver.resolve(&id).await {
        Ok(Some(resolved)) => (
            StatusCode::OK,
            [(TIER_HEADER, resolved.tier.as_str())],
            Json(resolved.record),
        )
            .into_response(),
        Ok(None) => json_error(
            StatusCode::NOT_FOUND,
            &format!("record '{}' not found", id),
        )
        .into_response(),
        Err(e) => {
            if !matches!(e, TieringError::InvalidId { .. }) {
                warn!(%id, error = %e, "lookup failed");
            }
            error_response(&e)
        }
    }
}

/// POST /migrations
pub(crate) async fn handle_run_migration<P: PrimaryStore, A: ArchiveStore>(
    State(state): State<Arc<AppState<P, A>>>,
    body: Bytes,
) -> Response {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        MigrationRequest::default()
    } else {
        match serde_json::from_slice::<MigrationRequest>(&body) {
            Ok(r) => r,
            Err(e) => {
                return json_error(
                    StatusCode::BAD_REQUEST,
                    &format!("invalid migration request: {}", e),
                )
                .into_response()
            }
        }
    };

    let Ok(_running) = state.migration.try_lock() else {
        return json_error(StatusCode::CONFLICT, "a migration cycle is already running")
            .into_response();
    };

    let result = match request.cutoff {
        Some(cutoff) => {
            state
                .engine
                .run_cycle_with_cancel(cutoff, &state.shutdown)
                .await
        }
        None => state.engine.run_cycle_now(&state.shutdown).await,
    };

    match result {
        Ok(report) => {
            info!(archived = report.archived(), "migration triggered over http finished");
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(e) => {
            warn!(error = %e, "migration cycle failed");
            error_response(&e)
        }
    }
}
