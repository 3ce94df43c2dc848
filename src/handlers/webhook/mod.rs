//! Purge webhook.
//!
//! Endpoints:
//! - `POST /webhook/purge/{id}`: queue a purge of the message carrying `id`
//! - `GET /health`: health check
//!
//! The response never waits for the scan. 204 means the id was queued.

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;
use tracing::{debug, error, info};

use crate::dispatch::DispatchHandle;
use crate::validation::PurgeId;

/// Path prefix of the purge webhook.
pub const PURGE_PATH_PREFIX: &str = "/webhook/purge/";

/// Start the webhook server on `host:port`.
///
/// When `port` is 0, the OS assigns an ephemeral port. The actual bound
/// port is always logged so it can be discovered.
pub async fn serve(
    dispatch: DispatchHandle,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(dispatch);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let actual_port = listener.local_addr()?.port();
    info!(port = actual_port, "purge webhook listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the axum router (separated for testing).
pub fn router(dispatch: DispatchHandle) -> Router {
    Router::new()
        .route(PURGE_PATH_PREFIX, any(purge_without_id))
        .route("/webhook/purge/{*id}", any(purge))
        .route("/health", get(health))
        .with_state(dispatch)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn purge(
    method: Method,
    State(dispatch): State<DispatchHandle>,
    id: Result<Path<String>, PathRejection>,
) -> Response {
    let raw_id = id.map(|Path(id)| id).map_err(|e| e.body_text());
    handle_purge(&method, &dispatch, raw_id.as_deref().map_err(String::as_str))
}

async fn purge_without_id(method: Method, State(dispatch): State<DispatchHandle>) -> Response {
    handle_purge(&method, &dispatch, Ok(""))
}

/// The method is checked before the id so every non-POST call gets 501,
/// including ones whose id segment does not decode.
fn handle_purge(
    method: &Method,
    dispatch: &DispatchHandle,
    raw_id: Result<&str, &str>,
) -> Response {
    if method != Method::POST {
        return status_with_reason(StatusCode::NOT_IMPLEMENTED);
    }

    let raw_id = match raw_id {
        Ok(raw_id) => raw_id,
        Err(reason) => {
            debug!(error = %reason, "Rejected undecodable purge id");
            return (StatusCode::BAD_REQUEST, reason.to_string()).into_response();
        }
    };

    let id = match PurgeId::parse(raw_id) {
        Ok(id) => id,
        Err(e) => {
            debug!(id = %raw_id, error = %e, "Rejected purge request");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    match dispatch.submit(id.clone()) {
        Ok(()) => {
            debug!(value = %id, "Queued purge request");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            error!(value = %id, error = %e, "Failed to queue purge request");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Status code with its canonical reason phrase as the body.
fn status_with_reason(status: StatusCode) -> Response {
    let reason = status.canonical_reason().unwrap_or_default();
    (status, reason).into_response()
}

#[cfg(test)]
mod tests;
