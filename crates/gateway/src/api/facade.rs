//! Facade endpoints.
//!
//! - `POST /v1/:domain`: body is the request envelope, response is the
//!   response envelope; the HTTP status mirrors the error code
//! - `GET /v1/domains`: registered facades, their switches and commands
//! - `GET /health`: liveness

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};

use fg_domain::error::ErrorCode;

use crate::api::identity::CallerIdentity;
use crate::state::AppState;

/// HTTP status for a dispatch outcome.
pub fn status_for(code: Option<ErrorCode>) -> StatusCode {
    match code {
        None => StatusCode::OK,
        Some(ErrorCode::InvalidInput) => StatusCode::BAD_REQUEST,
        Some(ErrorCode::NotFound) => StatusCode::NOT_FOUND,
        Some(ErrorCode::Disabled) => StatusCode::FORBIDDEN,
        Some(ErrorCode::Conflict) => StatusCode::CONFLICT,
        Some(ErrorCode::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
        Some(ErrorCode::ProviderUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
        Some(ErrorCode::Timeout) => StatusCode::GATEWAY_TIMEOUT,
        Some(ErrorCode::Internal) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn dispatch(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    CallerIdentity(caller): CallerIdentity,
    body: Bytes,
) -> Response {
    let dispatched = state.dispatcher.dispatch_json(&domain, &body, &caller).await;

    let status = status_for(dispatched.error_code);
    let mut response = (status, Json(dispatched.response)).into_response();
    if let Some(secs) = dispatched.retry_after_secs {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}

pub async fn list_domains(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "domains": state.dispatcher.registry().domains() }))
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
