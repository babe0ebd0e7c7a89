//! Caller identity extractor.
//!
//! The upstream authenticating proxy sets `x-caller-id`; the gateway only
//! uses it as an opaque key for rate limiting.

use std::convert::Infallible;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

pub const CALLER_HEADER: &str = "x-caller-id";
pub const ANONYMOUS: &str = "anonymous";

const MAX_IDENTITY_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CallerIdentity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= MAX_IDENTITY_LEN)
            .unwrap_or(ANONYMOUS);
        Ok(CallerIdentity(id.to_string()))
    }
}
