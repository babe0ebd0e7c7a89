pub mod auth;
pub mod facade;
pub mod identity;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind the bearer-token middleware).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/health", get(facade::health));

    let protected = Router::new()
        .route("/v1/domains", get(facade::list_domains))
        .route("/v1/:domain", post(facade::dispatch))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public.merge(protected)
}
