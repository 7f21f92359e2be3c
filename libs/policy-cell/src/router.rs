use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn policy_routes(state: Arc<AppConfig>) -> Router {
    // Reads require any authenticated caller; the write path is admin-only
    // (enforced in the handler).
    let protected_routes = Router::new()
        .route("/", get(handlers::get_policy))
        .route("/", post(handlers::update_policy))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
