use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn availability_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/slots", get(handlers::get_slots))
        .route("/", get(handlers::list_availability))
        .route("/", post(handlers::upsert_availability))
        .route("/exceptions", get(handlers::list_exceptions))
        .route("/exceptions", post(handlers::create_exception))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
