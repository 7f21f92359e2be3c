use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::{appointment_routes, appointment_type_routes, stats_routes};
use audit_cell::router::audit_routes;
use availability_cell::router::availability_routes;
use policy_cell::router::policy_routes;
use shared_config::AppConfig;
use waitlist_cell::router::waitlist_routes;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinico scheduling API is running!" }))
        .nest("/availability", availability_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/appointment-types", appointment_type_routes(state.clone()))
        .nest("/policy", policy_routes(state.clone()))
        .nest("/waitlist", waitlist_routes(state.clone()))
        .nest("/admin/audit", audit_routes(state.clone()))
        .nest("/admin/stats", stats_routes(state))
}
