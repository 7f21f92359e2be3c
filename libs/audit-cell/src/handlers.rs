use std::sync::Arc;

use axum::{
    extract::{Extension, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::require_admin;

use crate::models::AuditLogQuery;
use crate::services::AuditService;

/// Admin view over the audit trail.
#[axum::debug_handler]
pub async fn list_audit_events(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = AuditService::new(&state);
    let entries = service
        .list_events(query, auth.token())
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({ "entries": entries })))
}
