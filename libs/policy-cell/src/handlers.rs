use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};

use audit_cell::models::{AuditAction, EntityType};
use audit_cell::services::AuditService;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::require_admin;

use crate::models::{PolicyError, UpdateClinicPolicyRequest};
use crate::services::ClinicPolicyService;

#[axum::debug_handler]
pub async fn get_policy(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = ClinicPolicyService::new(&state);
    let policy = service.get_policy(auth.token()).await;

    Ok(Json(json!(policy)))
}

#[axum::debug_handler]
pub async fn update_policy(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateClinicPolicyRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let token = auth.token();
    let service = ClinicPolicyService::new(&state);

    let cancellation_cutoff_hours = request.cancellation_cutoff_hours;
    let reschedule_cutoff_hours = request.reschedule_cutoff_hours;

    let policy = service
        .upsert_policy(request, token)
        .await
        .map_err(|e| match e {
            PolicyError::ValidationError(msg) => AppError::BadRequest(msg),
            PolicyError::DatabaseError(msg) => AppError::Database(msg),
        })?;

    AuditService::new(&state)
        .log_event(
            &user.id,
            AuditAction::ClinicPolicyUpdated,
            EntityType::ClinicPolicy,
            Some(&policy.id),
            json!({
                "cancellation_cutoff_hours": cancellation_cutoff_hours,
                "reschedule_cutoff_hours": reschedule_cutoff_hours,
            }),
            token,
        )
        .await;

    Ok(Json(json!(policy)))
}
