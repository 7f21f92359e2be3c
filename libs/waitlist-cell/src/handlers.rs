use std::sync::Arc;

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use audit_cell::models::{AuditAction, EntityType};
use audit_cell::services::AuditService;
use shared_config::AppConfig;
use shared_models::auth::{ActorRole, User};
use shared_models::error::AppError;
use shared_utils::extractor::require_role;

use crate::models::{CreateWaitlistRequest, WaitlistError, WaitlistQuery};
use crate::services::WaitlistService;

fn map_error(e: WaitlistError) -> AppError {
    match e {
        WaitlistError::ValidationError(msg) => AppError::BadRequest(msg),
        WaitlistError::DatabaseError(msg) => AppError::Database(msg),
    }
}

/// Patients join the waitlist when no slot fits.
#[axum::debug_handler]
pub async fn create_waitlist_entry(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateWaitlistRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let role = require_role(&user)?;
    if !role.is_patient() {
        return Err(AppError::Forbidden(
            "Only patients can join the waitlist".to_string(),
        ));
    }

    let patient_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Internal("Caller id is not a valid UUID".to_string()))?;
    let token = auth.token();

    let service = WaitlistService::new(&state);
    let entry = service
        .create_entry(patient_id, request, token)
        .await
        .map_err(map_error)?;

    AuditService::new(&state)
        .log_event(
            &user.id,
            AuditAction::WaitlistEntryCreated,
            EntityType::WaitlistEntry,
            Some(&entry.id.to_string()),
            json!({
                "appointment_type_id": entry.appointment_type_id,
                "provider_id": entry.provider_id,
            }),
            token,
        )
        .await;

    Ok((StatusCode::CREATED, Json(json!(entry))))
}

/// Patients see their own entries; admins may filter across patients.
#[axum::debug_handler]
pub async fn list_waitlist_entries(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(mut query): Query<WaitlistQuery>,
) -> Result<Json<Value>, AppError> {
    let role = require_role(&user)?;

    match role {
        ActorRole::Patient => {
            let patient_id = Uuid::parse_str(&user.id)
                .map_err(|_| AppError::Internal("Caller id is not a valid UUID".to_string()))?;
            query.patient_id = Some(patient_id);
        }
        ActorRole::Admin => {}
        ActorRole::Provider => {
            return Err(AppError::Forbidden(
                "Providers cannot view the waitlist".to_string(),
            ));
        }
    }

    let service = WaitlistService::new(&state);
    let entries = service
        .list_entries(query, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!(entries)))
}
