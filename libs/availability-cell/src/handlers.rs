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
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::require_provider;

use crate::models::{
    AvailabilityError, CreateExceptionRequest, ExceptionRangeQuery, SlotQuery,
    UpsertAvailabilityRequest,
};
use crate::services::slots::{DEFAULT_SLOT_DURATION_MINUTES, DEFAULT_SLOT_GRANULARITY_MINUTES};
use crate::services::{AvailabilityScheduleService, SlotGenerationService};

fn map_error(e: AvailabilityError) -> AppError {
    match e {
        AvailabilityError::ValidationError(msg) => AppError::BadRequest(msg),
        AvailabilityError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn user_uuid(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Internal("Caller id is not a valid UUID".to_string()))
}

/// Bookable start instants for a provider on a date.
#[axum::debug_handler]
pub async fn get_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let service = SlotGenerationService::new(&state);

    let slots = service
        .generate_slots(
            query.provider_id,
            query.date,
            query.duration_minutes.unwrap_or(DEFAULT_SLOT_DURATION_MINUTES),
            query
                .granularity_minutes
                .unwrap_or(DEFAULT_SLOT_GRANULARITY_MINUTES),
            auth.token(),
        )
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "slots": slots })))
}

/// The calling provider's weekly rules.
#[axum::debug_handler]
pub async fn list_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_provider(&user)?;
    let provider_id = user_uuid(&user)?;

    let service = AvailabilityScheduleService::new(&state);
    let rules = service
        .list_rules(provider_id, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!(rules)))
}

#[axum::debug_handler]
pub async fn upsert_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpsertAvailabilityRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_provider(&user)?;
    let provider_id = user_uuid(&user)?;
    let token = auth.token();

    let service = AvailabilityScheduleService::new(&state);
    let rule = service
        .upsert_rule(provider_id, request, token)
        .await
        .map_err(map_error)?;

    AuditService::new(&state)
        .log_event(
            &user.id,
            AuditAction::AvailabilityUpdated,
            EntityType::Availability,
            Some(&rule.id.to_string()),
            json!({ "day_of_week": rule.day_of_week, "is_available": rule.is_available }),
            token,
        )
        .await;

    Ok((StatusCode::CREATED, Json(json!(rule))))
}

#[axum::debug_handler]
pub async fn list_exceptions(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<ExceptionRangeQuery>,
) -> Result<Json<Value>, AppError> {
    require_provider(&user)?;
    let provider_id = user_uuid(&user)?;

    let service = AvailabilityScheduleService::new(&state);
    let exceptions = service
        .list_exceptions(provider_id, query, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!(exceptions)))
}

#[axum::debug_handler]
pub async fn create_exception(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateExceptionRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_provider(&user)?;
    let provider_id = user_uuid(&user)?;
    let token = auth.token();

    let service = AvailabilityScheduleService::new(&state);
    let exception = service
        .create_exception(provider_id, request, token)
        .await
        .map_err(map_error)?;

    AuditService::new(&state)
        .log_event(
            &user.id,
            AuditAction::AvailabilityExceptionCreated,
            EntityType::Availability,
            Some(&exception.id.to_string()),
            json!({ "date": exception.date, "reason": exception.reason }),
            token,
        )
        .await;

    Ok((StatusCode::CREATED, Json(json!(exception))))
}
