use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use audit_cell::models::{AuditAction, EntityType};
use audit_cell::services::AuditService;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::require_admin;

use crate::models::{
    AppointmentError, AppointmentSearchQuery, BookAppointmentRequest,
    CreateAppointmentTypeRequest, StatsQuery, UpdateAppointmentRequest,
};
use crate::services::{AppointmentBookingService, AppointmentStatsService, AppointmentTypeService};

fn map_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::SlotUnavailable => {
            AppError::Conflict("Time slot is already booked".to_string())
        }
        AppointmentError::PolicyCutoffViolation { cutoff_hours } => AppError::PolicyCutoff {
            message: format!(
                "Must be done at least {} hours before the appointment",
                cutoff_hours
            ),
            cutoff_hours,
        },
        AppointmentError::InvalidInput(msg) => AppError::BadRequest(msg),
        AppointmentError::Unauthorized(msg) => AppError::Forbidden(msg),
        AppointmentError::InvalidStatusTransition(status) => {
            AppError::BadRequest(format!("Appointment cannot be modified in status {}", status))
        }
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = AppointmentBookingService::new(&state);

    let appointment = service
        .book_appointment(request, &user, auth.token())
        .await
        .map_err(map_error)?;

    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);

    let appointments = service
        .search_appointments(query, &user, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);

    let appointment = service
        .get_appointment(appointment_id, &user, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!(appointment)))
}

/// Reschedule, status change or notes update in one PATCH, as the client
/// edits an appointment in place.
#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);

    let appointment = service
        .update_appointment(appointment_id, request, &user, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);

    service
        .cancel_appointment(appointment_id, &user, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "message": "Appointment cancelled" })))
}

// ==============================================================================
// APPOINTMENT TYPE HANDLERS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct TypeListQuery {
    pub include_archived: Option<bool>,
}

#[axum::debug_handler]
pub async fn list_appointment_types(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Query(query): Query<TypeListQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentTypeService::new(&state);

    let types = service
        .list_types(query.include_archived.unwrap_or(false), auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!(types)))
}

#[axum::debug_handler]
pub async fn create_appointment_type(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentTypeRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_admin(&user)?;
    let token = auth.token();

    let service = AppointmentTypeService::new(&state);
    let record = service
        .create_type(request, token)
        .await
        .map_err(map_error)?;

    AuditService::new(&state)
        .log_event(
            &user.id,
            AuditAction::AppointmentTypeCreated,
            EntityType::AppointmentType,
            Some(&record.id.to_string()),
            json!({ "name": record.name, "duration_minutes": record.duration_minutes }),
            token,
        )
        .await;

    Ok((StatusCode::CREATED, Json(json!(record))))
}

#[axum::debug_handler]
pub async fn archive_appointment_type(
    State(state): State<Arc<AppConfig>>,
    Path(type_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let token = auth.token();

    let service = AppointmentTypeService::new(&state);
    let record = service
        .archive_type(type_id, token)
        .await
        .map_err(map_error)?;

    AuditService::new(&state)
        .log_event(
            &user.id,
            AuditAction::AppointmentTypeArchived,
            EntityType::AppointmentType,
            Some(&record.id.to_string()),
            json!({ "name": record.name }),
            token,
        )
        .await;

    Ok(Json(json!(record)))
}

// ==============================================================================
// ADMIN STATISTICS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_clinic_stats(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = AppointmentStatsService::new(&state);
    let stats = service
        .get_stats(query, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!(stats)))
}
