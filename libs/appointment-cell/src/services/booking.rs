use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use audit_cell::models::{AuditAction, EntityType};
use audit_cell::services::AuditService;
use policy_cell::services::ClinicPolicyService;
use shared_config::AppConfig;
use shared_database::StoreClient;
use shared_models::auth::{ActorRole, User};

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus,
    BookAppointmentRequest, UpdateAppointmentRequest,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;

/// Orchestrates every scheduling mutation: booking, rescheduling,
/// cancellation and the terminal status changes. Composes the conflict
/// detector and the clinic policy engine, and reports each committed
/// mutation to the audit trail.
pub struct AppointmentBookingService {
    store: Arc<StoreClient>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    policy_service: ClinicPolicyService,
    audit_service: AuditService,
}

struct Actor {
    id: Uuid,
    role: ActorRole,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let store = Arc::new(StoreClient::new(config));
        Self::with_store(store)
    }

    pub fn with_store(store: Arc<StoreClient>) -> Self {
        let conflict_service = ConflictDetectionService::with_store(Arc::clone(&store));
        let policy_service = ClinicPolicyService::with_store(Arc::clone(&store));
        let audit_service = AuditService::with_store(Arc::clone(&store));

        Self {
            conflict_service,
            lifecycle_service: AppointmentLifecycleService::new(),
            policy_service,
            audit_service,
            store,
        }
    }

    /// Book a new appointment. The conflict check runs once before the
    /// insert and once more after it, excluding the new row, so that of two
    /// racing requests for the same slot at most one survives.
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let actor = resolve_actor(user)?;
        let (patient_id, provider_id) = resolve_participants(&request, &actor)?;

        info!(
            "Booking appointment for patient {} with provider {}",
            patient_id, provider_id
        );

        if request.title.trim().is_empty() {
            return Err(AppointmentError::InvalidInput(
                "Title must not be empty".to_string(),
            ));
        }
        if request.start_time >= request.end_time {
            return Err(AppointmentError::InvalidInput(
                "End time must be after start time".to_string(),
            ));
        }

        let has_conflict = self
            .conflict_service
            .has_conflict(
                provider_id,
                request.start_time,
                request.end_time,
                None,
                auth_token,
            )
            .await?;
        if has_conflict {
            return Err(AppointmentError::SlotUnavailable);
        }

        let appointment_data = json!({
            "patient_id": patient_id,
            "provider_id": provider_id,
            "appointment_type_id": request.appointment_type_id,
            "title": request.title,
            "description": request.description,
            "start_time": request.start_time.to_rfc3339(),
            "end_time": request.end_time.to_rfc3339(),
            "status": AppointmentStatus::Scheduled.to_string(),
        });

        let result = self
            .store
            .write_returning(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                appointment_data,
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or_else(|| {
            AppointmentError::DatabaseError("Failed to create appointment".to_string())
        })?;

        let appointment: Appointment = serde_json::from_value(row).map_err(|e| {
            AppointmentError::DatabaseError(format!("Failed to parse created appointment: {}", e))
        })?;

        // The check above and the insert are not atomic across the store
        // boundary. Re-check excluding our own row; if a concurrent booking
        // slipped in, back our row out and surface the slot as taken.
        let lost_race = self
            .conflict_service
            .has_conflict(
                provider_id,
                appointment.start_time,
                appointment.end_time,
                Some(appointment.id),
                auth_token,
            )
            .await?;

        if lost_race {
            warn!(
                "Booking race lost for provider {} at {}, compensating appointment {}",
                provider_id, appointment.start_time, appointment.id
            );
            self.compensate_lost_booking(appointment.id, auth_token).await;
            return Err(AppointmentError::SlotUnavailable);
        }

        self.audit_service
            .log_event(
                &user.id,
                AuditAction::AppointmentCreated,
                EntityType::Appointment,
                Some(&appointment.id.to_string()),
                json!({
                    "patient_id": patient_id,
                    "provider_id": provider_id,
                    "start_time": appointment.start_time.to_rfc3339(),
                    "end_time": appointment.end_time.to_rfc3339(),
                }),
                auth_token,
            )
            .await;

        info!("Appointment {} booked successfully", appointment.id);
        Ok(appointment)
    }

    /// Fetch one appointment, visible only to its patient, its provider, or
    /// an admin. Anyone else sees NotFound rather than a permission error.
    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or(AppointmentError::NotFound)?;

        let appointment: Appointment = serde_json::from_value(row).map_err(|e| {
            AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e))
        })?;

        let actor = resolve_actor(user)?;
        let involved =
            actor.id == appointment.patient_id || actor.id == appointment.provider_id;
        if !involved && !actor.role.is_admin() {
            return Err(AppointmentError::NotFound);
        }

        Ok(appointment)
    }

    /// List appointments visible to the caller: patients and providers see
    /// their own, admins see everything the filters select.
    pub async fn search_appointments(
        &self,
        query: AppointmentSearchQuery,
        user: &User,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let actor = resolve_actor(user)?;

        let mut query_parts = Vec::new();
        match actor.role {
            ActorRole::Patient => query_parts.push(format!("patient_id=eq.{}", actor.id)),
            ActorRole::Provider => query_parts.push(format!("provider_id=eq.{}", actor.id)),
            ActorRole::Admin => {
                if let Some(patient_id) = query.patient_id {
                    query_parts.push(format!("patient_id=eq.{}", patient_id));
                }
            }
        }

        if let Some(provider_id) = query.provider_id {
            // Providers are already pinned to their own rows.
            if !actor.role.is_provider() {
                query_parts.push(format!("provider_id=eq.{}", provider_id));
            }
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(from_date) = query.from_date {
            query_parts.push(format!(
                "start_time=gte.{}",
                urlencoding::encode(&from_date.to_rfc3339())
            ));
        }
        if let Some(to_date) = query.to_date {
            query_parts.push(format!(
                "start_time=lte.{}",
                urlencoding::encode(&to_date.to_rfc3339())
            ));
        }

        query_parts.push(format!("limit={}", query.limit.unwrap_or(100)));
        if let Some(offset) = query.offset {
            query_parts.push(format!("offset={}", offset));
        }

        let path = format!(
            "/rest/v1/appointments?{}&order=start_time.asc",
            query_parts.join("&")
        );

        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| {
                AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e))
            })
    }

    /// Apply a PATCH-style update: reschedule, status change, notes. The
    /// policy cutoff binds the appointment's patient; providers and admins
    /// bypass it.
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Updating appointment: {}", appointment_id);

        let current = self.get_appointment(appointment_id, user, auth_token).await?;
        let actor = resolve_actor(user)?;
        let is_patient_on_row = actor.role.is_patient() && actor.id == current.patient_id;
        let is_provider_on_row = actor.role.is_provider() && actor.id == current.provider_id;

        let mut update_data = Map::new();
        let mut audit_actions: Vec<(AuditAction, Value)> = Vec::new();

        if request.is_reschedule() {
            if current.status != AppointmentStatus::Scheduled {
                return Err(AppointmentError::InvalidStatusTransition(current.status));
            }

            if is_patient_on_row {
                let policy = self.policy_service.get_policy(auth_token).await;
                // The cutoff is measured against the appointment's current
                // start, not the requested new one.
                if !policy.can_reschedule(Utc::now(), current.start_time) {
                    return Err(AppointmentError::PolicyCutoffViolation {
                        cutoff_hours: policy.reschedule_cutoff_hours,
                    });
                }
            }

            let new_start = request.start_time.unwrap_or(current.start_time);
            let new_end = request.end_time.unwrap_or(current.end_time);
            if new_start >= new_end {
                return Err(AppointmentError::InvalidInput(
                    "End time must be after start time".to_string(),
                ));
            }

            let has_conflict = self
                .conflict_service
                .has_conflict(
                    current.provider_id,
                    new_start,
                    new_end,
                    Some(current.id),
                    auth_token,
                )
                .await?;
            if has_conflict {
                return Err(AppointmentError::SlotUnavailable);
            }

            update_data.insert("start_time".to_string(), json!(new_start.to_rfc3339()));
            update_data.insert("end_time".to_string(), json!(new_end.to_rfc3339()));
            audit_actions.push((
                AuditAction::AppointmentRescheduled,
                json!({
                    "from": current.start_time.to_rfc3339(),
                    "to": new_start.to_rfc3339(),
                }),
            ));
        }

        if let Some(new_status) = request.status {
            if new_status != current.status {
                self.lifecycle_service
                    .validate_status_transition(current.status, new_status)?;

                match new_status {
                    AppointmentStatus::Completed | AppointmentStatus::NoShow => {
                        if !is_provider_on_row && !actor.role.is_admin() {
                            return Err(AppointmentError::Unauthorized(
                                "Only the provider can complete or mark a no-show".to_string(),
                            ));
                        }
                    }
                    AppointmentStatus::Cancelled => {
                        if is_patient_on_row {
                            let policy = self.policy_service.get_policy(auth_token).await;
                            if !policy.can_cancel(Utc::now(), current.start_time) {
                                return Err(AppointmentError::PolicyCutoffViolation {
                                    cutoff_hours: policy.cancellation_cutoff_hours,
                                });
                            }
                        }
                    }
                    AppointmentStatus::Scheduled => {}
                }

                update_data.insert("status".to_string(), json!(new_status.to_string()));
                let action = match new_status {
                    AppointmentStatus::Completed => Some(AuditAction::AppointmentCompleted),
                    AppointmentStatus::NoShow => Some(AuditAction::AppointmentNoShow),
                    AppointmentStatus::Cancelled => Some(AuditAction::AppointmentCancelled),
                    AppointmentStatus::Scheduled => None,
                };
                if let Some(action) = action {
                    audit_actions.push((action, json!({ "status": new_status.to_string() })));
                }
            }
        }

        if let Some(title) = request.title {
            if title.trim().is_empty() {
                return Err(AppointmentError::InvalidInput(
                    "Title must not be empty".to_string(),
                ));
            }
            update_data.insert("title".to_string(), json!(title));
        }
        if let Some(description) = request.description {
            update_data.insert("description".to_string(), json!(description));
        }
        // Note fields are role-scoped; out-of-role updates are ignored
        // rather than rejected.
        if let Some(clinical_notes) = request.clinical_notes {
            if is_provider_on_row || actor.role.is_admin() {
                update_data.insert("clinical_notes".to_string(), json!(clinical_notes));
            }
        }
        if let Some(notes) = request.notes {
            if is_patient_on_row || actor.role.is_admin() {
                update_data.insert("notes".to_string(), json!(notes));
            }
        }
        if let Some(intake_forms) = request.intake_forms {
            if is_patient_on_row || actor.role.is_admin() {
                update_data.insert("intake_forms".to_string(), json!(intake_forms));
            }
        }

        if update_data.is_empty() {
            return Ok(current);
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let updated = self
            .patch_appointment(current.id, Value::Object(update_data), auth_token)
            .await?;

        for (action, metadata) in audit_actions {
            self.audit_service
                .log_event(
                    &user.id,
                    action,
                    EntityType::Appointment,
                    Some(&updated.id.to_string()),
                    metadata,
                    auth_token,
                )
                .await;
        }

        info!("Appointment {} updated successfully", appointment_id);
        Ok(updated)
    }

    /// Cancel an appointment. Patients are held to the cancellation cutoff;
    /// the provider on the appointment and admins bypass it.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Cancelling appointment: {}", appointment_id);

        let current = self.get_appointment(appointment_id, user, auth_token).await?;
        let actor = resolve_actor(user)?;

        self.lifecycle_service
            .validate_status_transition(current.status, AppointmentStatus::Cancelled)?;

        if actor.role.is_patient() && actor.id == current.patient_id {
            let policy = self.policy_service.get_policy(auth_token).await;
            if !policy.can_cancel(Utc::now(), current.start_time) {
                return Err(AppointmentError::PolicyCutoffViolation {
                    cutoff_hours: policy.cancellation_cutoff_hours,
                });
            }
        }

        let update_data = json!({
            "status": AppointmentStatus::Cancelled.to_string(),
            "updated_at": Utc::now().to_rfc3339(),
        });

        let cancelled = self
            .patch_appointment(current.id, update_data, auth_token)
            .await?;

        self.audit_service
            .log_event(
                &user.id,
                AuditAction::AppointmentCancelled,
                EntityType::Appointment,
                Some(&cancelled.id.to_string()),
                json!({ "start_time": cancelled.start_time.to_rfc3339() }),
                auth_token,
            )
            .await;

        info!("Appointment {} cancelled", appointment_id);
        Ok(cancelled)
    }

    // ==============================================================================
    // PRIVATE HELPERS
    // ==============================================================================

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        update_data: Value,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        let result = self
            .store
            .write_returning(Method::PATCH, &path, Some(auth_token), update_data)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or_else(|| {
            AppointmentError::DatabaseError("Failed to update appointment".to_string())
        })?;

        serde_json::from_value(row).map_err(|e| {
            AppointmentError::DatabaseError(format!("Failed to parse updated appointment: {}", e))
        })
    }

    /// Back out our own insert after losing the commit race. Failure here is
    /// logged but not surfaced; the caller already gets SlotUnavailable.
    async fn compensate_lost_booking(&self, appointment_id: Uuid, auth_token: &str) {
        let update_data = json!({
            "status": AppointmentStatus::Cancelled.to_string(),
            "updated_at": Utc::now().to_rfc3339(),
        });

        if let Err(e) = self
            .patch_appointment(appointment_id, update_data, auth_token)
            .await
        {
            error!(
                "Failed to compensate lost booking {}: {}",
                appointment_id, e
            );
        }
    }
}

fn resolve_actor(user: &User) -> Result<Actor, AppointmentError> {
    let role = user
        .actor_role()
        .ok_or_else(|| AppointmentError::Unauthorized("Unknown or missing role".to_string()))?;
    let id = Uuid::parse_str(&user.id)
        .map_err(|_| AppointmentError::InvalidInput("Caller id is not a valid UUID".to_string()))?;

    Ok(Actor { id, role })
}

/// Who the appointment is for and who delivers it, depending on who asks:
/// patients book for themselves, providers book patients in, admins name
/// both sides.
fn resolve_participants(
    request: &BookAppointmentRequest,
    actor: &Actor,
) -> Result<(Uuid, Uuid), AppointmentError> {
    match actor.role {
        ActorRole::Patient => {
            let provider_id = request.provider_id.ok_or_else(|| {
                AppointmentError::InvalidInput("Provider ID is required".to_string())
            })?;
            Ok((actor.id, provider_id))
        }
        ActorRole::Provider => {
            let patient_id = request.patient_id.ok_or_else(|| {
                AppointmentError::InvalidInput("Patient ID is required".to_string())
            })?;
            Ok((patient_id, actor.id))
        }
        ActorRole::Admin => {
            let patient_id = request.patient_id.ok_or_else(|| {
                AppointmentError::InvalidInput(
                    "Both patient and provider IDs are required".to_string(),
                )
            })?;
            let provider_id = request.provider_id.ok_or_else(|| {
                AppointmentError::InvalidInput(
                    "Both patient and provider IDs are required".to_string(),
                )
            })?;
            Ok((patient_id, provider_id))
        }
    }
}
