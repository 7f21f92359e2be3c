use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Every action recorded in the clinic audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    AppointmentCreated,
    AppointmentRescheduled,
    AppointmentCancelled,
    AppointmentCompleted,
    AppointmentNoShow,
    AvailabilityUpdated,
    AvailabilityExceptionCreated,
    AppointmentTypeCreated,
    AppointmentTypeArchived,
    ClinicPolicyUpdated,
    WaitlistEntryCreated,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditAction::AppointmentCreated => "APPOINTMENT_CREATED",
            AuditAction::AppointmentRescheduled => "APPOINTMENT_RESCHEDULED",
            AuditAction::AppointmentCancelled => "APPOINTMENT_CANCELLED",
            AuditAction::AppointmentCompleted => "APPOINTMENT_COMPLETED",
            AuditAction::AppointmentNoShow => "APPOINTMENT_NO_SHOW",
            AuditAction::AvailabilityUpdated => "AVAILABILITY_UPDATED",
            AuditAction::AvailabilityExceptionCreated => "AVAILABILITY_EXCEPTION_CREATED",
            AuditAction::AppointmentTypeCreated => "APPOINTMENT_TYPE_CREATED",
            AuditAction::AppointmentTypeArchived => "APPOINTMENT_TYPE_ARCHIVED",
            AuditAction::ClinicPolicyUpdated => "CLINIC_POLICY_UPDATED",
            AuditAction::WaitlistEntryCreated => "WAITLIST_ENTRY_CREATED",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityType {
    Appointment,
    Availability,
    AppointmentType,
    ClinicPolicy,
    WaitlistEntry,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityType::Appointment => "Appointment",
            EntityType::Availability => "Availability",
            EntityType::AppointmentType => "AppointmentType",
            EntityType::ClinicPolicy => "ClinicPolicy",
            EntityType::WaitlistEntry => "WaitlistEntry",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor_user_id: String,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditLogQuery {
    pub actor_user_id: Option<String>,
    pub action: Option<AuditAction>,
    pub entity_type: Option<String>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}
