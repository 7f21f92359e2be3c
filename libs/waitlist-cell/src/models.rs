use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A patient waiting for a slot that was not available when they looked.
/// Matching and notification run elsewhere; this cell records the intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub appointment_type_id: Uuid,
    pub provider_id: Option<Uuid>,
    pub preferred_days: Option<Vec<i32>>,
    pub status: WaitlistStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitlistStatus {
    Active,
    Notified,
    Booked,
}

impl fmt::Display for WaitlistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitlistStatus::Active => write!(f, "active"),
            WaitlistStatus::Notified => write!(f, "notified"),
            WaitlistStatus::Booked => write!(f, "booked"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWaitlistRequest {
    pub appointment_type_id: Uuid,
    pub provider_id: Option<Uuid>,
    pub preferred_days: Option<Vec<i32>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WaitlistQuery {
    pub patient_id: Option<Uuid>,
    pub status: Option<WaitlistStatus>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum WaitlistError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
