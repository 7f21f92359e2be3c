use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recurring weekly open hours for one provider. At most one rule exists per
/// (provider_id, day_of_week); writes are upserts. day_of_week is 0 = Sunday
/// through 6 = Saturday.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One-off override of the weekly rule for a specific calendar date:
/// vacation, holiday, or modified hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityException {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
}

/// The resolved bookable window for one provider on one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_open: bool,
}

impl DayWindow {
    pub fn open(start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            start_time,
            end_time,
            is_open: true,
        }
    }

    pub fn closed() -> Self {
        Self {
            start_time: NaiveTime::MIN,
            end_time: NaiveTime::MIN,
            is_open: false,
        }
    }
}

/// An already-booked interval of a provider's day, as far as slot
/// generation is concerned. Cancelled appointments never appear here.
#[derive(Debug, Clone, Deserialize)]
pub struct BookedInterval {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertAvailabilityRequest {
    pub day_of_week: i32,
    /// Wall-clock "HH:MM" strings, validated before parsing.
    pub start_time: String,
    pub end_time: String,
    pub is_available: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateExceptionRequest {
    pub date: NaiveDate,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub reason: Option<String>,
    pub is_blocked: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotQuery {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub duration_minutes: Option<i64>,
    pub granularity_minutes: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExceptionRangeQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AvailabilityError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
