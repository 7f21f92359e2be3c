use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CANCELLATION_CUTOFF_HOURS: i64 = 24;
pub const DEFAULT_RESCHEDULE_CUTOFF_HOURS: i64 = 12;

/// Clinic-wide scheduling policy. A single record (id "default") lives in
/// the store; when it is absent the built-in defaults below apply, so a
/// policy read can never fail for lack of configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicPolicy {
    pub id: String,
    pub cancellation_cutoff_hours: i64,
    pub reschedule_cutoff_hours: i64,
    pub office_hours_start: NaiveTime,
    pub office_hours_end: NaiveTime,
}

impl Default for ClinicPolicy {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            cancellation_cutoff_hours: DEFAULT_CANCELLATION_CUTOFF_HOURS,
            reschedule_cutoff_hours: DEFAULT_RESCHEDULE_CUTOFF_HOURS,
            office_hours_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            office_hours_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        }
    }
}

impl ClinicPolicy {
    /// A patient may cancel iff `now` has not passed the cutoff instant.
    /// At exactly `start - cutoff` the action is still allowed.
    pub fn can_cancel(&self, now: DateTime<Utc>, appointment_start: DateTime<Utc>) -> bool {
        !is_past_cutoff(now, appointment_start, self.cancellation_cutoff_hours)
    }

    pub fn can_reschedule(&self, now: DateTime<Utc>, appointment_start: DateTime<Utc>) -> bool {
        !is_past_cutoff(now, appointment_start, self.reschedule_cutoff_hours)
    }
}

/// True once `now` is strictly after `appointment_start - cutoff_hours`.
pub fn is_past_cutoff(
    now: DateTime<Utc>,
    appointment_start: DateTime<Utc>,
    cutoff_hours: i64,
) -> bool {
    let cutoff_instant = appointment_start - Duration::hours(cutoff_hours);
    now > cutoff_instant
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateClinicPolicyRequest {
    pub cancellation_cutoff_hours: i64,
    pub reschedule_cutoff_hours: i64,
    /// Wall-clock "HH:MM" strings, validated before parsing.
    pub office_hours_start: String,
    pub office_hours_end: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PolicyError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 15, h, m, s).unwrap()
    }

    #[test]
    fn cutoff_boundary_is_exclusive() {
        let policy = ClinicPolicy::default();
        let start = Utc.with_ymd_and_hms(2030, 3, 16, 10, 0, 0).unwrap();

        // Exactly 24h before: still allowed.
        assert!(policy.can_cancel(at(10, 0, 0), start));
        // One second earlier: allowed.
        assert!(policy.can_cancel(at(9, 59, 59), start));
        // One second past the cutoff instant: denied.
        assert!(!policy.can_cancel(at(10, 0, 1), start));
    }

    #[test]
    fn reschedule_uses_its_own_cutoff() {
        let policy = ClinicPolicy::default();
        let start = Utc.with_ymd_and_hms(2030, 3, 15, 22, 0, 0).unwrap();

        // 12h cutoff: 10:00 is the cutoff instant.
        assert!(policy.can_reschedule(at(10, 0, 0), start));
        assert!(!policy.can_reschedule(at(10, 0, 1), start));
        // 2 hours before start is far past a 12h cutoff.
        assert!(!policy.can_reschedule(at(20, 0, 0), start));
    }

    #[test]
    fn defaults_match_clinic_baseline() {
        let policy = ClinicPolicy::default();
        assert_eq!(policy.cancellation_cutoff_hours, 24);
        assert_eq!(policy.reschedule_cutoff_hours, 12);
        assert_eq!(policy.office_hours_start, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(policy.office_hours_end, NaiveTime::from_hms_opt(17, 0, 0).unwrap());
    }
}
