use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::StoreClient;

use crate::models::{Appointment, AppointmentError};

/// Two half-open intervals [s1, e1) and [s2, e2) conflict iff each starts
/// before the other ends. Touching intervals do not conflict.
pub fn intervals_overlap(
    s1: DateTime<Utc>,
    e1: DateTime<Utc>,
    s2: DateTime<Utc>,
    e2: DateTime<Utc>,
) -> bool {
    s1 < e2 && s2 < e1
}

/// Detects temporal overlap between a candidate time range and a provider's
/// existing non-cancelled appointments. Used when generating slots and again
/// at commit time, since no lock is held between the two.
pub struct ConflictDetectionService {
    store: Arc<StoreClient>,
}

impl ConflictDetectionService {
    pub fn with_store(store: Arc<StoreClient>) -> Self {
        Self { store }
    }

    pub async fn has_conflict(
        &self,
        provider_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        let conflicts = self
            .conflicting_appointments(
                provider_id,
                start_time,
                end_time,
                exclude_appointment_id,
                auth_token,
            )
            .await?;

        if !conflicts.is_empty() {
            warn!(
                "Conflict detected for provider {} - {} overlapping appointments",
                provider_id,
                conflicts.len()
            );
        }

        Ok(!conflicts.is_empty())
    }

    /// The provider's non-cancelled appointments overlapping [start, end),
    /// excluding the appointment being moved (its own prior interval is
    /// irrelevant to itself).
    pub async fn conflicting_appointments(
        &self,
        provider_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!(
            "Checking conflicts for provider {} from {} to {}",
            provider_id, start_time, end_time
        );

        let mut query_parts = vec![
            format!("provider_id=eq.{}", provider_id),
            "status=neq.CANCELLED".to_string(),
            format!(
                "start_time=lt.{}",
                urlencoding::encode(&end_time.to_rfc3339())
            ),
            format!(
                "end_time=gt.{}",
                urlencoding::encode(&start_time.to_rfc3339())
            ),
        ];

        if let Some(exclude_id) = exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
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

        let appointments: Vec<Appointment> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| {
                AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e))
            })?;

        // The store query already bounds the range; re-verify in memory so a
        // permissive filter can never produce a false negative.
        Ok(appointments
            .into_iter()
            .filter(|apt| apt.status.blocks_slot())
            .filter(|apt| intervals_overlap(start_time, end_time, apt.start_time, apt.end_time))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 7, h, m, 0).unwrap()
    }

    #[test]
    fn overlapping_intervals_conflict() {
        assert!(intervals_overlap(at(10, 0), at(11, 0), at(10, 30), at(11, 30)));
        assert!(intervals_overlap(at(10, 30), at(11, 30), at(10, 0), at(11, 0)));
    }

    #[test]
    fn containment_conflicts() {
        assert!(intervals_overlap(at(10, 0), at(12, 0), at(10, 30), at(11, 0)));
        assert!(intervals_overlap(at(10, 30), at(11, 0), at(10, 0), at(12, 0)));
    }

    #[test]
    fn identical_intervals_conflict() {
        assert!(intervals_overlap(at(10, 0), at(10, 30), at(10, 0), at(10, 30)));
    }

    #[test]
    fn touching_intervals_do_not_conflict() {
        assert!(!intervals_overlap(at(9, 0), at(10, 0), at(10, 0), at(11, 0)));
        assert!(!intervals_overlap(at(10, 0), at(11, 0), at(9, 0), at(10, 0)));
    }

    #[test]
    fn disjoint_intervals_do_not_conflict() {
        assert!(!intervals_overlap(at(9, 0), at(9, 30), at(14, 0), at(15, 0)));
    }
}
