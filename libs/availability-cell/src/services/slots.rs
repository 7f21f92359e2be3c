use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::StoreClient;

use crate::models::{AvailabilityError, BookedInterval, DayWindow};
use crate::services::schedule::AvailabilityScheduleService;

pub const DEFAULT_SLOT_GRANULARITY_MINUTES: i64 = 30;
pub const DEFAULT_SLOT_DURATION_MINUTES: i64 = 30;

/// Enumerates the bookable start instants for a provider on a date.
///
/// The walk itself is a pure function of the resolved window, the booked
/// intervals, and a caller-supplied "now", so the output is deterministic
/// for fixed inputs: two calls against the same appointment state yield the
/// identical ordered list.
pub struct SlotGenerationService {
    store: Arc<StoreClient>,
    schedule: AvailabilityScheduleService,
}

impl SlotGenerationService {
    pub fn new(config: &AppConfig) -> Self {
        let store = Arc::new(StoreClient::new(config));
        let schedule = AvailabilityScheduleService::with_store(Arc::clone(&store));
        Self { store, schedule }
    }

    pub fn with_store(store: Arc<StoreClient>) -> Self {
        let schedule = AvailabilityScheduleService::with_store(Arc::clone(&store));
        Self { store, schedule }
    }

    pub async fn generate_slots(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        duration_minutes: i64,
        granularity_minutes: i64,
        auth_token: &str,
    ) -> Result<Vec<DateTime<Utc>>, AvailabilityError> {
        if duration_minutes <= 0 {
            return Err(AvailabilityError::ValidationError(
                "Duration must be positive".to_string(),
            ));
        }
        if granularity_minutes <= 0 {
            return Err(AvailabilityError::ValidationError(
                "Granularity must be positive".to_string(),
            ));
        }

        let window = self
            .schedule
            .resolve_day_window(provider_id, date, auth_token)
            .await?;

        if !window.is_open {
            debug!("Provider {} is closed on {}", provider_id, date);
            return Ok(vec![]);
        }

        let booked = self
            .booked_intervals_for_date(provider_id, date, auth_token)
            .await?;

        let slots = walk_slots(
            date,
            &window,
            duration_minutes,
            granularity_minutes,
            &booked,
            Utc::now(),
        );

        debug!(
            "Generated {} slots for provider {} on {}",
            slots.len(),
            provider_id,
            date
        );
        Ok(slots)
    }

    /// The provider's non-cancelled appointments that start on the date.
    async fn booked_intervals_for_date(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<BookedInterval>, AvailabilityError> {
        let day_start = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let next_day = day_start + Duration::days(1);

        let path = format!(
            "/rest/v1/appointments?provider_id=eq.{}&status=neq.CANCELLED&start_time=gte.{}&start_time=lt.{}&select=start_time,end_time&order=start_time.asc",
            provider_id,
            urlencoding::encode(&day_start.to_rfc3339()),
            urlencoding::encode(&next_day.to_rfc3339()),
        );

        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<BookedInterval>, _>>()
            .map_err(|e| {
                AvailabilityError::DatabaseError(format!("Failed to parse appointments: {}", e))
            })
    }
}

/// Walk the open window in fixed granularity steps, emitting every start
/// whose slot fits the window, overlaps no booked interval (half-open
/// comparison), and ends strictly in the future.
pub fn walk_slots(
    date: NaiveDate,
    window: &DayWindow,
    duration_minutes: i64,
    granularity_minutes: i64,
    booked: &[BookedInterval],
    now: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let mut slots = Vec::new();
    if !window.is_open {
        return slots;
    }

    let window_start = date.and_time(window.start_time).and_utc();
    let window_end = date.and_time(window.end_time).and_utc();
    let duration = Duration::minutes(duration_minutes);
    let step = Duration::minutes(granularity_minutes);

    let mut current = window_start;
    while current + duration <= window_end {
        let slot_end = current + duration;

        let has_conflict = booked
            .iter()
            .any(|apt| current < apt.end_time && apt.start_time < slot_end);

        if !has_conflict && slot_end > now {
            slots.push(current);
        }

        current += step;
    }

    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    // A Monday, comfortably in the future relative to any test run.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
    }

    fn window_9_to_17() -> DayWindow {
        DayWindow::open(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        )
    }

    fn long_ago() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
    }

    fn booked(start_h: u32, start_m: u32, end_h: u32, end_m: u32) -> BookedInterval {
        let date = monday();
        BookedInterval {
            start_time: date.and_hms_opt(start_h, start_m, 0).unwrap().and_utc(),
            end_time: date.and_hms_opt(end_h, end_m, 0).unwrap().and_utc(),
        }
    }

    #[test]
    fn empty_book_yields_sixteen_half_hour_slots() {
        let slots = walk_slots(monday(), &window_9_to_17(), 30, 30, &[], long_ago());

        assert_eq!(slots.len(), 16);
        assert_eq!(slots[0], monday().and_hms_opt(9, 0, 0).unwrap().and_utc());
        assert_eq!(
            *slots.last().unwrap(),
            monday().and_hms_opt(16, 30, 0).unwrap().and_utc()
        );
    }

    #[test]
    fn booked_interval_removes_only_overlapping_starts() {
        let existing = [booked(10, 0, 10, 30)];
        let slots = walk_slots(monday(), &window_9_to_17(), 30, 30, &existing, long_ago());

        let ten = monday().and_hms_opt(10, 0, 0).unwrap().and_utc();
        let nine_thirty = monday().and_hms_opt(9, 30, 0).unwrap().and_utc();
        let ten_thirty = monday().and_hms_opt(10, 30, 0).unwrap().and_utc();

        assert!(!slots.contains(&ten));
        // Half-open intervals: 09:30-10:00 and 10:30-11:00 touch the booking
        // without overlapping it.
        assert!(slots.contains(&nine_thirty));
        assert!(slots.contains(&ten_thirty));
        assert_eq!(slots.len(), 15);
    }

    #[test]
    fn slots_in_the_past_are_never_offered() {
        // "Now" is 12:15 on the day itself; the 12:00 slot ends at 12:30 and
        // is still offered, everything earlier is gone.
        let now = monday().and_hms_opt(12, 15, 0).unwrap().and_utc();
        let slots = walk_slots(monday(), &window_9_to_17(), 30, 30, &[], now);

        assert_eq!(
            slots[0],
            monday().and_hms_opt(12, 0, 0).unwrap().and_utc()
        );
    }

    #[test]
    fn slot_ending_exactly_now_is_excluded() {
        let now = monday().and_hms_opt(9, 30, 0).unwrap().and_utc();
        let slots = walk_slots(monday(), &window_9_to_17(), 30, 30, &[], now);

        // 09:00 ends exactly at "now": not strictly in the future.
        assert_eq!(
            slots[0],
            monday().and_hms_opt(9, 30, 0).unwrap().and_utc()
        );
    }

    #[test]
    fn duration_longer_than_window_yields_nothing() {
        let window = DayWindow::open(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        );
        let slots = walk_slots(monday(), &window, 90, 30, &[], long_ago());
        assert!(slots.is_empty());
    }

    #[test]
    fn granularity_is_independent_of_duration() {
        // 60-minute appointments on a 30-minute grid still start every half
        // hour, as long as the hour fits before the window closes.
        let slots = walk_slots(monday(), &window_9_to_17(), 60, 30, &[], long_ago());

        assert_eq!(slots[0], monday().and_hms_opt(9, 0, 0).unwrap().and_utc());
        assert_eq!(slots[1], monday().and_hms_opt(9, 30, 0).unwrap().and_utc());
        assert_eq!(
            *slots.last().unwrap(),
            monday().and_hms_opt(16, 0, 0).unwrap().and_utc()
        );
    }

    #[test]
    fn closed_window_yields_nothing() {
        let slots = walk_slots(monday(), &DayWindow::closed(), 30, 30, &[], long_ago());
        assert!(slots.is_empty());
    }

    #[test]
    fn generation_is_idempotent() {
        let existing = [booked(11, 0, 12, 0), booked(14, 30, 15, 0)];
        let first = walk_slots(monday(), &window_9_to_17(), 30, 30, &existing, long_ago());
        let second = walk_slots(monday(), &window_9_to_17(), 30, 30, &existing, long_ago());

        assert_eq!(first, second);
        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(first, sorted);
    }
}
