use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveTime};
use regex::Regex;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::StoreClient;

use crate::models::{
    AvailabilityError, AvailabilityException, AvailabilityRule, CreateExceptionRequest,
    DayWindow, ExceptionRangeQuery, UpsertAvailabilityRequest,
};

const HHMM_PATTERN: &str = r"^([0-1][0-9]|2[0-3]):[0-5][0-9]$";

/// Weekly availability rules plus date-specific exceptions for providers,
/// and the resolution of both into a single day window.
pub struct AvailabilityScheduleService {
    store: Arc<StoreClient>,
}

impl AvailabilityScheduleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(StoreClient::new(config)),
        }
    }

    pub fn with_store(store: Arc<StoreClient>) -> Self {
        Self { store }
    }

    /// Create or replace the weekly rule for (provider, weekday).
    pub async fn upsert_rule(
        &self,
        provider_id: Uuid,
        request: UpsertAvailabilityRequest,
        auth_token: &str,
    ) -> Result<AvailabilityRule, AvailabilityError> {
        if request.day_of_week < 0 || request.day_of_week > 6 {
            return Err(AvailabilityError::ValidationError(
                "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }

        let start_time = parse_hhmm(&request.start_time)?;
        let end_time = parse_hhmm(&request.end_time)?;
        let is_available = request.is_available.unwrap_or(true);

        if is_available && start_time >= end_time {
            return Err(AvailabilityError::ValidationError(
                "Start time must be before end time".to_string(),
            ));
        }

        let rule_data = json!({
            "provider_id": provider_id,
            "day_of_week": request.day_of_week,
            "start_time": start_time.format("%H:%M:%S").to_string(),
            "end_time": end_time.format("%H:%M:%S").to_string(),
            "is_available": is_available,
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static(
                "resolution=merge-duplicates,return=representation",
            ),
        );

        let result: Vec<Value> = self
            .store
            .request_with_headers(
                Method::POST,
                "/rest/v1/availability_rules?on_conflict=provider_id,day_of_week",
                Some(auth_token),
                Some(rule_data),
                Some(headers),
            )
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or_else(|| {
            AvailabilityError::DatabaseError("Failed to upsert availability rule".to_string())
        })?;

        let rule: AvailabilityRule = serde_json::from_value(row)
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse rule: {}", e)))?;

        debug!(
            "Availability rule upserted for provider {} day {}",
            provider_id, rule.day_of_week
        );
        Ok(rule)
    }

    /// All weekly rules for a provider, ordered by weekday.
    pub async fn list_rules(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityRule>, AvailabilityError> {
        let path = format!(
            "/rest/v1/availability_rules?provider_id=eq.{}&order=day_of_week.asc",
            provider_id
        );

        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AvailabilityRule>, _>>()
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse rules: {}", e)))
    }

    pub async fn create_exception(
        &self,
        provider_id: Uuid,
        request: CreateExceptionRequest,
        auth_token: &str,
    ) -> Result<AvailabilityException, AvailabilityError> {
        let start_time = request.start_time.as_deref().map(parse_hhmm).transpose()?;
        let end_time = request.end_time.as_deref().map(parse_hhmm).transpose()?;

        if let (Some(start), Some(end)) = (start_time, end_time) {
            if start >= end {
                return Err(AvailabilityError::ValidationError(
                    "Start time must be before end time".to_string(),
                ));
            }
        }

        let exception_data = json!({
            "provider_id": provider_id,
            "date": request.date,
            "start_time": start_time.map(|t| t.format("%H:%M:%S").to_string()),
            "end_time": end_time.map(|t| t.format("%H:%M:%S").to_string()),
            "reason": request.reason,
            "is_blocked": request.is_blocked.unwrap_or(true),
        });

        let result: Vec<Value> = self
            .store
            .write_returning(
                Method::POST,
                "/rest/v1/availability_exceptions",
                Some(auth_token),
                exception_data,
            )
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or_else(|| {
            AvailabilityError::DatabaseError("Failed to create availability exception".to_string())
        })?;

        serde_json::from_value(row).map_err(|e| {
            AvailabilityError::DatabaseError(format!("Failed to parse exception: {}", e))
        })
    }

    pub async fn list_exceptions(
        &self,
        provider_id: Uuid,
        query: ExceptionRangeQuery,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityException>, AvailabilityError> {
        let mut query_parts = vec![format!("provider_id=eq.{}", provider_id)];

        if let Some(start_date) = query.start_date {
            query_parts.push(format!("date=gte.{}", start_date));
        }
        if let Some(end_date) = query.end_date {
            query_parts.push(format!("date=lte.{}", end_date));
        }

        let path = format!(
            "/rest/v1/availability_exceptions?{}&order=date.asc",
            query_parts.join("&")
        );

        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AvailabilityException>, _>>()
            .map_err(|e| {
                AvailabilityError::DatabaseError(format!("Failed to parse exceptions: {}", e))
            })
    }

    /// Resolve the bookable window for a provider on a date: weekly rule,
    /// overridden by the date's exception if one exists.
    pub async fn resolve_day_window(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<DayWindow, AvailabilityError> {
        let day_of_week = date.weekday().num_days_from_sunday() as i32;

        let rule_path = format!(
            "/rest/v1/availability_rules?provider_id=eq.{}&day_of_week=eq.{}",
            provider_id, day_of_week
        );
        let rule_rows: Vec<Value> = self
            .store
            .request(Method::GET, &rule_path, Some(auth_token), None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let rule: Option<AvailabilityRule> = rule_rows
            .into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse rule: {}", e)))?;

        // Latest exception wins if several were recorded for the same date.
        let exception_path = format!(
            "/rest/v1/availability_exceptions?provider_id=eq.{}&date=eq.{}&order=created_at.desc",
            provider_id, date
        );
        let exception_rows: Vec<Value> = self
            .store
            .request(Method::GET, &exception_path, Some(auth_token), None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let exception: Option<AvailabilityException> = exception_rows
            .into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| {
                AvailabilityError::DatabaseError(format!("Failed to parse exception: {}", e))
            })?;

        Ok(resolve_window(rule.as_ref(), exception.as_ref()))
    }
}

/// Combine the weekly rule and the date's exception into one window.
///
/// A blocked exception closes the whole day, with or without a time range.
/// An open exception replaces the weekly times with its own where given,
/// falling back to the weekly rule for any side it leaves out; it can open a
/// day that has no weekly rule as long as it carries both times.
pub fn resolve_window(
    rule: Option<&AvailabilityRule>,
    exception: Option<&AvailabilityException>,
) -> DayWindow {
    let weekly = rule.filter(|r| r.is_available);

    match exception {
        Some(ex) if ex.is_blocked => DayWindow::closed(),
        Some(ex) => {
            let start = ex.start_time.or(weekly.map(|r| r.start_time));
            let end = ex.end_time.or(weekly.map(|r| r.end_time));
            match (start, end) {
                (Some(start), Some(end)) if start < end => DayWindow::open(start, end),
                _ => DayWindow::closed(),
            }
        }
        None => match weekly {
            Some(r) => DayWindow::open(r.start_time, r.end_time),
            None => DayWindow::closed(),
        },
    }
}

fn parse_hhmm(value: &str) -> Result<NaiveTime, AvailabilityError> {
    let hhmm = Regex::new(HHMM_PATTERN).expect("static pattern");
    if !hhmm.is_match(value) {
        return Err(AvailabilityError::ValidationError(format!(
            "Invalid time '{}', expected HH:MM",
            value
        )));
    }

    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| AvailabilityError::ValidationError(format!("Invalid time '{}'", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn weekly_rule(start: NaiveTime, end: NaiveTime, is_available: bool) -> AvailabilityRule {
        AvailabilityRule {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            day_of_week: 1,
            start_time: start,
            end_time: end,
            is_available,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn exception(
        start: Option<NaiveTime>,
        end: Option<NaiveTime>,
        is_blocked: bool,
    ) -> AvailabilityException {
        AvailabilityException {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2030, 1, 7).unwrap(),
            start_time: start,
            end_time: end,
            reason: None,
            is_blocked,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn weekly_rule_opens_the_day() {
        let rule = weekly_rule(time(9, 0), time(17, 0), true);
        let window = resolve_window(Some(&rule), None);
        assert_eq!(window, DayWindow::open(time(9, 0), time(17, 0)));
    }

    #[test]
    fn no_rule_means_closed() {
        assert!(!resolve_window(None, None).is_open);
    }

    #[test]
    fn unavailable_rule_means_closed() {
        let rule = weekly_rule(time(9, 0), time(17, 0), false);
        assert!(!resolve_window(Some(&rule), None).is_open);
    }

    #[test]
    fn blocked_exception_closes_day() {
        let rule = weekly_rule(time(9, 0), time(17, 0), true);
        let ex = exception(None, None, true);
        assert!(!resolve_window(Some(&rule), Some(&ex)).is_open);
    }

    #[test]
    fn blocked_exception_with_time_range_still_closes_day() {
        // Pinned behavior: a time range on a blocked exception does not
        // narrow the block to a sub-range; the whole day closes.
        let rule = weekly_rule(time(9, 0), time(17, 0), true);
        let ex = exception(Some(time(12, 0)), Some(time(13, 0)), true);
        assert!(!resolve_window(Some(&rule), Some(&ex)).is_open);
    }

    #[test]
    fn open_exception_replaces_weekly_window() {
        let rule = weekly_rule(time(9, 0), time(17, 0), true);
        let ex = exception(Some(time(11, 0)), Some(time(15, 0)), false);
        let window = resolve_window(Some(&rule), Some(&ex));
        assert_eq!(window, DayWindow::open(time(11, 0), time(15, 0)));
    }

    #[test]
    fn open_exception_merges_partial_times_with_weekly_rule() {
        let rule = weekly_rule(time(9, 0), time(17, 0), true);
        let ex = exception(Some(time(12, 0)), None, false);
        let window = resolve_window(Some(&rule), Some(&ex));
        assert_eq!(window, DayWindow::open(time(12, 0), time(17, 0)));
    }

    #[test]
    fn open_exception_can_open_a_day_without_weekly_rule() {
        let ex = exception(Some(time(10, 0)), Some(time(14, 0)), false);
        let window = resolve_window(None, Some(&ex));
        assert_eq!(window, DayWindow::open(time(10, 0), time(14, 0)));
    }

    #[test]
    fn open_exception_without_usable_times_closes_unruled_day() {
        let ex = exception(Some(time(10, 0)), None, false);
        assert!(!resolve_window(None, Some(&ex)).is_open);
    }

    #[test]
    fn hhmm_parsing_is_strict() {
        assert!(parse_hhmm("09:30").is_ok());
        assert_matches!(parse_hhmm("9:30"), Err(AvailabilityError::ValidationError(_)));
        assert_matches!(parse_hhmm("09:30:00"), Err(AvailabilityError::ValidationError(_)));
        assert_matches!(parse_hhmm("25:00"), Err(AvailabilityError::ValidationError(_)));
    }
}
