use std::sync::Arc;

use chrono::NaiveTime;
use regex::Regex;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::StoreClient;

use crate::models::{ClinicPolicy, PolicyError, UpdateClinicPolicyRequest};

const HHMM_PATTERN: &str = r"^([0-1][0-9]|2[0-3]):[0-5][0-9]$";

/// Reads and writes the clinic policy singleton. Reads substitute built-in
/// defaults when no record exists, so callers never branch on "missing
/// configuration".
pub struct ClinicPolicyService {
    store: Arc<StoreClient>,
}

impl ClinicPolicyService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(StoreClient::new(config)),
        }
    }

    pub fn with_store(store: Arc<StoreClient>) -> Self {
        Self { store }
    }

    /// Fetch the effective policy. A missing record, or a store failure on
    /// this read-mostly path, yields the defaults rather than an error.
    pub async fn get_policy(&self, auth_token: &str) -> ClinicPolicy {
        let result: Result<Vec<Value>, _> = self
            .store
            .request(
                Method::GET,
                "/rest/v1/clinic_policies?id=eq.default",
                Some(auth_token),
                None,
            )
            .await;

        match result {
            Ok(rows) => match rows.into_iter().next() {
                Some(row) => serde_json::from_value(row).unwrap_or_else(|e| {
                    warn!("Malformed clinic policy record, using defaults: {}", e);
                    ClinicPolicy::default()
                }),
                None => {
                    debug!("No clinic policy record, using defaults");
                    ClinicPolicy::default()
                }
            },
            Err(e) => {
                warn!("Failed to read clinic policy, using defaults: {}", e);
                ClinicPolicy::default()
            }
        }
    }

    /// Admin upsert of the singleton record.
    pub async fn upsert_policy(
        &self,
        request: UpdateClinicPolicyRequest,
        auth_token: &str,
    ) -> Result<ClinicPolicy, PolicyError> {
        let (office_hours_start, office_hours_end) =
            validate_office_hours(&request.office_hours_start, &request.office_hours_end)?;

        if request.cancellation_cutoff_hours < 0 || request.reschedule_cutoff_hours < 0 {
            return Err(PolicyError::ValidationError(
                "Cutoff hours cannot be negative".to_string(),
            ));
        }

        let policy_data = json!({
            "id": "default",
            "cancellation_cutoff_hours": request.cancellation_cutoff_hours,
            "reschedule_cutoff_hours": request.reschedule_cutoff_hours,
            "office_hours_start": office_hours_start.format("%H:%M:%S").to_string(),
            "office_hours_end": office_hours_end.format("%H:%M:%S").to_string(),
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
                "/rest/v1/clinic_policies?on_conflict=id",
                Some(auth_token),
                Some(policy_data),
                Some(headers),
            )
            .await
            .map_err(|e| PolicyError::DatabaseError(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| PolicyError::DatabaseError("Failed to upsert policy".to_string()))?;

        let policy: ClinicPolicy = serde_json::from_value(row)
            .map_err(|e| PolicyError::DatabaseError(format!("Failed to parse policy: {}", e)))?;

        debug!(
            "Clinic policy updated: cancel cutoff {}h, reschedule cutoff {}h",
            policy.cancellation_cutoff_hours, policy.reschedule_cutoff_hours
        );

        Ok(policy)
    }
}

fn validate_office_hours(
    start: &str,
    end: &str,
) -> Result<(NaiveTime, NaiveTime), PolicyError> {
    let hhmm = Regex::new(HHMM_PATTERN).expect("static pattern");

    for value in [start, end] {
        if !hhmm.is_match(value) {
            return Err(PolicyError::ValidationError(format!(
                "Invalid time '{}', expected HH:MM",
                value
            )));
        }
    }

    let start_time = NaiveTime::parse_from_str(start, "%H:%M")
        .map_err(|_| PolicyError::ValidationError(format!("Invalid time '{}'", start)))?;
    let end_time = NaiveTime::parse_from_str(end, "%H:%M")
        .map_err(|_| PolicyError::ValidationError(format!("Invalid time '{}'", end)))?;

    if start_time >= end_time {
        return Err(PolicyError::ValidationError(
            "Office hours start must be before end".to_string(),
        ));
    }

    Ok((start_time, end_time))
}
