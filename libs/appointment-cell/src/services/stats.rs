use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::StoreClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, ClinicStats, ProviderUtilization, StatsQuery,
};

/// Admin-facing aggregates over the appointment book: totals, cancellation
/// and no-show rates, and per-provider utilization against the weekly
/// availability rules.
pub struct AppointmentStatsService {
    store: Arc<StoreClient>,
}

/// Utilization compares booked minutes against four weeks of the weekly
/// availability, matching the reporting window the dashboard shows.
const UTILIZATION_WEEKS: i64 = 4;

impl AppointmentStatsService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(StoreClient::new(config)),
        }
    }

    pub fn with_store(store: Arc<StoreClient>) -> Self {
        Self { store }
    }

    pub async fn get_stats(
        &self,
        query: StatsQuery,
        auth_token: &str,
    ) -> Result<ClinicStats, AppointmentError> {
        let appointments = self.fetch_appointments(&query, auth_token).await?;

        let total_appointments = appointments.len() as i32;
        let completed_appointments = count_status(&appointments, AppointmentStatus::Completed);
        let cancelled_appointments = count_status(&appointments, AppointmentStatus::Cancelled);
        let no_show_appointments = count_status(&appointments, AppointmentStatus::NoShow);

        let total_scheduled = total_appointments - cancelled_appointments;
        let cancellation_rate = rate(cancelled_appointments, total_scheduled);
        let no_show_rate = rate(no_show_appointments, total_scheduled);

        let provider_utilization = self
            .provider_utilization(&appointments, query.provider_id, auth_token)
            .await?;

        Ok(ClinicStats {
            total_appointments,
            completed_appointments,
            cancelled_appointments,
            no_show_appointments,
            cancellation_rate,
            no_show_rate,
            provider_utilization,
        })
    }

    async fn fetch_appointments(
        &self,
        query: &StatsQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut query_parts = Vec::new();

        if let Some(provider_id) = query.provider_id {
            query_parts.push(format!("provider_id=eq.{}", provider_id));
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

        let path = if query_parts.is_empty() {
            "/rest/v1/appointments?order=start_time.asc".to_string()
        } else {
            format!(
                "/rest/v1/appointments?{}&order=start_time.asc",
                query_parts.join("&")
            )
        };

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

    async fn provider_utilization(
        &self,
        appointments: &[Appointment],
        provider_filter: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<ProviderUtilization>, AppointmentError> {
        let mut rules_path =
            "/rest/v1/availability_rules?is_available=eq.true&select=provider_id,start_time,end_time"
                .to_string();
        if let Some(provider_id) = provider_filter {
            rules_path.push_str(&format!("&provider_id=eq.{}", provider_id));
        }

        let rule_rows: Vec<Value> = self
            .store
            .request(Method::GET, &rules_path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        // Weekly open minutes per provider.
        let mut available_by_provider: HashMap<Uuid, i64> = HashMap::new();
        for row in rule_rows {
            let provider_id = row["provider_id"]
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok());
            let minutes = wall_clock_minutes(row["start_time"].as_str(), row["end_time"].as_str());

            if let (Some(provider_id), Some(minutes)) = (provider_id, minutes) {
                *available_by_provider.entry(provider_id).or_insert(0) += minutes;
            }
        }

        // Booked minutes per provider: slots actually held (scheduled or
        // delivered), not cancellations or no-shows.
        let mut booked_by_provider: HashMap<Uuid, i64> = HashMap::new();
        for apt in appointments {
            if matches!(
                apt.status,
                AppointmentStatus::Scheduled | AppointmentStatus::Completed
            ) {
                let minutes = (apt.end_time - apt.start_time).num_minutes();
                *booked_by_provider.entry(apt.provider_id).or_insert(0) += minutes;
            }
        }

        let mut utilization: Vec<ProviderUtilization> = available_by_provider
            .into_iter()
            .map(|(provider_id, weekly_minutes)| {
                let available_minutes = weekly_minutes * UTILIZATION_WEEKS;
                let booked_minutes = booked_by_provider.remove(&provider_id).unwrap_or(0);
                let utilization_pct = if available_minutes > 0 {
                    (booked_minutes as f64 / available_minutes as f64) * 100.0
                } else {
                    0.0
                };

                ProviderUtilization {
                    provider_id,
                    booked_minutes,
                    available_minutes,
                    utilization_pct: round2(utilization_pct),
                }
            })
            .collect();

        utilization.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));

        debug!("Computed utilization for {} providers", utilization.len());
        Ok(utilization)
    }
}

fn count_status(appointments: &[Appointment], status: AppointmentStatus) -> i32 {
    appointments.iter().filter(|apt| apt.status == status).count() as i32
}

fn rate(count: i32, out_of: i32) -> f64 {
    if out_of > 0 {
        round2((count as f64 / out_of as f64) * 100.0)
    } else {
        0.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn wall_clock_minutes(start: Option<&str>, end: Option<&str>) -> Option<i64> {
    let start = chrono::NaiveTime::parse_from_str(start?, "%H:%M:%S").ok()?;
    let end = chrono::NaiveTime::parse_from_str(end?, "%H:%M:%S").ok()?;
    Some((end - start).num_minutes())
}
