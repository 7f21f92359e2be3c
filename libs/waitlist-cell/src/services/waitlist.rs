use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::StoreClient;

use crate::models::{CreateWaitlistRequest, WaitlistEntry, WaitlistError, WaitlistQuery, WaitlistStatus};

pub struct WaitlistService {
    store: Arc<StoreClient>,
}

impl WaitlistService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(StoreClient::new(config)),
        }
    }

    pub fn with_store(store: Arc<StoreClient>) -> Self {
        Self { store }
    }

    pub async fn create_entry(
        &self,
        patient_id: Uuid,
        request: CreateWaitlistRequest,
        auth_token: &str,
    ) -> Result<WaitlistEntry, WaitlistError> {
        if let Some(days) = &request.preferred_days {
            if days.iter().any(|d| *d < 0 || *d > 6) {
                return Err(WaitlistError::ValidationError(
                    "Preferred days must be between 0 (Sunday) and 6 (Saturday)".to_string(),
                ));
            }
        }

        let entry_data = json!({
            "patient_id": patient_id,
            "appointment_type_id": request.appointment_type_id,
            "provider_id": request.provider_id,
            "preferred_days": request.preferred_days,
            "status": WaitlistStatus::Active.to_string(),
        });

        let result = self
            .store
            .write_returning(
                Method::POST,
                "/rest/v1/waitlist_entries",
                Some(auth_token),
                entry_data,
            )
            .await
            .map_err(|e| WaitlistError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or_else(|| {
            WaitlistError::DatabaseError("Failed to create waitlist entry".to_string())
        })?;

        let entry: WaitlistEntry = serde_json::from_value(row).map_err(|e| {
            WaitlistError::DatabaseError(format!("Failed to parse waitlist entry: {}", e))
        })?;

        debug!("Waitlist entry {} created for patient {}", entry.id, patient_id);
        Ok(entry)
    }

    /// List entries, optionally narrowed to a patient and/or status. Role
    /// scoping (patients see only their own) is the handler's concern.
    pub async fn list_entries(
        &self,
        query: WaitlistQuery,
        auth_token: &str,
    ) -> Result<Vec<WaitlistEntry>, WaitlistError> {
        let mut query_parts = Vec::new();

        if let Some(patient_id) = query.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }

        let path = if query_parts.is_empty() {
            "/rest/v1/waitlist_entries?order=created_at.desc".to_string()
        } else {
            format!(
                "/rest/v1/waitlist_entries?{}&order=created_at.desc",
                query_parts.join("&")
            )
        };

        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| WaitlistError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<WaitlistEntry>, _>>()
            .map_err(|e| {
                WaitlistError::DatabaseError(format!("Failed to parse waitlist entries: {}", e))
            })
    }
}
