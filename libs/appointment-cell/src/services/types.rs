use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::StoreClient;

use crate::models::{AppointmentError, AppointmentTypeRecord, CreateAppointmentTypeRequest};

/// The catalog of bookable visit kinds. Archiving keeps historical
/// appointments pointing at a real record while hiding the type from new
/// bookings.
pub struct AppointmentTypeService {
    store: Arc<StoreClient>,
}

impl AppointmentTypeService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(StoreClient::new(config)),
        }
    }

    pub fn with_store(store: Arc<StoreClient>) -> Self {
        Self { store }
    }

    pub async fn list_types(
        &self,
        include_archived: bool,
        auth_token: &str,
    ) -> Result<Vec<AppointmentTypeRecord>, AppointmentError> {
        let mut path = "/rest/v1/appointment_types?order=name.asc".to_string();
        if !include_archived {
            path.push_str("&is_archived=eq.false");
        }

        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AppointmentTypeRecord>, _>>()
            .map_err(|e| {
                AppointmentError::DatabaseError(format!("Failed to parse appointment types: {}", e))
            })
    }

    pub async fn create_type(
        &self,
        request: CreateAppointmentTypeRequest,
        auth_token: &str,
    ) -> Result<AppointmentTypeRecord, AppointmentError> {
        if request.name.trim().is_empty() {
            return Err(AppointmentError::InvalidInput(
                "Name must not be empty".to_string(),
            ));
        }
        if request.duration_minutes <= 0 {
            return Err(AppointmentError::InvalidInput(
                "Duration must be positive".to_string(),
            ));
        }
        if request.price < 0.0 {
            return Err(AppointmentError::InvalidInput(
                "Price cannot be negative".to_string(),
            ));
        }

        let type_data = json!({
            "name": request.name,
            "description": request.description,
            "duration_minutes": request.duration_minutes,
            "buffer_minutes": request.buffer_minutes.unwrap_or(0),
            "price": request.price,
            "is_archived": false,
        });

        let result = self
            .store
            .write_returning(
                Method::POST,
                "/rest/v1/appointment_types",
                Some(auth_token),
                type_data,
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or_else(|| {
            AppointmentError::DatabaseError("Failed to create appointment type".to_string())
        })?;

        let record: AppointmentTypeRecord = serde_json::from_value(row).map_err(|e| {
            AppointmentError::DatabaseError(format!("Failed to parse appointment type: {}", e))
        })?;

        debug!("Appointment type created: {}", record.name);
        Ok(record)
    }

    pub async fn archive_type(
        &self,
        type_id: Uuid,
        auth_token: &str,
    ) -> Result<AppointmentTypeRecord, AppointmentError> {
        let path = format!("/rest/v1/appointment_types?id=eq.{}", type_id);
        let update_data = json!({ "is_archived": true });

        let result = self
            .store
            .write_returning(Method::PATCH, &path, Some(auth_token), update_data)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(AppointmentError::NotFound)?;

        serde_json::from_value(row).map_err(|e| {
            AppointmentError::DatabaseError(format!("Failed to parse appointment type: {}", e))
        })
    }
}
