use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::StoreClient;

use crate::models::{AuditAction, AuditError, AuditLogEntry, AuditLogQuery, EntityType};

/// Append-only audit trail over the `audit_logs` table. Writes are
/// best-effort observers of the primary mutation: a failed write is logged
/// and swallowed so it can never fail or roll back the caller.
pub struct AuditService {
    store: Arc<StoreClient>,
}

impl AuditService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(StoreClient::new(config)),
        }
    }

    pub fn with_store(store: Arc<StoreClient>) -> Self {
        Self { store }
    }

    /// Record an audit event. Fire-and-forget: errors never propagate.
    pub async fn log_event(
        &self,
        actor_user_id: &str,
        action: AuditAction,
        entity_type: EntityType,
        entity_id: Option<&str>,
        metadata: Value,
        auth_token: &str,
    ) {
        let entry = json!({
            "actor_user_id": actor_user_id,
            "action": action.to_string(),
            "entity_type": entity_type.to_string(),
            "entity_id": entity_id,
            "metadata": metadata,
        });

        let result: Result<Vec<Value>, _> = self
            .store
            .request(Method::POST, "/rest/v1/audit_logs", Some(auth_token), Some(entry))
            .await;

        match result {
            Ok(_) => debug!("Audit event recorded: {} by {}", action, actor_user_id),
            Err(e) => warn!("Failed to record audit event {}: {}", action, e),
        }
    }

    /// Query the audit trail (admin viewer).
    pub async fn list_events(
        &self,
        query: AuditLogQuery,
        auth_token: &str,
    ) -> Result<Vec<AuditLogEntry>, AuditError> {
        let mut query_parts = Vec::new();

        if let Some(actor) = &query.actor_user_id {
            query_parts.push(format!("actor_user_id=eq.{}", actor));
        }
        if let Some(action) = query.action {
            query_parts.push(format!("action=eq.{}", action));
        }
        if let Some(entity_type) = &query.entity_type {
            query_parts.push(format!("entity_type=eq.{}", entity_type));
        }
        if let Some(from_date) = query.from_date {
            let encoded = urlencoding::encode(&from_date.to_rfc3339()).into_owned();
            query_parts.push(format!("created_at=gte.{}", encoded));
        }
        if let Some(to_date) = query.to_date {
            let encoded = urlencoding::encode(&to_date.to_rfc3339()).into_owned();
            query_parts.push(format!("created_at=lte.{}", encoded));
        }

        query_parts.push(format!("limit={}", query.limit.unwrap_or(100)));
        if let Some(offset) = query.offset {
            query_parts.push(format!("offset={}", offset));
        }

        let path = format!(
            "/rest/v1/audit_logs?{}&order=created_at.desc",
            query_parts.join("&")
        );

        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AuditError::DatabaseError(e.to_string()))?;

        let entries: Vec<AuditLogEntry> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AuditLogEntry>, _>>()
            .map_err(|e| AuditError::DatabaseError(format!("Failed to parse audit entries: {}", e)))?;

        Ok(entries)
    }
}
