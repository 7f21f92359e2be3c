use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub iat: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// The three roles known to the clinic. The JWT role claim is stored
/// uppercase ("PATIENT", "PROVIDER", "ADMIN").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Patient,
    Provider,
    Admin,
}

impl ActorRole {
    pub fn parse(role: &str) -> Option<Self> {
        match role {
            "PATIENT" => Some(ActorRole::Patient),
            "PROVIDER" => Some(ActorRole::Provider),
            "ADMIN" => Some(ActorRole::Admin),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, ActorRole::Admin)
    }

    pub fn is_provider(&self) -> bool {
        matches!(self, ActorRole::Provider)
    }

    pub fn is_patient(&self) -> bool {
        matches!(self, ActorRole::Patient)
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorRole::Patient => write!(f, "PATIENT"),
            ActorRole::Provider => write!(f, "PROVIDER"),
            ActorRole::Admin => write!(f, "ADMIN"),
        }
    }
}

impl User {
    pub fn actor_role(&self) -> Option<ActorRole> {
        self.role.as_deref().and_then(ActorRole::parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_roles() {
        assert_eq!(ActorRole::parse("PATIENT"), Some(ActorRole::Patient));
        assert_eq!(ActorRole::parse("PROVIDER"), Some(ActorRole::Provider));
        assert_eq!(ActorRole::parse("ADMIN"), Some(ActorRole::Admin));
        assert_eq!(ActorRole::parse("patient"), None);
        assert_eq!(ActorRole::parse("superuser"), None);
    }

    #[test]
    fn role_display_round_trips() {
        for role in [ActorRole::Patient, ActorRole::Provider, ActorRole::Admin] {
            assert_eq!(ActorRole::parse(&role.to_string()), Some(role));
        }
    }
}
