//! External identities per project, resolved from inbound channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An external identity (a person or system) attached to a project.
/// Looked up by `(project_id, channel identifier)` where the identifier is
/// a phone number, email, or opaque external id depending on the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Uuid,
    pub project_id: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Contact {
    /// True when any of the identity fields equals the given identifier.
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        self.phone.as_deref() == Some(identifier)
            || self.email.as_deref() == Some(identifier)
            || self.external_id.as_deref() == Some(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_any_identity_field() {
        let c = Contact {
            id: Uuid::new_v4(),
            project_id: "P1".into(),
            phone: Some("+15550001".into()),
            email: None,
            external_id: Some("tg:42".into()),
            name: None,
            language: None,
            role: None,
            metadata: None,
            created_at: Utc::now(),
        };
        assert!(c.matches_identifier("+15550001"));
        assert!(c.matches_identifier("tg:42"));
        assert!(!c.matches_identifier("someone@example.com"));
    }
}
