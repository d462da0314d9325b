//! Versioned prompt layers.
//!
//! A layer is immutable after creation. At most one layer per
//! (project, layer type) is active at any time; activation deactivates all
//! other versions in the same transaction. Rollback = activate an older
//! version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Identity,
    Instructions,
    Safety,
}

impl LayerType {
    pub const ALL: [LayerType; 3] = [
        LayerType::Identity,
        LayerType::Instructions,
        LayerType::Safety,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LayerType::Identity => "identity",
            LayerType::Instructions => "instructions",
            LayerType::Safety => "safety",
        }
    }
}

/// Immutable versioned prompt fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptLayer {
    pub id: Uuid,
    pub project_id: String,
    pub layer_type: LayerType,
    /// Auto-incremented per (project, layer type); smallest untaken positive
    /// integer at creation time.
    pub version: u32,
    pub content: String,
    pub is_active: bool,
    pub created_by: String,
    pub change_reason: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_type_round_trips() {
        for lt in LayerType::ALL {
            let json = serde_json::to_string(&lt).unwrap();
            let back: LayerType = serde_json::from_str(&json).unwrap();
            assert_eq!(lt, back);
        }
    }

    #[test]
    fn layer_type_as_str() {
        assert_eq!(LayerType::Identity.as_str(), "identity");
        assert_eq!(LayerType::Safety.as_str(), "safety");
    }
}
