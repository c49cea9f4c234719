//! Canonical company record

use serde::{Deserialize, Serialize};

/// Normalized company record, independent of the backend dialect it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    /// Always the id the caller asked for
    pub id: String,
    pub name: String,
    pub active: bool,
    /// Raw closure/dissolution date as sent by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_until: Option<String>,
}
