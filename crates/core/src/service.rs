//! Civic-service records and ranked matches.

use serde::{Deserialize, Serialize};

/// One civic service, as maintained in the static catalog source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Unique display name (e.g., "児童手当")
    pub name: String,

    /// Free-text description
    #[serde(default)]
    pub description: String,

    /// Canonical reference link; `None` when unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Matching terms
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// A catalog record paired with its relevance score for one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedMatch {
    pub record: ServiceRecord,
    pub score: u32,
}
