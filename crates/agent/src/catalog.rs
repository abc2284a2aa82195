//! Service catalog — the read-only set of civic-service records.
//!
//! Loaded once at startup from a JSON array of `{name, description, url,
//! keywords}` objects. Loading fails soft: a missing or malformed source
//! yields an empty catalog, and an empty catalog never recommends anything.

use madoguchi_core::error::CatalogError;
use madoguchi_core::service::ServiceRecord;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    records: Vec<ServiceRecord>,
}

impl Catalog {
    /// Load from `path`, degrading to an empty catalog on any failure.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(catalog) => {
                info!(path = %path.display(), records = catalog.len(), "Service catalog loaded");
                catalog
            }
            Err(e) => {
                warn!(error = %e, "Service catalog unavailable, continuing with an empty catalog");
                Self::default()
            }
        }
    }

    /// Load from `path`. A missing file is an empty catalog, not an error.
    pub fn try_load(path: &Path) -> Result<Self, CatalogError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No service catalog found");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(CatalogError::Read {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };

        Self::from_json(&content).map_err(|e| CatalogError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let records: Vec<ServiceRecord> = serde_json::from_str(json)?;
        Ok(Self::from_records(records))
    }

    /// Build from records, normalizing keywords and URLs.
    ///
    /// Keywords are trimmed, blanks dropped, duplicates removed (first
    /// occurrence wins). A blank URL is treated as unknown.
    pub fn from_records(records: Vec<ServiceRecord>) -> Self {
        let records = records
            .into_iter()
            .filter(|r| !r.name.trim().is_empty())
            .map(normalize)
            .collect();
        Self { records }
    }

    pub fn records(&self) -> &[ServiceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn normalize(mut record: ServiceRecord) -> ServiceRecord {
    let mut keywords: Vec<String> = Vec::with_capacity(record.keywords.len());
    for keyword in record.keywords.drain(..) {
        let keyword = keyword.trim();
        if !keyword.is_empty() && !keywords.iter().any(|k| k == keyword) {
            keywords.push(keyword.to_string());
        }
    }
    record.keywords = keywords;
    record.url = record.url.filter(|u| !u.trim().is_empty());
    record
}
