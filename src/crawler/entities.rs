//! Loading of the entity (municipality) list

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::crawler::domain::AllowedDomains;
use crate::crawler::storage::sanitize_file_name;
use crate::error::Error as CrateError;

/// A municipality or organisation to crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Unique name, also used for the result file name
    pub name: String,

    /// Seed URL of the crawl
    pub url: Url,

    /// Postal code, if the entity list provides one
    pub postal_code: Option<String>,

    /// Region or district, if the entity list provides one
    pub region: Option<String>,
}

/// Error type for entity list loading
#[derive(Debug, Error)]
pub enum EntityError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Entity list must be a JSON array of records")]
    NotAnArray,
}

impl From<EntityError> for CrateError {
    fn from(err: EntityError) -> Self {
        CrateError::Entities(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    name: Option<String>,
    #[serde(alias = "websiteUrl", alias = "website_url", alias = "website")]
    url: Option<String>,
    #[serde(alias = "postalCode", alias = "npa", alias = "zip")]
    postal_code: Option<Value>,
    #[serde(alias = "district")]
    region: Option<Value>,
}

/// Postal codes and regions appear both as strings and as numbers
fn scalar_to_string(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read and validate the entity list at `path`
pub fn load_entities(path: &Path) -> Result<Vec<Entity>, EntityError> {
    let raw = std::fs::read_to_string(path)?;
    let entities = parse_entities(&raw)?;
    info!("Loaded {} entities from {}", entities.len(), path.display());
    Ok(entities)
}

/// Parse an entity list, skipping malformed records with a warning
///
/// A record is malformed when its name or URL is missing or blank, when the
/// URL cannot be parsed or has no host, or when its name repeats an earlier
/// record. Names that differ but map to the same result file name are also
/// rejected, keeping the first.
pub fn parse_entities(raw: &str) -> Result<Vec<Entity>, EntityError> {
    let records = match serde_json::from_str::<Value>(raw)? {
        Value::Array(records) => records,
        _ => return Err(EntityError::NotAnArray),
    };

    // result file name -> entity name
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut entities = Vec::with_capacity(records.len());

    for (index, record) in records.into_iter().enumerate() {
        let raw: RawEntity = match serde_json::from_value(record) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping entity #{}: {}", index, e);
                continue;
            }
        };

        let Some(name) = raw.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) else {
            warn!("Skipping entity #{}: missing name", index);
            continue;
        };

        let Some(url) = raw.url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) else {
            warn!("[{}] Skipping entity: missing URL", name);
            continue;
        };

        let url = match Url::parse(&url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            Ok(url) => {
                warn!("[{}] Skipping entity: unsupported URL scheme in {}", name, url);
                continue;
            }
            Err(e) => {
                warn!("[{}] Skipping entity: invalid URL '{}': {}", name, url, e);
                continue;
            }
        };

        if AllowedDomains::from_seed(&url).is_err() {
            warn!("[{}] Skipping entity: URL has no host", name);
            continue;
        }

        let file_name = sanitize_file_name(&name);
        if let Some(first) = seen.get(&file_name) {
            if *first == name {
                warn!("[{}] Skipping duplicate entity", name);
            } else {
                warn!(
                    "[{}] Skipping entity: result file '{}.json' already belongs to '{}'",
                    name, file_name, first
                );
            }
            continue;
        }
        seen.insert(file_name, name.clone());

        entities.push(Entity {
            name,
            url,
            postal_code: scalar_to_string(raw.postal_code),
            region: scalar_to_string(raw.region),
        });
    }

    Ok(entities)
}
