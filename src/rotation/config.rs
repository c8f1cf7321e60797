//! Plan configuration documents.
//!
//! A configuration path is either a JSON file holding one plan object or an
//! array of plans, or a directory whose `*.json` files are read in name
//! order. Documents that fail to parse or validate do not stop the load;
//! they are returned alongside the valid ones so they can be reported.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use validator::Validate;

use super::plan::RevocationPolicy;
use crate::errors::{Error, ItemFailure, Result};
use crate::secrets::StoreDefinition;

const DEFAULT_ROTATION_PERIOD: Duration = Duration::from_secs(90 * 24 * 3600);

fn default_rotation_period() -> Duration {
    DEFAULT_ROTATION_PERIOD
}

/// Declarative definition of one rotation plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlanDocument {
    #[validate(length(min = 1, max = 128, message = "name must be 1-128 characters"))]
    pub name: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default = "default_rotation_period", with = "humantime_serde")]
    pub rotation_period: Duration,

    /// Falls back to the runtime default when absent
    #[serde(default, with = "humantime_serde")]
    pub warning_window: Option<Duration>,

    #[serde(default)]
    pub revocation: RevocationPolicy,

    #[validate(length(min = 1, message = "at least one store is required"))]
    pub stores: Vec<StoreDefinition>,
}

/// Result of loading a configuration path.
#[derive(Debug, Default)]
pub struct LoadedPlans {
    pub documents: Vec<PlanDocument>,
    /// Entries that could not be turned into a document, by plan name
    pub invalid: Vec<ItemFailure>,
}

impl LoadedPlans {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.invalid.is_empty()
    }
}

/// Load every plan document under `path`.
///
/// Fails only when the path itself cannot be read; problems with individual
/// plans end up in [`LoadedPlans::invalid`].
pub fn load_plans(path: &Path) -> Result<LoadedPlans> {
    let files = plan_files(path)?;
    let mut loaded = LoadedPlans::default();
    let mut names = HashSet::new();

    for file in files {
        let raw = std::fs::read_to_string(&file)
            .map_err(|e| Error::io(e, format!("Failed to read {}", file.display())))?;

        let entries = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items,
            Ok(item) => vec![item],
            Err(e) => {
                warn!(file = %file.display(), error = %e, "Plan file is not valid JSON");
                loaded.invalid.push(ItemFailure::new(
                    file.display().to_string(),
                    Error::serialization(e, format!("plan file {}", file.display())),
                ));
                continue;
            }
        };

        for (index, entry) in entries.into_iter().enumerate() {
            let label = entry
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}#{}", file.display(), index));

            match parse_document(entry) {
                Ok(document) if !names.insert(document.name.clone()) => {
                    loaded.invalid.push(ItemFailure::new(
                        label,
                        Error::config(format!("Plan '{}' is defined more than once", document.name)),
                    ));
                }
                Ok(document) => {
                    debug!(plan = %document.name, file = %file.display(), "Loaded plan");
                    loaded.documents.push(document);
                }
                Err(error) => {
                    warn!(plan = %label, error = %error, "Invalid plan definition");
                    loaded.invalid.push(ItemFailure::new(label, error));
                }
            }
        }
    }

    Ok(loaded)
}

fn parse_document(entry: Value) -> Result<PlanDocument> {
    let document: PlanDocument = serde_json::from_value(entry)
        .map_err(|e| Error::config(format!("Invalid plan definition: {}", e)))?;
    document.validate()?;
    Ok(document)
}

fn plan_files(path: &Path) -> Result<Vec<PathBuf>> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| Error::io(e, format!("Cannot access {}", path.display())))?;

    if !metadata.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    let entries = std::fs::read_dir(path)
        .map_err(|e| Error::io(e, format!("Cannot list {}", path.display())))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(e, format!("Cannot list {}", path.display())))?;
        let file = entry.path();
        if file.is_file() && file.extension().is_some_and(|ext| ext == "json") {
            files.push(file);
        }
    }
    files.sort();
    Ok(files)
}
