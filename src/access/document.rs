//! Access configuration documents.
//!
//! Each document keeps its raw, untemplated JSON next to the rendered
//! [`ApplicationAccessConfig`]. Saving writes the raw tree back, so resolved
//! values never replace tokens on disk. The one exception is the
//! application id, folded in by [`AccessConfigDocument::fold_identifiers_into_raw`].

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use super::template::{self, PROPERTIES_KEY};
use crate::domain::{ApplicationAccessConfig, APPLICATION_ID_PROPERTY};
use crate::errors::{Error, Result};

#[derive(Debug, Clone)]
pub struct AccessConfigDocument {
    source: String,
    raw: Value,
    config: ApplicationAccessConfig,
    unresolved: BTreeSet<String>,
}

impl AccessConfigDocument {
    /// Parse and render a document. Unresolved tokens are tolerated here.
    pub fn from_value(source: impl Into<String>, raw: Value) -> Result<Self> {
        let source = source.into();
        if !raw.is_object() {
            return Err(Error::config(format!("{}: access document must be a JSON object", source)));
        }

        let properties = match raw.get(PROPERTIES_KEY) {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                Error::config(format!("{}: properties must map strings to strings: {}", source, e))
            })?,
        };

        let (config, unresolved) = render_config(&source, &raw, properties)?;
        if config.app_display_name.trim().is_empty() {
            return Err(Error::config(format!("{}: appDisplayName is required", source)));
        }

        Ok(Self { source, raw, config, unresolved })
    }

    /// Where the document came from, usually a file path
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn config(&self) -> &ApplicationAccessConfig {
        &self.config
    }

    pub fn display_name(&self) -> &str {
        &self.config.app_display_name
    }

    /// Tokens left unresolved by the last render
    pub fn unresolved(&self) -> &BTreeSet<String> {
        &self.unresolved
    }

    /// Unresolved tokens that reconciliation does not fill in
    pub fn blocking_unresolved(&self) -> BTreeSet<String> {
        self.unresolved.iter().filter(|t| !template::is_deferred(t)).cloned().collect()
    }

    pub fn set_application_id(&mut self, application_id: &str) {
        self.config
            .properties
            .insert(APPLICATION_ID_PROPERTY.to_string(), application_id.to_string());
    }

    /// Re-render the raw tree with the live properties.
    pub fn render(&mut self) -> Result<()> {
        let properties = self.config.properties.clone();
        let (config, unresolved) = render_config(&self.source, &self.raw, properties)?;
        self.config = config;
        self.unresolved = unresolved;
        Ok(())
    }

    /// Fail with [`Error::UnresolvedTokens`] if any token is still unresolved.
    pub fn require_resolved(&self) -> Result<()> {
        if self.unresolved.is_empty() {
            Ok(())
        } else {
            Err(Error::unresolved_tokens(self.display_name(), self.unresolved.iter().cloned()))
        }
    }

    /// Copy the live application id into the raw tree.
    ///
    /// Returns whether the raw tree changed. Nothing else is written back.
    pub fn fold_identifiers_into_raw(&mut self) -> bool {
        let Some(application_id) = self.config.application_id().map(str::to_string) else {
            return false;
        };
        let Some(root) = self.raw.as_object_mut() else {
            return false;
        };

        let properties = root
            .entry(PROPERTIES_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        if properties.is_null() {
            *properties = Value::Object(Map::new());
        }
        let Some(properties) = properties.as_object_mut() else {
            return false;
        };

        if properties.get(APPLICATION_ID_PROPERTY).and_then(Value::as_str)
            == Some(application_id.as_str())
        {
            return false;
        }
        properties.insert(APPLICATION_ID_PROPERTY.to_string(), Value::String(application_id));
        true
    }
}

fn render_config(
    source: &str,
    raw: &Value,
    properties: BTreeMap<String, String>,
) -> Result<(ApplicationAccessConfig, BTreeSet<String>)> {
    let (rendered, unresolved) = template::render_document(raw, &properties);
    let mut config: ApplicationAccessConfig = serde_json::from_value(rendered)
        .map_err(|e| Error::config(format!("{}: invalid access document: {}", source, e)))?;
    config.properties = properties;
    Ok((config, unresolved))
}
