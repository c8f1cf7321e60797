//! Where access documents are loaded from and saved back to.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::document::AccessConfigDocument;
use crate::errors::{Error, ItemFailure, Result};

/// Result of [`ConfigStore::load`].
#[derive(Debug, Default)]
pub struct LoadedDocuments {
    pub documents: Vec<AccessConfigDocument>,
    /// Sources that could not be read or parsed, by source name
    pub invalid: Vec<ItemFailure>,
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load every document. Fails only when the store itself cannot be
    /// read; broken documents end up in [`LoadedDocuments::invalid`].
    async fn load(&self) -> Result<LoadedDocuments>;

    /// Persist the raw form of `documents`. Returns how many were written.
    async fn save(&self, documents: &[AccessConfigDocument]) -> Result<usize>;
}

/// One JSON document per file. Directories contribute their `*.json` files
/// in name order.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    paths: Vec<PathBuf>,
}

impl FileConfigStore {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    async fn files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for path in &self.paths {
            let metadata = tokio::fs::metadata(path)
                .await
                .map_err(|e| Error::io(e, format!("Cannot access {}", path.display())))?;
            if !metadata.is_dir() {
                files.push(path.clone());
                continue;
            }

            let mut found = Vec::new();
            let mut entries = tokio::fs::read_dir(path)
                .await
                .map_err(|e| Error::io(e, format!("Cannot list {}", path.display())))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Error::io(e, format!("Cannot list {}", path.display())))?
            {
                let file = entry.path();
                if file.extension().is_some_and(|ext| ext == "json") {
                    found.push(file);
                }
            }
            found.sort();
            files.extend(found);
        }
        Ok(files)
    }
}

async fn load_file(file: &Path) -> Result<AccessConfigDocument> {
    let content = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| Error::io(e, format!("Failed to read {}", file.display())))?;
    let raw: Value = serde_json::from_str(&content)
        .map_err(|e| Error::serialization(e, format!("access document {}", file.display())))?;
    AccessConfigDocument::from_value(file.display().to_string(), raw)
}

fn to_pretty_json(document: &AccessConfigDocument) -> Result<String> {
    let mut json = serde_json::to_string_pretty(document.raw()).map_err(|e| {
        Error::serialization(e, format!("access document {}", document.source()))
    })?;
    json.push('\n');
    Ok(json)
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load(&self) -> Result<LoadedDocuments> {
        let mut loaded = LoadedDocuments::default();
        for file in self.files().await? {
            let source = file.display().to_string();
            match load_file(&file).await {
                Ok(document) => {
                    debug!(file = %source, "Loaded access document");
                    loaded.documents.push(document);
                }
                Err(e) => {
                    warn!(file = %source, error = %e, "Invalid access document");
                    loaded.invalid.push(ItemFailure::new(source, e));
                }
            }
        }
        Ok(loaded)
    }

    async fn save(&self, documents: &[AccessConfigDocument]) -> Result<usize> {
        let mut written = 0;
        for document in documents {
            let path = Path::new(document.source());
            let json = to_pretty_json(document)?;

            let current = tokio::fs::read_to_string(path).await.ok();
            if current.as_deref() == Some(json.as_str()) {
                continue;
            }

            tokio::fs::write(path, json)
                .await
                .map_err(|e| Error::io(e, format!("Failed to write {}", path.display())))?;
            info!(file = %path.display(), "Updated access document");
            written += 1;
        }
        Ok(written)
    }
}

/// Documents held in memory, keyed by source name.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    documents: Mutex<Vec<(String, Value)>>,
    saves: Mutex<usize>,
}

impl MemoryConfigStore {
    pub fn new<I, S>(documents: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        Self {
            documents: Mutex::new(documents.into_iter().map(|(s, v)| (s.into(), v)).collect()),
            saves: Mutex::new(0),
        }
    }

    pub async fn raw(&self, source: &str) -> Option<Value> {
        let documents = self.documents.lock().await;
        documents.iter().find(|(s, _)| s == source).map(|(_, v)| v.clone())
    }

    /// Number of `save` calls so far
    pub async fn save_count(&self) -> usize {
        *self.saves.lock().await
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load(&self) -> Result<LoadedDocuments> {
        let documents = self.documents.lock().await;
        let mut loaded = LoadedDocuments::default();
        for (source, raw) in documents.iter() {
            match AccessConfigDocument::from_value(source.clone(), raw.clone()) {
                Ok(document) => loaded.documents.push(document),
                Err(e) => loaded.invalid.push(ItemFailure::new(source.clone(), e)),
            }
        }
        Ok(loaded)
    }

    async fn save(&self, documents: &[AccessConfigDocument]) -> Result<usize> {
        let mut stored = self.documents.lock().await;
        let mut written = 0;
        for document in documents {
            match stored.iter_mut().find(|(s, _)| s == document.source()) {
                Some((_, raw)) if raw == document.raw() => {}
                Some((_, raw)) => {
                    *raw = document.raw().clone();
                    written += 1;
                }
                None => {
                    stored.push((document.source().to_string(), document.raw().clone()));
                    written += 1;
                }
            }
        }
        *self.saves.lock().await += 1;
        Ok(written)
    }
}
