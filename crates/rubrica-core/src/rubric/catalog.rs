//! Read-only rubric catalog collaborators.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tracing::debug;

use crate::errors::{GradingError, GradingResult};

/// Raw definition as stored in the catalog.
#[derive(Debug, Clone)]
pub enum EntryBody {
    Parsed(Value),
    Json(String),
    Yaml(String),
}

impl EntryBody {
    pub fn into_value(self) -> Result<Value, String> {
        match self {
            Self::Parsed(v) => Ok(v),
            Self::Json(text) => {
                serde_json::from_str(&text).map_err(|e| format!("invalid JSON: {}", e))
            }
            Self::Yaml(text) => {
                serde_yaml::from_str(&text).map_err(|e| format!("invalid YAML: {}", e))
            }
        }
    }
}

/// A catalog hit: the entry's own name plus its raw body.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub name: String,
    pub body: EntryBody,
}

/// Lookup of raw rubric definitions by case-insensitive name.
#[async_trait]
pub trait RubricCatalog: Send + Sync {
    /// `Ok(None)` when no entry matches; `Err` only for catalog access failures.
    async fn lookup(&self, name: &str) -> GradingResult<Option<CatalogEntry>>;
}

/// In-memory catalog, mostly for tests and embedded rubric sets.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    entries: BTreeMap<String, (String, Value)>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rubric(mut self, name: impl Into<String>, definition: Value) -> Self {
        self.insert(name, definition);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, definition: Value) {
        let name = name.into();
        self.entries
            .insert(name.to_lowercase(), (name, definition));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RubricCatalog for MemoryCatalog {
    async fn lookup(&self, name: &str) -> GradingResult<Option<CatalogEntry>> {
        Ok(self
            .entries
            .get(&name.to_lowercase())
            .map(|(name, def)| CatalogEntry {
                name: name.clone(),
                body: EntryBody::Parsed(def.clone()),
            }))
    }
}

/// Directory of `<NAME>.json` / `<NAME>.yaml` files; the file stem is the rubric name.
#[derive(Debug, Clone)]
pub struct DirCatalog {
    dir: PathBuf,
}

impl DirCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl RubricCatalog for DirCatalog {
    async fn lookup(&self, name: &str) -> GradingResult<Option<CatalogEntry>> {
        let wanted = name.to_lowercase();
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| GradingError::Config {
                message: format!("failed to read rubric dir {}: {}", self.dir.display(), e),
            })?;

        let mut matches = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| GradingError::Config {
            message: format!("failed to list rubric dir: {}", e),
        })? {
            let path = entry.path();
            let (Some(stem), Some(ext)) = (
                path.file_stem().and_then(|s| s.to_str()),
                path.extension().and_then(|s| s.to_str()),
            ) else {
                continue;
            };
            let ext = ext.to_ascii_lowercase();
            if !matches!(ext.as_str(), "json" | "yaml" | "yml") {
                continue;
            }
            if stem.to_lowercase() == wanted {
                matches.push((stem.to_string(), ext, path.clone()));
            }
        }

        // Deterministic pick when both FOO.json and foo.yaml exist.
        matches.sort();
        let Some((stem, ext, path)) = matches.into_iter().next() else {
            debug!(name, dir = %self.dir.display(), "rubric not in catalog");
            return Ok(None);
        };

        let text = fs::read_to_string(&path)
            .await
            .map_err(|e| GradingError::Config {
                message: format!("failed to read rubric {}: {}", path.display(), e),
            })?;
        let body = if ext == "json" {
            EntryBody::Json(text)
        } else {
            EntryBody::Yaml(text)
        };
        Ok(Some(CatalogEntry { name: stem, body }))
    }
}
