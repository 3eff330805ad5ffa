//! Registration store.
//!
//! The store is the persisted view of what is registered: handler
//! enable flags plus intent, rule and cron records. Records here take
//! precedence over what handler manifests declare.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lisa_hooks::RuleRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerRecord {
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRecord {
    pub name: String,
    pub handler: String,
    pub entry_point: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i_can: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronRecord {
    pub name: String,
    #[serde(default)]
    pub handler: String,
    pub entry_point: String,
    /// Six- or seven-field cron expression (seconds first).
    pub schedule: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    #[serde(default)]
    pub handlers: Vec<HandlerRecord>,
    #[serde(default)]
    pub intents: Vec<IntentRecord>,
    #[serde(default)]
    pub rules: Vec<RuleRecord>,
    #[serde(default)]
    pub crons: Vec<CronRecord>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read registration store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse registration store {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn load(&self) -> Result<StoreDocument, StoreError>;
}

/// Store backed by one YAML or JSON document, chosen by extension.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RegistrationStore for FileStore {
    async fn load(&self) -> Result<StoreDocument, StoreError> {
        let path = &self.path;
        if !path.exists() {
            debug!(path = %path.display(), "Registration store does not exist; starting empty");
            return Ok(StoreDocument::default());
        }
        let raw = fs::read_to_string(path).await.map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let parse_error = |message: String| StoreError::Parse {
            path: path.clone(),
            message,
        };
        let doc: StoreDocument = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&raw).map_err(|e| parse_error(e.to_string()))?
        } else if raw.trim().is_empty() {
            StoreDocument::default()
        } else {
            serde_yaml::from_str(&raw).map_err(|e| parse_error(e.to_string()))?
        };
        info!(
            path = %path.display(),
            intents = doc.intents.len(),
            rules = doc.rules.len(),
            crons = doc.crons.len(),
            "Loaded registration store"
        );
        Ok(doc)
    }
}

/// In-process store, used when no store file is configured.
#[derive(Default)]
pub struct MemoryStore {
    doc: RwLock<StoreDocument>,
}

impl MemoryStore {
    pub fn new(doc: StoreDocument) -> Self {
        Self { doc: RwLock::new(doc) }
    }

    pub async fn replace(&self, doc: StoreDocument) {
        *self.doc.write().await = doc;
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn load(&self) -> Result<StoreDocument, StoreError> {
        Ok(self.doc.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_yaml_store() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "handlers:\n  - name: Weather\n    enabled: false\nintents:\n  - name: weather_today\n    handler: Weather\n    entryPoint: today\n"
        )
        .unwrap();
        let doc = FileStore::new(file.path()).load().await.unwrap();
        assert!(!doc.handlers[0].enabled);
        assert_eq!(doc.intents[0].entry_point, "today");
        assert!(doc.intents[0].enabled);
        assert!(doc.rules.is_empty());
    }

    #[tokio::test]
    async fn test_load_json_store() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"crons":[{{"name":"tick","handler":"Clock","entryPoint":"tick","schedule":"*/5 * * * * *"}}]}}"#
        )
        .unwrap();
        let doc = FileStore::new(file.path()).load().await.unwrap();
        assert_eq!(doc.crons[0].schedule, "*/5 * * * * *");
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let doc = FileStore::new(dir.path().join("absent.yaml")).load().await.unwrap();
        assert_eq!(doc, StoreDocument::default());
    }

    #[tokio::test]
    async fn test_malformed_store_is_reported() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = FileStore::new(file.path()).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_memory_store_replace() {
        let store = MemoryStore::default();
        assert!(store.load().await.unwrap().intents.is_empty());
        store
            .replace(StoreDocument {
                handlers: vec![HandlerRecord { name: "Core".into(), enabled: true }],
                ..Default::default()
            })
            .await;
        assert_eq!(store.load().await.unwrap().handlers.len(), 1);
    }
}
