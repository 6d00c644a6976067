use crate::{
    domain::Priority,
    error::{Result, TavlaError},
    storage::{FileStorage, MemoryStorage, Storage},
};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, sync::Arc};
use tokio::fs;

/// Which backend persists committed state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    #[default]
    Memory,
    File {
        root: PathBuf,
    },
}

impl StorageConfig {
    pub fn build(&self) -> Arc<dyn Storage> {
        match self {
            Self::Memory => Arc::new(MemoryStorage::new()),
            Self::File { root } => Arc::new(FileStorage::new(root)),
        }
    }
}

/// Values used when create calls leave a field out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub board_color: String,
    pub lane_color: String,
    pub priority: Priority,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            board_color: "#1e293b".to_string(),
            lane_color: "#64748b".to_string(),
            priority: Priority::Medium,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TavlaConfig {
    pub storage: StorageConfig,
    pub defaults: Defaults,
}

impl TavlaConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| TavlaError::ConfigError(e.to_string()))
    }

    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).await?;
        Self::from_json_str(&contents)
    }

    /// File-backed configuration rooted at `root`
    pub fn file(root: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig::File { root: root.into() },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TavlaConfig::default();
        assert_eq!(config.storage, StorageConfig::Memory);
        assert_eq!(config.defaults.priority, Priority::Medium);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config = TavlaConfig::from_json_str(
            r##"{ "defaults": { "lane_color": "#ff0000", "priority": "HIGH" } }"##,
        )
        .unwrap();

        assert_eq!(config.storage, StorageConfig::Memory);
        assert_eq!(config.defaults.lane_color, "#ff0000");
        assert_eq!(config.defaults.board_color, "#1e293b");
        assert_eq!(config.defaults.priority, Priority::High);
    }

    #[test]
    fn test_file_storage_config() {
        let config =
            TavlaConfig::from_json_str(r#"{ "storage": { "kind": "file", "root": "/tmp/x" } }"#)
                .unwrap();
        assert_eq!(
            config.storage,
            StorageConfig::File {
                root: PathBuf::from("/tmp/x")
            }
        );
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = TavlaConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, TavlaError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_from_json_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("tavla.json");
        tokio::fs::write(&path, r#"{ "defaults": { "priority": "LOW" } }"#)
            .await
            .unwrap();

        let config = TavlaConfig::from_json_file(&path).await.unwrap();
        assert_eq!(config.defaults.priority, Priority::Low);
    }
}
