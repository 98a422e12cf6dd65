use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tandem_text::DiffGranularity;
use tokio::fs;

/// Engine settings, stored as JSON under `$TANDEM_ROOT/.tandem/config`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Which diff oracle derives provenance between baseline and working.
    #[serde(default)]
    pub diff_granularity: DiffGranularity,
    /// URI scheme used for baseline snapshots.
    #[serde(default = "default_baseline_scheme")]
    pub baseline_scheme: String,
    /// `tracing` filter directive used by binaries when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_baseline_scheme() -> String {
    "tandem-baseline".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            diff_granularity: DiffGranularity::default(),
            baseline_scheme: default_baseline_scheme(),
            log_filter: default_log_filter(),
        }
    }
}

impl EngineConfig {
    /// Loads the config from the default location.
    pub async fn load() -> Result<Self> {
        Self::load_from(&get_config_path()?).await
    }

    /// Loads the config from `path`. A missing, empty or corrupt file yields
    /// the defaults.
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(EngineConfig::default());
        }

        let content = fs::read_to_string(path).await?;

        if content.trim().is_empty() {
            tracing::warn!("Config file {:?} is empty, using default config", path);
            return Ok(EngineConfig::default());
        }

        let config: EngineConfig = match serde_json::from_str(&content) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(
                    "Failed to parse config {:?} ({}), using default. File may be corrupted.",
                    path,
                    e
                );
                return Ok(EngineConfig::default());
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self) -> Result<()> {
        self.save_to(&get_config_path()?).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Rejects values that would produce unusable baseline URIs.
    pub fn validate(&self) -> Result<()> {
        let scheme = &self.baseline_scheme;
        let valid = scheme
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !valid {
            return Err(SessionError::Config(format!(
                "invalid baseline scheme '{}'",
                scheme
            )));
        }
        if scheme == "file" {
            return Err(SessionError::Config(
                "baseline scheme must differ from 'file'".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn get_config_path() -> Result<PathBuf> {
    let root = get_root_dir()?;
    Ok(root.join(".tandem").join("config"))
}

pub fn get_root_dir() -> Result<PathBuf> {
    let root_str = std::env::var("TANDEM_ROOT").unwrap_or_else(|_| "tandem_data".to_string());

    let root = PathBuf::from(root_str);
    if let Ok(abs) = std::fs::canonicalize(&root) {
        Ok(abs)
    } else {
        Ok(std::env::current_dir()?.join(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::load_from(&dir.path().join("nope")).await.unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.baseline_scheme, "tandem-baseline");
    }

    #[tokio::test]
    async fn test_round_trip_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".tandem").join("config");
        let config = EngineConfig {
            diff_granularity: DiffGranularity::Char,
            log_filter: "debug".to_string(),
            ..EngineConfig::default()
        };
        config.save_to(&path).await.unwrap();

        let loaded = EngineConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, r#"{"diff_granularity":"char"}"#).unwrap();

        let loaded = EngineConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded.diff_granularity, DiffGranularity::Char);
        assert_eq!(loaded.log_filter, "info");
    }

    #[tokio::test]
    async fn test_corrupt_file_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(
            EngineConfig::load_from(&path).await.unwrap(),
            EngineConfig::default()
        );

        std::fs::write(&path, "   \n").unwrap();
        assert_eq!(
            EngineConfig::load_from(&path).await.unwrap(),
            EngineConfig::default()
        );
    }

    #[tokio::test]
    async fn test_invalid_scheme_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, r#"{"baseline_scheme":"9 bad"}"#).unwrap();
        let err = EngineConfig::load_from(&path).await.unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));

        let config = EngineConfig {
            baseline_scheme: "file".to_string(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
