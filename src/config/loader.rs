//! Configuration Loader
//!
//! Environment-aware configuration loading: discovers the base YAML file,
//! merges the environment-specific overlay on top, and validates the result.

use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::GuildMirrorConfig;
use crate::error::{MirrorError, Result};

const BASE_FILE: &str = "guildmirror-config.yaml";

/// Loaded configuration plus the environment it was resolved for
pub struct ConfigManager {
    config: GuildMirrorConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> Result<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> Result<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load from a specific directory with an explicit environment; used by
    /// tests to avoid mutating process-global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> Result<Arc<ConfigManager>> {
        let config_directory =
            config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let config = Self::load_and_merge(&config_directory, environment)?;
        config.validate()?;

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    pub fn config(&self) -> &GuildMirrorConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    fn detect_environment() -> String {
        env::var("GUILDMIRROR_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn load_and_merge(directory: &Path, environment: &str) -> Result<GuildMirrorConfig> {
        let base_path = directory.join(BASE_FILE);
        let mut merged = if base_path.exists() {
            Self::read_yaml(&base_path)?
        } else {
            warn!(
                path = %base_path.display(),
                "Base configuration file missing, starting from defaults"
            );
            YamlValue::Mapping(serde_yaml::Mapping::new())
        };

        let overlay_path =
            directory.join(format!("guildmirror-config-{environment}.yaml"));
        if overlay_path.exists() {
            let overlay = Self::read_yaml(&overlay_path)?;
            merge_yaml(&mut merged, overlay);
            debug!(path = %overlay_path.display(), "Environment overlay applied");
        }

        serde_yaml::from_value(merged)
            .map_err(|e| MirrorError::Configuration(format!("configuration parse error: {e}")))
    }

    fn read_yaml(path: &Path) -> Result<YamlValue> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MirrorError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_yaml::from_str(&raw).map_err(|e| {
            MirrorError::Configuration(format!("invalid YAML in {}: {e}", path.display()))
        })
    }
}

/// Deep-merge `overlay` into `base`: mappings merge recursively, every other
/// value type is replaced wholesale
fn merge_yaml(base: &mut YamlValue, overlay: YamlValue) {
    match (base, overlay) {
        (YamlValue::Mapping(base_map), YamlValue::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => merge_yaml(base_value, overlay_value),
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        assert_eq!(manager.environment(), "test");
        assert_eq!(
            manager.config().backfill.limit,
            crate::constants::system::MAX_BACKFILL_MESSAGES
        );
    }

    #[test]
    fn test_environment_overlay_wins() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(BASE_FILE),
            "backfill:\n  limit: 25\n  pacing_ms: 500\nfetch:\n  max_retries: 5\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("guildmirror-config-test.yaml"),
            "backfill:\n  limit: 10\n",
        )
        .unwrap();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        let config = manager.config();
        // Overlay replaces the key it names, base values survive elsewhere
        assert_eq!(config.backfill.limit, 10);
        assert_eq!(config.backfill.pacing_ms, 500);
        assert_eq!(config.fetch.max_retries, 5);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(BASE_FILE), "backfill:\n  limit: 0\n").unwrap();

        let result =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
        assert!(result.is_err());
    }
}
