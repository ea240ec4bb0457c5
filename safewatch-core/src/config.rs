//! Configuration system for SafeWatch.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/safewatch/config.toml` and/or `.safewatch/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::classifier::ClassTable;
use crate::error::{self, ConfigError};
use crate::gateway::GatewayConfig;
use crate::pipeline::PipelineConfig;
use crate::store::StoreConfig;
use crate::tracker::TrackerConfig;

/// Top-level configuration for SafeWatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafewatchConfig {
    pub tracker: TrackerConfig,
    pub store: StoreConfig,
    pub pipeline: PipelineConfig,
    pub gateway: GatewayConfig,
    pub classes: ClassTable,
}

impl SafewatchConfig {
    /// Every problem found in the configuration. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = self.tracker.validate();
        problems.extend(self.pipeline.validate());
        for id in self.classes.duplicate_ids() {
            problems.push(format!(
                "classes: id {id} is listed more than once; categories must be disjoint"
            ));
        }
        problems
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "safewatch", "safewatch")
}

/// User-level config file location, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().join("config.toml"))
}

/// Directory for rolling log files.
pub fn log_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `SAFEWATCH_`)
/// 3. Explicit config file (`--config`)
/// 4. Workspace-local config (`.safewatch/config.toml`)
/// 5. User config (`~/.config/safewatch/config.toml`)
/// 6. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&SafewatchConfig>,
) -> Result<SafewatchConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(SafewatchConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".safewatch").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(file) = config_file {
        figment = figment.merge(Toml::file(file));
    }

    // Environment variables (SAFEWATCH_TRACKER__ALERT_THRESHOLD, SAFEWATCH_GATEWAY__PORT, etc.)
    figment = figment.merge(Env::prefixed("SAFEWATCH_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Load the layered configuration and reject it unless it validates.
///
/// A `config_file` that does not exist is an error here, whereas
/// [`load_config`] would silently skip it.
pub fn load_validated_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> error::Result<SafewatchConfig> {
    if let Some(file) = config_file {
        if !file.exists() {
            return Err(ConfigError::FileNotFound {
                path: file.to_path_buf(),
            }
            .into());
        }
    }
    let config = load_config(workspace, config_file, None).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;

    let problems = config.validate();
    if !problems.is_empty() {
        return Err(ConfigError::Invalid {
            message: format!("\n  - {}", problems.join("\n  - ")),
        }
        .into());
    }
    Ok(config)
}

/// Check whether any SafeWatch configuration file exists.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| ws.join(".safewatch").join("config.toml").exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassEntry, RiskCategory};
    use crate::error::SafewatchError;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = SafewatchConfig::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.tracker.alert_threshold, 3);
        assert_eq!(config.tracker.rolling_window_secs, 60);
        assert_eq!(config.pipeline.skip_frames, 2);
        assert_eq!(config.store.history_limit, 50);
    }

    #[test]
    fn test_validate_collects_all_problems() {
        let mut config = SafewatchConfig::default();
        config.tracker.alert_threshold = 0;
        config.pipeline.skip_frames = 0;
        config
            .classes
            .entries
            .push(ClassEntry::new(4, "dup", RiskCategory::Safe));
        let problems = config.validate();
        assert_eq!(problems.len(), 3);
        assert!(problems.iter().any(|p| p.contains("id 4")));
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = SafewatchConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: SafewatchConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_config_workspace_file() {
        let dir = TempDir::new().unwrap();
        let cfg_dir = dir.path().join(".safewatch");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            r#"
[tracker]
alert_threshold = 5
window_capacity = 12

[gateway]
port = 9100
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None, None).unwrap();
        assert_eq!(config.tracker.alert_threshold, 5);
        assert_eq!(config.tracker.window_capacity, 12);
        assert_eq!(config.tracker.rolling_window_secs, 60);
        assert_eq!(config.gateway.port, 9100);
        assert_eq!(config.classes, ClassTable::default());
        assert!(config_exists(Some(dir.path())));
    }

    #[test]
    fn test_load_config_explicit_file_replaces_classes() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("site.toml");
        std::fs::write(
            &file,
            r#"
[[classes]]
id = 0
label = "no_harness"
category = "danger"
"#,
        )
        .unwrap();

        let config = load_config(None, Some(&file), None).unwrap();
        assert_eq!(config.classes.entries.len(), 1);
        assert_eq!(config.classes.entries[0].category, RiskCategory::Danger);
    }

    #[test]
    fn test_load_config_overrides_win() {
        let mut overrides = SafewatchConfig::default();
        overrides.pipeline.min_confidence = 0.4;
        let config = load_config(None, None, Some(&overrides)).unwrap();
        assert!((config.pipeline.min_confidence - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn test_load_validated_config_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = load_validated_config(Some(dir.path()), Some(&missing)).unwrap_err();
        assert!(matches!(
            err,
            SafewatchError::Config(ConfigError::FileNotFound { .. })
        ));
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn test_load_validated_config_rejects_invalid() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("bad.toml");
        std::fs::write(&file, "[tracker]\nrolling_window_secs = 0\n").unwrap();
        let err = load_validated_config(Some(dir.path()), Some(&file)).unwrap_err();
        assert!(matches!(err, SafewatchError::Config(ConfigError::Invalid { .. })));
        assert!(err.to_string().contains("rolling_window_secs"));
    }

    #[test]
    fn test_load_validated_config_parse_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("typo.toml");
        std::fs::write(&file, "[tracker]\nalert_threshold = \"three\"\n").unwrap();
        let err = load_validated_config(Some(dir.path()), Some(&file)).unwrap_err();
        assert!(matches!(
            err,
            SafewatchError::Config(ConfigError::ParseError { .. })
        ));
    }
}
