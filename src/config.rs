use crate::profile::{
    FormatterProfile, DEFAULT_NODE_IMAGE, DEFAULT_NPM_VERSION, DEFAULT_PRETTIER_VERSION,
};
use crate::selection::FileSelection;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid glob pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// Everything one pipeline run needs, passed explicitly to the pipeline.
#[derive(Debug, Clone)]
pub struct FormatConfig {
    pub root: PathBuf,
    pub image: String,
    pub npm_version: String,
    pub prettier_version: String,
    /// Replaces the profile's include globs when set.
    pub include: Option<Vec<String>>,
    /// Added to the default exclude list.
    pub exclude: Vec<String>,
    pub snapshot_steps: bool,
    pub log_level: String,
}

impl Default for FormatConfig {
    fn default() -> Self {
        let root = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let image = env::var("FMTBOX_IMAGE").unwrap_or_else(|_| DEFAULT_NODE_IMAGE.to_string());

        let npm_version =
            env::var("FMTBOX_NPM_VERSION").unwrap_or_else(|_| DEFAULT_NPM_VERSION.to_string());

        let prettier_version = env::var("FMTBOX_PRETTIER_VERSION")
            .unwrap_or_else(|_| DEFAULT_PRETTIER_VERSION.to_string());

        let snapshot_steps = env::var("FMTBOX_SNAPSHOT_STEPS")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);

        let log_level = env::var("FMTBOX_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            root,
            image,
            npm_version,
            prettier_version,
            include: None,
            exclude: Vec::new(),
            snapshot_steps,
            log_level,
        }
    }
}

impl FormatConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Base image must not be empty".to_string(),
            ));
        }
        if self.image.chars().any(char::is_whitespace) {
            return Err(ConfigError::ValidationFailed(format!(
                "Base image must not contain whitespace: {}",
                self.image
            )));
        }

        for (field, version) in [
            ("npm version", &self.npm_version),
            ("prettier version", &self.prettier_version),
        ] {
            if version.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must not be empty",
                    field
                )));
            }
            if version.chars().any(|c| c.is_whitespace() || c == '@') {
                return Err(ConfigError::ParseError {
                    field: field.to_string(),
                    error: format!("`{}` is not a version identifier", version),
                });
            }
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        let profile = self.profile();
        if !profile.working_path.starts_with('/') {
            return Err(ConfigError::ValidationFailed(format!(
                "Working path must be absolute: {}",
                profile.working_path
            )));
        }

        Ok(())
    }

    pub fn profile(&self) -> FormatterProfile {
        FormatterProfile::prettier(&self.image, &self.npm_version, &self.prettier_version)
    }

    /// Build the file selection, validating every glob.
    pub fn file_selection(&self) -> Result<FileSelection, ConfigError> {
        let include = match &self.include {
            Some(include) => include.clone(),
            None => self.profile().include,
        };
        FileSelection::new(self.root.clone(), include, self.exclude.clone())
    }

    pub fn to_display_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("root".to_string(), self.root.display().to_string());
        map.insert("image".to_string(), self.image.clone());
        map.insert("npm_version".to_string(), self.npm_version.clone());
        map.insert("prettier_version".to_string(), self.prettier_version.clone());
        map.insert(
            "include".to_string(),
            match &self.include {
                Some(include) => include.join(", "),
                None => self.profile().include.join(", "),
            },
        );
        map.insert("exclude".to_string(), self.exclude.join(", "));
        map.insert("snapshot_steps".to_string(), self.snapshot_steps.to_string());
        map.insert("log_level".to_string(), self.log_level.clone());
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "FMTBOX_IMAGE",
            "FMTBOX_NPM_VERSION",
            "FMTBOX_PRETTIER_VERSION",
            "FMTBOX_SNAPSHOT_STEPS",
            "FMTBOX_LOG_LEVEL",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_default_config() {
        clear_env();
        let config = FormatConfig::default();
        assert_eq!(config.image, "node:18.18.0-slim");
        assert_eq!(config.npm_version, "10.1.0");
        assert_eq!(config.prettier_version, "2.8.1");
        assert!(!config.snapshot_steps);
        assert_eq!(config.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("FMTBOX_IMAGE", "node:20-slim");
        env::set_var("FMTBOX_PRETTIER_VERSION", "3.0.3");
        env::set_var("FMTBOX_SNAPSHOT_STEPS", "true");
        env::set_var("FMTBOX_LOG_LEVEL", "DEBUG");

        let config = FormatConfig::default();
        assert_eq!(config.image, "node:20-slim");
        assert_eq!(config.prettier_version, "3.0.3");
        assert!(config.snapshot_steps);
        assert_eq!(config.log_level, "debug");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_validation_rejects_bad_values() {
        clear_env();
        let mut config = FormatConfig::default();
        config.image = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = FormatConfig::default();
        config.prettier_version = "prettier@2.8.1".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ParseError { .. })
        ));

        let mut config = FormatConfig::default();
        config.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_include_override_replaces_profile_globs() {
        clear_env();
        let mut config = FormatConfig::with_root("/repo");
        config.include = Some(vec!["**/*.yaml".to_string()]);
        config.exclude = vec!["fixtures".to_string()];

        let selection = config.file_selection().unwrap();
        assert_eq!(selection.include(), &["**/*.yaml".to_string()]);
        assert!(selection.exclude().contains(&"**/node_modules".to_string()));
        assert!(selection.exclude().contains(&"fixtures".to_string()));
    }

    #[test]
    #[serial]
    fn test_display_map() {
        clear_env();
        let config = FormatConfig::with_root("/repo");
        let map = config.to_display_map();
        assert_eq!(map.get("root").unwrap(), "/repo");
        assert_eq!(map.get("image").unwrap(), "node:18.18.0-slim");
        assert!(map.get("include").unwrap().contains("**/*.json"));
    }
}
