//! Configuration loading using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (`config/hal.toml` by default)
//! 2. environment variables prefixed with `STORM_HAL_`, with `__` separating
//!    nested keys (e.g. `STORM_HAL_APPLICATION__LOG_LEVEL=debug`)
//!
//! # Example
//! ```no_run
//! use storm_hal::config::HalConfig;
//!
//! let config = HalConfig::load()?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), storm_hal::error::HalError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{AppResult, HalError};
use crate::parameters::ParameterSet;
use crate::settings::SETTINGS_MODULE;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/hal.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HalConfig {
    /// Name and logging
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Hub actor settings
    #[serde(default)]
    pub hub: HubConfig,
    /// Parameter files
    #[serde(default)]
    pub settings: SettingsConfig,
    /// Module definitions, registered in this order
    #[serde(default)]
    pub modules: Vec<ModuleDefinition>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Hub actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Capacity of the hub's command channel
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_mailbox_capacity(),
        }
    }
}

/// Parameter files known at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Directory holding parameter files; relative file names resolve here
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    /// Default parameter file inside `directory`
    #[serde(default = "default_file")]
    pub default_file: String,
    /// Additional parameter files added to the library (not selected)
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            default_file: default_file(),
            files: Vec::new(),
        }
    }
}

/// Module definition in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDefinition {
    /// Unique module name, used as message source
    pub name: String,
    /// Module type (e.g., "display", "mosaic", "stage")
    pub r#type: String,
    /// Whether this module is registered
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Module-specific initial parameters (dynamic)
    #[serde(default)]
    pub parameters: Option<toml::Value>,
}

impl ModuleDefinition {
    /// Initial parameters as a set named after the module.
    pub fn initial_parameters(&self) -> AppResult<ParameterSet> {
        match &self.parameters {
            Some(value) => ParameterSet::from_toml_value(&self.name, value),
            None => Ok(ParameterSet::new(self.name.clone())),
        }
    }
}

// Default value functions
fn default_name() -> String {
    "STORM HAL".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_mailbox_capacity() -> usize {
    32
}

fn default_directory() -> PathBuf {
    PathBuf::from("config/parameters")
}

fn default_file() -> String {
    "default.toml".to_string()
}

fn default_enabled() -> bool {
    true
}

impl HalConfig {
    /// Load configuration from the default path and environment variables
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(HalConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("STORM_HAL_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(HalError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(HalError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.hub.mailbox_capacity == 0 {
            return Err(HalError::Configuration(
                "hub.mailbox_capacity must be at least 1".to_string(),
            ));
        }

        let mut names = HashSet::new();
        names.insert(SETTINGS_MODULE);
        for module in &self.modules {
            if !names.insert(module.name.as_str()) {
                return Err(HalError::Configuration(format!(
                    "Duplicate module name: {}",
                    module.name
                )));
            }
            if let Some(value) = &module.parameters {
                if !value.is_table() {
                    return Err(HalError::Configuration(format!(
                        "Parameters of module '{}' must be a table",
                        module.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Get all enabled modules
    pub fn enabled_modules(&self) -> Vec<&ModuleDefinition> {
        self.modules.iter().filter(|m| m.enabled).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str, kind: &str) -> ModuleDefinition {
        ModuleDefinition {
            name: name.to_string(),
            r#type: kind.to_string(),
            enabled: true,
            parameters: None,
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = HalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.settings.default_file, "default.toml");
        assert_eq!(config.hub.mailbox_capacity, 32);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hal.toml");
        std::fs::write(
            &path,
            r#"
[application]
name = "Test HAL"
log_level = "debug"

[[modules]]
name = "stage"
type = "stage"
parameters = { x_velocity = 2.0 }

[[modules]]
name = "display"
type = "display"
enabled = false
"#,
        )
        .unwrap();

        let config = HalConfig::load_from(&path).unwrap();
        assert_eq!(config.application.name, "Test HAL");
        assert_eq!(config.application.log_format, "pretty");
        assert!(config.validate().is_ok());

        let enabled = config.enabled_modules();
        assert_eq!(enabled.len(), 1);
        let initial = enabled[0].initial_parameters().unwrap();
        assert_eq!(initial.name(), "stage");
        assert!(initial.contains("x_velocity"));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = HalConfig::default();
        config.application.log_level = "invalid".to_string();
        assert!(matches!(
            config.validate(),
            Err(HalError::Configuration(_))
        ));
    }

    #[test]
    fn test_duplicate_module_names() {
        let mut config = HalConfig::default();
        config.modules = vec![module("stage", "stage"), module("stage", "mosaic")];
        assert!(config.validate().is_err());

        config.modules = vec![module("settings", "stage")];
        assert!(config.validate().is_err());
    }
}
