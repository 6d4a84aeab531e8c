//! Shared configuration for hostlink tools.
//!
//! TOML config file, `HOSTLINK_` environment overrides, and translation to
//! the runtime `hostlink_core::RegistryConfig` / `TelemetryConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hostlink_core::{CoreError, IdentityChangePolicy, RegistryConfig, TelemetryConfig};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub registry: RegistrySection,

    #[serde(default)]
    pub telemetry: TelemetrySection,

    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    /// Output format when `--output` is not given.
    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegistrySection {
    /// "duplicate", "supersede" or "ignore".
    #[serde(default)]
    pub identity_change: IdentityChangePolicy,

    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            identity_change: IdentityChangePolicy::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_event_capacity() -> usize {
    256
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TelemetrySection {
    /// Measurement window length in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
        }
    }
}

fn default_window_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LogSection {
    /// `EnvFilter` directive used when neither `-v` nor `RUST_LOG` is set.
    pub filter: Option<String>,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json: bool,
}

impl Config {
    /// Runtime registry configuration, validated.
    pub fn registry_config(&self) -> Result<RegistryConfig, ConfigError> {
        let config = RegistryConfig {
            identity_change: self.registry.identity_change,
            event_capacity: self.registry.event_capacity,
        };
        config
            .validate()
            .map_err(|e| invalid("registry", &e))?;
        Ok(config)
    }

    /// Runtime telemetry configuration, validated.
    pub fn telemetry_config(&self) -> Result<TelemetryConfig, ConfigError> {
        let config = TelemetryConfig {
            window: Duration::from_millis(self.telemetry.window_ms),
        };
        config
            .validate()
            .map_err(|e| invalid("telemetry", &e))?;
        Ok(config)
    }

    /// Check every section without building anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.registry_config()?;
        self.telemetry_config()?;
        Ok(())
    }
}

fn invalid(field: &str, err: &CoreError) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: err.to_string(),
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "hostlink", "hostlink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("hostlink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config from `path` (missing file is fine) + environment.
///
/// `HOSTLINK_REGISTRY__IDENTITY_CHANGE=supersede` overrides
/// `registry.identity_change`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HOSTLINK_").split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}
