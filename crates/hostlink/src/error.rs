//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use hostlink_config::ConfigError;
use hostlink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    #[allow(dead_code)]
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    /// Input data was malformed (sysexits `EX_DATAERR`).
    pub const INPUT: i32 = 65;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Input ────────────────────────────────────────────────────────

    #[error("Could not read {path}")]
    #[diagnostic(code(hostlink::read_failed))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}")]
    #[diagnostic(
        code(hostlink::json),
        help(
            "Expected a JSON array of {expected}.\n\
             Check the file contents and try again."
        )
    )]
    Json {
        path: String,
        expected: &'static str,
        #[source]
        source: serde_json::Error,
    },

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(hostlink::not_found),
        help("Run: hostlink {list_command} to see known {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(hostlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(hostlink::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(
        code(hostlink::config),
        help("Check the config file (hostlink config path) and HOSTLINK_* variables.")
    )]
    Config(#[from] ConfigError),

    // ── Core ─────────────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(code(hostlink::core))]
    Core(CoreError),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render TOML: {0}")]
    #[diagnostic(code(hostlink::toml))]
    Toml(#[from] toml::ser::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(hostlink::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                exit_code::NOT_FOUND
            }
            Self::Json { .. } => exit_code::INPUT,
            Self::Validation { .. } | Self::ConfigExists { .. } | Self::Config(_) => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::HostNotFound { identifier } => CliError::NotFound {
                resource_type: "host".into(),
                identifier,
                list_command: "hosts replay <FILE>".into(),
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            other => CliError::Core(other),
        }
    }
}
