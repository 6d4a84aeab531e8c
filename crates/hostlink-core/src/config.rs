// ── Runtime configuration ──
//
// These types describe how the registry and telemetry tracker behave.
// They never touch disk: hostlink-config (or any embedder) constructs
// them and hands them in.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CoreError;

/// What the registry does when a known address answers with a new id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IdentityChangePolicy {
    /// Keep the old record and add a new one for the new identity.
    #[default]
    Duplicate,
    /// Replace the old record with one built from the observation.
    Supersede,
    /// Keep the old record and discard the observation.
    Ignore,
}

/// Configuration for a `HostRegistry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub identity_change: IdentityChangePolicy,
    /// Capacity of the registry event broadcast channel.
    pub event_capacity: usize,
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.event_capacity == 0 {
            return Err(CoreError::Config {
                message: "registry event capacity must be at least 1".into(),
            });
        }
        Ok(())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            identity_change: IdentityChangePolicy::default(),
            event_capacity: 256,
        }
    }
}

/// Configuration for a `TelemetryTracker`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// How long the active measurement window runs before it is rolled.
    pub window: Duration,
}

impl TelemetryConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.window.is_zero() {
            return Err(CoreError::Config {
                message: "telemetry window must be longer than zero".into(),
            });
        }
        Ok(())
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(1000),
        }
    }
}
