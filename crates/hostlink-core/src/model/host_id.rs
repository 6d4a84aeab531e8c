// ── Core identity types ──
//
// HostId is the persistent identity that defines "same host" across
// sessions. HardwareAddress is the host's MAC, used for wake-on-LAN and
// never for identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ── HostId ──────────────────────────────────────────────────────────

/// Persistent host identifier.
///
/// Servers normally report a UUID, in whatever case they like. Anything
/// that does not parse as one is kept verbatim as an opaque id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostId {
    Uuid(Uuid),
    Opaque(String),
}

impl HostId {
    pub fn as_uuid(&self) -> Option<&Uuid> {
        match self {
            Self::Uuid(u) => Some(u),
            Self::Opaque(_) => None,
        }
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Opaque(s) => write!(f, "{s}"),
        }
    }
}

impl FromStr for HostId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl From<Uuid> for HostId {
    fn from(u: Uuid) -> Self {
        Self::Uuid(u)
    }
}

impl From<String> for HostId {
    fn from(s: String) -> Self {
        match Uuid::parse_str(s.trim()) {
            Ok(u) => Self::Uuid(u),
            Err(_) => Self::Opaque(s),
        }
    }
}

impl From<&str> for HostId {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

// ── HardwareAddress ─────────────────────────────────────────────────

/// Sentinel some servers report when they could not read their MAC.
const UNSET_HARDWARE_ADDRESS: &str = "00:00:00:00:00:00";

/// MAC address, normalized to lowercase colon-separated format (aa:bb:cc:dd:ee:ff).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HardwareAddress(String);

impl HardwareAddress {
    /// Create a normalized MAC address from any common format.
    /// Accepts colon-separated or dash-separated hex.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let normalized = raw.as_ref().trim().to_lowercase().replace('-', ":");
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The all-zero sentinel means "no hardware address known".
    pub fn is_unset(&self) -> bool {
        self.0 == UNSET_HARDWARE_ADDRESS
    }
}

impl fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for HardwareAddress {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
