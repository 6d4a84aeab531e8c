// ── Network endpoint ──
//
// AddressTuple is the leaf value type every candidate address on a
// HostRecord is built from. Construction validates; once built, a tuple
// is immutable and renders back to a string it can be parsed from.

use std::fmt;
use std::num::NonZeroU16;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

/// Prefix of the IPv4 loopback block. Some IPv6 forwarding tools report a
/// spurious loopback address as the host's LAN address.
const LOOPBACK_V4_PREFIX: &str = "127.";

/// An immutable `(address, port)` endpoint.
///
/// `address` is a hostname or IP literal with any IPv6 brackets removed.
/// Equality and hashing are structural on both parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "AddressParts", into = "AddressParts")]
pub struct AddressTuple {
    address: String,
    port: NonZeroU16,
}

impl AddressTuple {
    /// Build a tuple from address text and a port.
    ///
    /// A bracketed literal (`[fe80::1]`) is unwrapped. Fails on empty text
    /// or a port outside `1..=65535`.
    pub fn new(address: impl AsRef<str>, port: impl Into<i64>) -> Result<Self, AddressError> {
        let port = port.into();
        let raw = address.as_ref().trim();
        let address = raw
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(raw);

        if address.is_empty() {
            return Err(AddressError::Empty);
        }

        let port = u16::try_from(port)
            .ok()
            .and_then(NonZeroU16::new)
            .ok_or(AddressError::InvalidPort { port })?;

        Ok(Self {
            address: address.to_owned(),
            port,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port.get()
    }

    /// Same address, different port.
    pub fn with_port(&self, port: NonZeroU16) -> Self {
        Self {
            address: self.address.clone(),
            port,
        }
    }

    /// Whether the address is an IPv6 literal (contains a colon).
    pub fn is_ipv6_literal(&self) -> bool {
        self.address.contains(':')
    }

    /// Whether the address sits in `127.0.0.0/8`.
    pub fn is_loopback_v4(&self) -> bool {
        self.address.starts_with(LOOPBACK_V4_PREFIX)
    }
}

impl fmt::Display for AddressTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ipv6_literal() {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

impl FromStr for AddressTuple {
    type Err = AddressError;

    /// Parse `host:port`, `a.b.c.d:port` or `[v6]:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| AddressError::Malformed {
            input: s.to_owned(),
            reason: reason.to_owned(),
        };

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| malformed("unterminated '['"))?;
            let port = tail
                .strip_prefix(':')
                .ok_or_else(|| malformed("missing port"))?;
            (host, port)
        } else {
            let (host, port) = s.rsplit_once(':').ok_or_else(|| malformed("missing port"))?;
            if host.contains(':') {
                return Err(malformed("IPv6 literals must be bracketed"));
            }
            (host, port)
        };

        let port: i64 = port.parse().map_err(|_| malformed("port is not a number"))?;
        Self::new(host, port)
    }
}

// ── Serde shape ─────────────────────────────────────────────────────

/// Wire shape of an `AddressTuple`: `{ "address": "...", "port": 47989 }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AddressParts {
    address: String,
    port: i64,
}

impl TryFrom<AddressParts> for AddressTuple {
    type Error = AddressError;

    fn try_from(parts: AddressParts) -> Result<Self, Self::Error> {
        Self::new(parts.address, parts.port)
    }
}

impl From<AddressTuple> for AddressParts {
    fn from(tuple: AddressTuple) -> Self {
        Self {
            port: i64::from(tuple.port()),
            address: tuple.address,
        }
    }
}
