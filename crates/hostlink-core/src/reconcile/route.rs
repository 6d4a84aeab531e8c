// ── Connection address selection ──

use std::num::NonZeroU16;

use serde::Serialize;
use strum::Display;

use crate::model::{AddressTuple, HostRecord};

/// Well-known HTTP port of a streaming host.
pub const DEFAULT_HTTP_PORT: u16 = 47989;

/// Which record field a connection address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AddressSource {
    /// Remote address re-targeted at the reported external port.
    ExternalRemote,
    Remote,
    Active,
    Ipv6,
    Local,
}

/// Where a connection attempt should go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionAddress {
    Resolved {
        address: AddressTuple,
        source: AddressSource,
    },
    /// No candidate address is known. The port is still the best guess.
    Unreachable { port: u16 },
}

impl ConnectionAddress {
    pub fn address(&self) -> Option<&AddressTuple> {
        match self {
            Self::Resolved { address, .. } => Some(address),
            Self::Unreachable { .. } => None,
        }
    }

    /// The port a connection attempt would use.
    pub fn port(&self) -> u16 {
        match self {
            Self::Resolved { address, .. } => address.port(),
            Self::Unreachable { port } => *port,
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

/// Pick the address a connection attempt should use.
///
/// First match wins: remote address at a non-zero external port, remote
/// address, active address, IPv6 address, local address. With none of
/// them set the host is unreachable on the external port if one is
/// known, otherwise on [`DEFAULT_HTTP_PORT`]. Pure function of `record`.
pub fn select_connection_address(record: &HostRecord) -> ConnectionAddress {
    let external = NonZeroU16::new(record.external_port);

    if let (Some(remote), Some(port)) = (&record.remote_address, external) {
        return ConnectionAddress::Resolved {
            address: remote.with_port(port),
            source: AddressSource::ExternalRemote,
        };
    }

    let candidates = [
        (&record.remote_address, AddressSource::Remote),
        (&record.active_address, AddressSource::Active),
        (&record.ipv6_address, AddressSource::Ipv6),
        (&record.local_address, AddressSource::Local),
    ];

    candidates
        .into_iter()
        .find_map(|(address, source)| {
            address.as_ref().map(|address| ConnectionAddress::Resolved {
                address: address.clone(),
                source,
            })
        })
        .unwrap_or(ConnectionAddress::Unreachable {
            port: external.map_or(DEFAULT_HTTP_PORT, NonZeroU16::get),
        })
}
