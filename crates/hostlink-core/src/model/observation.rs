// ── Discovery observations ──
//
// A discovery channel hands us a `RawObservation`: every field optional,
// nothing validated. `validate()` turns it into a typed `Observation`,
// dropping (and reporting) any single field that is malformed so one bad
// address never sinks the whole update.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::address::AddressTuple;
use super::display_mode::DisplayMode;
use super::host::{HostField, HostState, PairState, ServerCertificate};
use super::host_id::{HardwareAddress, HostId};

/// An endpoint as reported on the wire, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAddress {
    pub address: Option<String>,
    pub port: i64,
}

impl RawAddress {
    pub fn new(address: impl Into<String>, port: i64) -> Self {
        Self {
            address: Some(address.into()),
            port,
        }
    }
}

/// Candidate addresses grouped the way discovery channels report them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAddresses {
    pub local: Option<RawAddress>,
    pub remote: Option<RawAddress>,
    pub manual: Option<RawAddress>,
    pub ipv6: Option<RawAddress>,
}

/// Unvalidated observation of a host from one discovery channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawObservation {
    pub id: Option<String>,
    pub name: Option<String>,
    pub state: Option<HostState>,
    pub addresses: RawAddresses,
    pub active_address: Option<RawAddress>,
    pub hardware_address: Option<String>,
    pub certificate: Option<String>,
    pub https_port: Option<i64>,
    pub external_port: Option<i64>,
    pub pair_state: Option<PairState>,
    pub running_session_id: Option<u32>,
    pub is_known_vendor_server: Option<bool>,
    pub raw_application_list: Option<String>,
    pub consecutive_offline_count: Option<u32>,
    pub server_version: Option<String>,
    pub active_display_mode: Option<DisplayMode>,
    pub machine_identifier: Option<String>,
}

/// A field that failed validation and was left out of the observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedField {
    pub field: HostField,
    pub reason: String,
}

/// Result of validating a `RawObservation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated {
    pub observation: Observation,
    pub dropped: Vec<DroppedField>,
}

/// A validated, typed observation ready to be merged into a `HostRecord`.
///
/// Always-overwrite fields are plain values: absence on the wire already
/// became the zero/empty value here. Preserve-if-absent fields stay
/// optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Observation {
    pub id: Option<HostId>,

    // Always-overwrite
    pub name: Option<String>,
    pub state: HostState,
    pub https_port: u16,
    pub external_port: u16,
    pub pair_state: Option<PairState>,
    pub running_session_id: u32,
    pub is_known_vendor_server: bool,
    pub raw_application_list: Option<String>,
    pub consecutive_offline_count: u32,

    // Preserve-if-absent
    pub local_address: Option<AddressTuple>,
    pub remote_address: Option<AddressTuple>,
    pub manual_address: Option<AddressTuple>,
    pub ipv6_address: Option<AddressTuple>,
    pub active_address: Option<AddressTuple>,
    pub hardware_address: Option<HardwareAddress>,
    pub server_certificate: Option<ServerCertificate>,
    pub server_version: Option<String>,
    pub active_display_mode: Option<DisplayMode>,
    pub machine_identifier: Option<String>,
}

impl Observation {
    /// Every address this observation could be matched on.
    pub fn candidate_addresses(&self) -> impl Iterator<Item = &AddressTuple> {
        [
            self.manual_address.as_ref(),
            self.local_address.as_ref(),
            self.remote_address.as_ref(),
            self.ipv6_address.as_ref(),
            self.active_address.as_ref(),
        ]
        .into_iter()
        .flatten()
    }
}

impl RawObservation {
    /// Validate every field, dropping the ones that do not hold up.
    pub fn validate(self) -> Validated {
        let mut dropped = Vec::new();

        let mut address = |field: HostField, raw: Option<RawAddress>| -> Option<AddressTuple> {
            let raw = raw?;
            match AddressTuple::new(raw.address.unwrap_or_default(), raw.port) {
                Ok(tuple) => Some(tuple),
                Err(e) => {
                    debug!(%field, error = %e, "dropping malformed address from observation");
                    dropped.push(DroppedField {
                        field,
                        reason: e.to_string(),
                    });
                    None
                }
            }
        };

        let local_address = address(HostField::LocalAddress, self.addresses.local);
        let remote_address = address(HostField::RemoteAddress, self.addresses.remote);
        let manual_address = address(HostField::ManualAddress, self.addresses.manual);
        let ipv6_address = address(HostField::Ipv6Address, self.addresses.ipv6);
        let active_address = address(HostField::ActiveAddress, self.active_address);

        let mut port = |field: HostField, raw: Option<i64>| -> u16 {
            let raw = raw.unwrap_or_default();
            u16::try_from(raw).unwrap_or_else(|_| {
                debug!(%field, port = raw, "dropping out-of-range port from observation");
                dropped.push(DroppedField {
                    field,
                    reason: format!("port {raw} out of range"),
                });
                0
            })
        };

        let https_port = port(HostField::HttpsPort, self.https_port);
        let external_port = port(HostField::ExternalPort, self.external_port);

        let id = self
            .id
            .filter(|s| !s.trim().is_empty())
            .map(HostId::from);

        let observation = Observation {
            id,
            name: self.name,
            state: self.state.unwrap_or_default(),
            https_port,
            external_port,
            pair_state: self.pair_state,
            running_session_id: self.running_session_id.unwrap_or_default(),
            is_known_vendor_server: self.is_known_vendor_server.unwrap_or_default(),
            raw_application_list: self.raw_application_list,
            consecutive_offline_count: self.consecutive_offline_count.unwrap_or_default(),
            local_address,
            remote_address,
            manual_address,
            ipv6_address,
            active_address,
            hardware_address: self
                .hardware_address
                .filter(|s| !s.trim().is_empty())
                .map(HardwareAddress::new),
            server_certificate: self.certificate.and_then(ServerCertificate::new),
            server_version: non_empty(self.server_version),
            active_display_mode: self.active_display_mode,
            machine_identifier: non_empty(self.machine_identifier),
        };

        Validated {
            observation,
            dropped,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
