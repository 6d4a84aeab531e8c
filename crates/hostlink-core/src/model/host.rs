// ── Host domain types ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoStaticStr};

use super::address::AddressTuple;
use super::display_mode::DisplayMode;
use super::host_id::{HardwareAddress, HostId};

/// Host reachability as last observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HostState {
    Online,
    Offline,
    #[default]
    Unknown,
}

impl HostState {
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

/// Pairing status between this client and the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PairState {
    NotPaired,
    Paired,
    PinWrong,
    Failed,
    AlreadyInProgress,
}

/// The host's pinned server certificate (PEM text).
///
/// Opaque to this crate: it is stored and compared, never validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerCertificate(String);

impl ServerCertificate {
    /// Returns `None` for blank input.
    pub fn new(pem: impl Into<String>) -> Option<Self> {
        let pem = pem.into();
        if pem.trim().is_empty() {
            None
        } else {
            Some(Self(pem))
        }
    }

    pub fn as_pem(&self) -> &str {
        &self.0
    }
}

/// Every mergeable field of a `HostRecord`, by name.
///
/// Used by the merge rule table, by change reporting, and by observation
/// validation to say which field was dropped.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HostField {
    Id,
    Name,
    State,
    LocalAddress,
    RemoteAddress,
    ManualAddress,
    Ipv6Address,
    ActiveAddress,
    HardwareAddress,
    ServerCertificate,
    HttpsPort,
    ExternalPort,
    PairState,
    RunningSessionId,
    RawApplicationList,
    IsKnownVendorServer,
    ConsecutiveOfflineCount,
    ServerVersion,
    ActiveDisplayMode,
    MachineIdentifier,
}

/// The canonical record of one remote host.
///
/// Persistent fields (`id`, `name`, the candidate addresses, hardware
/// address, certificate) describe the host across sessions. The rest is
/// session state that every observation may replace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct HostRecord {
    // Persistent identity
    pub id: Option<HostId>,
    pub name: Option<String>,
    pub local_address: Option<AddressTuple>,
    pub remote_address: Option<AddressTuple>,
    pub manual_address: Option<AddressTuple>,
    pub ipv6_address: Option<AddressTuple>,
    pub hardware_address: Option<HardwareAddress>,
    pub server_certificate: Option<ServerCertificate>,

    // Session state
    pub state: HostState,
    pub active_address: Option<AddressTuple>,
    pub https_port: u16,
    pub external_port: u16,
    pub pair_state: Option<PairState>,
    pub running_session_id: u32,
    pub raw_application_list: Option<String>,
    pub is_known_vendor_server: bool,
    pub consecutive_offline_count: u32,
    pub server_version: Option<String>,
    pub active_display_mode: Option<DisplayMode>,
    pub machine_identifier: Option<String>,
}

impl HostRecord {
    /// Paired outright, or holding a pinned certificate without a
    /// definitive "not paired" answer from the host.
    pub fn is_paired(&self) -> bool {
        match self.pair_state {
            Some(PairState::Paired) => true,
            Some(PairState::NotPaired) => false,
            _ => self.server_certificate.is_some(),
        }
    }

    /// Whether a session is running on the host right now.
    pub fn has_running_session(&self) -> bool {
        self.running_session_id != 0
    }

    /// All candidate addresses that are set, in lookup order.
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

    /// Human-facing label: the name, else the id, else the first address.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_owned();
        }
        if let Some(id) = &self.id {
            return id.to_string();
        }
        self.candidate_addresses()
            .next()
            .map_or_else(|| "<unknown host>".to_owned(), ToString::to_string)
    }
}
