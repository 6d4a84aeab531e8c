// ── Field merge rules ──
//
// The merge is a table, not a chain of conditionals: each row names one
// HostRecord field, its policy, and how to apply an observation to it.
// Rows report whether they changed the record.

use std::num::NonZeroU16;

use serde::Serialize;
use strum::Display;

use crate::model::{HostField, HostRecord, Observation};

/// How a field treats an incoming value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MergePolicy {
    /// Latest observation is authoritative, even when it is zero/empty.
    AlwaysOverwrite,
    /// Kept from prior state unless the observation supplies a value.
    PreserveIfAbsent,
}

/// One row of the merge table.
pub struct MergeRule {
    pub field: HostField,
    pub policy: MergePolicy,
    apply: fn(&mut HostRecord, &Observation) -> bool,
}

impl MergeRule {
    /// Apply this row. Returns `true` if the record changed.
    pub fn apply(&self, record: &mut HostRecord, observation: &Observation) -> bool {
        (self.apply)(record, observation)
    }
}

impl std::fmt::Debug for MergeRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeRule")
            .field("field", &self.field)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn overwrite<T: PartialEq + Clone>(slot: &mut T, incoming: &T) -> bool {
    if slot == incoming {
        return false;
    }
    slot.clone_from(incoming);
    true
}

fn adopt<T: PartialEq + Clone>(slot: &mut Option<T>, incoming: Option<&T>) -> bool {
    match incoming {
        Some(value) if slot.as_ref() != Some(value) => {
            *slot = Some(value.clone());
            true
        }
        _ => false,
    }
}

/// Keep the remote address current when the host stops reporting one.
///
/// Hosts behind NAT often omit the address but still report their
/// external port; a remote address learned earlier (e.g. via STUN) gets
/// that port patched in.
fn merge_remote_address(record: &mut HostRecord, observation: &Observation) -> bool {
    if observation.remote_address.is_some() {
        return adopt(
            &mut record.remote_address,
            observation.remote_address.as_ref(),
        );
    }

    let (Some(existing), Some(port)) = (
        record.remote_address.as_ref(),
        NonZeroU16::new(observation.external_port),
    ) else {
        return false;
    };

    if existing.port() == port.get() {
        return false;
    }
    let patched = existing.with_port(port);
    record.remote_address = Some(patched);
    true
}

/// The full merge table, in application order.
pub const MERGE_RULES: &[MergeRule] = &[
    // ── Always-overwrite ─────────────────────────────────────────────
    MergeRule {
        field: HostField::State,
        policy: MergePolicy::AlwaysOverwrite,
        apply: |r, o| overwrite(&mut r.state, &o.state),
    },
    MergeRule {
        field: HostField::Name,
        policy: MergePolicy::AlwaysOverwrite,
        apply: |r, o| overwrite(&mut r.name, &o.name),
    },
    MergeRule {
        field: HostField::ExternalPort,
        policy: MergePolicy::AlwaysOverwrite,
        apply: |r, o| overwrite(&mut r.external_port, &o.external_port),
    },
    MergeRule {
        field: HostField::HttpsPort,
        policy: MergePolicy::AlwaysOverwrite,
        apply: |r, o| overwrite(&mut r.https_port, &o.https_port),
    },
    MergeRule {
        field: HostField::PairState,
        policy: MergePolicy::AlwaysOverwrite,
        apply: |r, o| overwrite(&mut r.pair_state, &o.pair_state),
    },
    MergeRule {
        field: HostField::RunningSessionId,
        policy: MergePolicy::AlwaysOverwrite,
        apply: |r, o| overwrite(&mut r.running_session_id, &o.running_session_id),
    },
    MergeRule {
        field: HostField::IsKnownVendorServer,
        policy: MergePolicy::AlwaysOverwrite,
        apply: |r, o| overwrite(&mut r.is_known_vendor_server, &o.is_known_vendor_server),
    },
    MergeRule {
        field: HostField::RawApplicationList,
        policy: MergePolicy::AlwaysOverwrite,
        apply: |r, o| overwrite(&mut r.raw_application_list, &o.raw_application_list),
    },
    MergeRule {
        field: HostField::ConsecutiveOfflineCount,
        policy: MergePolicy::AlwaysOverwrite,
        apply: |r, o| {
            overwrite(
                &mut r.consecutive_offline_count,
                &o.consecutive_offline_count,
            )
        },
    },
    // ── Preserve-if-absent ───────────────────────────────────────────
    MergeRule {
        field: HostField::ActiveAddress,
        policy: MergePolicy::PreserveIfAbsent,
        apply: |r, o| adopt(&mut r.active_address, o.active_address.as_ref()),
    },
    MergeRule {
        field: HostField::LocalAddress,
        policy: MergePolicy::PreserveIfAbsent,
        apply: |r, o| {
            adopt(
                &mut r.local_address,
                o.local_address.as_ref().filter(|a| !a.is_loopback_v4()),
            )
        },
    },
    MergeRule {
        field: HostField::RemoteAddress,
        policy: MergePolicy::PreserveIfAbsent,
        apply: merge_remote_address,
    },
    MergeRule {
        field: HostField::ManualAddress,
        policy: MergePolicy::PreserveIfAbsent,
        apply: |r, o| adopt(&mut r.manual_address, o.manual_address.as_ref()),
    },
    MergeRule {
        field: HostField::Ipv6Address,
        policy: MergePolicy::PreserveIfAbsent,
        apply: |r, o| adopt(&mut r.ipv6_address, o.ipv6_address.as_ref()),
    },
    MergeRule {
        field: HostField::HardwareAddress,
        policy: MergePolicy::PreserveIfAbsent,
        apply: |r, o| {
            adopt(
                &mut r.hardware_address,
                o.hardware_address.as_ref().filter(|m| !m.is_unset()),
            )
        },
    },
    MergeRule {
        field: HostField::ServerCertificate,
        policy: MergePolicy::PreserveIfAbsent,
        apply: |r, o| adopt(&mut r.server_certificate, o.server_certificate.as_ref()),
    },
    MergeRule {
        field: HostField::ServerVersion,
        policy: MergePolicy::PreserveIfAbsent,
        apply: |r, o| {
            adopt(
                &mut r.server_version,
                o.server_version.as_ref().filter(|v| !v.is_empty()),
            )
        },
    },
    MergeRule {
        field: HostField::ActiveDisplayMode,
        policy: MergePolicy::PreserveIfAbsent,
        apply: |r, o| adopt(&mut r.active_display_mode, o.active_display_mode.as_ref()),
    },
    MergeRule {
        field: HostField::MachineIdentifier,
        policy: MergePolicy::PreserveIfAbsent,
        apply: |r, o| {
            adopt(
                &mut r.machine_identifier,
                o.machine_identifier.as_ref().filter(|m| !m.is_empty()),
            )
        },
    },
];

/// Look up the policy for a field. `None` for `Id`, which is not merged
/// through the table.
pub fn policy_of(field: HostField) -> Option<MergePolicy> {
    MERGE_RULES
        .iter()
        .find(|rule| rule.field == field)
        .map(|rule| rule.policy)
}

/// Apply every row of the table, returning the fields that changed.
pub(crate) fn apply_all(record: &mut HostRecord, observation: &Observation) -> Vec<HostField> {
    MERGE_RULES
        .iter()
        .filter_map(|rule| rule.apply(record, observation).then_some(rule.field))
        .collect()
}
