// ── Host record reconciler ──
//
// Merges a validated observation into a canonical HostRecord under the
// field policies in `rules`, and refuses the merge outright when the
// observation claims a different persistent identity.

mod route;
mod rules;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::model::{HostField, HostRecord, Observation};

pub use route::{AddressSource, ConnectionAddress, DEFAULT_HTTP_PORT, select_connection_address};
pub use rules::{MERGE_RULES, MergePolicy, MergeRule, policy_of};

/// A host answered on a known address with a different persistent id.
///
/// `old` is the record exactly as it was; `new` is what the observation
/// would look like as a record of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityChange {
    pub old: HostRecord,
    pub new: HostRecord,
    pub detected_at: DateTime<Utc>,
}

/// What a merge did.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "an identity change must be handled, it is never applied"]
pub enum MergeOutcome {
    /// The observation was applied. `changed` lists the fields that moved.
    Merged { changed: Vec<HostField> },
    /// The record was left untouched.
    IdentityChanged(Box<IdentityChange>),
}

impl MergeOutcome {
    pub fn is_identity_change(&self) -> bool {
        matches!(self, Self::IdentityChanged(_))
    }
}

/// Merge `observation` into `record`.
///
/// If both carry an id and the ids differ, nothing is written and the
/// outcome is `IdentityChanged`. An unset record id adopts the incoming
/// one; an observation without an id makes no identity claim.
pub fn merge(record: &mut HostRecord, observation: &Observation) -> MergeOutcome {
    if let (Some(current), Some(incoming)) = (&record.id, &observation.id) {
        if current != incoming {
            warn!(
                host = %record.display_name(),
                old_id = %current,
                new_id = %incoming,
                "host identity changed; refusing merge"
            );
            return MergeOutcome::IdentityChanged(Box::new(IdentityChange {
                old: record.clone(),
                new: HostRecord::from_observation(observation),
                detected_at: Utc::now(),
            }));
        }
    }

    let mut changed = Vec::new();
    if record.id.is_none() {
        if let Some(id) = &observation.id {
            record.id = Some(id.clone());
            changed.push(HostField::Id);
        }
    }
    changed.extend(rules::apply_all(record, observation));

    debug!(host = %record.display_name(), ?changed, "merged observation");
    MergeOutcome::Merged { changed }
}

impl HostRecord {
    /// Build a fresh record from a single observation, with the same field
    /// guards a merge applies (no loopback local address, no zero MAC).
    pub fn from_observation(observation: &Observation) -> Self {
        let mut record = Self {
            id: observation.id.clone(),
            ..Self::default()
        };
        rules::apply_all(&mut record, observation);
        record
    }

    /// See [`merge`].
    pub fn merge(&mut self, observation: &Observation) -> MergeOutcome {
        merge(self, observation)
    }

    /// See [`select_connection_address`].
    pub fn connection_address(&self) -> ConnectionAddress {
        select_connection_address(self)
    }
}
