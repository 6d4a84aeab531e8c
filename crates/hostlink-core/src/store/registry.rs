// ── Host registry ──
//
// Owns every canonical HostRecord. Observations are routed to the right
// record by id, then by address; identity changes are resolved per the
// configured policy and always broadcast.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::collection::HostCollection;
use crate::config::{IdentityChangePolicy, RegistryConfig};
use crate::error::CoreError;
use crate::model::{
    AddressTuple, DroppedField, HostField, HostId, HostRecord, Observation, RawObservation,
    Validated,
};
use crate::reconcile::{ConnectionAddress, IdentityChange, MergeOutcome, merge};
use crate::stream::{HostSnapshot, HostStream};

/// Membership and content changes, broadcast to every `events()` receiver.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    Added(Arc<HostRecord>),
    Updated {
        record: Arc<HostRecord>,
        changed: Vec<HostField>,
    },
    Removed(Arc<HostRecord>),
    /// Raised for every identity change, whatever the policy did with it.
    IdentityChanged(Arc<IdentityChange>),
}

/// How the registry disposed of an identity change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityResolution {
    /// A separate record was created for the new identity.
    Duplicated(Arc<HostRecord>),
    /// The old record was replaced by the new one.
    Superseded(Arc<HostRecord>),
    /// The observation was discarded.
    Ignored,
}

/// What `observe` did with one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserveOutcome {
    Added(Arc<HostRecord>),
    Updated {
        record: Arc<HostRecord>,
        changed: Vec<HostField>,
    },
    Unchanged(Arc<HostRecord>),
    IdentityChanged {
        change: Arc<IdentityChange>,
        resolution: IdentityResolution,
    },
}

impl ObserveOutcome {
    /// The record the observation ended up in, if any.
    pub fn record(&self) -> Option<&Arc<HostRecord>> {
        match self {
            Self::Added(record) | Self::Unchanged(record) | Self::Updated { record, .. } => {
                Some(record)
            }
            Self::IdentityChanged { resolution, .. } => match resolution {
                IdentityResolution::Duplicated(record) | IdentityResolution::Superseded(record) => {
                    Some(record)
                }
                IdentityResolution::Ignored => None,
            },
        }
    }
}

/// Result of `ingest`: the outcome plus the fields validation dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingested {
    pub outcome: ObserveOutcome,
    pub dropped: Vec<DroppedField>,
}

/// Canonical registry of remote hosts.
///
/// Merges for different hosts run in parallel; merges for the same host
/// serialize on that host's lock. Readers get immutable snapshots and
/// never block on writers.
pub struct HostRegistry {
    config: RegistryConfig,
    hosts: HostCollection,
    events: broadcast::Sender<RegistryEvent>,
    /// Serializes every path that creates a record, so two observations
    /// of a brand-new host (or a brand-new identity) create one record.
    creating: Mutex<()>,
}

impl HostRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            hosts: HostCollection::new(),
            events,
            creating: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // ── Ingestion ────────────────────────────────────────────────────

    /// Validate a raw observation and merge it.
    pub fn ingest(&self, raw: RawObservation) -> Result<Ingested, CoreError> {
        let Validated {
            observation,
            dropped,
        } = raw.validate();

        for field in &dropped {
            warn!(
                field = %field.field,
                reason = %field.reason,
                "dropped malformed observation field"
            );
        }

        let outcome = self.observe(&observation)?;
        Ok(Ingested { outcome, dropped })
    }

    /// Merge a validated observation into the matching record, creating
    /// one if no record matches by id or address.
    pub fn observe(&self, observation: &Observation) -> Result<ObserveOutcome, CoreError> {
        let mut creating = None;
        if let Some(outcome) = self.try_merge(observation, &mut creating) {
            return Ok(outcome);
        }

        // A miss never takes the lock, so it is free here.
        creating = Some(self.lock_creating());

        // Someone may have created it while we waited.
        if let Some(outcome) = self.try_merge(observation, &mut creating) {
            return Ok(outcome);
        }

        let record = HostRecord::from_observation(observation);
        if record.id.is_none() && record.candidate_addresses().next().is_none() {
            warn!("observation has neither an id nor a usable address");
            return Err(CoreError::Unidentifiable);
        }

        Ok(ObserveOutcome::Added(self.add(record)))
    }

    // ── Removal ──────────────────────────────────────────────────────

    /// Remove a host. Only the registry owner decides when a host is gone.
    pub fn remove(&self, id: &HostId) -> Result<Arc<HostRecord>, CoreError> {
        let removed = self
            .hosts
            .key_for_id(id)
            .and_then(|key| self.hosts.remove(key))
            .ok_or_else(|| CoreError::HostNotFound {
                identifier: id.to_string(),
            })?;

        info!(host = %removed.display_name(), "host removed");
        self.emit(RegistryEvent::Removed(Arc::clone(&removed)));
        Ok(removed)
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn get(&self, id: &HostId) -> Option<Arc<HostRecord>> {
        self.hosts
            .key_for_id(id)
            .and_then(|key| self.hosts.get(key))
    }

    pub fn find_by_address(&self, address: &AddressTuple) -> Option<Arc<HostRecord>> {
        self.hosts
            .key_for_address(address)
            .and_then(|key| self.hosts.get(key))
    }

    /// Address a connection attempt to `id` should use, from a consistent
    /// snapshot of the record.
    pub fn connection_address(&self, id: &HostId) -> Option<ConnectionAddress> {
        self.get(id).map(|record| record.connection_address())
    }

    pub fn snapshot(&self) -> HostSnapshot {
        self.hosts.snapshot()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Monotonic counter bumped on every change to the host list.
    pub fn version(&self) -> u64 {
        self.hosts.version()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe(&self) -> HostStream {
        HostStream::new(self.hosts.subscribe())
    }

    pub fn events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Find the slot an observation belongs to: by id, then by address.
    fn locate(&self, observation: &Observation) -> Option<u64> {
        if let Some(key) = observation
            .id
            .as_ref()
            .and_then(|id| self.hosts.key_for_id(id))
        {
            return Some(key);
        }

        // Loopback local addresses are never adopted, so never match on them.
        observation
            .candidate_addresses()
            .filter(|a| !a.is_loopback_v4())
            .find_map(|a| self.hosts.key_for_address(a))
    }

    /// Merge into the located record. `creating` holds the creation lock
    /// if the caller already took it; an identity change that needs a new
    /// record takes it here otherwise.
    fn try_merge<'a>(
        &'a self,
        observation: &Observation,
        creating: &mut Option<MutexGuard<'a, ()>>,
    ) -> Option<ObserveOutcome> {
        let key = self.locate(observation)?;
        let (outcome, record) = self.hosts.update(key, |r| merge(r, observation))?;

        Some(match outcome {
            MergeOutcome::Merged { changed } if changed.is_empty() => {
                ObserveOutcome::Unchanged(record)
            }
            MergeOutcome::Merged { changed } => {
                debug!(host = %record.display_name(), ?changed, "host updated");
                self.emit(RegistryEvent::Updated {
                    record: Arc::clone(&record),
                    changed: changed.clone(),
                });
                ObserveOutcome::Updated { record, changed }
            }
            MergeOutcome::IdentityChanged(change) => {
                self.resolve_identity_change(key, *change, observation, creating)
            }
        })
    }

    fn resolve_identity_change<'a>(
        &'a self,
        key: u64,
        change: IdentityChange,
        observation: &Observation,
        creating: &mut Option<MutexGuard<'a, ()>>,
    ) -> ObserveOutcome {
        let change = Arc::new(change);
        self.emit(RegistryEvent::IdentityChanged(Arc::clone(&change)));

        let policy = self.config.identity_change;
        let resolution = match policy {
            IdentityChangePolicy::Duplicate => {
                IdentityResolution::Duplicated(self.duplicate(&change, observation, creating))
            }
            IdentityChangePolicy::Supersede => {
                let replacement = change.new.clone();
                match self.hosts.update(key, move |r| *r = replacement) {
                    Some(((), record)) => {
                        self.emit(RegistryEvent::Removed(Arc::new(change.old.clone())));
                        self.emit(RegistryEvent::Added(Arc::clone(&record)));
                        IdentityResolution::Superseded(record)
                    }
                    // Removed underneath us: nothing left to supersede.
                    None => IdentityResolution::Duplicated(
                        self.duplicate(&change, observation, creating),
                    ),
                }
            }
            IdentityChangePolicy::Ignore => IdentityResolution::Ignored,
        };

        info!(
            old = %change.old.display_name(),
            new = %change.new.display_name(),
            %policy,
            "resolved host identity change"
        );
        ObserveOutcome::IdentityChanged { change, resolution }
    }

    /// Give the new identity a record of its own, unless a concurrent
    /// sighting of the same identity already created one; then merge into
    /// that record instead.
    fn duplicate<'a>(
        &'a self,
        change: &IdentityChange,
        observation: &Observation,
        creating: &mut Option<MutexGuard<'a, ()>>,
    ) -> Arc<HostRecord> {
        if creating.is_none() {
            *creating = Some(self.lock_creating());
        }

        let existing = observation
            .id
            .as_ref()
            .and_then(|id| self.hosts.key_for_id(id))
            .and_then(|key| self.hosts.update(key, |r| merge(r, observation)));

        match existing {
            Some((MergeOutcome::Merged { changed }, record)) => {
                debug!(host = %record.display_name(), "identity already has a record");
                if !changed.is_empty() {
                    self.emit(RegistryEvent::Updated {
                        record: Arc::clone(&record),
                        changed,
                    });
                }
                record
            }
            // The record was superseded by yet another id meanwhile; leave it be.
            Some((MergeOutcome::IdentityChanged(_), record)) => record,
            None => self.add(change.new.clone()),
        }
    }

    fn lock_creating(&self) -> MutexGuard<'_, ()> {
        self.creating.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self, record: HostRecord) -> Arc<HostRecord> {
        let (_, record) = self.hosts.insert(record);
        info!(host = %record.display_name(), "host added");
        self.emit(RegistryEvent::Added(Arc::clone(&record)));
        record
    }

    fn emit(&self, event: RegistryEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for HostRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{HostState, RawAddress, RawAddresses};

    fn addr(text: &str) -> AddressTuple {
        text.parse().unwrap()
    }

    fn seen(id: &str, local: &str) -> Observation {
        Observation {
            id: Some(HostId::from(id)),
            name: Some(format!("host {id}")),
            state: HostState::Online,
            local_address: Some(addr(local)),
            ..Observation::default()
        }
    }

    fn registry(policy: IdentityChangePolicy) -> HostRegistry {
        HostRegistry::new(RegistryConfig {
            identity_change: policy,
            ..RegistryConfig::default()
        })
    }

    #[test]
    fn first_observation_adds_a_host() {
        let reg = HostRegistry::default();
        let outcome = reg.observe(&seen("a", "10.0.0.1:47989")).unwrap();

        assert!(matches!(outcome, ObserveOutcome::Added(_)));
        assert_eq!(reg.len(), 1);
        assert_eq!(
            reg.get(&HostId::from("a")).unwrap().local_address,
            Some(addr("10.0.0.1:47989"))
        );
    }

    #[test]
    fn repeat_observation_is_unchanged() {
        let reg = HostRegistry::default();
        reg.observe(&seen("a", "10.0.0.1:47989")).unwrap();
        let outcome = reg.observe(&seen("a", "10.0.0.1:47989")).unwrap();
        assert!(matches!(outcome, ObserveOutcome::Unchanged(_)));
    }

    #[test]
    fn address_only_observation_finds_host() {
        let reg = HostRegistry::default();
        reg.observe(&seen("a", "10.0.0.1:47989")).unwrap();

        let outcome = reg
            .observe(&Observation {
                local_address: Some(addr("10.0.0.1:47989")),
                state: HostState::Offline,
                consecutive_offline_count: 1,
                ..Observation::default()
            })
            .unwrap();

        let ObserveOutcome::Updated { record, changed } = outcome else {
            panic!("expected an update, got {outcome:?}");
        };
        assert_eq!(record.id, Some(HostId::from("a")));
        assert_eq!(record.state, HostState::Offline);
        assert!(changed.contains(&HostField::ConsecutiveOfflineCount));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn address_known_host_adopts_id_later() {
        let reg = HostRegistry::default();
        reg.observe(&Observation {
            manual_address: Some(addr("den.local:47989")),
            ..Observation::default()
        })
        .unwrap();

        reg.observe(&Observation {
            id: Some(HostId::from("a")),
            manual_address: Some(addr("den.local:47989")),
            ..Observation::default()
        })
        .unwrap();

        assert_eq!(reg.len(), 1);
        assert!(reg.get(&HostId::from("a")).is_some());
    }

    #[test]
    fn identity_change_duplicates_by_default() {
        let reg = HostRegistry::default();
        let mut events = reg.events();
        reg.observe(&seen("a", "10.0.0.1:47989")).unwrap();

        let outcome = reg.observe(&seen("b", "10.0.0.1:47989")).unwrap();
        let ObserveOutcome::IdentityChanged { change, resolution } = outcome else {
            panic!("expected an identity change");
        };
        assert_eq!(change.old.id, Some(HostId::from("a")));
        assert_eq!(change.new.id, Some(HostId::from("b")));
        assert!(matches!(resolution, IdentityResolution::Duplicated(_)));

        assert_eq!(reg.len(), 2);
        assert_eq!(
            reg.get(&HostId::from("a")).unwrap().name.as_deref(),
            Some("host a")
        );
        assert!(reg.get(&HostId::from("b")).is_some());

        assert!(matches!(events.try_recv().unwrap(), RegistryEvent::Added(_)));
        assert!(matches!(
            events.try_recv().unwrap(),
            RegistryEvent::IdentityChanged(_)
        ));
        assert!(matches!(events.try_recv().unwrap(), RegistryEvent::Added(_)));
    }

    #[test]
    fn identity_change_supersede_replaces_record() {
        let reg = registry(IdentityChangePolicy::Supersede);
        reg.observe(&seen("a", "10.0.0.1:47989")).unwrap();
        let outcome = reg.observe(&seen("b", "10.0.0.1:47989")).unwrap();

        assert!(matches!(
            outcome,
            ObserveOutcome::IdentityChanged {
                resolution: IdentityResolution::Superseded(_),
                ..
            }
        ));
        assert_eq!(reg.len(), 1);
        assert!(reg.get(&HostId::from("a")).is_none());
        assert!(reg.get(&HostId::from("b")).is_some());
    }

    #[test]
    fn identity_change_ignore_keeps_old_record() {
        let reg = registry(IdentityChangePolicy::Ignore);
        reg.observe(&seen("a", "10.0.0.1:47989")).unwrap();
        let before = reg.get(&HostId::from("a")).unwrap();

        let outcome = reg.observe(&seen("b", "10.0.0.1:47989")).unwrap();
        assert!(outcome.record().is_none());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(&HostId::from("a")).unwrap(), before);
    }

    #[test]
    fn unidentifiable_observation_is_rejected() {
        let reg = HostRegistry::default();
        let err = reg
            .observe(&Observation {
                name: Some("ghost".into()),
                local_address: Some(addr("127.0.0.1:47989")),
                ..Observation::default()
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Unidentifiable));
        assert!(reg.is_empty());
    }

    #[test]
    fn remove_emits_event_and_forgets_host() {
        let reg = HostRegistry::default();
        reg.observe(&seen("a", "10.0.0.1:47989")).unwrap();
        let mut events = reg.events();

        let removed = reg.remove(&HostId::from("a")).unwrap();
        assert_eq!(removed.id, Some(HostId::from("a")));
        assert!(reg.find_by_address(&addr("10.0.0.1:47989")).is_none());
        assert!(matches!(events.try_recv().unwrap(), RegistryEvent::Removed(_)));

        assert!(matches!(
            reg.remove(&HostId::from("a")),
            Err(CoreError::HostNotFound { .. })
        ));
    }

    #[test]
    fn ingest_reports_dropped_fields() {
        let reg = HostRegistry::default();
        let ingested = reg
            .ingest(RawObservation {
                id: Some("a".into()),
                addresses: RawAddresses {
                    local: Some(RawAddress::new("10.0.0.1", 47989)),
                    remote: Some(RawAddress::new("203.0.113.7", -1)),
                    ..RawAddresses::default()
                },
                ..RawObservation::default()
            })
            .unwrap();

        assert_eq!(ingested.dropped.len(), 1);
        assert_eq!(ingested.dropped[0].field, HostField::RemoteAddress);
        let record = ingested.outcome.record().unwrap();
        assert_eq!(record.local_address, Some(addr("10.0.0.1:47989")));
        assert_eq!(record.remote_address, None);
    }

    #[test]
    fn connection_address_reads_published_record() {
        let reg = HostRegistry::default();
        reg.observe(&Observation {
            remote_address: Some(addr("203.0.113.7:47989")),
            ..seen("a", "10.0.0.1:47989")
        })
        .unwrap();

        let selected = reg.connection_address(&HostId::from("a")).unwrap();
        assert_eq!(selected.address(), Some(&addr("203.0.113.7:47989")));
        assert!(reg.connection_address(&HostId::from("zzz")).is_none());
    }

    #[test]
    fn concurrent_observations_of_one_host_serialize() {
        let reg = Arc::new(HostRegistry::default());
        reg.observe(&seen("a", "10.0.0.1:47989")).unwrap();

        let handles: Vec<_> = (1..=8u32)
            .map(|n| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || {
                    for _ in 0..50 {
                        reg.observe(&Observation {
                            consecutive_offline_count: n,
                            ..seen("a", "10.0.0.1:47989")
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(reg.len(), 1);
        let record = reg.get(&HostId::from("a")).unwrap();
        assert!((1..=8).contains(&record.consecutive_offline_count));
    }

    #[test]
    fn concurrent_first_sightings_create_one_record() {
        let reg = Arc::new(HostRegistry::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || reg.observe(&seen("a", "10.0.0.1:47989")).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn concurrent_new_identity_on_known_address_creates_one_record() {
        for _ in 0..50 {
            let reg = Arc::new(HostRegistry::default());
            reg.observe(&seen("a", "10.0.0.1:47989")).unwrap();

            let barrier = Arc::new(Barrier::new(8));
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let reg = Arc::clone(&reg);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        reg.observe(&seen("b", "10.0.0.1:47989")).unwrap()
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            let b = HostId::from("b");
            let records_for_b = reg
                .snapshot()
                .iter()
                .filter(|r| r.id.as_ref() == Some(&b))
                .count();
            assert_eq!(records_for_b, 1);
            assert_eq!(reg.len(), 2);
            assert!(reg.get(&HostId::from("a")).is_some());
        }
    }

    #[test]
    fn connection_address_never_sees_a_torn_record() {
        // Two complete address sets; a reader must only ever see one or the other.
        fn address_set(n: u16) -> Observation {
            let port = 50_000 + n;
            Observation {
                remote_address: Some(addr(&format!("203.0.113.{n}:{port}"))),
                external_port: port,
                ..seen("a", &format!("10.0.0.{n}:47989"))
            }
        }

        let reg = Arc::new(HostRegistry::default());
        reg.observe(&address_set(1)).unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let reg = Arc::clone(&reg);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let id = HostId::from("a");
                    let remotes = [address_set(1), address_set(2)].map(|o| o.remote_address);
                    let mut reads = 0u32;
                    while reads == 0 || !done.load(Ordering::Acquire) {
                        let record = reg.get(&id).unwrap();
                        let n = if record.external_port == 50_001 { 1 } else { 2 };
                        let expected = address_set(n);
                        assert_eq!(record.remote_address, expected.remote_address);
                        assert_eq!(record.local_address, expected.local_address);
                        assert_eq!(
                            record.connection_address().address(),
                            expected.remote_address.as_ref()
                        );

                        let route = reg.connection_address(&id).unwrap();
                        assert!(remotes.iter().any(|r| r.as_ref() == route.address()));
                        reads += 1;
                    }
                })
            })
            .collect();

        for i in 0..500u16 {
            reg.observe(&address_set(1 + i % 2)).unwrap();
        }
        done.store(true, Ordering::Release);
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn subscribers_see_new_hosts() {
        let reg = HostRegistry::default();
        let mut stream = reg.subscribe();
        assert!(stream.current().is_empty());

        reg.observe(&seen("a", "10.0.0.1:47989")).unwrap();
        let snap = stream.changed().await.unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(stream.latest().len(), 1);
    }

    #[tokio::test]
    async fn into_stream_yields_current_snapshot_first() {
        use futures_util::StreamExt;

        let reg = HostRegistry::default();
        reg.observe(&seen("a", "10.0.0.1:47989")).unwrap();

        let mut stream = reg.subscribe().into_stream();
        let first = stream.next().await.unwrap();
        assert_eq!(first.len(), 1);
    }
}
