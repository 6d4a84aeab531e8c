// ── Host collection ──
//
// Concurrent storage for host records with per-record write locks and
// push-based change notification via `watch` channels.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::sync::watch;

use crate::model::{AddressTuple, HostId, HostRecord};

/// One host's storage cell.
///
/// Writers serialize on `writer`; readers load `published`, an immutable
/// copy swapped in atomically after each write, so they never block on a
/// merge and never see a half-applied one.
struct HostSlot {
    writer: Mutex<HostRecord>,
    published: ArcSwap<HostRecord>,
}

impl HostSlot {
    fn new(record: HostRecord) -> Self {
        Self {
            published: ArcSwap::from_pointee(record.clone()),
            writer: Mutex::new(record),
        }
    }

    fn current(&self) -> Arc<HostRecord> {
        self.published.load_full()
    }
}

/// Registry-internal storage for host records.
///
/// Records are keyed by a registry-assigned slot key rather than by
/// `HostId`, because a host can be known by address before its id is.
/// Two secondary indexes map ids and candidate addresses to slot keys.
pub(crate) struct HostCollection {
    by_key: DashMap<u64, Arc<HostSlot>>,

    /// Secondary index: HostId -> slot key.
    id_to_key: DashMap<HostId, u64>,

    /// Secondary index: candidate address -> slot key. Last writer wins
    /// when two hosts claim the same address.
    address_to_key: DashMap<AddressTuple, u64>,

    next_key: AtomicU64,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot in insertion order, rebuilt on mutation.
    snapshot: watch::Sender<Arc<Vec<Arc<HostRecord>>>>,
}

impl HostCollection {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            id_to_key: DashMap::new(),
            address_to_key: DashMap::new(),
            next_key: AtomicU64::new(1),
            version,
            snapshot,
        }
    }

    /// Store a new record under a fresh key.
    pub(crate) fn insert(&self, record: HostRecord) -> (u64, Arc<HostRecord>) {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(HostSlot::new(record));
        let current = slot.current();

        // Index under the slot's write lock so a concurrent update of the
        // new slot cannot interleave with the initial indexing.
        {
            let guard = slot.writer.lock().unwrap_or_else(PoisonError::into_inner);
            self.by_key.insert(key, Arc::clone(&slot));
            self.reindex(key, &HostRecord::default(), &guard);
        }

        self.publish();
        (key, current)
    }

    /// Mutate one record under its own lock.
    ///
    /// Returns `f`'s result and the record as published afterwards, or
    /// `None` if the key no longer exists.
    pub(crate) fn update<R>(
        &self,
        key: u64,
        f: impl FnOnce(&mut HostRecord) -> R,
    ) -> Option<(R, Arc<HostRecord>)> {
        let slot = self.by_key.get(&key).map(|r| Arc::clone(r.value()))?;

        let mut guard = slot.writer.lock().unwrap_or_else(PoisonError::into_inner);
        // The slot may have been removed while we waited for the lock.
        if !self.by_key.contains_key(&key) {
            return None;
        }

        let before = slot.current();
        let result = f(&mut guard);

        if *guard == *before {
            return Some((result, before));
        }

        self.reindex(key, &before, &guard);
        let after = Arc::new(guard.clone());
        slot.published.store(Arc::clone(&after));
        drop(guard);

        self.publish();
        Some((result, after))
    }

    /// Remove a record. Returns it if it existed.
    pub(crate) fn remove(&self, key: u64) -> Option<Arc<HostRecord>> {
        let slot = self.by_key.get(&key).map(|r| Arc::clone(r.value()))?;
        let guard = slot.writer.lock().unwrap_or_else(PoisonError::into_inner);

        self.by_key.remove(&key)?;
        self.reindex(key, &guard, &HostRecord::default());
        let removed = slot.current();
        drop(guard);

        self.publish();
        Some(removed)
    }

    pub(crate) fn get(&self, key: u64) -> Option<Arc<HostRecord>> {
        self.by_key.get(&key).map(|r| r.value().current())
    }

    pub(crate) fn key_for_id(&self, id: &HostId) -> Option<u64> {
        self.id_to_key.get(id).map(|r| *r.value())
    }

    pub(crate) fn key_for_address(&self, address: &AddressTuple) -> Option<u64> {
        self.address_to_key.get(address).map(|r| *r.value())
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<HostRecord>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<HostRecord>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Move index entries for `key` from `before`'s id/addresses to `after`'s.
    fn reindex(&self, key: u64, before: &HostRecord, after: &HostRecord) {
        if before.id != after.id {
            if let Some(old) = &before.id {
                self.id_to_key.remove_if(old, |_, k| *k == key);
            }
        }
        if let Some(new) = &after.id {
            self.id_to_key.insert(new.clone(), key);
        }

        let retained: Vec<&AddressTuple> = after.candidate_addresses().collect();
        for stale in before
            .candidate_addresses()
            .filter(|a| !retained.contains(a))
        {
            self.address_to_key.remove_if(stale, |_, k| *k == key);
        }
        for address in retained {
            self.address_to_key.insert(address.clone(), key);
        }
    }

    /// Rebuild the snapshot in key order, broadcast it, bump the version.
    ///
    /// The rebuild runs inside `send_modify` so concurrent publishers are
    /// serialized and the last one always sees every preceding write.
    fn publish(&self) {
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| {
            let mut entries: Vec<(u64, Arc<HostRecord>)> = self
                .by_key
                .iter()
                .map(|r| (*r.key(), r.value().current()))
                .collect();
            entries.sort_unstable_by_key(|(key, _)| *key);
            *snap = Arc::new(entries.into_iter().map(|(_, v)| v).collect());
        });
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn addr(text: &str) -> AddressTuple {
        text.parse().unwrap()
    }

    fn record(id: &str, local: &str) -> HostRecord {
        HostRecord {
            id: Some(HostId::from(id)),
            local_address: Some(addr(local)),
            ..HostRecord::default()
        }
    }

    #[test]
    fn insert_indexes_id_and_addresses() {
        let col = HostCollection::new();
        let (key, _) = col.insert(record("a", "10.0.0.1:47989"));

        assert_eq!(col.key_for_id(&HostId::from("a")), Some(key));
        assert_eq!(col.key_for_address(&addr("10.0.0.1:47989")), Some(key));
        assert_eq!(col.len(), 1);
        assert_eq!(col.snapshot().len(), 1);
    }

    #[test]
    fn update_moves_address_index() {
        let col = HostCollection::new();
        let (key, _) = col.insert(record("a", "10.0.0.1:47989"));

        let ((), after) = col
            .update(key, |r| r.local_address = Some(addr("10.0.0.2:47989")))
            .unwrap();

        assert_eq!(after.local_address, Some(addr("10.0.0.2:47989")));
        assert_eq!(col.key_for_address(&addr("10.0.0.1:47989")), None);
        assert_eq!(col.key_for_address(&addr("10.0.0.2:47989")), Some(key));
        assert_eq!(col.get(key).unwrap().local_address, after.local_address);
    }

    #[test]
    fn update_without_change_keeps_version() {
        let col = HostCollection::new();
        let (key, _) = col.insert(record("a", "10.0.0.1:47989"));
        let version = col.version();

        col.update(key, |_| ()).unwrap();
        assert_eq!(col.version(), version);
    }

    #[test]
    fn remove_cleans_up_indexes() {
        let col = HostCollection::new();
        let (key, _) = col.insert(record("a", "10.0.0.1:47989"));

        let removed = col.remove(key).unwrap();
        assert_eq!(removed.id, Some(HostId::from("a")));
        assert!(col.get(key).is_none());
        assert!(col.key_for_id(&HostId::from("a")).is_none());
        assert!(col.key_for_address(&addr("10.0.0.1:47989")).is_none());
        assert!(col.is_empty());
        assert!(col.snapshot().is_empty());
        assert!(col.update(key, |_| ()).is_none());
    }

    #[test]
    fn snapshot_is_in_insertion_order() {
        let col = HostCollection::new();
        for (i, id) in ["c", "a", "b"].iter().enumerate() {
            col.insert(record(id, &format!("10.0.0.{}:47989", i + 1)));
        }
        let ids: Vec<String> = col
            .snapshot()
            .iter()
            .map(|r| r.id.as_ref().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn shared_address_does_not_unindex_other_host() {
        let col = HostCollection::new();
        let (first, _) = col.insert(record("a", "10.0.0.1:47989"));
        let (second, _) = col.insert(record("b", "10.0.0.1:47989"));
        assert_eq!(col.key_for_address(&addr("10.0.0.1:47989")), Some(second));

        // Moving the first host away must not drop the second host's entry.
        col.update(first, |r| r.local_address = Some(addr("10.0.0.9:47989")))
            .unwrap();
        assert_eq!(col.key_for_address(&addr("10.0.0.1:47989")), Some(second));
    }
}
