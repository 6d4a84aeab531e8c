// ── Host list subscriptions ──
//
// Every registry mutation republishes the whole host list on a `watch`
// channel. A subscriber only ever sees the newest list: lists replaced
// before it looked are skipped, never queued.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::{HostId, HostRecord};

/// Immutable host list, in the order hosts were first seen.
pub type HostSnapshot = Arc<Vec<Arc<HostRecord>>>;

/// Live view of the registry's host list, vended by `HostRegistry::subscribe`.
pub struct HostStream {
    seen: HostSnapshot,
    rx: watch::Receiver<HostSnapshot>,
}

impl HostStream {
    pub(crate) fn new(mut rx: watch::Receiver<HostSnapshot>) -> Self {
        let seen = Arc::clone(&rx.borrow_and_update());
        Self { seen, rx }
    }

    /// The list this subscriber last looked at.
    pub fn current(&self) -> &HostSnapshot {
        &self.seen
    }

    /// The registry's list right now, without marking it seen.
    pub fn latest(&self) -> HostSnapshot {
        Arc::clone(&self.rx.borrow())
    }

    /// Find a host by id in the list this subscriber last looked at.
    pub fn host(&self, id: &HostId) -> Option<&Arc<HostRecord>> {
        self.seen.iter().find(|r| r.id.as_ref() == Some(id))
    }

    /// Wait for a list newer than `current()`. `None` once the registry
    /// is dropped.
    pub async fn changed(&mut self) -> Option<HostSnapshot> {
        self.rx.changed().await.ok()?;
        self.seen = Arc::clone(&self.rx.borrow_and_update());
        Some(Arc::clone(&self.seen))
    }

    /// Wait until a host with `id` is listed and return its record.
    ///
    /// Resolves at once if the host is already there. `None` if the
    /// registry is dropped first.
    pub async fn wait_for_host(&mut self, id: &HostId) -> Option<Arc<HostRecord>> {
        let listed = |list: &HostSnapshot| list.iter().any(|r| r.id.as_ref() == Some(id));
        self.seen = Arc::clone(&*self.rx.wait_for(listed).await.ok()?);
        self.host(id).cloned()
    }

    /// Yield host lists as a `Stream`, starting with the newest one.
    pub fn into_stream(self) -> HostWatchStream {
        HostWatchStream {
            lists: WatchStream::new(self.rx),
        }
    }
}

/// `Stream` of host lists returned by [`HostStream::into_stream`].
pub struct HostWatchStream {
    lists: WatchStream<HostSnapshot>,
}

impl Stream for HostWatchStream {
    type Item = HostSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.lists).poll_next(cx)
    }
}
