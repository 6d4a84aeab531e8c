//! Host record reconciliation and streaming telemetry aggregation.
//!
//! Two state-aggregation engines that share one shape: merge a stream of
//! partial updates into durable state under explicit field-level rules.
//!
//! - **[`HostRegistry`]**: Canonical store of remote hosts. Each
//!   [`Observation`] from a discovery channel is routed to the matching
//!   [`HostRecord`] (by [`HostId`], then by address) and merged under the
//!   per-field policies in [`reconcile`]. A host that answers on a known
//!   address with a different id raises an [`IdentityChange`] instead of
//!   being merged.
//!
//! - **[`HostStream`]**: Subscription handle vended by the registry.
//!   Exposes `current()` / `latest()` / `changed()` and converts into a
//!   `Stream` of snapshots.
//!
//! - **Connection routing**: [`select_connection_address`] picks the
//!   address a connection attempt should use from a consistent record
//!   snapshot.
//!
//! - **Telemetry** ([`telemetry`]): [`TelemetryTracker`] folds per-interval
//!   [`TelemetrySample`]s into global, last and active windows and derives
//!   frame rates and a [`SessionSummary`].

pub mod config;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod store;
pub mod stream;
pub mod telemetry;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{IdentityChangePolicy, RegistryConfig, TelemetryConfig};
pub use error::{AddressError, CoreError};
pub use reconcile::{
    AddressSource, ConnectionAddress, DEFAULT_HTTP_PORT, IdentityChange, MergeOutcome, merge,
    select_connection_address,
};
pub use store::{HostRegistry, IdentityResolution, Ingested, ObserveOutcome, RegistryEvent};
pub use stream::{HostSnapshot, HostStream, HostWatchStream};
pub use telemetry::{
    FrameRates, PipelineInfo, SessionSummary, SharedTelemetry, TelemetrySample,
    TelemetrySnapshot, TelemetryTracker, WindowStats,
};

pub use model::{
    AddressTuple, DisplayMode, DroppedField, HardwareAddress, HostField, HostId, HostRecord,
    HostState, Observation, PairState, RawAddress, RawAddresses, RawObservation,
    ServerCertificate, Validated,
};
