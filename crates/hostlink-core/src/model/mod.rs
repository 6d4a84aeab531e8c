// ── Host domain model ──
//
// Every type here is the canonical representation of a remote host or a
// piece of one. Discovery channels speak `RawObservation`; everything past
// validation speaks these types.

pub mod address;
pub mod display_mode;
pub mod host;
pub mod host_id;
pub mod observation;

// ── Re-exports ──────────────────────────────────────────────────────

pub use address::AddressTuple;
pub use display_mode::DisplayMode;
pub use host::{HostField, HostRecord, HostState, PairState, ServerCertificate};
pub use host_id::{HardwareAddress, HostId};
pub use observation::{
    DroppedField, Observation, RawAddress, RawAddresses, RawObservation, Validated,
};
