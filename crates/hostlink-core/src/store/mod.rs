// ── Host store ──
//
// Canonical host registry backed by per-record slots.

mod collection;
mod registry;

pub use registry::{
    HostRegistry, IdentityResolution, Ingested, ObserveOutcome, RegistryEvent,
};
