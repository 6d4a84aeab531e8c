// ── Core error types ──
//
// Errors surfaced by hostlink-core. Address errors are field-scoped: the
// reconciler drops the offending field and keeps merging the rest, so they
// rarely escape past observation validation.

use thiserror::Error;

/// Why a textual endpoint could not become an `AddressTuple`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address must not be empty")]
    Empty,

    #[error("invalid port {port} (expected 1..=65535)")]
    InvalidPort { port: i64 },

    #[error("malformed endpoint '{input}': {reason}")]
    Malformed { input: String, reason: String },
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Input errors ─────────────────────────────────────────────────
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("Invalid display mode '{input}' (expected WIDTHxHEIGHTxREFRESH)")]
    InvalidDisplayMode { input: String },

    #[error("Observation carries neither an id nor a usable address")]
    Unidentifiable,

    // ── Lookup errors ────────────────────────────────────────────────
    #[error("Host not found: {identifier}")]
    HostNotFound { identifier: String },

    // ── Telemetry errors ─────────────────────────────────────────────
    #[error(
        "Telemetry window regressed: sample starts at {sample_start_ms}ms, \
         window already started at {window_start_ms}ms"
    )]
    WindowRegressed {
        window_start_ms: u64,
        sample_start_ms: u64,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}
