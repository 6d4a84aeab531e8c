// ── Telemetry samples ──

use serde::{Deserialize, Serialize};

/// One interval's measurements from the decode pipeline.
///
/// Host latencies are in tenths of a millisecond, as hosts report them.
/// Latency bounds are `None` when no frame in the interval carried one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySample {
    pub decode_time_ms: u64,
    pub elapsed_ms: u64,
    pub frames_total: u32,
    pub frames_received: u32,
    pub frames_rendered: u32,
    pub loss_events: u32,
    pub frames_lost: u32,
    pub host_latency_min: Option<u16>,
    pub host_latency_max: Option<u16>,
    pub host_latency_sum: u64,
    pub host_latency_sample_count: u32,
    /// Start of the interval on the telemetry clock.
    pub window_start_ms: u64,
}

impl TelemetrySample {
    /// When the interval ended on the telemetry clock.
    pub fn end_ms(&self) -> u64 {
        self.window_start_ms.saturating_add(self.elapsed_ms)
    }
}
