// ── Streaming telemetry aggregation ──
//
// The decode pipeline produces one `TelemetrySample` per interval; the
// tracker folds them into windows and derives rates and session summaries.

pub mod clock;
mod sample;
mod summary;
mod tracker;
mod window;

pub use sample::TelemetrySample;
pub use summary::{PipelineInfo, SessionSummary};
pub use tracker::{SharedTelemetry, TelemetrySnapshot, TelemetryTracker};
pub use window::{FrameRates, WindowStats};
