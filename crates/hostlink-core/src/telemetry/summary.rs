// ── Session summary ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::window::{FrameRates, WindowStats};
use crate::error::CoreError;

/// Session facts the decode pipeline reports alongside its samples.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineInfo {
    pub decoder: Option<String>,
    pub initial_width: Option<u32>,
    pub initial_height: Option<u32>,
    pub avg_net_latency_ms: Option<u32>,
    pub avg_net_latency_variance_ms: Option<u32>,
}

/// Human-facing digest of the most recent two windows, plus the session
/// totals. Metrics that would divide by zero are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub pipeline: PipelineInfo,
    pub avg_fps: FrameRates,
    /// Average decode time per received frame.
    pub decode_time_ms: Option<f64>,
    pub net_drops_percent: Option<f64>,
    pub host_latency_min_ms: Option<f64>,
    pub host_latency_max_ms: Option<f64>,
    pub host_latency_avg_ms: Option<f64>,
    /// Last and active windows combined.
    pub recent: WindowStats,
    /// The whole session, including the active window.
    pub global: WindowStats,
}

impl SessionSummary {
    /// Summarize as of `now_ms` on the telemetry clock.
    pub fn from_windows(
        global: &WindowStats,
        last: &WindowStats,
        active: &WindowStats,
        now_ms: u64,
    ) -> Result<Self, CoreError> {
        let mut recent = last.snapshot();
        recent.absorb(active)?;
        let mut session = global.snapshot();
        session.absorb(active)?;

        let has_latency = recent.host_latency_sample_count > 0;
        let latency_ms = |tenths: Option<u16>| {
            tenths
                .filter(|_| has_latency)
                .map(|t| f64::from(t) / 10.0)
        };

        Ok(Self {
            generated_at: Utc::now(),
            pipeline: PipelineInfo::default(),
            avg_fps: recent.rate_at(now_ms),
            decode_time_ms: ratio(recent.decode_time_ms, u64::from(recent.frames_received)),
            net_drops_percent: ratio(
                u64::from(recent.frames_lost),
                u64::from(recent.frames_total),
            )
            .map(|r| r * 100.0),
            host_latency_min_ms: latency_ms(recent.host_latency_min),
            host_latency_max_ms: latency_ms(recent.host_latency_max),
            host_latency_avg_ms: ratio(
                recent.host_latency_sum,
                u64::from(recent.host_latency_sample_count),
            )
            .map(|tenths| tenths / 10.0),
            recent,
            global: session,
        })
    }

    /// Attach what the pipeline reported about the session.
    pub fn with_pipeline(mut self, pipeline: PipelineInfo) -> Self {
        self.pipeline = pipeline;
        self
    }
}

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::telemetry::TelemetrySample;

    fn window(start: u64, frames: u32, lost: u32, latency: Option<u16>) -> WindowStats {
        let mut w = WindowStats::default();
        w.add(&TelemetrySample {
            decode_time_ms: u64::from(frames) * 3,
            elapsed_ms: 1000,
            frames_total: frames,
            frames_received: frames,
            frames_rendered: frames,
            frames_lost: lost,
            host_latency_min: latency,
            host_latency_max: latency,
            host_latency_sum: latency.map_or(0, u64::from),
            host_latency_sample_count: u32::from(latency.is_some()),
            window_start_ms: start,
            ..TelemetrySample::default()
        })
        .unwrap();
        w
    }

    fn close(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn summary_combines_last_and_active() {
        let last = window(0, 60, 3, Some(40));
        let active = window(1000, 40, 2, Some(20));
        let summary =
            SessionSummary::from_windows(&WindowStats::default(), &last, &active, 2000).unwrap();

        assert!((summary.avg_fps.total_fps - 50.0).abs() < 1e-9);
        assert!(close(summary.decode_time_ms, 3.0));
        assert!(close(summary.net_drops_percent, 5.0));
        assert!(close(summary.host_latency_min_ms, 2.0));
        assert!(close(summary.host_latency_max_ms, 4.0));
        assert!(close(summary.host_latency_avg_ms, 3.0));
        assert_eq!(summary.recent.frames_total, 100);
        assert_eq!(summary.global.frames_total, 40);
    }

    #[test]
    fn empty_windows_have_no_derived_metrics() {
        let empty = WindowStats::default();
        let summary = SessionSummary::from_windows(&empty, &empty, &empty, 5000).unwrap();

        assert_eq!(summary.avg_fps, FrameRates::default());
        assert_eq!(summary.decode_time_ms, None);
        assert_eq!(summary.net_drops_percent, None);
        assert_eq!(summary.host_latency_min_ms, None);
        assert_eq!(summary.host_latency_avg_ms, None);
    }

    #[test]
    fn summary_serializes_for_export() {
        let last = window(0, 60, 0, None);
        let summary =
            SessionSummary::from_windows(&last, &last, &WindowStats::default(), 1000).unwrap();
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json["avg_fps"]["total_fps"].is_number());
        assert!(json["host_latency_min_ms"].is_null());
        assert!(json["decoder"].is_null());
    }

    #[test]
    fn pipeline_facts_are_exported_flat() {
        let last = window(0, 60, 0, None);
        let summary = SessionSummary::from_windows(&last, &last, &WindowStats::default(), 1000)
            .unwrap()
            .with_pipeline(PipelineInfo {
                decoder: Some("c2.qti.hevc.decoder".into()),
                avg_net_latency_ms: Some(12),
                avg_net_latency_variance_ms: Some(3),
                ..PipelineInfo::default()
            });

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["decoder"], "c2.qti.hevc.decoder");
        assert_eq!(json["avg_net_latency_ms"], 12);
        assert_eq!(json["avg_net_latency_variance_ms"], 3);
        assert!(json["initial_width"].is_null());
    }
}
