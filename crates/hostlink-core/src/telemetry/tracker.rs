// ── Telemetry tracker ──
//
// Keeps three windows: `global` (whole session), `last_window` (the most
// recently completed window) and `active_window` (being filled). The
// active window is rolled once the configured duration has passed since
// it started.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{trace, warn};

use super::clock;
use super::sample::TelemetrySample;
use super::summary::{PipelineInfo, SessionSummary};
use super::window::WindowStats;
use crate::config::TelemetryConfig;
use crate::error::CoreError;

/// Point-in-time copy of all three windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    pub global: WindowStats,
    pub last_window: WindowStats,
    pub active_window: WindowStats,
}

#[derive(Debug, Clone, Default)]
pub struct TelemetryTracker {
    config: TelemetryConfig,
    global: WindowStats,
    last_window: WindowStats,
    active_window: WindowStats,
    pipeline: PipelineInfo,
}

impl TelemetryTracker {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Record a sample, rolling the active window against the telemetry clock.
    pub fn record(&mut self, sample: &TelemetrySample) -> Result<(), CoreError> {
        self.record_at(sample, clock::now_ms())
    }

    /// Record a sample, rolling the active window as of `now_ms`.
    ///
    /// A sample starting before the last completed window is rejected and
    /// leaves every window untouched.
    pub fn record_at(&mut self, sample: &TelemetrySample, now_ms: u64) -> Result<(), CoreError> {
        if let Some(window_start_ms) = self.last_window.window_start_ms {
            if sample.window_start_ms < window_start_ms {
                return Err(CoreError::WindowRegressed {
                    window_start_ms,
                    sample_start_ms: sample.window_start_ms,
                });
            }
        }
        self.active_window.add(sample)?;

        if let Some(start) = self.active_window.window_start_ms {
            if now_ms.saturating_sub(start) >= self.window_ms() {
                self.roll()?;
            }
        }
        Ok(())
    }

    pub fn global(&self) -> &WindowStats {
        &self.global
    }

    pub fn last_window(&self) -> &WindowStats {
        &self.last_window
    }

    pub fn active_window(&self) -> &WindowStats {
        &self.active_window
    }

    pub fn pipeline(&self) -> &PipelineInfo {
        &self.pipeline
    }

    /// Replace what the pipeline reported about this session.
    pub fn set_pipeline(&mut self, pipeline: PipelineInfo) {
        self.pipeline = pipeline;
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            global: self.global,
            last_window: self.last_window,
            active_window: self.active_window,
        }
    }

    pub fn summary_at(&self, now_ms: u64) -> Result<SessionSummary, CoreError> {
        SessionSummary::from_windows(&self.global, &self.last_window, &self.active_window, now_ms)
            .map(|summary| summary.with_pipeline(self.pipeline.clone()))
    }

    pub fn summary(&self) -> Result<SessionSummary, CoreError> {
        self.summary_at(clock::now_ms())
    }

    /// Start a new session: every window is emptied.
    pub fn clear(&mut self) {
        self.global.clear();
        self.last_window.clear();
        self.active_window.clear();
        self.pipeline = PipelineInfo::default();
    }

    fn window_ms(&self) -> u64 {
        u64::try_from(self.config.window.as_millis()).unwrap_or(u64::MAX)
    }

    fn roll(&mut self) -> Result<(), CoreError> {
        self.global.absorb(&self.active_window)?;
        self.last_window = self.active_window.snapshot();
        self.active_window.clear();
        trace!(
            frames = self.last_window.frames_total,
            start_ms = ?self.last_window.window_start_ms,
            "rolled telemetry window"
        );
        Ok(())
    }
}

/// Tracker handle shared between the sample producer and its readers.
///
/// Every operation holds the lock only for the copy or fold itself.
#[derive(Debug, Clone, Default)]
pub struct SharedTelemetry {
    inner: Arc<Mutex<TelemetryTracker>>,
}

impl SharedTelemetry {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TelemetryTracker::new(config))),
        }
    }

    /// Record a sample. A regressed window start is logged and returned.
    pub fn record(&self, sample: &TelemetrySample) -> Result<(), CoreError> {
        self.record_at(sample, clock::now_ms())
    }

    pub fn record_at(&self, sample: &TelemetrySample, now_ms: u64) -> Result<(), CoreError> {
        self.lock().record_at(sample, now_ms).inspect_err(|e| {
            warn!(error = %e, "rejected telemetry sample");
        })
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.lock().snapshot()
    }

    pub fn set_pipeline(&self, pipeline: PipelineInfo) {
        self.lock().set_pipeline(pipeline);
    }

    pub fn summary(&self) -> Result<SessionSummary, CoreError> {
        let (snap, pipeline) = {
            let tracker = self.lock();
            (tracker.snapshot(), tracker.pipeline().clone())
        };
        SessionSummary::from_windows(
            &snap.global,
            &snap.last_window,
            &snap.active_window,
            clock::now_ms(),
        )
        .map(|summary| summary.with_pipeline(pipeline))
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, TelemetryTracker> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;

    fn sample(start: u64, frames: u32) -> TelemetrySample {
        TelemetrySample {
            elapsed_ms: 250,
            frames_total: frames,
            frames_received: frames,
            frames_rendered: frames,
            window_start_ms: start,
            ..TelemetrySample::default()
        }
    }

    fn tracker() -> TelemetryTracker {
        TelemetryTracker::new(TelemetryConfig {
            window: Duration::from_millis(1000),
        })
    }

    #[test]
    fn samples_fill_active_window_until_it_rolls() {
        let mut t = tracker();
        t.record_at(&sample(0, 15), 250).unwrap();
        t.record_at(&sample(250, 15), 500).unwrap();
        assert_eq!(t.active_window().frames_total, 30);
        assert!(t.last_window().is_empty());

        t.record_at(&sample(500, 15), 750).unwrap();
        t.record_at(&sample(750, 15), 1000).unwrap();
        assert!(t.active_window().is_empty());
        assert_eq!(t.last_window().frames_total, 60);
        assert_eq!(t.global().frames_total, 60);
    }

    #[test]
    fn global_accumulates_across_rolls() {
        let mut t = tracker();
        for i in 0..8u64 {
            t.record_at(&sample(i * 250, 10), (i + 1) * 250).unwrap();
        }
        assert_eq!(t.global().frames_total, 80);
        assert_eq!(t.global().window_start_ms, Some(0));
        assert_eq!(t.last_window().window_start_ms, Some(1000));
    }

    #[test]
    fn sample_older_than_last_window_is_rejected() {
        let mut t = tracker();
        t.record_at(&sample(1000, 10), 2000).unwrap();
        let before = t.snapshot();

        let err = t.record_at(&sample(500, 10), 2100).unwrap_err();
        assert!(matches!(err, CoreError::WindowRegressed { .. }));
        assert_eq!(t.snapshot(), before);
    }

    #[test]
    fn summary_reads_recent_windows() {
        let mut t = tracker();
        for i in 0..6u64 {
            t.record_at(&sample(i * 250, 15), (i + 1) * 250).unwrap();
        }
        let summary = t.summary_at(1500).unwrap();
        assert_eq!(summary.recent.frames_total, 90);
        assert!((summary.avg_fps.total_fps - 60.0).abs() < 1e-9);
    }

    #[test]
    fn clear_starts_a_new_session() {
        let mut t = tracker();
        t.record_at(&sample(0, 10), 1000).unwrap();
        t.clear();
        assert_eq!(t.snapshot(), TelemetrySnapshot::default());
        t.record_at(&sample(0, 10), 100).unwrap();
    }

    #[test]
    fn summary_carries_pipeline_info_until_cleared() {
        let mut t = tracker();
        t.set_pipeline(PipelineInfo {
            decoder: Some("OMX.hevc".into()),
            avg_net_latency_ms: Some(8),
            ..PipelineInfo::default()
        });
        t.record_at(&sample(0, 10), 250).unwrap();

        let summary = t.summary_at(250).unwrap();
        assert_eq!(summary.pipeline.decoder.as_deref(), Some("OMX.hevc"));
        assert_eq!(summary.pipeline.avg_net_latency_ms, Some(8));

        t.clear();
        assert_eq!(t.summary_at(0).unwrap().pipeline, PipelineInfo::default());
    }

    #[test]
    fn shared_handle_serves_concurrent_readers() {
        let shared = SharedTelemetry::default();
        let writer = shared.clone();

        let producer = thread::spawn(move || {
            for i in 0..100u64 {
                writer.record_at(&sample(i * 10, 1), i * 10 + 10).unwrap();
            }
        });
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let reader = shared.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        let snap = reader.snapshot();
                        assert!(snap.global.frames_total <= 100);
                    }
                })
            })
            .collect();

        producer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }

        let snap = shared.snapshot();
        let seen = snap.global.frames_total + snap.active_window.frames_total;
        assert_eq!(seen, 100);
    }
}
