// ── Measurement windows ──
//
// Cumulative counters over one measurement window. Folding is
// associative and commutative on the summed counters; the window start
// is the only order-sensitive field.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::clock;
use super::sample::TelemetrySample;
use crate::error::CoreError;

/// Frame throughput over a window, in frames per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameRates {
    pub total_fps: f64,
    pub received_fps: f64,
    pub rendered_fps: f64,
}

/// Aggregated counters for one measurement window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStats {
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
    /// `None` until the first sample arrives.
    pub window_start_ms: Option<u64>,
}

impl From<&TelemetrySample> for WindowStats {
    fn from(sample: &TelemetrySample) -> Self {
        Self {
            decode_time_ms: sample.decode_time_ms,
            elapsed_ms: sample.elapsed_ms,
            frames_total: sample.frames_total,
            frames_received: sample.frames_received,
            frames_rendered: sample.frames_rendered,
            loss_events: sample.loss_events,
            frames_lost: sample.frames_lost,
            host_latency_min: sample.host_latency_min,
            host_latency_max: sample.host_latency_max,
            host_latency_sum: sample.host_latency_sum,
            host_latency_sample_count: sample.host_latency_sample_count,
            window_start_ms: Some(sample.window_start_ms),
        }
    }
}

impl WindowStats {
    /// Fold one interval's sample into the window.
    ///
    /// Fails without touching the window if the sample starts before
    /// the window does.
    pub fn add(&mut self, sample: &TelemetrySample) -> Result<(), CoreError> {
        self.absorb(&Self::from(sample))
    }

    /// Fold another window's counters into this one.
    pub fn absorb(&mut self, other: &Self) -> Result<(), CoreError> {
        if let (Some(window_start_ms), Some(sample_start_ms)) =
            (self.window_start_ms, other.window_start_ms)
        {
            if sample_start_ms < window_start_ms {
                return Err(CoreError::WindowRegressed {
                    window_start_ms,
                    sample_start_ms,
                });
            }
        }

        self.decode_time_ms = self.decode_time_ms.saturating_add(other.decode_time_ms);
        self.elapsed_ms = self.elapsed_ms.saturating_add(other.elapsed_ms);
        self.frames_total = self.frames_total.saturating_add(other.frames_total);
        self.frames_received = self.frames_received.saturating_add(other.frames_received);
        self.frames_rendered = self.frames_rendered.saturating_add(other.frames_rendered);
        self.loss_events = self.loss_events.saturating_add(other.loss_events);
        self.frames_lost = self.frames_lost.saturating_add(other.frames_lost);

        self.host_latency_min =
            merge_bound(self.host_latency_min, other.host_latency_min, u16::min);
        self.host_latency_max =
            merge_bound(self.host_latency_max, other.host_latency_max, u16::max);
        self.host_latency_sum = self.host_latency_sum.saturating_add(other.host_latency_sum);
        self.host_latency_sample_count = self
            .host_latency_sample_count
            .saturating_add(other.host_latency_sample_count);

        if self.window_start_ms.is_none() {
            self.window_start_ms = other.window_start_ms;
        }
        Ok(())
    }

    /// Independent point-in-time copy for a reader.
    pub fn snapshot(&self) -> Self {
        *self
    }

    /// Reset to the empty window.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Frame rates between the window start and `now_ms`.
    ///
    /// All zero when the window has not started or no time has passed.
    pub fn rate_at(&self, now_ms: u64) -> FrameRates {
        let Some(elapsed_ms) = self
            .window_start_ms
            .and_then(|start| now_ms.checked_sub(start))
            .filter(|ms| *ms > 0)
        else {
            return FrameRates::default();
        };

        let secs = Duration::from_millis(elapsed_ms).as_secs_f64();
        FrameRates {
            total_fps: f64::from(self.frames_total) / secs,
            received_fps: f64::from(self.frames_received) / secs,
            rendered_fps: f64::from(self.frames_rendered) / secs,
        }
    }

    /// Frame rates up to now on the telemetry clock.
    pub fn rate(&self) -> FrameRates {
        self.rate_at(clock::now_ms())
    }
}

fn merge_bound(
    current: Option<u16>,
    incoming: Option<u16>,
    pick: fn(u16, u16) -> u16,
) -> Option<u16> {
    match (current, incoming) {
        (Some(a), Some(b)) => Some(pick(a, b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample(start: u64, frames: u32, latency: Option<u16>) -> TelemetrySample {
        TelemetrySample {
            decode_time_ms: u64::from(frames) * 2,
            elapsed_ms: 250,
            frames_total: frames,
            frames_received: frames,
            frames_rendered: frames.saturating_sub(1),
            loss_events: 1,
            frames_lost: 2,
            host_latency_min: latency,
            host_latency_max: latency,
            host_latency_sum: latency.map_or(0, u64::from),
            host_latency_sample_count: u32::from(latency.is_some()),
            window_start_ms: start,
        }
    }

    #[test]
    fn summed_counters_commute() {
        let a = sample(100, 30, Some(40));
        let b = sample(100, 12, None);

        let mut ab = WindowStats::default();
        ab.add(&a).unwrap();
        ab.add(&b).unwrap();

        let mut ba = WindowStats::default();
        ba.add(&b).unwrap();
        ba.add(&a).unwrap();

        assert_eq!(ab, ba);
        assert_eq!(ab.frames_total, 42);
        assert_eq!(ab.loss_events, 2);
    }

    #[test]
    fn latency_bounds_track_min_and_max() {
        let mut window = WindowStats::default();
        for (i, latency) in [5, 2, 9].into_iter().enumerate() {
            let start = 1000 + u64::try_from(i).unwrap() * 250;
            window.add(&sample(start, 10, Some(latency))).unwrap();
        }
        assert_eq!(window.host_latency_min, Some(2));
        assert_eq!(window.host_latency_max, Some(9));
        assert_eq!(window.host_latency_sum, 16);
        assert_eq!(window.host_latency_sample_count, 3);
    }

    #[test]
    fn samples_without_latency_leave_bounds_unset() {
        let mut window = WindowStats::default();
        window.add(&sample(0, 10, None)).unwrap();
        assert_eq!(window.host_latency_min, None);
        window.add(&sample(10, 10, Some(7))).unwrap();
        assert_eq!(window.host_latency_min, Some(7));
    }

    #[test]
    fn window_start_is_adopted_once() {
        let mut window = WindowStats::default();
        window.add(&sample(500, 1, None)).unwrap();
        window.add(&sample(750, 1, None)).unwrap();
        assert_eq!(window.window_start_ms, Some(500));
    }

    #[test]
    fn regressed_sample_is_rejected_untouched() {
        let mut window = WindowStats::default();
        window.add(&sample(500, 1, None)).unwrap();
        let before = window.snapshot();

        let err = window.add(&sample(499, 1, None)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::WindowRegressed {
                window_start_ms: 500,
                sample_start_ms: 499
            }
        ));
        assert_eq!(window, before);
    }

    #[test]
    fn fresh_window_rates_are_zero() {
        let mut window = WindowStats::default();
        assert_eq!(window.rate_at(10_000), FrameRates::default());

        window.add(&sample(2000, 60, None)).unwrap();
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.rate(), FrameRates::default());
    }

    #[test]
    fn zero_elapsed_rates_are_zero() {
        let mut window = WindowStats::default();
        window.add(&sample(2000, 60, None)).unwrap();
        assert_eq!(window.rate_at(2000), FrameRates::default());
        assert_eq!(window.rate_at(1500), FrameRates::default());
    }

    #[test]
    fn rates_divide_by_elapsed_seconds() {
        let mut window = WindowStats::default();
        window.add(&sample(2000, 60, None)).unwrap();
        let rates = window.rate_at(3000);
        assert!((rates.total_fps - 60.0).abs() < f64::EPSILON);
        assert!((rates.rendered_fps - 59.0).abs() < f64::EPSILON);
    }

    #[test]
    fn snapshot_is_independent() {
        let mut window = WindowStats::default();
        window.add(&sample(0, 5, None)).unwrap();
        let copy = window.snapshot();
        window.clear();
        assert_eq!(copy.frames_total, 5);
    }
}
