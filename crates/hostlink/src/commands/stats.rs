//! Telemetry replay handler.

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use hostlink_core::{
    PipelineInfo, SessionSummary, TelemetryConfig, TelemetrySample, TelemetryTracker,
};

use crate::cli::{OutputFormat, StatsArgs, StatsCommand};
use crate::commands::{Context, read_json_array};
use crate::error::CliError;
use crate::output::{self, or_dash};

#[derive(Debug, Serialize)]
struct StatsReport {
    samples: usize,
    /// Indexes of samples whose window start went backwards.
    rejected: Vec<usize>,
    summary: SessionSummary,
}

/// Fold samples in order, rolling windows on each sample's end time.
fn replay(
    config: TelemetryConfig,
    pipeline: PipelineInfo,
    samples: &[TelemetrySample],
) -> Result<StatsReport, CliError> {
    let mut tracker = TelemetryTracker::new(config);
    tracker.set_pipeline(pipeline);
    let mut rejected = Vec::new();
    let mut now_ms = 0;

    for (index, sample) in samples.iter().enumerate() {
        now_ms = now_ms.max(sample.end_ms());
        if let Err(e) = tracker.record_at(sample, now_ms) {
            debug!(index, error = %e, "sample rejected");
            rejected.push(index);
        }
    }

    Ok(StatsReport {
        samples: samples.len(),
        rejected,
        summary: tracker.summary_at(now_ms)?,
    })
}

fn fmt_ms(value: Option<f64>) -> String {
    or_dash(value.map(|v| format!("{v:.1} ms")))
}

fn detail(report: &StatsReport) -> String {
    let s = &report.summary;
    output::render_detail(&[
        ("Samples", report.samples.to_string()),
        ("Decoder", or_dash(s.pipeline.decoder.as_deref())),
        (
            "Network latency",
            or_dash(s.pipeline.avg_net_latency_ms.map(|ms| {
                let variance = or_dash(s.pipeline.avg_net_latency_variance_ms);
                format!("{ms} ms (variance {variance} ms)")
            })),
        ),
        ("Rejected", report.rejected.len().to_string()),
        ("Frames", s.global.frames_total.to_string()),
        (
            "FPS (total/recv/rend)",
            format!(
                "{:.1} / {:.1} / {:.1}",
                s.avg_fps.total_fps, s.avg_fps.received_fps, s.avg_fps.rendered_fps
            ),
        ),
        ("Decode time", fmt_ms(s.decode_time_ms)),
        (
            "Network drops",
            or_dash(s.net_drops_percent.map(|p| format!("{p:.2}%"))),
        ),
        ("Host latency min", fmt_ms(s.host_latency_min_ms)),
        ("Host latency max", fmt_ms(s.host_latency_max_ms)),
        ("Host latency avg", fmt_ms(s.host_latency_avg_ms)),
    ])
}

pub fn handle(args: StatsArgs, ctx: &Context) -> Result<(), CliError> {
    match args.command {
        StatsCommand::Replay {
            file,
            window_ms,
            decoder,
            net_latency_ms,
            net_latency_variance_ms,
        } => {
            let samples: Vec<TelemetrySample> = read_json_array(&file, "telemetry samples")?;

            let mut config = ctx.config.telemetry_config()?;
            if let Some(ms) = window_ms {
                config.window = Duration::from_millis(ms);
                config.validate()?;
            }

            let pipeline = PipelineInfo {
                decoder,
                avg_net_latency_ms: net_latency_ms,
                avg_net_latency_variance_ms: net_latency_variance_ms,
                ..PipelineInfo::default()
            };
            let report = replay(config, pipeline, &samples)?;
            if matches!(ctx.format, OutputFormat::Table | OutputFormat::Plain) {
                for index in &report.rejected {
                    output::warn_line(
                        &format!("sample #{index}: window start went backwards, rejected"),
                        ctx.color,
                    );
                }
            }

            let out = output::render_single(ctx.format, &report, detail, |r| {
                format!("{:.1}", r.summary.avg_fps.total_fps)
            })?;
            output::print_output(&out, ctx.quiet);
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample(start: u64, frames: u32) -> TelemetrySample {
        TelemetrySample {
            elapsed_ms: 500,
            frames_total: frames,
            frames_received: frames,
            frames_rendered: frames,
            window_start_ms: start,
            ..TelemetrySample::default()
        }
    }

    fn replay_default(samples: &[TelemetrySample]) -> StatsReport {
        replay(TelemetryConfig::default(), PipelineInfo::default(), samples).unwrap()
    }

    #[test]
    fn replay_rolls_on_sample_time() {
        let samples = [sample(0, 30), sample(500, 30), sample(1000, 30)];
        let report = replay_default(&samples);

        assert_eq!(report.samples, 3);
        assert!(report.rejected.is_empty());
        assert_eq!(report.summary.global.frames_total, 90);
    }

    #[test]
    fn regressed_samples_are_counted_not_fatal() {
        let samples = [sample(0, 30), sample(500, 30), sample(1000, 30), sample(200, 5)];
        let report = replay_default(&samples);
        assert_eq!(report.rejected, vec![3]);
    }
}
