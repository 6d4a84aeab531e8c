//! Host replay handlers.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;
use tracing::{debug, warn};

use hostlink_core::{
    ConnectionAddress, CoreError, HostField, HostId, HostRecord, HostRegistry, IdentityChange,
    IdentityResolution, Ingested, ObserveOutcome, RawObservation,
};

use crate::cli::{HostsArgs, HostsCommand, OutputFormat};
use crate::commands::{Context, read_json_array};
use crate::error::CliError;
use crate::output::{self, or_dash};

// ── Replay ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct DroppedEntry {
    index: usize,
    field: HostField,
    reason: String,
}

#[derive(Debug, Serialize)]
struct IdentityChangeEntry {
    index: usize,
    resolution: &'static str,
    #[serde(flatten)]
    change: Arc<IdentityChange>,
}

/// Everything a replay produced.
#[derive(Debug, Default, Serialize)]
struct ReplayReport {
    hosts: Vec<Arc<HostRecord>>,
    identity_changes: Vec<IdentityChangeEntry>,
    dropped: Vec<DroppedEntry>,
    /// Indexes of observations that carried neither an id nor an address.
    skipped: Vec<usize>,
}

fn resolution_label(resolution: &IdentityResolution) -> &'static str {
    match resolution {
        IdentityResolution::Duplicated(_) => "duplicated",
        IdentityResolution::Superseded(_) => "superseded",
        IdentityResolution::Ignored => "ignored",
    }
}

/// Feed every observation, in order, through `registry`.
fn replay(registry: &HostRegistry, observations: Vec<RawObservation>) -> ReplayReport {
    let mut report = ReplayReport::default();

    for (index, raw) in observations.into_iter().enumerate() {
        match registry.ingest(raw) {
            Ok(Ingested { outcome, dropped }) => {
                report
                    .dropped
                    .extend(dropped.into_iter().map(|d| DroppedEntry {
                        index,
                        field: d.field,
                        reason: d.reason,
                    }));
                if let ObserveOutcome::IdentityChanged { change, resolution } = outcome {
                    report.identity_changes.push(IdentityChangeEntry {
                        index,
                        resolution: resolution_label(&resolution),
                        change,
                    });
                }
            }
            Err(e) => {
                warn!(index, error = %e, "skipping observation");
                report.skipped.push(index);
            }
        }
    }

    report.hosts = registry.snapshot().iter().cloned().collect();
    debug!(
        hosts = report.hosts.len(),
        identity_changes = report.identity_changes.len(),
        "replay finished"
    );
    report
}

fn load_and_replay(
    path: &Path,
    ctx: &Context,
) -> Result<(HostRegistry, ReplayReport), CliError> {
    let observations: Vec<RawObservation> = read_json_array(path, "discovery observations")?;
    let registry = HostRegistry::new(ctx.config.registry_config()?);
    let report = replay(&registry, observations);
    Ok((registry, report))
}

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct HostRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Paired")]
    paired: String,
    #[tabled(rename = "Local")]
    local: String,
    #[tabled(rename = "Remote")]
    remote: String,
    #[tabled(rename = "Manual")]
    manual: String,
    #[tabled(rename = "IPv6")]
    ipv6: String,
    #[tabled(rename = "MAC")]
    mac: String,
}

impl From<&Arc<HostRecord>> for HostRow {
    fn from(h: &Arc<HostRecord>) -> Self {
        Self {
            id: or_dash(h.id.as_ref()),
            name: or_dash(h.name.as_deref()),
            state: h.state.to_string(),
            paired: if h.is_paired() { "yes" } else { "no" }.into(),
            local: or_dash(h.local_address.as_ref()),
            remote: or_dash(h.remote_address.as_ref()),
            manual: or_dash(h.manual_address.as_ref()),
            ipv6: or_dash(h.ipv6_address.as_ref()),
            mac: or_dash(h.hardware_address.as_ref()),
        }
    }
}

#[derive(Debug, Serialize)]
struct RouteEntry {
    host: String,
    id: Option<HostId>,
    #[serde(flatten)]
    route: ConnectionAddress,
}

#[derive(Tabled)]
struct RouteRow {
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Source")]
    source: String,
}

impl From<&RouteEntry> for RouteRow {
    fn from(e: &RouteEntry) -> Self {
        let (address, source) = match &e.route {
            ConnectionAddress::Resolved { address, source } => {
                (address.to_string(), source.to_string())
            }
            ConnectionAddress::Unreachable { port } => {
                (format!("unreachable (port {port})"), "-".into())
            }
        };
        Self {
            host: e.host.clone(),
            address,
            source,
        }
    }
}

fn host_key(h: &HostRecord) -> String {
    h.id.as_ref()
        .map_or_else(|| h.display_name(), ToString::to_string)
}

// ── Warnings ────────────────────────────────────────────────────────

fn print_warnings(report: &ReplayReport, color: bool) {
    for entry in &report.identity_changes {
        output::warn_line(
            &format!(
                "observation #{}: {} changed identity {} -> {} ({})",
                entry.index,
                entry.change.old.display_name(),
                or_dash(entry.change.old.id.as_ref()),
                or_dash(entry.change.new.id.as_ref()),
                entry.resolution,
            ),
            color,
        );
    }
    for entry in &report.dropped {
        output::warn_line(
            &format!(
                "observation #{}: dropped {}: {}",
                entry.index, entry.field, entry.reason
            ),
            color,
        );
    }
    for index in &report.skipped {
        output::warn_line(
            &format!("observation #{index}: no id and no usable address, skipped"),
            color,
        );
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: HostsArgs, ctx: &Context) -> Result<(), CliError> {
    match args.command {
        HostsCommand::Replay { file } => {
            let (_, report) = load_and_replay(&file, ctx)?;
            if matches!(ctx.format, OutputFormat::Table | OutputFormat::Plain) {
                print_warnings(&report, ctx.color);
            }

            let out = output::render_single(
                ctx.format,
                &report,
                |r| {
                    let rows: Vec<HostRow> = r.hosts.iter().map(HostRow::from).collect();
                    output::render_table(&rows)
                },
                |r| {
                    r.hosts
                        .iter()
                        .map(|h| host_key(h.as_ref()))
                        .collect::<Vec<_>>()
                        .join("\n")
                },
            )?;
            output::print_output(&out, ctx.quiet);
            Ok(())
        }

        HostsCommand::Route { file, host } => {
            let (registry, _) = load_and_replay(&file, ctx)?;

            let entries: Vec<RouteEntry> = match host {
                Some(identifier) => {
                    let id = HostId::from(identifier.as_str());
                    let not_found = || CoreError::HostNotFound {
                        identifier: identifier.clone(),
                    };
                    let record = registry.get(&id).ok_or_else(not_found)?;
                    let route = registry.connection_address(&id).ok_or_else(not_found)?;
                    vec![RouteEntry {
                        host: record.display_name(),
                        id: record.id.clone(),
                        route,
                    }]
                }
                None => registry
                    .snapshot()
                    .iter()
                    .map(|record| RouteEntry {
                        host: record.display_name(),
                        id: record.id.clone(),
                        route: record.connection_address(),
                    })
                    .collect(),
            };

            let out = output::render_list(ctx.format, &entries, |e| RouteRow::from(e), |e| {
                e.route
                    .address()
                    .map_or_else(|| "-".into(), ToString::to_string)
            })?;
            output::print_output(&out, ctx.quiet);
            Ok(())
        }
    }
}
