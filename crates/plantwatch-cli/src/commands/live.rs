//! `plantwatch live`: follow the push feed until Ctrl+C.

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use plantwatch_core::{BootstrapReport, PlantConfig, SessionView, TelemetrySession};

use super::{SECTIONS, fmt_value};

pub const WAITING: &str = "Waiting for live plant data...";

/// Run the live command.
pub fn run(config: &PlantConfig, token: Option<String>, refresh: f64) {
    let refresh = Duration::from_secs_f64(refresh.clamp(0.1, 3600.0));

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Error setting Ctrl+C handler: {e}");
        std::process::exit(1);
    }

    if token.is_none() {
        eprintln!("Warning: no token found; device snapshots will be skipped");
    }

    println!("plantwatch live v{}", plantwatch_core::VERSION);
    println!("  Backend: {}", config.base_url);
    println!("  Feed:    {}", config.feed_url());
    println!("  Window:  {} records", config.window_capacity);
    println!("  Stop:    Ctrl+C");
    println!();

    let rt = super::runtime();
    rt.block_on(async {
        let session = TelemetrySession::connect(config, token);
        let mut views = session.subscribe();
        let mut ticker = tokio::time::interval(refresh);
        let mut reported_bootstrap = false;
        let mut last_printed: Option<(u64, String)> = None;

        while running.load(Ordering::SeqCst) {
            ticker.tick().await;
            let view = views.borrow_and_update().clone();

            if !reported_bootstrap {
                if let Some(report) = &view.bootstrap {
                    reported_bootstrap = true;
                    println!("{}", render_bootstrap(report));
                }
            }

            let key = (view.frames_ingested, format!("{}/{}", view.state, view.connection));
            if last_printed.as_ref() == Some(&key) {
                continue;
            }
            println!("{}", render_view(&view));
            last_printed = Some(key);
        }

        println!("Stopping session {}...", session.id());
        session.teardown().await;
    });
}

/// Summary of the bootstrap phase, one line per unavailable source.
pub fn render_bootstrap(report: &BootstrapReport) -> String {
    let mut out = format!("Bootstrap: {} records seeded\n", report.seeded_records);
    for failure in &report.failed_devices {
        let _ = writeln!(out, "  {} unavailable: {}", failure.device_id, failure.reason);
    }
    if let Some(err) = &report.history_error {
        let _ = writeln!(out, "  history seed unavailable: {err}");
    }
    out
}

/// Text rendering of one view: the waiting line until data exists, then the
/// latest record grouped by plant section.
pub fn render_view(view: &SessionView) -> String {
    let Some(latest) = &view.latest else {
        return WAITING.to_string();
    };

    let mut out = String::new();
    let devices: Vec<&str> = latest.device_ids.iter().map(String::as_str).collect();
    let _ = writeln!(
        out,
        "[{} / {}] frames: {}  reconnects: {}  window: {}",
        view.state,
        view.connection,
        view.frames_ingested,
        view.reconnects,
        view.window.len()
    );
    let _ = writeln!(out, "Device:      {}", devices.join(", "));
    let _ = writeln!(out, "Last update: {}", latest.ts.to_rfc3339());
    if let Some(node) = &latest.node_id {
        let _ = writeln!(out, "Last node:   {node}");
    }

    for section in SECTIONS {
        let _ = writeln!(out, "\n  {}", section.title);
        for m in section.metrics {
            let value = fmt_value(latest.metric(m.key), m.digits);
            let _ = writeln!(out, "    {:<14} {:>10} {}", m.label, value, m.unit);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use plantwatch_core::{ConnectionState, DeviceFailure, MetricRecord, SessionState};

    fn view(latest: Option<MetricRecord>) -> SessionView {
        SessionView {
            state: SessionState::Live,
            connection: ConnectionState::Open,
            latest,
            window: Arc::new(Vec::new()),
            bootstrap: None,
            frames_ingested: 3,
            reconnects: 0,
        }
    }

    #[test]
    fn test_waiting_until_first_record() {
        assert_eq!(render_view(&view(None)), WAITING);
    }

    #[test]
    fn test_render_groups_and_dashes() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let mut rec = MetricRecord::new(ts)
            .with_metric("temp_T1", 650.04)
            .with_metric("fan_speed", 0.0)
            .with_device("plant_1_reactor_temp_node_1");
        rec.node_id = Some("node-7".into());

        let text = render_view(&view(Some(rec)));
        assert!(text.contains("Reactor Temps"));
        assert!(text.contains("Buffer Tank"));
        assert!(text.contains("650.0"));
        assert!(text.contains("Last node:   node-7"));
        assert!(text.contains("plant_1_reactor_temp_node_1"));
        // Unreported metrics are dashes; a reported zero is not.
        assert!(text.contains("—"));
        let fan_line = text.lines().find(|l| l.contains("Fan speed")).unwrap();
        assert!(fan_line.contains("0.0"));
    }

    #[test]
    fn test_bootstrap_summary_lists_failures() {
        let report = BootstrapReport {
            seeded_records: 12,
            failed_devices: vec![DeviceFailure {
                device_id: "plant_1_buffer_node_1".into(),
                reason: "network error: timed out".into(),
            }],
            history_error: Some("server returned 503: busy".into()),
        };
        let text = render_bootstrap(&report);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Bootstrap: 12 records seeded");
        assert_eq!(
            lines[1],
            "  plant_1_buffer_node_1 unavailable: network error: timed out"
        );
        assert_eq!(lines[2], "  history seed unavailable: server returned 503: busy");
    }

    #[test]
    fn test_bootstrap_summary_clean() {
        let text = render_bootstrap(&BootstrapReport::default());
        assert_eq!(text, "Bootstrap: 0 records seeded\n");
    }
}
