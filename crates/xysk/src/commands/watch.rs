//! `xysk watch`: auto-refresh and stream status until Ctrl-C.

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use xysk_core::config::{MIN_REFRESH_INTERVAL, clamp_refresh};
use xysk_core::{InboundEvent, StatusReport};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util::Device;

/// One line per status report.
fn status_line(event: &InboundEvent, report: &StatusReport, color: bool) -> String {
    let time = event
        .received_at
        .with_timezone(&chrono::Local)
        .format("%H:%M:%S%.3f");
    let mode = report
        .mode()
        .map_or_else(|| "--".into(), |m| output::accent(&m.to_string(), color));
    let out = report
        .output_enabled
        .map_or_else(|| "-".into(), |b| output::on_off(b, color));
    format!(
        "{time}  {:>9}  {:>8}  {:>8}  {mode:>2}  {out}",
        output::reading(report.voltage, "V", 3, color),
        output::reading(report.current, "A", 3, color),
        output::reading(report.power, "W", 2, color),
    )
}

fn render(event: &InboundEvent, all: bool, format: &OutputFormat, color: bool) -> Option<String> {
    let report = event.message.status();
    if report.is_none() && !all {
        return None;
    }
    let line = match format {
        OutputFormat::Table => match report {
            Some(ref r) => status_line(event, r, color),
            None => format!(
                "{}  {}",
                event.received_at.with_timezone(&chrono::Local).format("%H:%M:%S%.3f"),
                output::render_json(&event.message.payload, true)
            ),
        },
        OutputFormat::Plain => match report {
            Some(ref r) => [r.voltage, r.current, r.power]
                .iter()
                .map(|v| v.map_or_else(|| "-".into(), |v| v.to_string()))
                .collect::<Vec<_>>()
                .join("\t"),
            None => output::render_json(&event.message.payload, true),
        },
        // Streams stay line-delimited whatever the format.
        OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
            output::render_json(event, true)
        }
    };
    Some(line)
}

pub async fn handle(args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let requested = Duration::from_millis(args.interval);
    if requested < MIN_REFRESH_INTERVAL {
        warn!(
            requested_ms = args.interval,
            "refresh interval raised to {} ms",
            MIN_REFRESH_INTERVAL.as_millis()
        );
    }

    let device = Device::open(global).await?;
    let session = device.session();
    let mut events = session.subscribe();
    let mut status = session.watch_status();
    session.set_refresh_interval(Some(clamp_refresh(requested))).await;

    let color = output::should_color(&global.color);
    let mut shown = 0usize;

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),

            changed = status.changed() => {
                if changed.is_err() {
                    break Err(CliError::Internal("session stopped".into()));
                }
                let now = *status.borrow_and_update();
                if !global.quiet {
                    eprintln!("· {} is {}", device.address(), output::accent(&now.to_string(), color));
                }
            }

            event = events.recv() => match event {
                Ok(event) => {
                    let is_status = event.message.status().is_some();
                    if let Some(line) = render(&event, args.all, &global.output, color) {
                        output::print_output(&line, global.quiet);
                    }
                    if is_status {
                        shown += 1;
                        if args.count.is_some_and(|n| shown >= n) {
                            break Ok(());
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "watch output lagged"),
                Err(RecvError::Closed) => break Err(CliError::Internal("session stopped".into())),
            },
        }
    };

    device.close().await;
    result
}
