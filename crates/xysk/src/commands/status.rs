//! `xysk status`: one status round trip, rendered.

use serde::Serialize;
use xysk_core::{Command, EventSource, StatusReport};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::util::Device;

/// Status plus where it came from.
#[derive(Debug, Serialize)]
pub struct StatusView {
    pub device: String,
    pub via: &'static str,
    #[serde(flatten)]
    pub report: StatusReport,
}

pub(crate) fn via(source: EventSource) -> &'static str {
    match source {
        EventSource::Socket => "websocket",
        EventSource::Http => "http",
    }
}

pub(crate) fn detail(view: &StatusView, color: bool) -> String {
    let r = &view.report;
    let mode = r
        .mode()
        .map_or_else(|| "-".into(), |m| output::accent(&m.to_string(), color));
    let set_value = match (r.set_value, r.mode()) {
        (Some(v), Some(m)) => output::reading(Some(v), m.unit(), 3, color),
        _ => "-".into(),
    };
    let flag = |v: Option<bool>| v.map_or_else(|| "-".into(), |b| output::on_off(b, color));

    vec![
        format!("Device:       {} (via {})", view.device, view.via),
        format!("Output:       {}", flag(r.output_enabled)),
        format!("Voltage:      {}", output::reading(r.voltage, "V", 3, color)),
        format!("Current:      {}", output::reading(r.current, "A", 3, color)),
        format!("Power:        {}", output::reading(r.power, "W", 2, color)),
        format!("Mode:         {mode}"),
        format!("Setpoint:     {set_value}"),
        format!("V set:        {}", output::reading(r.voltage_set, "V", 3, color)),
        format!("I set:        {}", output::reading(r.current_set, "A", 3, color)),
        format!("CP mode:      {}", flag(r.cp_mode_enabled)),
        format!("Key lock:     {}", flag(r.key_lock_enabled)),
        format!("Temperature:  {}", output::reading(r.temperature, "°C", 1, color)),
        format!(
            "Model:        {}",
            r.model.map_or_else(|| "-".into(), |m| m.to_string())
        ),
        format!(
            "Firmware:     {}",
            r.version.map_or_else(|| "-".into(), |v| v.to_string())
        ),
    ]
    .join("\n")
}

pub(crate) fn plain(view: &StatusView) -> String {
    let r = &view.report;
    [r.voltage, r.current, r.power]
        .iter()
        .map(|v| v.map_or_else(|| "-".into(), |v| v.to_string()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let device = Device::open(global).await?;
    let result = device.request(Command::GetStatus).await;
    let address = device.address().to_string();
    device.close().await;

    let event = result?;
    let report = event
        .message
        .status()
        .ok_or_else(|| CliError::Internal("device sent an unreadable status report".into()))?;
    let view = StatusView {
        device: address,
        via: via(event.source),
        report,
    };

    let color = output::should_color(&global.color);
    let out = output::render_single(&global.output, &view, |v| detail(v, color), plain);
    output::print_output(&out, global.quiet);
    Ok(())
}
