//! Regulation mode: show it, or switch to CV / CC / CP.

use serde::Serialize;
use xysk_core::{Command, OperatingMode, StatusReport};

use crate::cli::{GlobalOpts, ModeArgs, ModeCommand};
use crate::error::CliError;
use crate::output;

use super::control;
use super::util::{self, Device};

#[derive(Debug, Serialize)]
struct ModeView {
    mode: Option<OperatingMode>,
    set_value: Option<f64>,
    voltage_set: Option<f64>,
    current_set: Option<f64>,
    power_set: Option<f64>,
    cp_mode_enabled: Option<bool>,
}

impl From<StatusReport> for ModeView {
    fn from(r: StatusReport) -> Self {
        Self {
            mode: r.mode(),
            set_value: r.set_value,
            voltage_set: r.voltage_set,
            current_set: r.current_set,
            power_set: r.power_set,
            cp_mode_enabled: r.cp_mode_enabled,
        }
    }
}

fn detail(view: &ModeView, color: bool) -> String {
    let mode = view
        .mode
        .map_or_else(|| "unknown".into(), |m| output::accent(&m.to_string(), color));
    let unit = view.mode.map_or("", OperatingMode::unit);
    vec![
        format!("Mode:      {mode}"),
        format!("Setpoint:  {}", output::reading(view.set_value, unit, 3, color)),
        format!("V set:     {}", output::reading(view.voltage_set, "V", 3, color)),
        format!("I set:     {}", output::reading(view.current_set, "A", 3, color)),
        format!("P set:     {}", output::reading(view.power_set, "W", 2, color)),
        format!(
            "CP mode:   {}",
            view.cp_mode_enabled
                .map_or_else(|| "-".into(), |b| output::on_off(b, color))
        ),
    ]
    .join("\n")
}

async fn show(global: &GlobalOpts) -> Result<(), CliError> {
    let device = Device::open(global).await?;
    let result = device.request(Command::GetOperatingMode).await;
    device.close().await;

    let event = result?;
    // The reply carries the same field names as a status report.
    let report: StatusReport = serde_json::from_value(event.message.payload.clone())
        .map_err(|e| CliError::Internal(format!("unreadable mode reply: {e}")))?;
    let view = ModeView::from(report);

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &view,
        |v| detail(v, color),
        |v| v.mode.map_or_else(|| "unknown".into(), |m| m.to_string()),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Send each command in order over one session, stopping at the first failure.
async fn switch(commands: Vec<Command>, done: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let commands = commands
        .into_iter()
        .map(util::validated)
        .collect::<Result<Vec<_>, _>>()?;

    let device = Device::open(global).await?;
    let mut last = None;
    let mut failure = None;
    for command in commands {
        let action = command.action();
        match device.request(command).await {
            Ok(event) => last = Some((action, event)),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    device.close().await;

    if let Some(err) = failure {
        return Err(err);
    }
    if let Some((action, event)) = last {
        control::report(action, &event, done, global);
    }
    Ok(())
}

pub async fn handle(args: ModeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ModeCommand::Show => show(global).await,
        ModeCommand::Cv { volts } => {
            let done = format!("Constant voltage at {volts:.3} V");
            switch(vec![Command::SetConstantVoltage { voltage: volts }], &done, global).await
        }
        ModeCommand::Cc { amps } => {
            let done = format!("Constant current at {amps:.3} A");
            switch(vec![Command::SetConstantCurrent { current: amps }], &done, global).await
        }
        ModeCommand::Cp { watts } => {
            let done = format!("Constant power at {watts:.2} W");
            switch(
                vec![
                    Command::SetConstantPower { power: watts },
                    Command::SetConstantPowerMode { enable: true },
                ],
                &done,
                global,
            )
            .await
        }
        ModeCommand::CpOff => {
            switch(
                vec![Command::SetConstantPowerMode { enable: false }],
                "Constant power mode off",
                global,
            )
            .await
        }
    }
}
