//! Output switch, setpoints, and key lock.

use serde::Serialize;
use xysk_core::{Command, InboundEvent};

use crate::cli::{
    GlobalOpts, KeylockArgs, KeylockCommand, OutputArgs, OutputCommand, OutputFormat, SetArgs,
    SetCommand,
};
use crate::error::CliError;
use crate::output;

use super::util::{self, Device};

/// What a one-shot control command reports back.
#[derive(Debug, Serialize)]
struct Ack<'a> {
    action: &'static str,
    via: &'static str,
    reply: &'a serde_json::Value,
}

/// Send one command, wait for its reply, and print the outcome.
async fn apply(command: Command, done: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let command = util::validated(command)?;
    let action = command.action();

    let device = Device::open(global).await?;
    let result = device.request(command).await;
    device.close().await;

    let event = result?;
    report(action, &event, done, global);
    Ok(())
}

pub(crate) fn report(action: &'static str, event: &InboundEvent, done: &str, global: &GlobalOpts) {
    match global.output {
        OutputFormat::Table | OutputFormat::Plain => {
            output::print_done(done, global.quiet);
        }
        _ => {
            let ack = Ack {
                action,
                via: super::status::via(event.source),
                reply: &event.message.payload,
            };
            let out = output::render_single(&global.output, &ack, |_| String::new(), |_| String::new());
            output::print_output(&out, global.quiet);
        }
    }
}

pub async fn handle_output(args: OutputArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let enable = matches!(args.command, OutputCommand::On);
    let done = if enable { "Output enabled" } else { "Output disabled" };
    apply(Command::PowerOutput { enable }, done, global).await
}

pub async fn handle_set(args: SetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        SetCommand::Voltage { volts } => {
            let done = format!("Voltage set to {volts:.3} V");
            apply(Command::SetVoltage { voltage: volts }, &done, global).await
        }
        SetCommand::Current { amps } => {
            let done = format!("Current limit set to {amps:.3} A");
            apply(Command::SetCurrent { current: amps }, &done, global).await
        }
    }
}

pub async fn handle_keylock(args: KeylockArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let lock = matches!(args.command, KeylockCommand::On);
    let done = if lock { "Front panel locked" } else { "Front panel unlocked" };
    apply(Command::SetKeyLock { lock }, done, global).await
}
