//! Bridge WiFi command handlers.

use std::io::{BufRead, IsTerminal};

use secrecy::{ExposeSecret, SecretString};
use xysk_core::{Command, ConnectionStatus};

use crate::cli::{GlobalOpts, WifiArgs, WifiCommand};
use crate::error::CliError;
use crate::output;

use super::control;
use super::util::{self, Device};

// ── Password input ──────────────────────────────────────────────────

fn read_password(from_stdin: bool) -> Result<SecretString, CliError> {
    let raw = if from_stdin {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        line.trim_end_matches(['\r', '\n']).to_owned()
    } else {
        if !std::io::stdin().is_terminal() {
            return Err(CliError::Validation {
                field: "password".into(),
                reason: "no terminal to prompt on; use --password-stdin".into(),
            });
        }
        rpassword::prompt_password("WiFi password: ")?
    };
    Ok(SecretString::from(raw))
}

// ── Handler ─────────────────────────────────────────────────────────

async fn status(global: &GlobalOpts) -> Result<(), CliError> {
    let device = Device::open(global).await?;

    // The socket reply and the REST endpoint carry the same body.
    let result = if device.session().status() == ConnectionStatus::Connected {
        device
            .request(Command::GetWifiStatus)
            .await
            .map(|event| event.message.payload.clone())
    } else {
        match device.rest() {
            Ok(rest) => rest
                .wifi_status()
                .await
                .map_err(|e| CliError::from(xysk_core::CoreError::from(e))),
            Err(e) => Err(e),
        }
    };
    device.close().await;

    let body = result?;
    let out = output::render_single(
        &global.output,
        &body,
        |v| {
            v.as_object()
                .map(|map| {
                    map.iter()
                        .filter(|(k, _)| k.as_str() != "action")
                        .map(|(k, v)| format!("{k:<12} {v}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_else(|| v.to_string())
        },
        |v| {
            v.get("ssid")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_owned()
        },
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

async fn send(command: Command, done: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let action = command.action();
    let device = Device::open(global).await?;
    let result = device.request(command).await;
    device.close().await;
    let event = result?;
    control::report(action, &event, done, global);
    Ok(())
}

pub async fn handle(args: WifiArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        WifiCommand::Status => status(global).await,

        WifiCommand::Save {
            ssid,
            password_stdin,
        } => {
            let password = read_password(password_stdin)?;
            let command = util::validated(Command::SaveWifiCredentials {
                ssid: ssid.clone(),
                password: password.expose_secret().to_owned(),
            })?;
            send(command, &format!("Credentials for '{ssid}' saved"), global).await
        }

        WifiCommand::Load => {
            send(Command::LoadWifiCredentials, "Stored credentials reloaded", global).await
        }

        WifiCommand::Reset => {
            if !util::confirm(
                "Erase the bridge's WiFi credentials? It will restart in access-point mode",
                "wifi reset",
                global.yes,
            )? {
                return Ok(());
            }
            send(Command::ResetWifi, "WiFi credentials erased", global).await
        }
    }
}
