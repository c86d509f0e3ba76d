//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;
use xysk_api::{FallbackClient, HttpConfig, PageOrigin};
use xysk_config::StateFile;
use xysk_core::{AddressStore, Command, ConnectionStatus, DeviceAddress, InboundEvent, Session};

use crate::cli::GlobalOpts;
use crate::config::{self, Target};
use crate::error::CliError;

// ── Device handle ───────────────────────────────────────────────────

/// A live session to the resolved device plus the per-request timeout.
pub struct Device {
    session: Session,
    address: DeviceAddress,
    origin: PageOrigin,
    http: HttpConfig,
    http_base: Option<Url>,
    timeout: Duration,
}

impl Device {
    /// Resolve the target, connect, and wait (bounded) for the first
    /// attempt to resolve.
    ///
    /// A socket that does not open is not an error: commands with a REST
    /// route still go through the HTTP fallback.
    pub async fn open(global: &GlobalOpts) -> Result<Self, CliError> {
        let target = config::resolve_target(global)?;
        let origin = target.session.origin.clone();
        let http = target.session.http.clone();
        let http_base = target.session.http_base.clone();
        let timeout = target.timeout;

        let session = Session::new(target.session, Arc::new(StateFile::default_location()));
        let address = match target.address {
            Some(address) => {
                session.connect(address.clone()).await?;
                address
            }
            None => match session.restore().await? {
                Some(address) => address,
                None => {
                    session.shutdown().await;
                    return Err(no_device());
                }
            },
        };

        match session.wait_settled(timeout).await {
            Ok(ConnectionStatus::Connected) => debug!(%address, "socket open"),
            Ok(status) => warn!(%address, %status, "socket not open; using the HTTP fallback where possible"),
            Err(e) => warn!(%address, error = %e, "socket not open; using the HTTP fallback where possible"),
        }

        Ok(Self {
            session,
            address,
            origin,
            http,
            http_base,
            timeout,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `command` and wait for the device's answer.
    pub async fn request(&self, command: Command) -> Result<Arc<InboundEvent>, CliError> {
        Ok(self.session.request(command, self.timeout).await?)
    }

    /// A REST client for endpoints the session does not cover.
    pub fn rest(&self) -> Result<FallbackClient, CliError> {
        rest_client(&self.address, &self.origin, &self.http, self.http_base.as_ref())
    }

    /// Shut the session down, closing the socket.
    pub async fn close(self) {
        self.session.shutdown().await;
    }
}

// ── Stateless helpers ───────────────────────────────────────────────

/// A REST client for `target` without opening a socket.
///
/// Falls back to the last connected device when no device is configured.
pub fn rest_for_target(target: &Target) -> Result<(DeviceAddress, FallbackClient), CliError> {
    let address = target
        .address
        .clone()
        .or_else(|| StateFile::default_location().load_last())
        .ok_or_else(no_device)?;
    let client = rest_client(
        &address,
        &target.session.origin,
        &target.session.http,
        target.session.http_base.as_ref(),
    )?;
    Ok((address, client))
}

fn rest_client(
    address: &DeviceAddress,
    origin: &PageOrigin,
    http: &HttpConfig,
    http_base: Option<&Url>,
) -> Result<FallbackClient, CliError> {
    let base = match http_base {
        Some(base) => base.clone(),
        None => address
            .http_base(origin)
            .map_err(|e| CliError::from(xysk_core::CoreError::from(e)))?,
    };
    FallbackClient::new(base, http).map_err(|e| CliError::from(xysk_core::CoreError::from(e)))
}

/// Check a command's parameters before touching the network.
pub fn validated(command: Command) -> Result<Command, CliError> {
    match command.validate() {
        Ok(()) => Ok(command),
        Err(xysk_api::Error::Validation { field, reason }) => Err(CliError::Validation {
            field: field.into(),
            reason,
        }),
        Err(other) => Err(xysk_core::CoreError::from(other).into()),
    }
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}

fn no_device() -> CliError {
    CliError::NoDevice {
        path: xysk_config::config_path().display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validated_passes_good_setpoints_through() {
        let cmd = validated(Command::SetVoltage { voltage: 12.0 }).unwrap();
        assert_eq!(cmd, Command::SetVoltage { voltage: 12.0 });
    }

    #[test]
    fn validated_names_the_offending_field() {
        let err = validated(Command::SetCurrent { current: 7.5 }).unwrap_err();
        match err {
            CliError::Validation { field, .. } => assert_eq!(field, "current"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
