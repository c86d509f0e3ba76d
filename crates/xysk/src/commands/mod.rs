//! Command dispatch: bridges CLI args -> session requests -> output formatting.

pub mod config_cmd;
pub mod control;
pub mod diag;
pub mod mode;
pub mod status;
pub mod util;
pub mod watch;
pub mod wifi;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a device-bound command to the appropriate handler.
///
/// Handlers open their own session so that argument validation can fail
/// before any connection attempt.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Status => status::handle(global).await,
        Command::Output(args) => control::handle_output(args, global).await,
        Command::Set(args) => control::handle_set(args, global).await,
        Command::Keylock(args) => control::handle_keylock(args, global).await,
        Command::Mode(args) => mode::handle(args, global).await,
        Command::Wifi(args) => wifi::handle(args, global).await,
        Command::Ping => diag::handle_ping(global).await,
        Command::Watch(args) => watch::handle(args, global).await,
        Command::Diag => diag::handle(global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "config and completions are not device commands".into(),
        )),
    }
}
