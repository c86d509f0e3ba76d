//! CLI-side config resolution: profile lookup plus global flag overrides,
//! producing everything a command needs to reach its device.
//!
//! File formats and loading live in `xysk_config`; this module only decides
//! which values win.

use std::time::Duration;

use xysk_config::{Config, Profile};
use xysk_core::{DeviceAddress, SessionConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// A fully resolved device target.
#[derive(Debug)]
pub struct Target {
    pub profile_name: String,
    /// `None` when neither the profile nor the flags name a device.
    pub address: Option<DeviceAddress>,
    pub session: SessionConfig,
    pub timeout: Duration,
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Load the config file and resolve the active target.
pub fn resolve_target(global: &GlobalOpts) -> Result<Target, CliError> {
    let cfg = xysk_config::load_config_or_default();
    resolve_target_with(global, &cfg)
}

/// Resolve against an already-loaded config (flag > env > profile > defaults).
pub fn resolve_target_with(global: &GlobalOpts, cfg: &Config) -> Result<Target, CliError> {
    let profile_name = active_profile_name(global, cfg);

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        // An explicitly requested profile must exist.
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(cfg),
            });
        }
        None => Profile::default(),
    };
    apply_overrides(&mut profile, global);

    let session = xysk_config::profile_to_session_config(&profile, &cfg.defaults)?;
    let address = if profile.device.trim().is_empty() {
        None
    } else {
        Some(xysk_config::profile_address(&profile)?)
    };
    let timeout = Duration::from_secs(profile.timeout.unwrap_or(cfg.defaults.timeout).max(1));

    Ok(Target {
        profile_name,
        address,
        session,
        timeout,
    })
}

fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(ref device) = global.device {
        profile.device.clone_from(device);
    }
    if let Some(ref base) = global.http_base {
        profile.http_base = Some(base.clone());
    }
    if global.secure {
        profile.secure = Some(true);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
}

/// Comma-separated profile names, for help text.
pub fn available_profiles(cfg: &Config) -> String {
    let mut names: Vec<_> = cfg.profiles.keys().cloned().collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort();
    names.join(", ")
}
