//! Config subcommand handlers.

use std::io::IsTerminal;

use dialoguer::{Confirm, Input};
use serde::Serialize;
use tabled::Tabled;
use xysk_config::{Config, Profile, StateFile};
use xysk_core::{AddressStore, DeviceAddress};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn interactive() -> bool {
    std::io::stdin().is_terminal()
}

/// Use the given value, or prompt for it when running interactively.
fn value_or_prompt(
    given: Option<String>,
    prompt: &str,
    default: &str,
    field: &str,
) -> Result<String, CliError> {
    if let Some(value) = given {
        return Ok(value);
    }
    if !interactive() {
        return Err(CliError::Validation {
            field: field.into(),
            reason: format!("no terminal to prompt on; pass --{field}"),
        });
    }
    Input::new()
        .with_prompt(prompt)
        .default(default.to_owned())
        .interact_text()
        .map_err(prompt_err)
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ProfileEntry {
    name: String,
    default: bool,
    #[serde(flatten)]
    profile: Profile,
}

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "")]
    marker: &'static str,
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Secure")]
    secure: String,
    #[tabled(rename = "Refresh")]
    refresh: String,
}

impl From<&ProfileEntry> for ProfileRow {
    fn from(e: &ProfileEntry) -> Self {
        Self {
            marker: if e.default { "*" } else { "" },
            name: e.name.clone(),
            device: e.profile.device.clone(),
            secure: if e.profile.secure.unwrap_or(false) { "yes" } else { "no" }.into(),
            refresh: e
                .profile
                .refresh_ms
                .map_or_else(|| "off".into(), |ms| format!("{ms} ms")),
        }
    }
}

fn profile_entries(cfg: &Config) -> Vec<ProfileEntry> {
    let default = cfg.default_profile.as_deref().unwrap_or("default");
    let mut entries: Vec<_> = cfg
        .profiles
        .iter()
        .map(|(name, profile)| ProfileEntry {
            name: name.clone(),
            default: name == default,
            profile: profile.clone(),
        })
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

// ── Handler ─────────────────────────────────────────────────────────

#[allow(clippy::too_many_lines)]
pub async fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init: add a profile, prompting for what flags don't give ─
        ConfigCommand::Init { name } => {
            let config_path = xysk_config::config_path();
            if interactive() && !global.quiet {
                eprintln!("xysk configuration");
                eprintln!("   Config path: {}\n", config_path.display());
            }

            let mut cfg = xysk_config::load_config_or_default();

            let profile_name = value_or_prompt(name, "Profile name", "default", "name")?;
            let last = StateFile::default_location()
                .load_last()
                .map_or_else(|| "192.168.4.1".to_owned(), |a| a.to_string());
            let device = value_or_prompt(global.device.clone(), "Bridge address", &last, "device")?;
            // Fail early on an unusable address instead of writing it.
            DeviceAddress::parse(&device).map_err(|e| CliError::Validation {
                field: "device".into(),
                reason: e.to_string(),
            })?;

            let secure = if global.secure || !interactive() {
                global.secure
            } else {
                Confirm::new()
                    .with_prompt("Use wss:// and https://?")
                    .default(false)
                    .interact()
                    .map_err(prompt_err)?
            };

            let profile = Profile {
                device,
                secure: secure.then_some(true),
                http_base: global.http_base.clone(),
                insecure: global.insecure.then_some(true),
                timeout: global.timeout,
                ..Profile::default()
            };

            if cfg.profiles.insert(profile_name.clone(), profile).is_some() && !global.quiet {
                eprintln!("  Replaced existing profile '{profile_name}'");
            }
            if cfg.profiles.len() == 1 {
                cfg.default_profile = Some(profile_name.clone());
            }

            let written = xysk_config::save_config(&cfg)?;

            output::print_done(
                &format!("Configuration written to {}", written.display()),
                global.quiet,
            );
            if !global.quiet {
                eprintln!("  Profile: {profile_name}");
                eprintln!("\n  Test it: xysk --profile {profile_name} status");
            }
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = xysk_config::load_config_or_default();
            let out = output::render_single(
                &global.output,
                &cfg,
                toml_view,
                |c| c.default_profile.clone().unwrap_or_default(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = xysk_config::load_config_or_default();
            let entries = profile_entries(&cfg);
            if entries.is_empty() {
                if !global.quiet {
                    eprintln!("No profiles configured. Run: xysk config init");
                }
                return Ok(());
            }
            let out = output::render_list(
                &global.output,
                &entries,
                |e| ProfileRow::from(e),
                |e| e.name.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Use <name> ─────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = xysk_config::load_config_or_default();

            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: config::available_profiles(&cfg),
                    name,
                });
            }

            cfg.default_profile = Some(name.clone());
            xysk_config::save_config(&cfg)?;
            output::print_done(&format!("Default profile set to '{name}'"), global.quiet);
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            let paths = Paths {
                config: xysk_config::config_path().display().to_string(),
                state: xysk_config::state_path().display().to_string(),
            };
            let out = output::render_single(
                &global.output,
                &paths,
                |p| format!("Config: {}\nState:  {}", p.config, p.state),
                |p| p.config.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

#[derive(Debug, Serialize)]
struct Paths {
    config: String,
    state: String,
}

fn toml_view(cfg: &Config) -> String {
    toml::to_string_pretty(cfg).unwrap_or_else(|e| format!("# unrenderable config: {e}"))
}
