//! Shared configuration for the xysk CLI.
//!
//! TOML profiles (one per power supply), figment loading with `XYSK_`
//! environment overrides, translation to `xysk_core::SessionConfig`, and the
//! small state file that remembers the last connected device.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use xysk_api::{HttpConfig, TlsMode};
use xysk_core::{
    AddressStore, CoreError, DeviceAddress, PageOrigin, ReconnectConfig, SessionConfig,
};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Request and response timeout, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Keep-alive ping interval in seconds; 0 disables it.
    #[serde(default = "default_keepalive")]
    pub keepalive: u64,

    /// Give up reconnecting after this many attempts (unbounded when unset).
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            keepalive: default_keepalive(),
            max_retries: None,
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    5
}
fn default_keepalive() -> u64 {
    30
}

/// A named power-supply profile.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Bridge host: hostname, `ip[:port]`, or `localhost`.
    pub device: String,

    /// Host the client treats as its own origin (for `localhost` resolution).
    pub origin: Option<String>,

    /// Use `wss`/`https` instead of `ws`/`http`.
    pub secure: Option<bool>,

    /// Explicit REST base URL (e.g. behind a reverse proxy).
    pub http_base: Option<String>,

    /// Accept invalid TLS certificates.
    pub insecure: Option<bool>,

    /// Override timeout, in seconds.
    pub timeout: Option<u64>,

    /// Auto-refresh interval in milliseconds.
    pub refresh_ms: Option<u64>,
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "xysk", "xysk")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Resolve the state file path (last connected device).
pub fn state_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("state.toml"),
        |dirs| dirs.data_local_dir().join("state.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("xysk");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file, layering `XYSK_` env vars on top.
///
/// Nested keys use a double underscore: `XYSK_DEFAULTS__TIMEOUT=10`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("XYSK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation to core types ───────────────────────────────────────

impl Config {
    /// Look up a profile by name.
    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound { name: name.into() })
    }
}

/// Parse the profile's device address.
pub fn profile_address(profile: &Profile) -> Result<DeviceAddress, ConfigError> {
    DeviceAddress::parse(&profile.device).map_err(|e| ConfigError::Validation {
        field: "device".into(),
        reason: e.to_string(),
    })
}

/// Build a `SessionConfig` from a profile and the global defaults.
pub fn profile_to_session_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<SessionConfig, ConfigError> {
    let http_base = profile
        .http_base
        .as_deref()
        .map(|raw| {
            url::Url::parse(raw).map_err(|e| ConfigError::Validation {
                field: "http_base".into(),
                reason: format!("invalid URL '{raw}': {e}"),
            })
        })
        .transpose()?;

    let origin = PageOrigin {
        host: profile
            .origin
            .clone()
            .unwrap_or_else(|| PageOrigin::default().host),
        secure: profile.secure.unwrap_or(false),
    };

    let tls = if profile.insecure.unwrap_or(false) {
        TlsMode::DangerAcceptInvalid
    } else {
        TlsMode::System
    };

    let timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));

    Ok(SessionConfig {
        origin,
        reconnect: ReconnectConfig {
            max_retries: defaults.max_retries,
            ..ReconnectConfig::default()
        },
        http: HttpConfig { tls, timeout },
        http_base,
        keepalive_interval: (defaults.keepalive > 0)
            .then(|| Duration::from_secs(defaults.keepalive)),
        refresh_interval: profile.refresh_ms.map(Duration::from_millis),
    })
}

// ── Persisted state ─────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, Serialize)]
struct State {
    last_device: Option<DeviceAddress>,
}

/// File-backed [`AddressStore`] (`state.toml` next to the user's data).
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The platform-default state file.
    pub fn default_location() -> Self {
        Self::new(state_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<State, ConfigError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(State::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, state: &State) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, toml::to_string_pretty(state)?)?;
        Ok(())
    }
}

impl AddressStore for StateFile {
    fn load_last(&self) -> Option<DeviceAddress> {
        match self.read() {
            Ok(state) => state.last_device,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable state file");
                None
            }
        }
    }

    fn save_last(&self, address: &DeviceAddress) -> Result<(), CoreError> {
        let state = State {
            last_device: Some(address.clone()),
        };
        self.write(&state).map_err(|e| CoreError::Config {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use super::*;

    const SAMPLE: &str = r#"
default_profile = "bench"

[defaults]
timeout = 8
keepalive = 0

[profiles.bench]
device = "192.168.1.50"
refresh_ms = 250

[profiles.proxy]
device = "localhost"
origin = "psu.lab.example"
secure = true
http_base = "https://psu.lab.example/"
insecure = true
"#;

    fn write_sample(dir: &Path) -> PathBuf {
        let path = dir.join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        path
    }

    #[test]
    fn loads_profiles_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&write_sample(dir.path())).unwrap();

        assert_eq!(config.default_profile.as_deref(), Some("bench"));
        assert_eq!(config.defaults.timeout, 8);
        assert_eq!(config.defaults.output, "table");
        assert_eq!(config.profile("bench").unwrap().device, "192.168.1.50");
        assert!(matches!(
            config.profile("missing"),
            Err(ConfigError::ProfileNotFound { .. })
        ));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert!(config.profiles.is_empty());
        assert_eq!(config.defaults.keepalive, 30);
    }

    #[test]
    fn profile_translates_to_session_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&write_sample(dir.path())).unwrap();

        let session = profile_to_session_config(config.profile("bench").unwrap(), &config.defaults)
            .unwrap();
        assert_eq!(session.http.timeout, Duration::from_secs(8));
        assert_eq!(session.keepalive_interval, None);
        assert_eq!(session.refresh_interval, Some(Duration::from_millis(250)));
        assert_eq!(session.origin, PageOrigin::default());
        assert_eq!(session.http.tls, TlsMode::System);

        let proxy = profile_to_session_config(config.profile("proxy").unwrap(), &config.defaults)
            .unwrap();
        assert!(proxy.origin.secure);
        assert_eq!(proxy.http.tls, TlsMode::DangerAcceptInvalid);
        assert_eq!(
            proxy.http_base.unwrap().as_str(),
            "https://psu.lab.example/"
        );

        let address = profile_address(config.profile("proxy").unwrap()).unwrap();
        assert_eq!(address.resolve(&proxy.origin).as_str(), "psu.lab.example");
    }

    #[test]
    fn bad_http_base_is_a_validation_error() {
        let profile = Profile {
            device: "10.0.0.2".into(),
            http_base: Some("not a url".into()),
            ..Profile::default()
        };
        let err = profile_to_session_config(&profile, &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "http_base"));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.profiles.insert(
            "default".into(),
            Profile {
                device: "psu.local".into(),
                ..Profile::default()
            },
        );
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.profiles["default"], config.profiles["default"]);
    }

    #[test]
    fn state_file_remembers_last_device() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateFile::new(dir.path().join("state").join("state.toml"));
        assert_eq!(store.load_last(), None);

        let address = DeviceAddress::parse("192.168.4.1").unwrap();
        store.save_last(&address).unwrap();
        assert_eq!(store.load_last(), Some(address));

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("last_device = \"192.168.4.1\""));
    }

    #[test]
    fn corrupt_state_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        std::fs::write(&path, "last_device = [").unwrap();
        assert_eq!(StateFile::new(path).load_last(), None);
    }
}
