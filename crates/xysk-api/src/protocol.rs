//! JSON action protocol spoken by the XY-SK120 WiFi bridge.
//!
//! Every request is a single text frame shaped `{ "action": "<name>", ...fields }`
//! and every reply is `{ "action": "<name>Response", "success"?: bool, ...fields }`.
//! [`Command`] is the closed request vocabulary; [`InboundMessage`] is the
//! loosely-typed reply envelope, with [`StatusReport`] as a typed view over
//! status payloads.
//!
//! The firmware reads the output flag as `enable`. Older web clients sent
//! `enabled`, so decoding accepts both spellings while encoding always emits
//! `enable`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

// ── Device limits ────────────────────────────────────────────────────

/// Highest voltage setpoint the XY-SK120 accepts, in volts.
pub const MAX_VOLTAGE: f64 = 30.0;

/// Highest current setpoint, in amps.
pub const MAX_CURRENT: f64 = 5.0;

/// Highest constant-power setpoint, in watts.
pub const MAX_POWER: f64 = 120.0;

// ── Command ──────────────────────────────────────────────────────────

/// A request the device understands.
///
/// Serialized with the variant name (camelCase) in the `action` field and
/// the variant's fields flattened beside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(tag = "action", rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Command {
    GetStatus,
    GetData,
    SetVoltage {
        voltage: f64,
    },
    SetCurrent {
        current: f64,
    },
    PowerOutput {
        #[serde(alias = "enabled")]
        enable: bool,
    },
    SetOutputState {
        #[serde(alias = "enabled")]
        enable: bool,
    },
    SetConstantVoltage {
        voltage: f64,
    },
    SetConstantCurrent {
        current: f64,
    },
    SetConstantPower {
        power: f64,
    },
    SetConstantPowerMode {
        #[serde(alias = "enabled")]
        enable: bool,
    },
    SetKeyLock {
        lock: bool,
    },
    GetOperatingMode,
    GetWifiStatus,
    ResetWifi,
    SaveWifiCredentials {
        ssid: String,
        password: String,
    },
    LoadWifiCredentials,
    Ping,
}

impl Command {
    /// The wire name of this command's action, e.g. `"powerOutput"`.
    pub fn action(&self) -> &'static str {
        self.into()
    }

    /// Check parameters against the device's accepted ranges.
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Self::SetVoltage { voltage } | Self::SetConstantVoltage { voltage } => {
                check_range("voltage", *voltage, MAX_VOLTAGE, "V")
            }
            Self::SetCurrent { current } | Self::SetConstantCurrent { current } => {
                check_range("current", *current, MAX_CURRENT, "A")
            }
            Self::SetConstantPower { power } => check_range("power", *power, MAX_POWER, "W"),
            Self::SaveWifiCredentials { ssid, .. } if ssid.trim().is_empty() => {
                Err(Error::Validation {
                    field: "ssid",
                    reason: "must not be empty".into(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Reply actions the firmware (or an older firmware) answers this command with.
    pub fn response_actions(&self) -> &'static [&'static str] {
        match self {
            Self::GetStatus | Self::GetData => &["statusResponse"],
            Self::SetVoltage { .. } => &["setVoltageResponse"],
            Self::SetCurrent { .. } => &["setCurrentResponse"],
            Self::PowerOutput { .. } => &["powerOutputResponse"],
            Self::SetOutputState { .. } => &["setOutputStateResponse", "powerOutputResponse"],
            Self::SetConstantVoltage { .. } => &["constantVoltageResponse"],
            Self::SetConstantCurrent { .. } => &["constantCurrentResponse"],
            Self::SetConstantPower { .. } => &["constantPowerResponse"],
            Self::SetConstantPowerMode { .. } => {
                &["constantPowerModeResponse", "setConstantPowerModeResponse"]
            }
            Self::SetKeyLock { .. } => &["keyLockResponse", "setKeyLockResponse"],
            Self::GetOperatingMode => &["operatingModeResponse"],
            Self::GetWifiStatus => &["wifiStatusResponse"],
            Self::ResetWifi => &["resetWifiResponse"],
            Self::SaveWifiCredentials { .. } => &["saveWifiCredentialsResponse"],
            Self::LoadWifiCredentials => &["loadWifiCredentialsResponse"],
            Self::Ping => &["pong", "pingResponse"],
        }
    }
}

fn check_range(field: &'static str, value: f64, max: f64, unit: &str) -> Result<(), Error> {
    if (0.0..=max).contains(&value) {
        Ok(())
    } else {
        Err(Error::Validation {
            field,
            reason: format!("{value} is outside 0-{max} {unit}"),
        })
    }
}

// ── Codec ────────────────────────────────────────────────────────────

/// Serialize a command into a wire frame.
pub fn encode(command: &Command) -> Result<String, Error> {
    Ok(serde_json::to_string(command)?)
}

/// Parse a request frame back into a [`Command`].
///
/// Used by device simulators and tests; the client itself never receives
/// requests.
pub fn decode_command(text: &str) -> Result<Command, Error> {
    serde_json::from_str(text).map_err(|e| Error::MalformedFrame {
        message: e.to_string(),
        frame: text.to_owned(),
    })
}

/// Parse an inbound frame. Anything that isn't a JSON object is malformed.
pub fn decode_frame(text: &str) -> Result<InboundMessage, Error> {
    let payload: Value = serde_json::from_str(text).map_err(|e| Error::MalformedFrame {
        message: e.to_string(),
        frame: text.to_owned(),
    })?;

    if !payload.is_object() {
        return Err(Error::MalformedFrame {
            message: "frame is not a JSON object".into(),
            frame: text.to_owned(),
        });
    }

    Ok(InboundMessage::from_value(payload))
}

// ── InboundMessage ───────────────────────────────────────────────────

/// A decoded reply frame.
///
/// `payload` keeps the whole object (including `action`) so nothing the
/// firmware sends is dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundMessage {
    pub action: Option<String>,
    pub payload: Value,
}

impl InboundMessage {
    pub fn from_value(payload: Value) -> Self {
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .map(String::from);
        Self { action, payload }
    }

    /// The `success` flag, when the reply carries one.
    pub fn success(&self) -> Option<bool> {
        self.payload.get("success").and_then(Value::as_bool)
    }

    /// Error text from `{"success": false, "error": "..."}` replies.
    pub fn error_message(&self) -> Option<&str> {
        self.payload.get("error").and_then(Value::as_str)
    }

    /// Whether this frame answers `command`.
    pub fn is_response_to(&self, command: &Command) -> bool {
        self.action
            .as_deref()
            .is_some_and(|a| command.response_actions().contains(&a))
    }

    /// Typed status view, for `statusResponse` frames and `/api/data` bodies.
    pub fn status(&self) -> Option<StatusReport> {
        match self.action.as_deref() {
            Some("statusResponse") | None => serde_json::from_value(self.payload.clone()).ok(),
            _ => None,
        }
    }
}

// ── StatusReport ─────────────────────────────────────────────────────

/// Live readings and output state reported by the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    #[serde(default)]
    pub voltage: Option<f64>,
    #[serde(default)]
    pub current: Option<f64>,
    #[serde(default)]
    pub power: Option<f64>,
    #[serde(default)]
    pub output_enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient_mode")]
    pub operating_mode: Option<OperatingMode>,
    #[serde(default, deserialize_with = "lenient_mode")]
    pub mode_code: Option<OperatingMode>,
    #[serde(default)]
    pub set_value: Option<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub voltage_set: Option<f64>,
    #[serde(default)]
    pub current_set: Option<f64>,
    #[serde(default)]
    pub power_set: Option<f64>,
    #[serde(default)]
    pub cp_mode_enabled: Option<bool>,
    #[serde(default)]
    pub key_lock_enabled: Option<bool>,
    #[serde(default)]
    pub connected: Option<bool>,
    #[serde(default)]
    pub model: Option<u16>,
    #[serde(default)]
    pub version: Option<u16>,
}

impl StatusReport {
    /// Operating mode from either `operatingMode` or `modeCode`.
    pub fn mode(&self) -> Option<OperatingMode> {
        self.operating_mode.or(self.mode_code)
    }
}

// The bridge reports "Unknown" while the supply is unreachable.
fn lenient_mode<'de, D>(deserializer: D) -> Result<Option<OperatingMode>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| OperatingMode::deserialize(value).ok()))
}

// ── OperatingMode ────────────────────────────────────────────────────

/// Regulation mode of the output stage.
///
/// The firmware reports it either by name (`"CV"`) or by numeric code
/// (`0` = CV, `1` = CC, `2` = CP).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(try_from = "RawMode")]
pub enum OperatingMode {
    #[serde(rename = "CV")]
    #[strum(serialize = "CV")]
    ConstantVoltage,
    #[serde(rename = "CC")]
    #[strum(serialize = "CC")]
    ConstantCurrent,
    #[serde(rename = "CP")]
    #[strum(serialize = "CP")]
    ConstantPower,
}

impl OperatingMode {
    /// Unit of the setpoint that governs this mode.
    pub fn unit(self) -> &'static str {
        match self {
            Self::ConstantVoltage => "V",
            Self::ConstantCurrent => "A",
            Self::ConstantPower => "W",
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMode {
    Code(u8),
    Name(String),
}

impl TryFrom<RawMode> for OperatingMode {
    type Error = String;

    fn try_from(raw: RawMode) -> Result<Self, Self::Error> {
        match raw {
            RawMode::Code(0) => Ok(Self::ConstantVoltage),
            RawMode::Code(1) => Ok(Self::ConstantCurrent),
            RawMode::Code(2) => Ok(Self::ConstantPower),
            RawMode::Code(other) => Err(format!("unknown operating mode code {other}")),
            RawMode::Name(name) => match name.to_ascii_uppercase().as_str() {
                "CV" => Ok(Self::ConstantVoltage),
                "CC" => Ok(Self::ConstantCurrent),
                "CP" => Ok(Self::ConstantPower),
                _ => Err(format!("unknown operating mode '{name}'")),
            },
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
