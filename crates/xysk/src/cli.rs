//! Clap derive structures for the `xysk` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// xysk -- drive an XY-SK120 power supply over its WiFi bridge
#[derive(Debug, Parser)]
#[command(
    name = "xysk",
    version,
    about = "Control XY-SK120 power supplies from the command line",
    long_about = "A client for XY-SK120 bench supplies behind an ESP32 WiFi bridge.\n\n\
        Talks to the bridge over its WebSocket, reconnecting with backoff,\n\
        and falls back to the REST API when the socket is unavailable.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Device profile to use
    #[arg(long, short = 'p', env = "XYSK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Bridge address: hostname, ip[:port] or localhost (overrides profile)
    #[arg(long, short = 'd', env = "XYSK_DEVICE", global = true)]
    pub device: Option<String>,

    /// REST base URL for the HTTP fallback (overrides profile)
    #[arg(long, env = "XYSK_HTTP_BASE", global = true)]
    pub http_base: Option<String>,

    /// Use wss:// and https:// when talking to the bridge
    #[arg(long, env = "XYSK_SECURE", global = true)]
    pub secure: bool,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "XYSK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates (https and wss)
    #[arg(long, short = 'k', env = "XYSK_INSECURE", global = true)]
    pub insecure: bool,

    /// Connect and response timeout in seconds
    #[arg(long, env = "XYSK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show live readings, setpoints and output state
    #[command(alias = "st")]
    Status,

    /// Switch the output stage on or off
    #[command(alias = "out")]
    Output(OutputArgs),

    /// Change the voltage or current setpoint
    Set(SetArgs),

    /// Select the regulation mode (CV, CC, CP)
    Mode(ModeArgs),

    /// Lock or unlock the front-panel keys
    Keylock(KeylockArgs),

    /// Inspect and manage the bridge's WiFi credentials
    #[command(alias = "w")]
    Wifi(WifiArgs),

    /// Check that the bridge's HTTP server answers
    Ping,

    /// Stream status updates until interrupted
    Watch(WatchArgs),

    /// Connect and print session diagnostics
    #[command(alias = "diagnostics")]
    Diag,

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Output ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct OutputArgs {
    #[command(subcommand)]
    pub command: OutputCommand,
}

#[derive(Debug, Subcommand)]
pub enum OutputCommand {
    /// Enable the output
    On,
    /// Disable the output
    Off,
}

// ── Setpoints ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SetArgs {
    #[command(subcommand)]
    pub command: SetCommand,
}

#[derive(Debug, Subcommand)]
pub enum SetCommand {
    /// Output voltage in volts (0-30)
    #[command(alias = "v")]
    Voltage {
        /// Target voltage
        volts: f64,
    },

    /// Current limit in amps (0-5)
    #[command(alias = "i")]
    Current {
        /// Target current
        amps: f64,
    },
}

// ── Operating mode ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ModeArgs {
    #[command(subcommand)]
    pub command: ModeCommand,
}

#[derive(Debug, Subcommand)]
pub enum ModeCommand {
    /// Show the current regulation mode
    Show,

    /// Constant voltage at the given setpoint
    Cv {
        /// Voltage in volts (0-30)
        volts: f64,
    },

    /// Constant current at the given setpoint
    Cc {
        /// Current in amps (0-5)
        amps: f64,
    },

    /// Constant power at the given setpoint (enables CP mode)
    Cp {
        /// Power in watts (0-120)
        watts: f64,
    },

    /// Leave constant power mode
    CpOff,
}

// ── Key lock ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct KeylockArgs {
    #[command(subcommand)]
    pub command: KeylockCommand,
}

#[derive(Debug, Subcommand)]
pub enum KeylockCommand {
    /// Lock the front panel
    On,
    /// Unlock the front panel
    Off,
}

// ── WiFi ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WifiArgs {
    #[command(subcommand)]
    pub command: WifiCommand,
}

#[derive(Debug, Subcommand)]
pub enum WifiCommand {
    /// Show the bridge's WiFi connection status
    Status,

    /// Store new station credentials on the bridge
    Save {
        /// Network SSID
        ssid: String,

        /// Read the password from stdin instead of prompting
        #[arg(long)]
        password_stdin: bool,
    },

    /// Reload the stored credentials and reconnect
    Load,

    /// Erase stored credentials (the bridge falls back to AP mode)
    Reset,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Refresh interval in milliseconds (minimum 500)
    #[arg(long, short = 'i', default_value = "1000")]
    pub interval: u64,

    /// Stop after this many status updates
    #[arg(long, short = 'n')]
    pub count: Option<usize>,

    /// Print every inbound message, not just status reports
    #[arg(long, short = 'a')]
    pub all: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or extend the config file with a device profile
    Init {
        /// Profile name (prompted when omitted)
        #[arg(long)]
        name: Option<String>,
    },

    /// Display current resolved configuration
    Show,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name
        name: String,
    },

    /// Print the config and state file locations
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
