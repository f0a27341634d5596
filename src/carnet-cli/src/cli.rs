//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::command::{Command, CommandValue};

/// Query or change the state of a connected vehicle.
#[derive(Debug, Parser)]
#[command(name = "carnet", version, about)]
pub struct Cli {
    /// Account configuration as a JSON object, or a path to a JSON file
    #[arg(value_name = "CONFIG_JSON")]
    pub config: String,

    /// What to query or change: "" (everything), locked, charging,
    /// climatisation or window-heating
    #[arg(value_name = "COMMAND", value_parser = clap::value_parser!(Command))]
    pub command: Command,

    /// 1 to enable, 0 to disable, status to only read
    #[arg(value_name = "VALUE", value_parser = clap::value_parser!(CommandValue))]
    pub value: CommandValue,

    /// Directory holding session files, the state cache and the log
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Log verbosity (overrides CARNET_LOG_LEVEL and the config's loggingLevel)
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log verbosity level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// Only show errors
    Error,
    /// Show warnings and errors
    Warn,
    /// Show informational messages, warnings, and errors (default)
    #[default]
    Info,
    /// Show debug messages and above
    Debug,
    /// Show all messages including trace-level details
    Trace,
}

impl LogLevel {
    /// Convert to tracing filter string.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Parse from string (case-insensitive).
    pub fn from_str_loose(s: &str) -> Option<LogLevel> {
        match s.trim().to_lowercase().as_str() {
            "error" | "critical" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" | "notset" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    /// Numeric levels as written by older configs (10 debug .. 50 critical).
    pub fn from_number(level: i64) -> LogLevel {
        match level {
            i64::MIN..=0 => LogLevel::Trace,
            1..=10 => LogLevel::Debug,
            11..=20 => LogLevel::Info,
            21..=30 => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }
}
