//! Account configuration passed as the first argument.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use carnet_api::gateway::{DEFAULT_BRAND, DEFAULT_COUNTRY};
use carnet_login::{Credentials, SecurityPin};

use crate::cli::LogLevel;

const DEFAULT_TEMPERATURE: f64 = 21.5;

/// The S-PIN may be written as a string or as a bare number.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum Spin {
    Number(u64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum Level {
    Number(i64),
    Text(String),
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub username: String,
    password: String,
    #[serde(default)]
    spin: Option<Spin>,
    /// VIN to operate on; the first registered car when empty.
    #[serde(default)]
    pub vin: Option<String>,
    /// Climatisation target in degrees Celsius.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Toggle window heating together with climatisation.
    #[serde(default)]
    pub combine_heating: bool,
    #[serde(default)]
    logging_level: Option<Level>,
    #[serde(default = "default_brand")]
    pub brand: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_brand() -> String {
    DEFAULT_BRAND.to_string()
}

fn default_country() -> String {
    DEFAULT_COUNTRY.to_string()
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("username", &self.username)
            .field("vin", &self.vin)
            .field("temperature", &self.temperature)
            .field("combine_heating", &self.combine_heating)
            .field("brand", &self.brand)
            .field("country", &self.country)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Parse the config argument: inline JSON, or a path to a JSON file.
    pub fn from_arg(arg: &str) -> Result<Self> {
        let trimmed = arg.trim();
        if trimmed.starts_with('{') {
            return serde_json::from_str(trimmed).context("invalid config JSON");
        }
        let path = Path::new(trimmed);
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid config JSON in {}", path.display()))
    }

    /// Credentials with the PIN validated.
    pub fn credentials(&self) -> Result<Credentials> {
        let credentials = Credentials::new(&self.username, &self.password);
        let pin = match &self.spin {
            None => None,
            Some(Spin::Text(text)) if text.trim().is_empty() => None,
            Some(Spin::Text(text)) => Some(SecurityPin::parse(text.trim())?),
            Some(Spin::Number(number)) => Some(SecurityPin::from_number(*number)?),
        };
        Ok(match pin {
            Some(pin) => credentials.with_pin(pin),
            None => credentials,
        })
    }

    /// Configured VIN, if non-empty.
    pub fn vin(&self) -> Option<&str> {
        self.vin.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn log_level(&self) -> Option<LogLevel> {
        match self.logging_level.as_ref()? {
            Level::Number(n) => Some(LogLevel::from_number(*n)),
            Level::Text(text) => match text.trim().parse::<i64>() {
                Ok(n) => Some(LogLevel::from_number(n)),
                Err(_) => LogLevel::from_str_loose(text),
            },
        }
    }
}
