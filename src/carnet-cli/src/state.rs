//! Vehicle-state cache (`carStates.json`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Last known state of one vehicle. Unknown values stay `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarState {
    #[serde(default)]
    pub climatisation: Option<bool>,
    #[serde(default)]
    pub window_heating: Option<bool>,
    #[serde(default)]
    pub locked: Option<bool>,
    #[serde(default)]
    pub battery_level: Option<i64>,
    #[serde(default)]
    pub charging: Option<bool>,
}

/// VIN to state map, persisted wholesale.
#[derive(Debug, Default)]
pub struct CarStates {
    path: PathBuf,
    states: BTreeMap<String, CarState>,
}

impl CarStates {
    /// Read the cache; a missing or unreadable file yields an empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let states = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => match serde_json::from_str(&text) {
                Ok(states) => states,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring corrupt vehicle state cache");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No vehicle state cache yet");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read vehicle state cache");
                BTreeMap::new()
            }
        };
        Self { path, states }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, vin: &str) -> Option<&CarState> {
        self.states.get(vin)
    }

    /// State for `vin`, created empty on first use.
    pub fn entry(&mut self, vin: &str) -> &mut CarState {
        self.states.entry(vin.to_string()).or_default()
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.states)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("cannot write {}", self.path.display()))?;
        debug!(path = %self.path.display(), vehicles = self.states.len(), "Saved vehicle state cache");
        Ok(())
    }
}
