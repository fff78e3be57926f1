//! Host settings store.
//!
//! The host exposes its settings as a flat string-keyed map. Only two keys
//! matter to casting: whether the local web server (the bridge) is enabled and
//! the port it listens on.

use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::{CastError, Result};

pub const WEB_BRIDGE_ENABLED: &str = "services.webserver";
pub const WEB_BRIDGE_PORT: &str = "services.webserverport";
pub const DEFAULT_BRIDGE_PORT: u16 = 8080;

pub trait SettingsStore {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false)
    }

    fn set_bool(&mut self, key: &str, value: bool) -> Result<()> {
        self.set(key, if value { "true" } else { "false" })
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    fn bridge_enabled(&self) -> bool {
        self.get_bool(WEB_BRIDGE_ENABLED)
    }

    fn bridge_port(&self) -> u16 {
        self.get_int(WEB_BRIDGE_PORT)
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(DEFAULT_BRIDGE_PORT)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    values: BTreeMap<String, String>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Settings persisted as a flat TOML table, written back on every `set`.
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileSettings {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            toml::from_str(&text)?
        } else {
            debug!("Settings file {} not found, starting empty", path.display());
            BTreeMap::new()
        };

        Ok(Self { path, values })
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string(&self.values)
            .map_err(|e| CastError::Config(format!("Failed to serialize settings: {}", e)))?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

impl SettingsStore for FileSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let previous = self.values.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist() {
            warn!("Failed to save setting {}: {}", key, e);
            match previous {
                Some(old) => self.values.insert(key.to_string(), old),
                None => self.values.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }
}
