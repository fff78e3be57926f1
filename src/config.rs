use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::{CastError, Result};

const CONFIG_FILE: &str = "config.toml";
const SETTINGS_FILE: &str = "settings.toml";
pub const MAX_CONNECT_RETRIES: u32 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cast: CastConfig,
    pub discovery: DiscoveryConfig,
    pub control: ControlConfig,
    pub resolver: ResolverConfig,
    pub skin: SkinConfig,
    pub service: ServiceConfig,
    /// Location of the host settings store. Defaults next to the config file.
    pub settings_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CastConfig {
    pub connect_retries: u32,
    pub retry_delay_ms: u64,
    /// Upper bound on any single receiver call, connect included.
    pub io_timeout_ms: u64,
}

impl Default for CastConfig {
    fn default() -> Self {
        Self {
            connect_retries: 3,
            retry_delay_ms: 500,
            io_timeout_ms: 10_000,
        }
    }
}

impl CastConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub timeout_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { timeout_secs: 3 }
    }
}

impl DiscoveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub poll_interval_ms: u64,
    pub status_timeout_ms: u64,
    pub volume_step: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            status_timeout_ms: 3000,
            volume_step: 5.0,
        }
    }
}

impl ControlConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub probe_timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 5000,
        }
    }
}

impl ResolverConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SkinConfig {
    /// Per-user skin folder the host actually loads.
    pub user_dir: PathBuf,
    /// System-wide install the user copy is cloned from.
    pub template_dir: PathBuf,
    /// Document that receives the launch button.
    pub document: String,
}

impl Default for SkinConfig {
    fn default() -> Self {
        let home = directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().to_path_buf())
            .unwrap_or_else(std::env::temp_dir);

        Self {
            user_dir: home.join(".kodi/addons/skin.confluence/720p"),
            template_dir: PathBuf::from("/usr/share/kodi/addons/skin.confluence/720p"),
            document: "VideoOSD.xml".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub idle_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self { idle_secs: 1 }
    }
}

impl Config {
    fn project_dir() -> PathBuf {
        directories::ProjectDirs::from("org", "kastodi", "kastodi")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| std::env::temp_dir().join("kastodi"))
    }

    pub fn default_path() -> PathBuf {
        Self::project_dir().join(CONFIG_FILE)
    }

    /// Load from `path`, or the default location. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);

        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&text)?;
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(|| Self::project_dir().join(SETTINGS_FILE))
    }

    fn validate(&self) -> Result<()> {
        if self.cast.connect_retries == 0 {
            return Err(CastError::Config("cast.connect_retries must be at least 1".into()));
        }
        if self.cast.connect_retries > MAX_CONNECT_RETRIES {
            return Err(CastError::Config(format!(
                "cast.connect_retries must be at most {}",
                MAX_CONNECT_RETRIES
            )));
        }
        if self.cast.io_timeout_ms == 0 {
            return Err(CastError::Config("cast.io_timeout_ms must be positive".into()));
        }
        if self.control.poll_interval_ms == 0 {
            return Err(CastError::Config("control.poll_interval_ms must be positive".into()));
        }
        if self.skin.document.is_empty() {
            return Err(CastError::Config("skin.document must not be empty".into()));
        }
        Ok(())
    }
}
