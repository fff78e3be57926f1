pub mod cast;
pub mod config;
pub mod console;
pub mod control;
pub mod error;
pub mod host;
pub mod network;
pub mod service;
pub mod settings;
pub mod skin;

pub use error::{CastError, Result};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

const HTTP_PREFIXES: &[&str] = &["http://", "https://"];
const RTMP_PREFIXES: &[&str] = &["rtmp://", "rtmpe://", "rtmps://", "rtmpt://", "rtmpte://"];

/// Where the host is currently reading media from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackLocator(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorKind {
    Http,
    Rtmp,
    LocalFile,
}

impl PlaybackLocator {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> LocatorKind {
        let lower = self.0.to_ascii_lowercase();
        if HTTP_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            LocatorKind::Http
        } else if RTMP_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            LocatorKind::Rtmp
        } else {
            LocatorKind::LocalFile
        }
    }
}

impl fmt::Display for PlaybackLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A receiver picked from a discovery snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastTarget {
    pub name: String,
    pub address: IpAddr,
    pub port: u16,
}

impl fmt::Display for CastTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.address, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: String,
    pub thumbnail: Option<PlaybackLocator>,
}

/// Snapshot of what the receiver reports. May lag behind the last command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RemoteStatus {
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
    /// Receiver volume in 0.0..=1.0, when reported.
    pub volume_level: Option<f64>,
}

impl Default for RemoteStatus {
    fn default() -> Self {
        Self {
            is_playing: false,
            current_time: 0.0,
            duration: 0.0,
            volume_level: None,
        }
    }
}
