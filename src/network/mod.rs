pub mod chromecast;
pub mod discovery;
pub mod interfaces;
pub mod worker;

use async_trait::async_trait;

use crate::{CastTarget, RemoteStatus, Result};

pub use chromecast::ChromecastReceiver;
pub use discovery::{MdnsDiscovery, TargetDiscovery};
pub use interfaces::{first_private_ipv4, InterfaceSource, SystemInterfaces};
pub use worker::IoWorker;

/// Everything the receiver needs to start playback.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRequest {
    pub url: String,
    /// May be empty when the type could not be determined.
    pub content_type: String,
    pub start_offset: f64,
    pub title: String,
    pub thumbnail_url: Option<String>,
}

/// Remote cast-receiver capability.
///
/// Calls complete (or fail) before returning. Implementations must not block
/// the runtime thread: callers bound every call with `tokio::time::timeout`
/// and cancel connects by dropping the future.
#[async_trait(?Send)]
pub trait CastReceiver {
    async fn connect(&mut self, target: &CastTarget) -> Result<()>;

    async fn play_media(&mut self, request: &MediaRequest) -> Result<()>;

    async fn pause(&mut self) -> Result<()>;

    async fn resume(&mut self) -> Result<()>;

    async fn seek(&mut self, seconds: f64) -> Result<()>;

    /// `level` in 0.0..=1.0.
    async fn set_volume(&mut self, level: f64) -> Result<()>;

    async fn status(&mut self) -> Result<RemoteStatus>;

    async fn stop(&mut self) -> Result<()>;

    async fn disconnect(&mut self);
}
