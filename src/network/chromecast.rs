use std::time::Duration;

use async_trait::async_trait;
use rust_cast::channels::media::{GenericMediaMetadata, Image, Media, Metadata, PlayerState, StreamType};
use rust_cast::channels::receiver::CastDeviceApp;
use rust_cast::CastDevice;
use tracing::{debug, info, warn};

use super::worker::IoWorker;
use super::{CastReceiver, MediaRequest};
use crate::{CastError, CastTarget, RemoteStatus, Result};

const RECEIVER_DESTINATION: &str = "receiver-0";
const IO_THREAD: &str = "chromecast-io";

/// The default media receiver app once launched.
struct MediaApp {
    transport_id: String,
    session_id: String,
    media_session_id: Option<i32>,
}

/// Device state, only ever touched on the I/O thread.
struct Connection {
    device: CastDevice<'static>,
    app: Option<MediaApp>,
}

fn not_connected() -> CastError {
    CastError::Network("Device not connected".into())
}

fn no_app() -> CastError {
    CastError::Remote("No media app running".into())
}

fn build_media(request: &MediaRequest) -> Media {
    let images = request
        .thumbnail_url
        .iter()
        .map(|url| Image::new(url.clone()))
        .collect();

    Media {
        content_id: request.url.clone(),
        stream_type: StreamType::Buffered,
        content_type: request.content_type.clone(),
        metadata: Some(Metadata::Generic(GenericMediaMetadata {
            title: Some(request.title.clone()),
            subtitle: None,
            images,
            release_date: None,
        })),
        duration: None,
    }
}

impl Connection {
    fn open(target: &CastTarget) -> Result<Self> {
        let connect_error = |e: rust_cast::errors::Error| CastError::Network(format!("Failed to connect to {}: {}", target, e));

        let device = CastDevice::connect_without_host_verification(target.address.to_string(), target.port)
            .map_err(connect_error)?;
        device.connection.connect(RECEIVER_DESTINATION).map_err(connect_error)?;
        device.heartbeat.ping()?;

        Ok(Self { device, app: None })
    }

    fn app(&self) -> Result<&MediaApp> {
        self.app.as_ref().ok_or_else(no_app)
    }

    /// Media session id, refreshed from status when the load reply had none.
    fn media_session_id(&mut self) -> Result<i32> {
        let app = self.app.as_mut().ok_or_else(no_app)?;
        if let Some(id) = app.media_session_id {
            return Ok(id);
        }

        let status = self.device.media.get_status(app.transport_id.as_str(), None)?;
        let id = status
            .entries
            .first()
            .map(|entry| entry.media_session_id)
            .ok_or_else(|| CastError::Remote("No media session".into()))?;
        app.media_session_id = Some(id);
        Ok(id)
    }

    fn play(&mut self, request: &MediaRequest) -> Result<()> {
        let app = self.device.receiver.launch_app(&CastDeviceApp::DefaultMediaReceiver)?;
        info!("Launched media receiver app {} ({})", app.display_name, app.session_id);

        self.device.connection.connect(app.transport_id.as_str())?;
        let status = self
            .device
            .media
            .load(app.transport_id.as_str(), app.session_id.as_str(), &build_media(request))?;

        self.app = Some(MediaApp {
            media_session_id: status.entries.first().map(|entry| entry.media_session_id),
            transport_id: app.transport_id,
            session_id: app.session_id,
        });

        if request.start_offset > 0.0 {
            debug!("Seeking to start offset {:.1}s", request.start_offset);
            self.seek(request.start_offset)?;
        }
        info!("Loaded {} on receiver", request.url);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        let id = self.media_session_id()?;
        self.device.media.pause(self.app()?.transport_id.as_str(), id)?;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        let id = self.media_session_id()?;
        self.device.media.play(self.app()?.transport_id.as_str(), id)?;
        Ok(())
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        let id = self.media_session_id()?;
        self.device
            .media
            .seek(self.app()?.transport_id.as_str(), id, Some(seconds.max(0.0) as f32), None)?;
        Ok(())
    }

    fn set_volume(&self, level: f64) -> Result<()> {
        self.device.receiver.set_volume(level.clamp(0.0, 1.0) as f32)?;
        Ok(())
    }

    fn status(&self) -> Result<RemoteStatus> {
        self.device.heartbeat.ping()?;

        let receiver_status = self.device.receiver.get_status()?;
        let mut status = RemoteStatus {
            volume_level: receiver_status.volume.level.map(f64::from),
            ..RemoteStatus::default()
        };

        let Some(app) = self.app.as_ref() else {
            return Ok(status);
        };

        let media_status = self.device.media.get_status(app.transport_id.as_str(), None)?;
        if let Some(entry) = media_status.entries.first() {
            status.is_playing = matches!(entry.player_state, PlayerState::Playing | PlayerState::Buffering);
            status.current_time = entry.current_time.map(f64::from).unwrap_or(0.0);
            status.duration = entry
                .media
                .as_ref()
                .and_then(|media| media.duration)
                .map(f64::from)
                .unwrap_or(0.0);
        }
        Ok(status)
    }

    fn stop(&mut self) -> Result<()> {
        let id = self.media_session_id().ok();
        let app = self.app()?;

        if let Some(id) = id {
            if let Err(e) = self.device.media.stop(app.transport_id.as_str(), id) {
                warn!("Media stop failed: {}", e);
            }
        }
        self.device.receiver.stop_app(app.session_id.as_str())?;

        info!("Stopped casting");
        Ok(())
    }

    fn close(self) {
        if let Err(e) = self.device.connection.disconnect(RECEIVER_DESTINATION) {
            debug!("Disconnect from receiver failed: {}", e);
        }
    }
}

/// Chromecast backend speaking CASTV2 through `rust_cast`.
///
/// `rust_cast` blocks on its socket, so every device call runs on a
/// per-connection I/O thread and is awaited with `io_timeout`.
pub struct ChromecastReceiver {
    io_timeout: Duration,
    worker: Option<IoWorker<Option<Connection>>>,
}

impl ChromecastReceiver {
    pub fn new(io_timeout: Duration) -> Self {
        Self {
            io_timeout,
            worker: None,
        }
    }

    async fn with_connection<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let worker = self.worker.as_ref().ok_or_else(not_connected)?;
        worker
            .call(self.io_timeout, move |slot: &mut Option<Connection>| match slot.as_mut() {
                Some(connection) => job(connection),
                None => Err(not_connected()),
            })
            .await
    }
}

#[async_trait(?Send)]
impl CastReceiver for ChromecastReceiver {
    async fn connect(&mut self, target: &CastTarget) -> Result<()> {
        info!("Connecting to Chromecast {}", target);
        self.disconnect().await;

        let worker = IoWorker::spawn(IO_THREAD, || None::<Connection>)?;
        let target = target.clone();
        let opened = worker
            .call(self.io_timeout, move |slot: &mut Option<Connection>| {
                *slot = Some(Connection::open(&target)?);
                Ok(())
            })
            .await;

        // A worker whose connect failed or hung is dropped, its thread exits
        // once the pending call returns.
        if opened.is_ok() {
            self.worker = Some(worker);
        }
        opened
    }

    async fn play_media(&mut self, request: &MediaRequest) -> Result<()> {
        let request = request.clone();
        self.with_connection(move |connection| connection.play(&request)).await
    }

    async fn pause(&mut self) -> Result<()> {
        self.with_connection(|connection| connection.pause()).await
    }

    async fn resume(&mut self) -> Result<()> {
        self.with_connection(|connection| connection.resume()).await
    }

    async fn seek(&mut self, seconds: f64) -> Result<()> {
        self.with_connection(move |connection| connection.seek(seconds)).await
    }

    async fn set_volume(&mut self, level: f64) -> Result<()> {
        self.with_connection(move |connection| connection.set_volume(level)).await
    }

    async fn status(&mut self) -> Result<RemoteStatus> {
        self.with_connection(|connection| connection.status()).await
    }

    async fn stop(&mut self) -> Result<()> {
        self.with_connection(|connection| connection.stop()).await
    }

    async fn disconnect(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.post(|slot: &mut Option<Connection>| {
                if let Some(connection) = slot.take() {
                    connection.close();
                }
            });
        }
    }
}
