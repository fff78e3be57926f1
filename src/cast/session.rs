use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::resolver::UrlResolver;
use crate::config::CastConfig;
use crate::host::{HostContext, Progress};
use crate::network::{CastReceiver, InterfaceSource, MediaRequest, SystemInterfaces};
use crate::{CastError, CastTarget, MediaMetadata, PlaybackLocator, RemoteStatus, Result};

const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// One cast handoff, alive from a successful `start` until `stop`.
#[derive(Debug, Clone, Serialize)]
pub struct CastSession {
    pub id: Uuid,
    pub target: CastTarget,
    pub media_url: String,
    pub content_type: String,
    pub start_offset: f64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
enum SessionSlot {
    Idle,
    Starting,
    Active(CastSession),
}

/// Owns the receiver and the process-wide single session slot.
pub struct CastController<R, I = SystemInterfaces> {
    receiver: R,
    resolver: UrlResolver<I>,
    config: CastConfig,
    slot: SessionSlot,
}

impl<R: CastReceiver, I: InterfaceSource> CastController<R, I> {
    pub fn new(receiver: R, resolver: UrlResolver<I>, config: CastConfig) -> Self {
        Self {
            receiver,
            resolver,
            config,
            slot: SessionSlot::Idle,
        }
    }

    pub fn active_session(&self) -> Option<&CastSession> {
        match &self.slot {
            SessionSlot::Active(session) => Some(session),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.slot, SessionSlot::Idle)
    }

    pub fn receiver(&self) -> &R {
        &self.receiver
    }

    /// Hand the currently playing item over to `target`.
    ///
    /// Fails with `SessionAlreadyActive` while another session exists or is
    /// being started. On any failure the slot is back to idle and no
    /// connection is left open.
    pub async fn start(
        &mut self,
        ctx: &mut HostContext,
        target: &CastTarget,
        locator: &PlaybackLocator,
        metadata: &MediaMetadata,
        start_offset: f64,
    ) -> Result<CastSession> {
        if !self.is_idle() {
            warn!("Cast start rejected, a session is already {:?}", self.slot);
            return Err(CastError::SessionAlreadyActive);
        }
        self.slot = SessionSlot::Starting;

        let mut progress = ctx.prompter.progress("Connecting to Chromecast");
        let connected = self.connect_with_retry(target, progress.as_mut()).await;
        progress.close();

        if let Err(e) = connected {
            self.slot = SessionSlot::Idle;
            return Err(e);
        }

        match self.begin_playback(ctx, target, locator, metadata, start_offset).await {
            Ok(session) => {
                info!("Cast session {} started on {}", session.id, session.target);
                self.slot = SessionSlot::Active(session.clone());
                Ok(session)
            }
            Err(e) => {
                error!("Failed to start playback on {}: {}", target, e);
                self.receiver.disconnect().await;
                self.slot = SessionSlot::Idle;
                Err(e)
            }
        }
    }

    async fn connect_with_retry(&mut self, target: &CastTarget, progress: &mut dyn Progress) -> Result<()> {
        let attempts = self.config.connect_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if progress.is_cancelled() {
                return self.abandon_connect(target).await;
            }

            let percent = (u64::from(attempt - 1) * 100 / u64::from(attempts)) as u8;
            progress.update(percent, &format!("Connecting to {} (attempt {}/{})", target.name, attempt, attempts));

            let outcome = tokio::select! {
                result = self.receiver.connect(target) => Some(result),
                _ = cancelled(&*progress) => None,
            };
            let Some(result) = outcome else {
                return self.abandon_connect(target).await;
            };

            match result {
                Ok(()) if progress.is_cancelled() => return self.abandon_connect(target).await,
                Ok(()) => {
                    debug!("Connected to {} on attempt {}", target, attempt);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Connect attempt {}/{} to {} failed: {}", attempt, attempts, target, e);
                    last_error = e.to_string();
                    if attempt < attempts {
                        sleep(self.config.retry_delay()).await;
                    }
                }
            }
        }

        Err(CastError::ConnectFailed {
            target: target.to_string(),
            attempts,
            reason: last_error,
        })
    }

    async fn abandon_connect(&mut self, target: &CastTarget) -> Result<()> {
        info!("Connection to {} cancelled", target);
        self.receiver.disconnect().await;
        Err(CastError::Cancelled)
    }

    async fn begin_playback(
        &mut self,
        ctx: &mut HostContext,
        target: &CastTarget,
        locator: &PlaybackLocator,
        metadata: &MediaMetadata,
        start_offset: f64,
    ) -> Result<CastSession> {
        let url = self
            .resolver
            .resolve(locator, true, ctx.settings.as_mut(), ctx.prompter.as_ref())?;

        let content_type = match self.resolver.content_type(locator, &url).await {
            Ok(mime) => mime,
            Err(e) => {
                warn!("{}, casting without a content type", e);
                String::new()
            }
        };

        // Thumbnails are cosmetic, never ask the user about them
        let thumbnail_url = metadata.thumbnail.as_ref().and_then(|thumb| {
            self.resolver
                .resolve(thumb, false, ctx.settings.as_mut(), ctx.prompter.as_ref())
                .map_err(|e| debug!("Skipping thumbnail {}: {}", thumb, e))
                .ok()
        });

        let paused_here = !ctx.player.is_paused();
        if paused_here {
            debug!("Pausing local playback");
            ctx.player.pause();
        }

        let request = MediaRequest {
            url: url.clone(),
            content_type: content_type.clone(),
            start_offset: start_offset.max(0.0),
            title: metadata.title.clone(),
            thumbnail_url,
        };
        if let Err(e) = self.receiver.play_media(&request).await {
            if paused_here {
                debug!("Resuming local playback after failed handoff");
                ctx.player.resume();
            }
            return Err(e);
        }

        Ok(CastSession {
            id: Uuid::new_v4(),
            target: target.clone(),
            media_url: url,
            content_type,
            start_offset: request.start_offset,
            started_at: Utc::now(),
        })
    }

    /// Stop remote playback and disconnect. Never fails: an unresponsive
    /// receiver only gets logged.
    pub async fn stop(&mut self) -> Option<CastSession> {
        let SessionSlot::Active(session) = std::mem::replace(&mut self.slot, SessionSlot::Idle) else {
            debug!("Stop requested with no active session");
            return None;
        };

        if let Err(e) = self.receiver.stop().await {
            warn!("Receiver did not stop cleanly: {}", e);
        }
        self.receiver.disconnect().await;

        info!("Cast session {} ended", session.id);
        Some(session)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.active_session().is_some() {
            Ok(())
        } else {
            Err(CastError::NoActiveSession)
        }
    }

    pub async fn pause(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.receiver.pause().await
    }

    pub async fn resume(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.receiver.resume().await
    }

    pub async fn seek(&mut self, seconds: f64) -> Result<()> {
        self.ensure_active()?;
        self.receiver.seek(seconds.max(0.0)).await
    }

    /// `percent` is clamped to 0..=100.
    pub async fn set_volume(&mut self, percent: f64) -> Result<()> {
        self.ensure_active()?;
        let percent = if percent.is_nan() { 0.0 } else { percent.clamp(0.0, 100.0) };
        self.receiver.set_volume(percent / 100.0).await
    }

    pub async fn status(&mut self) -> Result<RemoteStatus> {
        self.ensure_active()?;
        self.receiver.status().await
    }
}

/// Resolves once the user cancels `progress`.
async fn cancelled(progress: &dyn Progress) {
    while !progress.is_cancelled() {
        sleep(CANCEL_CHECK_INTERVAL).await;
    }
}
