//! Keeps the control surface in step with what the receiver reports.
//!
//! User commands are applied optimistically. For one poll interval after a
//! command the receiver's play state is not trusted, so a lagging status
//! report cannot undo what the user just pressed.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::session::CastController;
use crate::config::ControlConfig;
use crate::network::{CastReceiver, InterfaceSource};
use crate::{RemoteStatus, Result};

/// Commands the reconciler sends back to the receiver.
#[async_trait(?Send)]
pub trait RemoteTransport {
    async fn status(&mut self) -> Result<RemoteStatus>;

    async fn pause(&mut self) -> Result<()>;

    async fn resume(&mut self) -> Result<()>;

    async fn seek(&mut self, seconds: f64) -> Result<()>;

    async fn set_volume(&mut self, percent: f64) -> Result<()>;

    /// Best effort, never fails.
    async fn stop(&mut self);
}

#[async_trait(?Send)]
impl<R: CastReceiver, I: InterfaceSource> RemoteTransport for CastController<R, I> {
    async fn status(&mut self) -> Result<RemoteStatus> {
        CastController::status(self).await
    }

    async fn pause(&mut self) -> Result<()> {
        CastController::pause(self).await
    }

    async fn resume(&mut self) -> Result<()> {
        CastController::resume(self).await
    }

    async fn seek(&mut self, seconds: f64) -> Result<()> {
        CastController::seek(self, seconds).await
    }

    async fn set_volume(&mut self, percent: f64) -> Result<()> {
        CastController::set_volume(self, percent).await
    }

    async fn stop(&mut self) {
        CastController::stop(self).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlUiState {
    pub playing: bool,
    pub seek_percentage: f64,
    pub volume_percentage: f64,
    pub seek_visible: bool,
}

/// Input from the control surface. `Tick` is the poll cadence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlEvent {
    Tick,
    TogglePlayPause,
    Pause,
    Resume,
    SeekTo(f64),
    VolumeChanged(f64),
    /// Relative volume change in percentage points.
    VolumeBy(f64),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

pub fn clamp_percentage(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Playback position as a percentage, or `None` when the duration is unknown.
pub fn progress_percentage(current_time: f64, duration: f64) -> Option<f64> {
    if duration.is_finite() && duration > 0.0 {
        Some(clamp_percentage(current_time / duration * 100.0))
    } else {
        None
    }
}

#[derive(Debug)]
pub struct PlaybackStateReconciler {
    state: PlayState,
    ui: ControlUiState,
    grace: Duration,
    status_timeout: Duration,
    /// When the last play/pause command was issued by the user.
    play_command_at: Option<Instant>,
    seek_command_at: Option<Instant>,
    /// Seeded once from the first status report, then only the user moves it.
    volume: Option<f64>,
    duration: Option<f64>,
}

impl PlaybackStateReconciler {
    pub fn new(config: &ControlConfig, show_seek: bool, initial_percentage: f64) -> Self {
        Self {
            state: PlayState::Playing,
            ui: ControlUiState {
                playing: true,
                seek_percentage: clamp_percentage(initial_percentage),
                volume_percentage: 100.0,
                seek_visible: show_seek,
            },
            grace: config.poll_interval(),
            status_timeout: config.status_timeout(),
            play_command_at: None,
            seek_command_at: None,
            volume: None,
            duration: None,
        }
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn ui(&self) -> &ControlUiState {
        &self.ui
    }

    fn within_grace(&self, issued: Option<Instant>) -> bool {
        issued.is_some_and(|at| at.elapsed() < self.grace)
    }

    fn set_state(&mut self, state: PlayState) {
        self.state = state;
        self.ui.playing = state == PlayState::Playing;
    }

    pub async fn handle<T: RemoteTransport + ?Sized>(&mut self, transport: &mut T, event: ControlEvent) -> Flow {
        match event {
            ControlEvent::Tick => self.tick(transport).await,
            ControlEvent::TogglePlayPause => match self.state {
                PlayState::Playing => self.user_pause(transport).await,
                PlayState::Paused => self.user_resume(transport).await,
            },
            ControlEvent::Pause => self.user_pause(transport).await,
            ControlEvent::Resume => self.user_resume(transport).await,
            ControlEvent::SeekTo(percent) => self.user_seek(transport, percent).await,
            ControlEvent::VolumeChanged(percent) => self.user_volume(transport, percent).await,
            ControlEvent::VolumeBy(delta) => {
                let target = self.ui.volume_percentage + delta;
                self.user_volume(transport, target).await
            }
            ControlEvent::Close => return Flow::Close,
        }
        Flow::Continue
    }

    async fn tick<T: RemoteTransport + ?Sized>(&mut self, transport: &mut T) {
        let status = match timeout(self.status_timeout, transport.status()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                warn!("Status poll failed: {}", e);
                return;
            }
            Err(_) => {
                warn!("Status poll timed out after {:?}", self.status_timeout);
                return;
            }
        };

        if self.volume.is_none() {
            if let Some(level) = status.volume_level {
                let percent = clamp_percentage(level * 100.0);
                self.volume = Some(percent);
                self.ui.volume_percentage = percent;
            }
        }

        self.apply_progress(&status);
        self.reconcile_play_state(transport, &status).await;
    }

    fn apply_progress(&mut self, status: &RemoteStatus) {
        let percentage = progress_percentage(status.current_time, status.duration);
        self.duration = percentage.map(|_| status.duration);
        self.ui.seek_visible = percentage.is_some();

        if self.within_grace(self.seek_command_at) {
            return;
        }
        self.seek_command_at = None;
        self.ui.seek_percentage = percentage.unwrap_or(0.0);
    }

    async fn reconcile_play_state<T: RemoteTransport + ?Sized>(&mut self, transport: &mut T, status: &RemoteStatus) {
        if self.within_grace(self.play_command_at) {
            debug!("Ignoring remote play state during command grace window");
            return;
        }
        self.play_command_at = None;

        match (self.state, status.is_playing) {
            (PlayState::Playing, false) => {
                info!("Receiver reports paused, following");
                if let Err(e) = transport.pause().await {
                    warn!("Pause command failed: {}", e);
                }
                self.set_state(PlayState::Paused);
            }
            (PlayState::Paused, true) => {
                info!("Receiver reports playing, following");
                if let Err(e) = transport.resume().await {
                    warn!("Resume command failed: {}", e);
                }
                self.set_state(PlayState::Playing);
            }
            _ => {}
        }
    }

    async fn user_pause<T: RemoteTransport + ?Sized>(&mut self, transport: &mut T) {
        if self.state == PlayState::Paused {
            return;
        }
        self.set_state(PlayState::Paused);
        self.play_command_at = Some(Instant::now());
        if let Err(e) = transport.pause().await {
            warn!("Pause command failed: {}", e);
        }
    }

    async fn user_resume<T: RemoteTransport + ?Sized>(&mut self, transport: &mut T) {
        if self.state == PlayState::Playing {
            return;
        }
        self.set_state(PlayState::Playing);
        self.play_command_at = Some(Instant::now());
        if let Err(e) = transport.resume().await {
            warn!("Resume command failed: {}", e);
        }
    }

    async fn user_seek<T: RemoteTransport + ?Sized>(&mut self, transport: &mut T, percent: f64) {
        let Some(duration) = self.duration else {
            debug!("Seek ignored, duration unknown");
            return;
        };
        let percent = clamp_percentage(percent);
        self.ui.seek_percentage = percent;
        self.seek_command_at = Some(Instant::now());
        if let Err(e) = transport.seek(duration * percent / 100.0).await {
            warn!("Seek command failed: {}", e);
        }
    }

    async fn user_volume<T: RemoteTransport + ?Sized>(&mut self, transport: &mut T, percent: f64) {
        let percent = clamp_percentage(percent);
        self.volume = Some(percent);
        self.ui.volume_percentage = percent;
        if let Err(e) = transport.set_volume(percent).await {
            warn!("Volume command failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::IoWorker;
    use crate::CastError;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedTransport {
        statuses: VecDeque<Result<RemoteStatus>>,
        pauses: u32,
        resumes: u32,
        seeks: Vec<f64>,
        volumes: Vec<f64>,
        stops: u32,
        status_calls: u32,
    }

    impl ScriptedTransport {
        fn push(&mut self, is_playing: bool, current_time: f64, duration: f64) {
            self.statuses.push_back(Ok(RemoteStatus {
                is_playing,
                current_time,
                duration,
                volume_level: Some(0.3),
            }));
        }
    }

    #[async_trait(?Send)]
    impl RemoteTransport for ScriptedTransport {
        async fn status(&mut self) -> Result<RemoteStatus> {
            self.status_calls += 1;
            self.statuses
                .pop_front()
                .unwrap_or_else(|| Err(CastError::Remote("no status scripted".into())))
        }

        async fn pause(&mut self) -> Result<()> {
            self.pauses += 1;
            Ok(())
        }

        async fn resume(&mut self) -> Result<()> {
            self.resumes += 1;
            Ok(())
        }

        async fn seek(&mut self, seconds: f64) -> Result<()> {
            self.seeks.push(seconds);
            Ok(())
        }

        async fn set_volume(&mut self, percent: f64) -> Result<()> {
            self.volumes.push(percent);
            Ok(())
        }

        async fn stop(&mut self) {
            self.stops += 1;
        }
    }

    fn config(grace_ms: u64) -> ControlConfig {
        ControlConfig {
            poll_interval_ms: grace_ms,
            ..ControlConfig::default()
        }
    }

    /// Answers status from a device thread that takes far longer than the poll budget.
    struct SlowDevice {
        worker: IoWorker<()>,
        pauses: u32,
    }

    #[async_trait(?Send)]
    impl RemoteTransport for SlowDevice {
        async fn status(&mut self) -> Result<RemoteStatus> {
            self.worker
                .call(Duration::from_secs(5), |_| {
                    std::thread::sleep(Duration::from_millis(600));
                    Ok(RemoteStatus {
                        is_playing: false,
                        current_time: 50.0,
                        duration: 100.0,
                        volume_level: Some(0.1),
                    })
                })
                .await
        }

        async fn pause(&mut self) -> Result<()> {
            self.pauses += 1;
            Ok(())
        }

        async fn resume(&mut self) -> Result<()> {
            Ok(())
        }

        async fn seek(&mut self, _seconds: f64) -> Result<()> {
            Ok(())
        }

        async fn set_volume(&mut self, _percent: f64) -> Result<()> {
            Ok(())
        }

        async fn stop(&mut self) {}
    }

    #[tokio::test]
    async fn slow_status_is_abandoned_at_the_timeout() {
        let config = ControlConfig {
            poll_interval_ms: 1000,
            status_timeout_ms: 50,
            ..ControlConfig::default()
        };
        let mut rec = PlaybackStateReconciler::new(&config, true, 10.0);
        let mut device = SlowDevice {
            worker: IoWorker::spawn("slow-device", || ()).unwrap(),
            pauses: 0,
        };

        let started = Instant::now();
        rec.handle(&mut device, ControlEvent::Tick).await;

        assert!(started.elapsed() < Duration::from_millis(300));
        assert_eq!(rec.state(), PlayState::Playing);
        assert_eq!(rec.ui().seek_percentage, 10.0);
        assert_eq!(rec.ui().volume_percentage, 100.0);
        assert_eq!(device.pauses, 0);
    }

    #[test]
    fn percentage_math() {
        assert_eq!(progress_percentage(450.0, 900.0), Some(50.0));
        assert_eq!(progress_percentage(950.0, 900.0), Some(100.0));
        assert_eq!(progress_percentage(-3.0, 900.0), Some(0.0));
        assert_eq!(progress_percentage(10.0, 0.0), None);
        assert_eq!(progress_percentage(10.0, f64::INFINITY), None);
        assert_eq!(progress_percentage(10.0, f64::NAN), None);
    }

    #[tokio::test]
    async fn remote_pause_is_followed_once() {
        let mut rec = PlaybackStateReconciler::new(&config(1000), true, 0.0);
        let mut transport = ScriptedTransport::default();
        transport.push(false, 10.0, 100.0);
        transport.push(false, 10.0, 100.0);

        rec.handle(&mut transport, ControlEvent::Tick).await;
        assert_eq!(rec.state(), PlayState::Paused);
        assert!(!rec.ui().playing);
        assert_eq!(transport.pauses, 1);

        rec.handle(&mut transport, ControlEvent::Tick).await;
        assert_eq!(rec.state(), PlayState::Paused);
        assert_eq!(transport.pauses, 1);
    }

    #[tokio::test]
    async fn remote_resume_is_followed() {
        let mut rec = PlaybackStateReconciler::new(&config(1000), true, 0.0);
        let mut transport = ScriptedTransport::default();
        transport.push(false, 10.0, 100.0);
        transport.push(true, 11.0, 100.0);

        rec.handle(&mut transport, ControlEvent::Tick).await;
        rec.handle(&mut transport, ControlEvent::Tick).await;
        assert_eq!(rec.state(), PlayState::Playing);
        assert_eq!(transport.resumes, 1);
    }

    #[tokio::test]
    async fn user_pause_survives_lagging_status() {
        let mut rec = PlaybackStateReconciler::new(&config(60_000), true, 0.0);
        let mut transport = ScriptedTransport::default();
        transport.push(true, 10.0, 100.0);

        rec.handle(&mut transport, ControlEvent::Pause).await;
        assert_eq!(transport.pauses, 1);
        assert!(!rec.ui().playing);

        rec.handle(&mut transport, ControlEvent::Tick).await;
        assert_eq!(rec.state(), PlayState::Paused);
        assert_eq!(transport.resumes, 0);
    }

    #[tokio::test]
    async fn correction_resumes_after_grace_window() {
        let mut rec = PlaybackStateReconciler::new(&config(0), true, 0.0);
        let mut transport = ScriptedTransport::default();
        transport.push(true, 10.0, 100.0);

        rec.handle(&mut transport, ControlEvent::Pause).await;
        rec.handle(&mut transport, ControlEvent::Tick).await;
        assert_eq!(rec.state(), PlayState::Playing);
        assert_eq!(transport.resumes, 1);
    }

    #[tokio::test]
    async fn toggle_flips_and_repeated_pause_is_noop() {
        let mut rec = PlaybackStateReconciler::new(&config(1000), true, 0.0);
        let mut transport = ScriptedTransport::default();

        rec.handle(&mut transport, ControlEvent::TogglePlayPause).await;
        rec.handle(&mut transport, ControlEvent::Pause).await;
        assert_eq!(transport.pauses, 1);

        rec.handle(&mut transport, ControlEvent::TogglePlayPause).await;
        assert_eq!(rec.state(), PlayState::Playing);
        assert_eq!(transport.resumes, 1);
    }

    #[tokio::test]
    async fn progress_and_unknown_duration() {
        let mut rec = PlaybackStateReconciler::new(&config(1000), true, 0.0);
        let mut transport = ScriptedTransport::default();
        transport.push(true, 450.0, 900.0);
        transport.push(true, 460.0, 0.0);
        transport.push(true, 470.0, 900.0);

        rec.handle(&mut transport, ControlEvent::Tick).await;
        assert_eq!(rec.ui().seek_percentage, 50.0);
        assert!(rec.ui().seek_visible);

        rec.handle(&mut transport, ControlEvent::Tick).await;
        assert_eq!(rec.ui().seek_percentage, 0.0);
        assert!(!rec.ui().seek_visible);

        // recomputed on every tick, so the bar comes back
        rec.handle(&mut transport, ControlEvent::Tick).await;
        assert!(rec.ui().seek_visible);
    }

    #[tokio::test]
    async fn seek_converts_percentage_to_seconds() {
        let mut rec = PlaybackStateReconciler::new(&config(60_000), true, 0.0);
        let mut transport = ScriptedTransport::default();
        transport.push(true, 100.0, 900.0);
        transport.push(true, 101.0, 900.0);

        rec.handle(&mut transport, ControlEvent::Tick).await;
        rec.handle(&mut transport, ControlEvent::SeekTo(150.0)).await;
        assert_eq!(transport.seeks, vec![900.0]);
        assert_eq!(rec.ui().seek_percentage, 100.0);

        // the stale position does not yank the slider back
        rec.handle(&mut transport, ControlEvent::Tick).await;
        assert_eq!(rec.ui().seek_percentage, 100.0);
    }

    #[tokio::test]
    async fn seek_without_duration_is_ignored() {
        let mut rec = PlaybackStateReconciler::new(&config(1000), false, 0.0);
        let mut transport = ScriptedTransport::default();

        rec.handle(&mut transport, ControlEvent::SeekTo(30.0)).await;
        assert!(transport.seeks.is_empty());
    }

    #[tokio::test]
    async fn volume_is_write_mostly() {
        let mut rec = PlaybackStateReconciler::new(&config(1000), true, 0.0);
        let mut transport = ScriptedTransport::default();
        transport.push(true, 1.0, 10.0);
        transport.push(true, 2.0, 10.0);

        rec.handle(&mut transport, ControlEvent::Tick).await;
        assert_eq!(rec.ui().volume_percentage, 30.0);

        rec.handle(&mut transport, ControlEvent::VolumeChanged(-20.0)).await;
        assert_eq!(transport.volumes, vec![0.0]);
        assert_eq!(rec.ui().volume_percentage, 0.0);

        // status still says 30%, the user's value stays
        rec.handle(&mut transport, ControlEvent::Tick).await;
        assert_eq!(rec.ui().volume_percentage, 0.0);
    }

    #[tokio::test]
    async fn relative_volume_steps_clamp() {
        let mut rec = PlaybackStateReconciler::new(&config(1000), true, 0.0);
        let mut transport = ScriptedTransport::default();

        rec.handle(&mut transport, ControlEvent::VolumeBy(5.0)).await;
        rec.handle(&mut transport, ControlEvent::VolumeBy(-30.0)).await;
        assert_eq!(transport.volumes, vec![100.0, 70.0]);
    }

    #[tokio::test]
    async fn failed_poll_leaves_state_alone() {
        let mut rec = PlaybackStateReconciler::new(&config(1000), true, 25.0);
        let mut transport = ScriptedTransport::default();

        let flow = rec.handle(&mut transport, ControlEvent::Tick).await;
        assert_eq!(flow, Flow::Continue);
        assert_eq!(transport.status_calls, 1);
        assert_eq!(rec.state(), PlayState::Playing);
        assert_eq!(rec.ui().seek_percentage, 25.0);
        assert_eq!(transport.pauses, 0);
    }

    #[tokio::test]
    async fn close_ends_the_loop() {
        let mut rec = PlaybackStateReconciler::new(&config(1000), true, 0.0);
        let mut transport = ScriptedTransport::default();
        assert_eq!(rec.handle(&mut transport, ControlEvent::Close).await, Flow::Close);
        assert_eq!(transport.stops, 0);
    }
}
