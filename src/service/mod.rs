//! The long-running add-on service and the Cast button handler.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::cast::{CastController, UrlResolver};
use crate::config::Config;
use crate::control::{ControlInput, ControlSurface, ControlView};
use crate::host::{HostContext, TargetSelector};
use crate::network::{CastReceiver, InterfaceSource, SystemInterfaces, TargetDiscovery};
use crate::skin::{PatchOutcome, SkinPatcher, UnpatchOutcome};
use crate::{CastError, MediaMetadata};

const HEADING: &str = "Cast";

/// What a press of the Cast button ended with.
#[derive(Debug, Clone, PartialEq)]
pub enum CastOutcome {
    NothingPlaying,
    NoTargets,
    NotSelected,
    Cancelled,
    Failed(String),
    Finished,
}

pub struct CastService<R, D, I = SystemInterfaces> {
    config: Config,
    ctx: HostContext,
    controller: CastController<R, I>,
    discovery: D,
    selector: Box<dyn TargetSelector>,
    patcher: SkinPatcher,
}

impl<R: CastReceiver, D: TargetDiscovery> CastService<R, D, SystemInterfaces> {
    pub fn new(config: Config, ctx: HostContext, receiver: R, discovery: D, selector: Box<dyn TargetSelector>) -> Self {
        let resolver = UrlResolver::new(config.resolver.probe_timeout());
        Self::with_resolver(config, ctx, receiver, resolver, discovery, selector)
    }
}

impl<R: CastReceiver, D: TargetDiscovery, I: InterfaceSource> CastService<R, D, I> {
    pub fn with_resolver(
        config: Config,
        ctx: HostContext,
        receiver: R,
        resolver: UrlResolver<I>,
        discovery: D,
        selector: Box<dyn TargetSelector>,
    ) -> Self {
        let controller = CastController::new(receiver, resolver, config.cast.clone());
        let patcher = SkinPatcher::new(&config.skin);
        Self {
            config,
            ctx,
            controller,
            discovery,
            selector,
            patcher,
        }
    }

    pub fn controller(&self) -> &CastController<R, I> {
        &self.controller
    }

    pub fn context(&self) -> &HostContext {
        &self.ctx
    }

    /// Hand whatever the host is playing to a receiver and stay in the
    /// control surface until the user closes it.
    pub async fn cast_button_pressed<In, V>(&mut self, input: In, view: V) -> CastOutcome
    where
        In: ControlInput,
        V: ControlView,
    {
        let player = &self.ctx.player;
        let locator = match player.current_locator() {
            Some(locator) if player.is_playing() => locator,
            _ => {
                self.ctx.prompter.notify(HEADING, "Nothing is playing");
                return CastOutcome::NothingPlaying;
            }
        };
        let elapsed = player.elapsed_seconds().max(0.0);
        let total = player.total_seconds();
        let metadata = MediaMetadata {
            title: player.current_title(),
            thumbnail: player.current_thumbnail(),
        };
        info!("Cast requested for {} at {:.1}s", locator, elapsed);

        let mut progress = self.ctx.prompter.progress("Searching for Chromecasts");
        let found = self.discovery.discover(progress.as_mut()).await;
        progress.close();

        let targets = match found {
            Ok(targets) => targets,
            Err(CastError::Cancelled) => {
                debug!("Discovery cancelled");
                return CastOutcome::Cancelled;
            }
            Err(e) => return self.report(e),
        };
        if targets.is_empty() {
            self.ctx.prompter.notify(HEADING, "No Chromecast devices found");
            return CastOutcome::NoTargets;
        }

        let Some(target) = self.selector.select(&targets) else {
            debug!("No receiver selected");
            return CastOutcome::NotSelected;
        };

        let started = self
            .controller
            .start(&mut self.ctx, &target, &locator, &metadata, elapsed)
            .await;
        match started {
            Ok(_) => {}
            Err(CastError::Cancelled) => return CastOutcome::Cancelled,
            Err(e) => return self.report(e),
        }

        let show_seek = total > 0.0;
        let initial = if show_seek { elapsed / total * 100.0 } else { 0.0 };
        let thumbnail = metadata.thumbnail.as_ref().map(|t| t.to_string());

        let surface = ControlSurface::new(
            metadata.title,
            thumbnail,
            show_seek,
            initial,
            &self.config.control,
            input,
            view,
        );
        surface.run(&mut self.controller).await;

        // no-op unless the surface failed to stop it
        self.controller.stop().await;
        CastOutcome::Finished
    }

    fn report(&self, e: CastError) -> CastOutcome {
        error!("Cast failed: {}", e);
        self.ctx.prompter.warn(HEADING, &e.to_string());
        CastOutcome::Failed(e.to_string())
    }

    /// Put the Cast button into the skin. Failures are reported, never fatal.
    pub fn start_service(&self) -> Option<PatchOutcome> {
        info!("Service starting");
        match self.patcher.ensure_present() {
            Ok(outcome) => {
                if let PatchOutcome::Applied { restart_required: true } = outcome {
                    self.ctx
                        .prompter
                        .notify(HEADING, "Restart the media center to show the Cast button");
                }
                Some(outcome)
            }
            Err(e) => {
                error!("Could not add the Cast button: {}", e);
                self.ctx.prompter.warn(HEADING, &format!("Could not add the Cast button: {}", e));
                None
            }
        }
    }

    /// Idle until `abort` resolves.
    pub async fn run_until_abort<F: Future<Output = ()>>(&self, abort: F) {
        let idle = Duration::from_secs(self.config.service.idle_secs.max(1));
        tokio::pin!(abort);

        loop {
            tokio::select! {
                _ = &mut abort => break,
                _ = tokio::time::sleep(idle) => {}
            }
        }
        info!("Abort requested");
    }

    pub fn stop_service(&self) -> Option<UnpatchOutcome> {
        let outcome = match self.patcher.ensure_absent() {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!("Could not remove the Cast button: {}", e);
                self.ctx
                    .prompter
                    .warn(HEADING, &format!("Could not remove the Cast button: {}", e));
                None
            }
        };
        info!("Service stopped");
        outcome
    }

    /// `start_service`, idle until `abort`, then `stop_service`.
    pub async fn run<F: Future<Output = ()>>(&self, abort: F) {
        self.start_service();
        self.run_until_abort(abort).await;
        self.stop_service();
    }
}
