//! The modal cast control surface.
//!
//! There is no timer of its own: the host's input stream decides when a poll
//! happens by emitting `ControlEvent::Tick`, and every event goes through the
//! reconciler before the view is redrawn.

pub mod console;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::cast::{ControlEvent, ControlUiState, Flow, PlaybackStateReconciler, RemoteTransport};
use crate::config::ControlConfig;

pub use console::{ConsoleInput, ConsoleView};

#[async_trait(?Send)]
pub trait ControlInput {
    /// Next event from the host. `None` means the surface was torn down.
    async fn next_event(&mut self) -> Option<ControlEvent>;
}

pub trait ControlView {
    fn open(&mut self, title: &str, thumbnail: Option<&str>);

    fn render(&mut self, state: &ControlUiState);

    fn close(&mut self);
}

pub struct ControlSurface<I, V> {
    title: String,
    thumbnail: Option<String>,
    reconciler: PlaybackStateReconciler,
    input: I,
    view: V,
    /// Last frame drawn, `None` until the first render.
    drawn: Option<ControlUiState>,
}

impl<I: ControlInput, V: ControlView> ControlSurface<I, V> {
    pub fn new(
        title: impl Into<String>,
        thumbnail: Option<String>,
        show_seek: bool,
        initial_percentage: f64,
        config: &ControlConfig,
        input: I,
        view: V,
    ) -> Self {
        Self {
            title: title.into(),
            thumbnail,
            reconciler: PlaybackStateReconciler::new(config, show_seek, initial_percentage),
            input,
            view,
            drawn: None,
        }
    }

    fn redraw(&mut self) {
        let state = *self.reconciler.ui();
        if self.drawn != Some(state) {
            self.view.render(&state);
            self.drawn = Some(state);
        }
    }

    /// Run until the user closes the surface, then stop the remote session.
    ///
    /// Returns the last UI state shown.
    pub async fn run<T: RemoteTransport + ?Sized>(mut self, transport: &mut T) -> ControlUiState {
        info!("Opening cast controls for {}", self.title);
        self.view.open(&self.title, self.thumbnail.as_deref());
        self.redraw();

        loop {
            let Some(event) = self.input.next_event().await else {
                debug!("Control input ended");
                break;
            };
            if self.reconciler.handle(transport, event).await == Flow::Close {
                break;
            }
            self.redraw();
        }

        transport.stop().await;
        self.view.close();
        info!("Cast controls closed");
        *self.reconciler.ui()
    }
}
