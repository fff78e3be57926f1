pub mod reconciler;
pub mod resolver;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use reconciler::{
    progress_percentage, ControlEvent, ControlUiState, Flow, PlayState, PlaybackStateReconciler, RemoteTransport,
};
pub use resolver::UrlResolver;
pub use session::{CastController, CastSession};
