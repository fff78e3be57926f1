//! Collaborators owned by the media host.
//!
//! The player, the settings service and the dialog layer all belong to the
//! host application. Casting only talks to them through these traits.

use crate::settings::SettingsStore;
use crate::{CastTarget, PlaybackLocator};

pub trait MediaHost {
    fn is_playing(&self) -> bool;

    fn current_locator(&self) -> Option<PlaybackLocator>;

    fn current_title(&self) -> String;

    fn current_thumbnail(&self) -> Option<PlaybackLocator>;

    /// Seconds into the current item.
    fn elapsed_seconds(&self) -> f64;

    fn total_seconds(&self) -> f64;

    fn is_paused(&self) -> bool;

    fn pause(&mut self);

    fn resume(&mut self);
}

/// A cancellable progress indicator shown during slow network calls.
pub trait Progress {
    fn update(&mut self, percent: u8, message: &str);

    fn is_cancelled(&self) -> bool;

    fn close(&mut self);
}

pub trait Prompter {
    fn notify(&self, heading: &str, message: &str);

    fn warn(&self, heading: &str, message: &str);

    /// Yes/no question. Returns `true` on yes.
    fn confirm(&self, heading: &str, question: &str) -> bool;

    fn progress(&self, heading: &str) -> Box<dyn Progress>;
}

pub trait TargetSelector {
    fn select(&self, targets: &[CastTarget]) -> Option<CastTarget>;
}

pub struct HostContext {
    pub player: Box<dyn MediaHost>,
    pub settings: Box<dyn SettingsStore>,
    pub prompter: Box<dyn Prompter>,
}

/// A host with no local player attached.
///
/// The command-line front end uses it to cast a locator from a fixed offset:
/// there is nothing to pause locally, and the "current item" never changes.
#[derive(Debug, Clone)]
pub struct StaticHost {
    locator: PlaybackLocator,
    title: String,
    thumbnail: Option<PlaybackLocator>,
    offset: f64,
    paused: bool,
}

impl StaticHost {
    pub fn new(locator: PlaybackLocator, title: impl Into<String>, offset: f64) -> Self {
        Self {
            locator,
            title: title.into(),
            thumbnail: None,
            offset: offset.max(0.0),
            paused: false,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: PlaybackLocator) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }
}

impl MediaHost for StaticHost {
    fn is_playing(&self) -> bool {
        true
    }

    fn current_locator(&self) -> Option<PlaybackLocator> {
        Some(self.locator.clone())
    }

    fn current_title(&self) -> String {
        self.title.clone()
    }

    fn current_thumbnail(&self) -> Option<PlaybackLocator> {
        self.thumbnail.clone()
    }

    fn elapsed_seconds(&self) -> f64 {
        self.offset
    }

    fn total_seconds(&self) -> f64 {
        0.0
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }
}

/// A host that never has anything playing, used while only the service runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleHost;

impl MediaHost for IdleHost {
    fn is_playing(&self) -> bool {
        false
    }

    fn current_locator(&self) -> Option<PlaybackLocator> {
        None
    }

    fn current_title(&self) -> String {
        String::new()
    }

    fn current_thumbnail(&self) -> Option<PlaybackLocator> {
        None
    }

    fn elapsed_seconds(&self) -> f64 {
        0.0
    }

    fn total_seconds(&self) -> f64 {
        0.0
    }

    fn is_paused(&self) -> bool {
        false
    }

    fn pause(&mut self) {}

    fn resume(&mut self) {}
}
