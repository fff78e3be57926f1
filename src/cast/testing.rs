//! In-memory stand-ins for the host and the receiver.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use async_trait::async_trait;

use crate::host::{HostContext, MediaHost, Progress, Prompter, TargetSelector};
use crate::network::{CastReceiver, MediaRequest};
use crate::settings::MemorySettings;
use crate::{CastError, CastTarget, PlaybackLocator, RemoteStatus, Result};

#[derive(Debug, Default)]
pub struct HostState {
    pub playing: bool,
    pub paused: bool,
    pub locator: Option<PlaybackLocator>,
    pub title: String,
    pub elapsed: f64,
}

#[derive(Clone)]
pub struct FakeHost(pub Rc<RefCell<HostState>>);

impl FakeHost {
    pub fn playing() -> Self {
        Self(Rc::new(RefCell::new(HostState {
            playing: true,
            paused: false,
            locator: Some(PlaybackLocator::new("http://cdn.example.com/bbb.mp4")),
            title: "Big Buck Bunny".into(),
            elapsed: 42.0,
        })))
    }

    pub fn idle() -> Self {
        Self(Rc::new(RefCell::new(HostState::default())))
    }
}

impl MediaHost for FakeHost {
    fn is_playing(&self) -> bool {
        self.0.borrow().playing
    }

    fn current_locator(&self) -> Option<PlaybackLocator> {
        self.0.borrow().locator.clone()
    }

    fn current_title(&self) -> String {
        self.0.borrow().title.clone()
    }

    fn current_thumbnail(&self) -> Option<PlaybackLocator> {
        None
    }

    fn elapsed_seconds(&self) -> f64 {
        self.0.borrow().elapsed
    }

    fn total_seconds(&self) -> f64 {
        600.0
    }

    fn is_paused(&self) -> bool {
        self.0.borrow().paused
    }

    fn pause(&mut self) {
        self.0.borrow_mut().paused = true;
    }

    fn resume(&mut self) {
        self.0.borrow_mut().paused = false;
    }
}

#[derive(Debug, Default)]
pub struct PromptLog {
    pub notices: Vec<String>,
    pub warnings: Vec<String>,
    pub questions: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakePrompter {
    pub log: Rc<RefCell<PromptLog>>,
    pub answer: bool,
    /// Shared by every progress indicator this prompter hands out.
    pub cancel: Rc<Cell<bool>>,
}

pub struct FakeProgress {
    cancelled: Rc<Cell<bool>>,
}

impl Progress for FakeProgress {
    fn update(&mut self, _percent: u8, _message: &str) {}

    fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    fn close(&mut self) {}
}

impl Prompter for FakePrompter {
    fn notify(&self, _heading: &str, message: &str) {
        self.log.borrow_mut().notices.push(message.to_string());
    }

    fn warn(&self, _heading: &str, message: &str) {
        self.log.borrow_mut().warnings.push(message.to_string());
    }

    fn confirm(&self, _heading: &str, question: &str) -> bool {
        self.log.borrow_mut().questions.push(question.to_string());
        self.answer
    }

    fn progress(&self, _heading: &str) -> Box<dyn Progress> {
        Box::new(FakeProgress {
            cancelled: Rc::clone(&self.cancel),
        })
    }
}

pub struct FirstTarget;

impl TargetSelector for FirstTarget {
    fn select(&self, targets: &[CastTarget]) -> Option<CastTarget> {
        targets.first().cloned()
    }
}

pub fn context(host: FakeHost, settings: MemorySettings) -> (HostContext, Rc<RefCell<HostState>>) {
    context_with_prompter(host, settings, FakePrompter::default())
}

pub fn context_with_prompter(
    host: FakeHost,
    settings: MemorySettings,
    prompter: FakePrompter,
) -> (HostContext, Rc<RefCell<HostState>>) {
    let state = Rc::clone(&host.0);
    let ctx = HostContext {
        player: Box::new(host),
        settings: Box::new(settings),
        prompter: Box::new(prompter),
    };
    (ctx, state)
}

#[derive(Debug, Default)]
pub struct ReceiverLog {
    pub connects: u32,
    pub disconnects: u32,
    pub played: Vec<MediaRequest>,
    pub pauses: u32,
    pub resumes: u32,
    pub seeks: Vec<f64>,
    pub volumes: Vec<f64>,
    pub stops: u32,
}

#[derive(Default)]
pub struct FakeReceiver {
    pub log: Rc<RefCell<ReceiverLog>>,
    pub connect_failures: u32,
    /// Set while a connect is in flight, as a user pressing cancel would.
    pub cancel_on_connect: Option<Rc<Cell<bool>>>,
    /// Connect never completes.
    pub connect_hangs: bool,
    pub fail_play: bool,
    pub fail_stop: bool,
    /// Served in order; the last one repeats.
    pub statuses: VecDeque<RemoteStatus>,
}

#[async_trait(?Send)]
impl CastReceiver for FakeReceiver {
    async fn connect(&mut self, _target: &CastTarget) -> Result<()> {
        self.log.borrow_mut().connects += 1;
        if let Some(flag) = &self.cancel_on_connect {
            flag.set(true);
        }
        if self.connect_hangs {
            std::future::pending::<()>().await;
        }
        if self.connect_failures > 0 {
            self.connect_failures -= 1;
            return Err(CastError::Network("connection refused".into()));
        }
        Ok(())
    }

    async fn play_media(&mut self, request: &MediaRequest) -> Result<()> {
        if self.fail_play {
            return Err(CastError::Remote("LOAD_FAILED".into()));
        }
        self.log.borrow_mut().played.push(request.clone());
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.log.borrow_mut().pauses += 1;
        Ok(())
    }

    async fn resume(&mut self) -> Result<()> {
        self.log.borrow_mut().resumes += 1;
        Ok(())
    }

    async fn seek(&mut self, seconds: f64) -> Result<()> {
        self.log.borrow_mut().seeks.push(seconds);
        Ok(())
    }

    async fn set_volume(&mut self, level: f64) -> Result<()> {
        self.log.borrow_mut().volumes.push(level);
        Ok(())
    }

    async fn status(&mut self) -> Result<RemoteStatus> {
        let status = if self.statuses.len() > 1 {
            self.statuses.pop_front()
        } else {
            self.statuses.front().copied()
        };
        Ok(status.unwrap_or(RemoteStatus {
            is_playing: true,
            ..RemoteStatus::default()
        }))
    }

    async fn stop(&mut self) -> Result<()> {
        self.log.borrow_mut().stops += 1;
        if self.fail_stop {
            return Err(CastError::Remote("receiver not responding".into()));
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.log.borrow_mut().disconnects += 1;
    }
}
