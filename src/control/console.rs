use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines, Stdin};
use tokio::sync::watch;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::debug;

use super::{ControlInput, ControlView};
use crate::cast::{ControlEvent, ControlUiState};
use crate::console::Interrupts;

const BAR_WIDTH: usize = 30;

/// Map one line typed on the terminal to a control event.
pub fn parse_command(line: &str, volume_step: f64) -> Option<ControlEvent> {
    let mut parts = line.split_whitespace();
    let command = parts.next()?;
    let arg = parts.next().and_then(|a| a.trim_end_matches('%').parse::<f64>().ok());

    match (command, arg) {
        ("p" | "play" | "pause", None) => Some(ControlEvent::TogglePlayPause),
        ("s" | "seek", Some(pct)) => Some(ControlEvent::SeekTo(pct)),
        ("v" | "vol" | "volume", Some(pct)) => Some(ControlEvent::VolumeChanged(pct)),
        ("+", None) => Some(ControlEvent::VolumeBy(volume_step)),
        ("-", None) => Some(ControlEvent::VolumeBy(-volume_step)),
        ("q" | "quit" | "stop", None) => Some(ControlEvent::Close),
        _ => None,
    }
}

/// Terminal commands merged with a poll tick. Ctrl-C closes the controls.
pub struct ConsoleInput<R = Stdin> {
    lines: Lines<BufReader<R>>,
    interrupts: watch::Receiver<u64>,
    ticker: Interval,
    volume_step: f64,
}

impl ConsoleInput {
    pub fn new(interrupts: &Interrupts, poll_interval: Duration, volume_step: f64) -> Self {
        Self::with_reader(tokio::io::stdin(), interrupts, poll_interval, volume_step)
    }
}

impl<R: AsyncRead + Unpin> ConsoleInput<R> {
    pub fn with_reader(reader: R, interrupts: &Interrupts, poll_interval: Duration, volume_step: f64) -> Self {
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Self {
            lines: BufReader::new(reader).lines(),
            interrupts: interrupts.subscribe(),
            ticker,
            volume_step,
        }
    }
}

#[async_trait(?Send)]
impl<R: AsyncRead + Unpin> ControlInput for ConsoleInput<R> {
    async fn next_event(&mut self) -> Option<ControlEvent> {
        loop {
            tokio::select! {
                biased;
                Ok(()) = self.interrupts.changed() => {
                    debug!("Ctrl-C, closing controls");
                    return Some(ControlEvent::Close);
                }
                line = self.lines.next_line() => match line {
                    Ok(Some(line)) => match parse_command(&line, self.volume_step) {
                        Some(event) => return Some(event),
                        None => {
                            eprintln!("commands: p (play/pause), s <pct> (seek), v <pct> | + | - (volume), q (stop)");
                        }
                    },
                    Ok(None) => return None,
                    Err(e) => {
                        debug!("stdin closed: {}", e);
                        return None;
                    }
                },
                _ = self.ticker.tick() => return Some(ControlEvent::Tick),
            }
        }
    }
}

/// One status line on stderr, rewritten in place.
#[derive(Debug, Default)]
pub struct ConsoleView {
    /// Seek bar width, set only once the receiver reports a duration.
    seek_bar: Option<usize>,
}

impl ConsoleView {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn status_line(state: &ControlUiState, seek_bar: Option<usize>) -> String {
    let icon = if state.playing { "▶" } else { "⏸" };
    let progress = match seek_bar {
        Some(width) if state.seek_visible => {
            let filled = ((state.seek_percentage / 100.0) * width as f64).round() as usize;
            let filled = filled.min(width);
            format!("[{}{}] {:5.1}%", "#".repeat(filled), "-".repeat(width - filled), state.seek_percentage)
        }
        _ => "live".to_string(),
    };
    format!("{} {}  vol {:3.0}%", icon, progress, state.volume_percentage)
}

impl ControlView for ConsoleView {
    fn open(&mut self, title: &str, thumbnail: Option<&str>) {
        eprintln!("Casting: {}", title);
        if let Some(thumb) = thumbnail {
            eprintln!("Artwork: {}", thumb);
        }
    }

    fn render(&mut self, state: &ControlUiState) {
        if state.seek_visible && self.seek_bar.is_none() {
            self.seek_bar = Some(BAR_WIDTH);
        }
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\r\x1b[2K{}", status_line(state, self.seek_bar));
        let _ = stderr.flush();
    }

    fn close(&mut self) {
        eprintln!();
    }
}
