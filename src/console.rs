//! Terminal stand-ins for the host's dialogs.

use std::io::{BufRead, Write};

use tokio::sync::watch;
use tracing::{info, warn};

use crate::host::{Progress, Prompter, TargetSelector};
use crate::CastTarget;

fn read_answer() -> Option<String> {
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

/// Count of Ctrl-C presses since startup.
///
/// One watcher owns the signal for the whole process. Progress dialogs and
/// the control input compare against the count they saw when created.
#[derive(Debug, Clone)]
pub struct Interrupts {
    presses: watch::Receiver<u64>,
}

impl Interrupts {
    /// A counter fed by the returned sender instead of the terminal.
    pub fn channel() -> (watch::Sender<u64>, Self) {
        let (sender, presses) = watch::channel(0);
        (sender, Self { presses })
    }

    /// Take over Ctrl-C. The handler is registered by the time this returns,
    /// so a press is never lost to the default handler.
    pub async fn install() -> Self {
        let (sender, interrupts) = Self::channel();

        tokio::spawn(async move {
            loop {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("Interrupted");
                        sender.send_modify(|count| *count += 1);
                    }
                    Err(e) => {
                        warn!("Could not listen for Ctrl-C: {}", e);
                        // Keep the sender so waiters stay pending.
                        std::future::pending::<()>().await;
                    }
                }
            }
        });
        // Let the watcher reach its first poll of the signal.
        tokio::task::yield_now().await;

        interrupts
    }

    pub fn count(&self) -> u64 {
        *self.presses.borrow()
    }

    /// Receiver that only reports presses from now on.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        let mut presses = self.presses.clone();
        presses.borrow_and_update();
        presses
    }

    /// Resolve on the next press.
    pub async fn pressed(&self) {
        let mut presses = self.subscribe();
        let _ = presses.changed().await;
    }
}

#[derive(Debug, Clone)]
pub struct ConsolePrompter {
    interrupts: Interrupts,
    /// Answer yes to every question without reading stdin.
    pub assume_yes: bool,
}

impl ConsolePrompter {
    pub fn new(interrupts: Interrupts, assume_yes: bool) -> Self {
        Self { interrupts, assume_yes }
    }
}

impl Prompter for ConsolePrompter {
    fn notify(&self, heading: &str, message: &str) {
        info!("{}: {}", heading, message);
        eprintln!("[{}] {}", heading, message);
    }

    fn warn(&self, heading: &str, message: &str) {
        warn!("{}: {}", heading, message);
        eprintln!("[{}] warning: {}", heading, message);
    }

    fn confirm(&self, heading: &str, question: &str) -> bool {
        if self.assume_yes {
            info!("{}: {} -> yes (assumed)", heading, question);
            return true;
        }
        eprint!("[{}] {} [y/N] ", heading, question);
        let _ = std::io::stderr().flush();
        matches!(
            read_answer().as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("y" | "yes")
        )
    }

    fn progress(&self, heading: &str) -> Box<dyn Progress> {
        Box::new(ConsoleProgress::new(&self.interrupts, heading))
    }
}

/// Progress on stderr, cancelled with Ctrl-C.
pub struct ConsoleProgress {
    heading: String,
    interrupts: Interrupts,
    seen: u64,
    drawn: bool,
}

impl ConsoleProgress {
    pub fn new(interrupts: &Interrupts, heading: &str) -> Self {
        Self {
            heading: heading.to_string(),
            interrupts: interrupts.clone(),
            seen: interrupts.count(),
            drawn: false,
        }
    }
}

impl Progress for ConsoleProgress {
    fn update(&mut self, percent: u8, message: &str) {
        self.drawn = true;
        eprint!("\r\x1b[2K[{}] {:3}% {} (Ctrl-C to cancel)", self.heading, percent, message);
        let _ = std::io::stderr().flush();
    }

    fn is_cancelled(&self) -> bool {
        self.interrupts.count() > self.seen
    }

    fn close(&mut self) {
        if std::mem::take(&mut self.drawn) {
            eprintln!();
        }
    }
}

/// Picks a receiver by name, or asks on the terminal.
#[derive(Debug, Clone, Default)]
pub struct ConsoleSelector {
    pub preferred: Option<String>,
}

/// Case-insensitive match on the friendly name.
pub fn find_target<'a>(targets: &'a [CastTarget], name: &str) -> Option<&'a CastTarget> {
    targets.iter().find(|t| t.name.eq_ignore_ascii_case(name))
}

impl TargetSelector for ConsoleSelector {
    fn select(&self, targets: &[CastTarget]) -> Option<CastTarget> {
        if let Some(name) = &self.preferred {
            let found = find_target(targets, name).cloned();
            if found.is_none() {
                warn!("Receiver {:?} not found among {} device(s)", name, targets.len());
            }
            return found;
        }

        if targets.is_empty() {
            return None;
        }

        eprintln!("Select a receiver:");
        for (i, target) in targets.iter().enumerate() {
            eprintln!("  {}) {}", i + 1, target);
        }
        eprint!("> ");
        let _ = std::io::stderr().flush();

        let choice: usize = read_answer()?.parse().ok()?;
        targets.get(choice.checked_sub(1)?).cloned()
    }
}
