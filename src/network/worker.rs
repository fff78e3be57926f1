//! A thread that owns blocking device state.
//!
//! Jobs run one at a time on the worker thread; callers await the reply with
//! a deadline, so a device that stops answering never blocks the runtime.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time;
use tracing::debug;

use crate::{CastError, Result};

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

pub struct IoWorker<S> {
    jobs: mpsc::Sender<Job<S>>,
}

impl<S: 'static> IoWorker<S> {
    /// Start the thread. `init` builds the state on the worker itself, so `S`
    /// never has to cross threads.
    pub fn spawn<F>(name: &str, init: F) -> Result<Self>
    where
        F: FnOnce() -> S + Send + 'static,
    {
        let (jobs, queue) = mpsc::channel::<Job<S>>();
        let thread_name = name.to_string();

        thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let mut state = init();
                for job in queue {
                    job(&mut state);
                }
                debug!("{} finished", thread_name);
            })
            .map_err(|e| CastError::Network(format!("Failed to start {} thread: {}", name, e)))?;

        Ok(Self { jobs })
    }

    /// Run `job` on the worker and wait at most `limit` for its result.
    ///
    /// On timeout the job keeps running; later jobs queue behind it.
    pub async fn call<T, F>(&self, limit: Duration, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> Result<T> + Send + 'static,
    {
        let (reply, answer) = oneshot::channel();
        self.jobs
            .send(Box::new(move |state: &mut S| {
                let _ = reply.send(job(state));
            }))
            .map_err(|_| CastError::Network("Device I/O thread has stopped".into()))?;

        match time::timeout(limit, answer).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CastError::Network("Device I/O thread dropped the request".into())),
            Err(_) => Err(CastError::Network(format!("Device did not answer within {:?}", limit))),
        }
    }

    /// Queue `job` without waiting for it.
    pub fn post<F>(&self, job: F)
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        if self.jobs.send(Box::new(job)).is_err() {
            debug!("Device I/O thread already gone");
        }
    }
}
