//! Named execution contexts
//!
//! A context is a task queue plus one consumer loop. Producers on any thread
//! hand work to it through a [`ContextHandle`] without waiting; the loop runs
//! jobs one at a time in submission order. The loop is either spawned onto
//! the tokio runtime or driven by the host itself through a [`ContextPump`]
//! (the shape a UI-affine thread needs).

use crate::error::ContextError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Unit of work scheduled onto a context
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Cloneable producer side of a context
#[derive(Clone)]
pub struct ContextHandle {
    name: Arc<str>,
    sender: mpsc::UnboundedSender<Job>,
}

impl ContextHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a job. Returns immediately; fails only if the loop is gone.
    pub fn submit(&self, job: Job) -> Result<(), ContextError> {
        self.sender
            .send(job)
            .map_err(|_| ContextError::Closed(self.name.to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle").field("name", &self.name).finish()
    }
}

/// A context that has not been started yet
pub struct ExecutionContext {
    handle: ContextHandle,
    pump: ContextPump,
}

impl ExecutionContext {
    pub fn new(name: impl Into<String>) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            handle: ContextHandle {
                name: name.clone(),
                sender,
            },
            pump: ContextPump { name, receiver },
        }
    }

    pub fn handle(&self) -> ContextHandle {
        self.handle.clone()
    }

    /// Run the consumer loop on the tokio runtime.
    ///
    /// The task finishes once every handle has been dropped and the queue
    /// is drained; it yields the number of jobs run.
    pub fn spawn(self) -> (ContextHandle, JoinHandle<usize>) {
        let Self { handle, pump } = self;
        debug!(context = %handle.name, "Spawning execution context");
        (handle, tokio::spawn(pump.run()))
    }

    /// Hand the consumer side to the host, which drives it itself.
    pub fn into_pump(self) -> (ContextHandle, ContextPump) {
        (self.handle, self.pump)
    }
}

/// Consumer side of a context
pub struct ContextPump {
    name: Arc<str>,
    receiver: mpsc::UnboundedReceiver<Job>,
}

impl ContextPump {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run every job queued right now, without waiting for more.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            self.run_job(job);
            ran += 1;
        }
        ran
    }

    /// Wait for the next job and run it. Returns `false` once the context
    /// is closed and drained.
    pub async fn run_next(&mut self) -> bool {
        match self.receiver.recv().await {
            Some(job) => {
                self.run_job(job);
                true
            }
            None => false,
        }
    }

    /// Run jobs until every handle is dropped.
    pub async fn run(mut self) -> usize {
        let mut ran = 0;
        while self.run_next().await {
            ran += 1;
        }
        debug!(context = %self.name, jobs = ran, "Execution context drained");
        ran
    }

    fn run_job(&self, job: Job) {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!(context = %self.name, "Job panicked; continuing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn manual_pump_runs_in_order() {
        let (handle, mut pump) = ExecutionContext::new("ui").into_pump();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let seen = seen.clone();
            handle
                .submit(Box::new(move || seen.lock().unwrap().push(i)))
                .unwrap();
        }

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(pump.run_pending(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(pump.run_pending(), 0);
    }

    #[test]
    fn submit_after_pump_dropped_fails() {
        let (handle, pump) = ExecutionContext::new("gone").into_pump();
        drop(pump);
        let err = handle.submit(Box::new(|| {})).unwrap_err();
        assert_eq!(err, ContextError::Closed("gone".into()));
        assert!(handle.is_closed());
    }

    #[test]
    fn panicking_job_does_not_stop_pump() {
        let (handle, mut pump) = ExecutionContext::new("ui").into_pump();
        let hits = Arc::new(Mutex::new(0));

        handle.submit(Box::new(|| panic!("bad job"))).unwrap();
        let h = hits.clone();
        handle.submit(Box::new(move || *h.lock().unwrap() += 1)).unwrap();

        assert_eq!(pump.run_pending(), 2);
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn spawned_context_drains_and_exits() {
        let (handle, task) = ExecutionContext::new("worker").spawn();
        let (tx, rx) = tokio::sync::oneshot::channel();

        handle
            .submit(Box::new(move || {
                let _ = tx.send(std::thread::current().id());
            }))
            .unwrap();
        rx.await.unwrap();

        drop(handle);
        assert_eq!(task.await.unwrap(), 1);
    }
}
