//! Decorative step counter shown while a request is in flight.
//!
//! The counter runs on its own timer and knows nothing about the backend.
//! Dropping the ticker aborts the timer task.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

pub const ANALYSIS_STEPS: [&str; 4] = [
    "Running CNN classification",
    "Checking prediction confidence",
    "Running visual analysis",
    "Generating agricultural advice",
];

pub struct ProgressTicker {
    step: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl ProgressTicker {
    /// Starts at step 0 and advances once per `interval`, stopping on the
    /// last step. Must be called inside a tokio runtime.
    pub fn start(interval: Duration) -> Self {
        let step = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&step);
        let last = ANALYSIS_STEPS.len() - 1;

        let task = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            // The first tick fires immediately.
            ticks.tick().await;
            loop {
                ticks.tick().await;
                let previous = counter
                    .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                        (current < last).then_some(current + 1)
                    })
                    .unwrap_or(last);
                if previous + 1 >= last {
                    break;
                }
            }
        });

        Self { step, task }
    }

    pub fn step(&self) -> usize {
        self.step.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}
