//! # Background Task Runner
//!
//! Runs fire-and-forget work (printing, invoicing, export) after a commit.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  spawn("invoice", fut)                                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  TaskTracker ── tracks lifetime, drain() waits for all                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Semaphore permit ── at most `max_concurrent` outbound calls            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  inner tokio::spawn(fut) ── a panic surfaces as JoinError and is        │
//! │                             logged; nothing reaches the caller          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

/// Bounded runner for isolated background tasks.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
}

impl TaskRunner {
    /// `max_concurrent` is clamped to at least one.
    pub fn new(max_concurrent: usize) -> Self {
        TaskRunner {
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Spawns `work`. Returns immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<F>(&self, name: &'static str, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);

        self.tracker.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(task = name, "Task runner closed, dropping task");
                    return;
                }
            };

            match tokio::spawn(work).await {
                Ok(()) => debug!(task = name, "Background task finished"),
                Err(e) if e.is_panic() => {
                    let message = panic_message(e.into_panic());
                    error!(task = name, panic = %message, "Background task panicked");
                }
                Err(e) => warn!(task = name, ?e, "Background task cancelled"),
            }
        });
    }

    /// Tasks spawned and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Waits for every task spawned so far, including tasks they spawn
    /// before finishing.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
