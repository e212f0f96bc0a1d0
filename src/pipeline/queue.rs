//! Rate-limited upload queue.
//!
//! Uploads are admitted under two limits at once: a maximum number in
//! flight, and a maximum number started within any sliding interval. With
//! carryover enabled, uploads still running after their start has left the
//! window keep counting against the cap.
//!
//! A single dispatcher task owns admission. Each admitted upload runs on its
//! own spawned task; its outcome is logged and dropped, so a failing or
//! panicking upload never reaches the message pipeline.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{Notify, Semaphore, mpsc};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::QueueConfig;
use crate::error::PreprocessError;

/// A deferred upload.
pub type UploadTask = BoxFuture<'static, Result<(), PreprocessError>>;

struct Job {
    label: String,
    task: UploadTask,
}

/// Snapshot of queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub in_flight: usize,
}

#[derive(Default)]
struct Shared {
    /// Enqueued and not yet finished.
    pending: AtomicUsize,
    in_flight: AtomicUsize,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    idle: Notify,
}

impl Shared {
    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Bounded, interval-capped upload queue.
///
/// Cloning shares the same dispatcher and limits.
#[derive(Clone)]
pub struct UploadQueue {
    tx: mpsc::UnboundedSender<Job>,
    shared: Arc<Shared>,
}

impl UploadQueue {
    /// Start the queue's dispatcher on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(config: QueueConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        tokio::spawn(dispatch(rx, config, Arc::clone(&shared)));
        Self { tx, shared }
    }

    /// Schedule `task`. Fails only if the dispatcher is gone.
    pub fn enqueue(&self, label: impl Into<String>, task: UploadTask) -> Result<(), PreprocessError> {
        let label = label.into();
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        match self.tx.send(Job {
            label: label.clone(),
            task,
        }) {
            Ok(()) => {
                self.shared.submitted.fetch_add(1, Ordering::SeqCst);
                debug!(label = %label, "Upload enqueued");
                Ok(())
            }
            Err(_) => {
                self.shared.finish_one();
                Err(PreprocessError::Enqueue {
                    filename: label,
                    reason: "upload dispatcher is not running".into(),
                })
            }
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            submitted: self.shared.submitted.load(Ordering::SeqCst),
            completed: self.shared.completed.load(Ordering::SeqCst),
            failed: self.shared.failed.load(Ordering::SeqCst),
            in_flight: self.shared.in_flight.load(Ordering::SeqCst),
        }
    }

    /// Wait until nothing is queued or running.
    pub async fn on_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

async fn dispatch(mut rx: mpsc::UnboundedReceiver<Job>, config: QueueConfig, shared: Arc<Shared>) {
    let slots = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let mut window = IntervalWindow::default();

    while let Some(job) = rx.recv().await {
        let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
            break;
        };

        loop {
            let in_flight = shared.in_flight.load(Ordering::SeqCst);
            match window.try_admit(Instant::now(), in_flight, &config) {
                Ok(()) => break,
                Err(retry_at) => {
                    debug!(label = %job.label, "Interval cap reached, waiting");
                    tokio::time::sleep_until(retry_at).await;
                }
            }
        }

        shared.in_flight.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            let Job { label, task } = job;
            let outcome = AssertUnwindSafe(task).catch_unwind().await;
            shared.in_flight.fetch_sub(1, Ordering::SeqCst);
            drop(permit);

            match outcome {
                Ok(Ok(())) => {
                    shared.completed.fetch_add(1, Ordering::SeqCst);
                    debug!(label = %label, "Upload complete");
                }
                Ok(Err(e)) => {
                    shared.failed.fetch_add(1, Ordering::SeqCst);
                    warn!(label = %label, error = %e, "Upload failed, discarding");
                }
                Err(_) => {
                    shared.failed.fetch_add(1, Ordering::SeqCst);
                    error!(label = %label, "Upload task panicked, discarding");
                }
            }
            shared.finish_one();
        });
    }
}

/// Sliding record of recent upload starts.
///
/// Holds at most `interval_cap` instants, all younger than `interval`.
#[derive(Debug, Default)]
struct IntervalWindow {
    starts: VecDeque<Instant>,
}

impl IntervalWindow {
    /// Admit one start at `now`, or return when to retry.
    fn try_admit(&mut self, now: Instant, in_flight: usize, config: &QueueConfig) -> Result<(), Instant> {
        let cap = config.interval_cap;
        if config.interval.is_zero() || cap == 0 {
            return Ok(());
        }

        while self
            .starts
            .front()
            .is_some_and(|&started| now >= started + config.interval)
        {
            self.starts.pop_front();
        }

        let occupied = if config.carryover {
            self.starts.len().max(in_flight)
        } else {
            self.starts.len()
        };

        if occupied < cap {
            self.starts.push_back(now);
            Ok(())
        } else {
            let oldest = self.starts.front().copied().unwrap_or(now);
            Err(oldest + config.interval)
        }
    }
}
