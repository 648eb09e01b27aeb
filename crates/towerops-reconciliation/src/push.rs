//! Corrective push queue.
//!
//! Drift corrections discovered during a sweep are queued rather than
//! applied inline, so one slow or broken remote call cannot block the
//! batch. The queue drains afterwards on a bounded worker pool sized for
//! I/O-bound calls; each task fails alone.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, warn};
use towerops_tracker::TrackerResult;

type PushFuture = Pin<Box<dyn Future<Output = TrackerResult<()>> + Send>>;

struct PushTask {
    label: String,
    fut: PushFuture,
}

/// Outcome counters for a drained queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushStats {
    pub succeeded: usize,
    pub failed: usize,
}

/// Queue of corrective pushes collected across one batch.
#[derive(Default)]
pub struct PushQueue {
    tasks: Vec<PushTask>,
}

impl PushQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a push task. `label` identifies the task in logs.
    pub fn enqueue<F>(&mut self, label: impl Into<String>, fut: F)
    where
        F: Future<Output = TrackerResult<()>> + Send + 'static,
    {
        self.tasks.push(PushTask {
            label: label.into(),
            fut: Box::pin(fut),
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drain the queue concurrently.
    ///
    /// Worker count is `min(pending, cpu_count * multiplier)`: these are
    /// I/O-bound network calls, so the pool runs well past the core count.
    pub async fn execute(self, multiplier: usize) -> PushStats {
        if self.tasks.is_empty() {
            debug!("Push queue empty, nothing to execute");
            return PushStats::default();
        }

        let workers = self
            .tasks
            .len()
            .min(num_cpus::get() * multiplier.max(1))
            .max(1);
        let semaphore = Arc::new(Semaphore::new(workers));

        debug!(
            pending = self.tasks.len(),
            workers, "Executing corrective pushes"
        );

        let results = futures::future::join_all(self.tasks.into_iter().map(|task| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await;
                match task.fut.await {
                    Ok(()) => {
                        debug!(label = %task.label, "Push completed");
                        true
                    }
                    Err(e) => {
                        warn!(label = %task.label, error = %e, "Push failed");
                        false
                    }
                }
            }
        }))
        .await;

        let succeeded = results.iter().filter(|ok| **ok).count();
        PushStats {
            succeeded,
            failed: results.len() - succeeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use towerops_tracker::TrackerError;

    #[tokio::test]
    async fn empty_queue_reports_nothing() {
        let stats = PushQueue::new().execute(10).await;
        assert_eq!(stats, PushStats::default());
    }

    #[tokio::test]
    async fn failures_are_isolated_from_siblings() {
        let mut queue = PushQueue::new();
        queue.enqueue("ok-1", async { Ok(()) });
        queue.enqueue("broken", async {
            Err(TrackerError::Network("connection reset".into()))
        });
        queue.enqueue("ok-2", async { Ok(()) });

        let stats = queue.execute(10).await;
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn large_queue_drains_completely() {
        let mut queue = PushQueue::new();
        for i in 0..100 {
            queue.enqueue(format!("task-{i}"), async { Ok(()) });
        }
        let stats = queue.execute(2).await;
        assert_eq!(stats.succeeded, 100);
        assert_eq!(stats.failed, 0);
    }
}
