//! Long-lived polling runner.
//!
//! Repeats the open and closed sweeps forever. Overlapping runs of the
//! same job are excluded through the store's advisory lock, whose ttl
//! bounds how long a crashed holder can block successors. Fatal auth
//! failures put the runner into a cooldown before the next attempt; the
//! stop flag is honored between batches and, inside the engine, between
//! issues.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};
use towerops_db::{LockStore, Store};
use towerops_tracker::TrackerApi;

use crate::engine::ReconciliationEngine;
use crate::notify::Notifier;

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Minimum duration of one cycle; fast cycles sleep out the rest so the
    /// tracker is not hammered when there is nothing to do.
    pub min_cycle: Duration,
    /// Sleep applied after a fatal (auth) failure before trying again.
    pub fatal_cooldown: Duration,
    /// Advisory lock name for this job.
    pub lock_name: String,
    /// Lock lifetime; a crashed holder blocks successors for at most this.
    pub lock_ttl: chrono::Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            min_cycle: Duration::from_secs(10),
            fatal_cooldown: Duration::from_secs(60),
            lock_name: "towerops-reconcile".into(),
            lock_ttl: chrono::Duration::minutes(10),
        }
    }
}

/// Drives the engine in a loop until stopped.
pub struct Runner<S, T, N> {
    engine: ReconciliationEngine<S, T, N>,
    config: RunnerConfig,
    stop: Arc<AtomicBool>,
}

impl<S, T, N> Runner<S, T, N>
where
    S: Store,
    T: TrackerApi + 'static,
    N: Notifier,
{
    #[must_use]
    pub fn new(engine: ReconciliationEngine<S, T, N>, config: RunnerConfig) -> Self {
        Self {
            engine,
            config,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops the loop; hand it to a signal handler.
    #[must_use]
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Run until the stop flag is raised.
    pub async fn run(&self) {
        info!(
            lock = %self.config.lock_name,
            min_cycle_secs = self.config.min_cycle.as_secs(),
            "Reconciliation runner started"
        );

        while !self.stop.load(Ordering::Relaxed) {
            let cycle_start = Instant::now();

            match self.run_cycle().await {
                CycleOutcome::Done => {}
                CycleOutcome::LockHeld => {
                    debug!("Another run holds the lock, waiting for the next cycle");
                }
                CycleOutcome::Fatal => {
                    warn!(
                        cooldown_secs = self.config.fatal_cooldown.as_secs(),
                        "Fatal failure, cooling down before the next attempt"
                    );
                    tokio::time::sleep(self.config.fatal_cooldown).await;
                }
            }

            // Pace the loop: a cycle never completes faster than min_cycle.
            let elapsed = cycle_start.elapsed();
            if elapsed < self.config.min_cycle && !self.stop.load(Ordering::Relaxed) {
                tokio::time::sleep(self.config.min_cycle - elapsed).await;
            }
        }

        info!("Reconciliation runner stopped");
    }

    async fn run_cycle(&self) -> CycleOutcome {
        let store = self.engine.store();

        let locked = match store
            .try_lock_run(&self.config.lock_name, self.config.lock_ttl)
            .await
        {
            Ok(locked) => locked,
            Err(e) => {
                error!(error = %e, "Failed to take the run lock");
                return CycleOutcome::Done;
            }
        };
        if !locked {
            return CycleOutcome::LockHeld;
        }

        let mut outcome = CycleOutcome::Done;

        match self.engine.sweep_open(&self.stop).await {
            Ok(report) => {
                if report.has_errors() {
                    warn!(
                        errors = report.errors,
                        push_failures = report.push_failures,
                        "Open sweep finished with per-item errors"
                    );
                }
            }
            Err(e) if e.is_fatal_auth() => {
                error!(error = %e, "Open sweep aborted");
                outcome = CycleOutcome::Fatal;
            }
            Err(e) => {
                error!(error = %e, "Open sweep failed");
            }
        }

        if outcome == CycleOutcome::Done && !self.stop.load(Ordering::Relaxed) {
            match self.engine.sweep_closed(&self.stop).await {
                Ok(_) => {}
                Err(e) if e.is_fatal_auth() => {
                    error!(error = %e, "Closed sweep aborted");
                    outcome = CycleOutcome::Fatal;
                }
                Err(e) => {
                    error!(error = %e, "Closed sweep failed");
                }
            }
        }

        if let Err(e) = store.unlock_run(&self.config.lock_name).await {
            warn!(error = %e, "Failed to release the run lock; it expires by ttl");
        }

        outcome
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    Done,
    LockHeld,
    Fatal,
}
