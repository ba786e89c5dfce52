//! Periodic SLA sweep.
//!
//! The scheduler owns no state of its own: every sweep re-reads overdue
//! candidates and escalates each one through the same conditional write that
//! human actions use, so a sweep racing an approver can only lose cleanly.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::approvals::store::{RequestStore, StoreError};
use crate::clock::Clock;
use crate::workflow::WorkflowEngine;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EscalationSettings {
    pub interval: Duration,
    pub batch_size: usize,
}

impl Default for EscalationSettings {
    fn default() -> Self {
        Self { interval: Duration::from_secs(300), batch_size: 500 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepStats {
    pub scanned: usize,
    pub escalated: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Error)]
pub enum EscalationError {
    #[error("could not list overdue requests: {0}")]
    Candidates(#[from] StoreError),
}

pub struct EscalationScheduler {
    store: Arc<dyn RequestStore>,
    clock: Arc<dyn Clock>,
    workflow: WorkflowEngine,
    settings: EscalationSettings,
}

impl EscalationScheduler {
    pub fn new(
        store: Arc<dyn RequestStore>,
        clock: Arc<dyn Clock>,
        workflow: WorkflowEngine,
        settings: EscalationSettings,
    ) -> Self {
        Self { store, clock, workflow, settings }
    }

    pub fn settings(&self) -> &EscalationSettings {
        &self.settings
    }

    /// Escalates at most one batch of overdue requests. Per-record failures
    /// are counted, never propagated.
    pub async fn sweep(&self) -> Result<SweepStats, EscalationError> {
        let now = self.clock.now();
        let candidates = match self.store.list_overdue(now, self.settings.batch_size).await {
            Ok(candidates) => candidates,
            Err(error) => {
                error!(
                    event_name = "escalation.sweep_failed",
                    correlation_id = "scheduler",
                    error = %error,
                    "could not list overdue requests"
                );
                return Err(error.into());
            }
        };

        let mut stats = SweepStats { scanned: candidates.len(), ..SweepStats::default() };
        for request in &candidates {
            let transition = match self.workflow.escalate(request, now) {
                Ok(transition) => transition,
                Err(refusal) => {
                    debug!(
                        event_name = "escalation.race_lost",
                        request_id = %request.id,
                        reason = %refusal,
                        "candidate no longer eligible"
                    );
                    stats.skipped += 1;
                    continue;
                }
            };

            match self.store.apply_transition(&transition).await {
                Ok(true) => {
                    stats.escalated += 1;
                    info!(
                        event_name = "escalation.request_escalated",
                        correlation_id = "scheduler",
                        request_id = %transition.request_id,
                        level = %transition.event.level,
                        sla_deadline = %request.sla_deadline,
                        "request escalated after SLA breach"
                    );
                }
                Ok(false) => {
                    stats.skipped += 1;
                    debug!(
                        event_name = "escalation.race_lost",
                        request_id = %transition.request_id,
                        expected_version = transition.expected_version,
                        "request changed before escalation could commit"
                    );
                }
                Err(error) => {
                    stats.failed += 1;
                    warn!(
                        event_name = "escalation.record_failed",
                        correlation_id = "scheduler",
                        request_id = %transition.request_id,
                        error = %error,
                        "escalation write failed; will retry next sweep"
                    );
                }
            }
        }

        if stats.scanned > 0 {
            info!(
                event_name = "escalation.sweep_completed",
                correlation_id = "scheduler",
                scanned = stats.scanned,
                escalated = stats.escalated,
                skipped = stats.skipped,
                failed = stats.failed,
                "escalation sweep completed"
            );
        }
        Ok(stats)
    }

    /// Spawns the periodic loop. The first sweep runs immediately.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let scheduler = self;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.settings.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                event_name = "escalation.scheduler_started",
                correlation_id = "scheduler",
                interval_secs = scheduler.settings.interval.as_secs(),
                batch_size = scheduler.settings.batch_size,
                "escalation scheduler started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Failures are already logged inside the sweep.
                        let _ = scheduler.sweep().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!(
                event_name = "escalation.scheduler_stopped",
                correlation_id = "scheduler",
                "escalation scheduler stopped"
            );
        });

        SchedulerHandle { shutdown, task }
    }
}

pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signals the loop and waits for the in-flight sweep to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(join_error) = self.task.await {
            error!(
                event_name = "escalation.scheduler_stopped",
                correlation_id = "scheduler",
                error = %join_error,
                "escalation scheduler task ended abnormally"
            );
        }
    }
}
