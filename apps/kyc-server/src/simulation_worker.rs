// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Simulation Worker
//!
//! Background task that completes checks created against simulated vendor
//! adapters. Creating such a check enqueues a [`SimulationTask`] in the
//! durable redb queue; the worker picks it up once it is due and feeds a
//! synthetic CLEAR report through the same ingestion path a vendor webhook
//! takes.
//!
//! ## Delivery
//!
//! Tasks are acknowledged only after the resulting update is persisted, so a
//! crash between the two redelivers the task on restart. Completion is
//! idempotent: a redelivered task for a settled check is acknowledged
//! without further effect. Failed completions are rescheduled with
//! exponential backoff.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::queue::{SimulationQueue, SimulationTask};
use crate::service::KycService;

/// Default interval between queue sweeps.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Tasks taken per sweep.
const BATCH_SIZE: usize = 32;

const RETRY_BASE: Duration = Duration::from_secs(2);
const RETRY_CAP: Duration = Duration::from_secs(300);

/// Backoff before the next attempt of a task that has failed `attempts`
/// times.
fn retry_delay(attempts: u32) -> Duration {
    let factor = 1u32 << attempts.min(16);
    RETRY_BASE.saturating_mul(factor).min(RETRY_CAP)
}

/// Completes due simulated checks.
pub struct SimulationWorker {
    service: Arc<KycService>,
    queue: Arc<SimulationQueue>,
    poll_interval: Duration,
}

impl SimulationWorker {
    pub fn new(service: Arc<KycService>, queue: Arc<SimulationQueue>) -> Self {
        Self {
            service,
            queue,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the worker loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(worker.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_ms = self.poll_interval.as_millis() as u64,
            "Simulation worker starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Simulation worker shutting down");
                return;
            }

            self.poll_step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Simulation worker shutting down");
                    return;
                }
            }
        }
    }

    /// Process every task that is due now. Returns the number acknowledged.
    pub async fn poll_step(&self) -> usize {
        let due = match self.queue.due(Utc::now(), BATCH_SIZE) {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "Simulation worker: failed to read queue");
                return 0;
            }
        };
        if due.is_empty() {
            return 0;
        }
        debug!(count = due.len(), "Simulation worker: processing due tasks");

        let mut acknowledged = 0;
        for task in &due {
            if self.process(task).await {
                acknowledged += 1;
            }
        }
        acknowledged
    }

    async fn process(&self, task: &SimulationTask) -> bool {
        match self.service.complete_simulated_check(task).await {
            Ok(outcome) => {
                if let Some(outcome) = &outcome {
                    info!(
                        check_id = %task.check_id,
                        organization_id = %outcome.organization_id,
                        status = %outcome.status,
                        applied = outcome.applied,
                        "Simulation worker: completed check"
                    );
                }
                match self.queue.ack(&task.check_id) {
                    Ok(_) => true,
                    Err(e) => {
                        error!(
                            check_id = %task.check_id,
                            error = %e,
                            "Simulation worker: failed to acknowledge task"
                        );
                        false
                    }
                }
            }
            Err(e) => {
                let delay = retry_delay(task.attempts);
                warn!(
                    check_id = %task.check_id,
                    attempts = task.attempts + 1,
                    retry_in_secs = delay.as_secs(),
                    error = %e,
                    "Simulation worker: completion failed, rescheduling"
                );
                let next_due =
                    Utc::now() + TimeDelta::from_std(delay).unwrap_or_else(|_| TimeDelta::zero());
                if let Err(e) = self.queue.retry_later(&task.check_id, next_due) {
                    error!(
                        check_id = %task.check_id,
                        error = %e,
                        "Simulation worker: failed to reschedule task"
                    );
                }
                false
            }
        }
    }
}
