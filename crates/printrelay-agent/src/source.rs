// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job source client.
//
// Wraps the remote queue with the agent's polling rules: fetch failures never
// reach the dispatcher (they just mean "no jobs this cycle"), a rejected token
// slows polling down, and acknowledgements that could not be delivered are
// kept and re-sent so a printed ticket is never printed twice just because
// the `complete` request got lost.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use printrelay_core::config::AgentConfig;
use printrelay_core::error::RelayError;
use printrelay_core::human_errors::humanize_error;
use printrelay_core::types::{JobId, JobOutcome, PrintJob};
use printrelay_print::retry::backoff_delay;

use crate::remote::{ClaimOutcome, RemoteQueue};

/// Undelivered acknowledgements kept in memory before the oldest is dropped.
const MAX_BACKLOG: usize = 512;

/// What to do with a job after trying to claim it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimDecision {
    /// The server recorded this agent as the owner.
    Owned,
    /// Print without ownership: claims are off, unsupported, or the request failed.
    Unclaimed,
    /// Leave the job alone.
    Skip,
}

pub struct JobSourceClient {
    queue: Arc<dyn RemoteQueue>,
    agent_id: String,
    claim_jobs: bool,
    poll_interval: Duration,
    auth_backoff_max: Duration,
    auth_failures: u32,
    transport_failures: u32,
    backlog: VecDeque<(JobId, JobOutcome)>,
}

impl JobSourceClient {
    pub fn new(queue: Arc<dyn RemoteQueue>, config: &AgentConfig) -> Self {
        Self {
            queue,
            agent_id: config.agent_id.clone(),
            claim_jobs: config.claim_jobs,
            poll_interval: config.poll_interval(),
            auth_backoff_max: config.auth_backoff_max(),
            auth_failures: 0,
            transport_failures: 0,
            backlog: VecDeque::new(),
        }
    }

    /// Consecutive polls rejected for authentication.
    pub fn auth_failures(&self) -> u32 {
        self.auth_failures
    }

    /// Acknowledgements still waiting to reach the server.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// How long to sleep before the next poll.
    pub fn next_poll_delay(&self) -> Duration {
        if self.auth_failures == 0 {
            self.poll_interval
        } else {
            backoff_delay(self.poll_interval, self.auth_failures, self.auth_backoff_max)
        }
    }

    /// Pending jobs for this cycle; empty on any failure.
    ///
    /// Re-sends undelivered acknowledgements first. A job whose outcome is
    /// still in the backlog is left out: it was already handled.
    pub async fn fetch_pending(&mut self) -> Vec<PrintJob> {
        self.flush_backlog().await;

        match self.queue.fetch_pending().await {
            Ok(jobs) => {
                if self.auth_failures > 0 {
                    info!("server accepts the API token again; normal polling resumed");
                }
                if self.transport_failures > 0 {
                    info!(failed_polls = self.transport_failures, "order server reachable again");
                }
                self.auth_failures = 0;
                self.transport_failures = 0;

                let before = jobs.len();
                let jobs: Vec<_> = jobs
                    .into_iter()
                    .filter(|job| !self.backlog.iter().any(|(id, _)| *id == job.id))
                    .collect();
                if jobs.len() < before {
                    debug!(skipped = before - jobs.len(), "jobs awaiting acknowledgement skipped");
                }
                jobs
            }
            Err(e @ RelayError::Auth(_)) => {
                self.auth_failures = self.auth_failures.saturating_add(1);
                let human = humanize_error(&e);
                error!(
                    error = %e,
                    failures = self.auth_failures,
                    next_poll_secs = self.next_poll_delay().as_secs(),
                    "{} {}",
                    human.message,
                    human.suggestion
                );
                Vec::new()
            }
            Err(e) => {
                self.transport_failures = self.transport_failures.saturating_add(1);
                if self.transport_failures == 1 {
                    warn!(error = %e, "cannot fetch jobs; retrying every poll");
                } else {
                    debug!(error = %e, failed_polls = self.transport_failures, "fetch failed again");
                }
                Vec::new()
            }
        }
    }

    /// Ask the server for ownership of `id` before printing it.
    ///
    /// Only a server that says another agent owns the job stops the print.
    pub async fn claim(&mut self, id: &JobId) -> ClaimDecision {
        if !self.claim_jobs {
            return ClaimDecision::Unclaimed;
        }
        match self.queue.claim(id, &self.agent_id).await {
            Ok(ClaimOutcome::Claimed) => ClaimDecision::Owned,
            Ok(ClaimOutcome::Unsupported) => ClaimDecision::Unclaimed,
            Ok(ClaimOutcome::AlreadyClaimed) => {
                info!(job_id = %id, "job already claimed by another agent; skipping");
                ClaimDecision::Skip
            }
            Err(e @ RelayError::Auth(_)) => {
                self.auth_failures = self.auth_failures.saturating_add(1);
                error!(job_id = %id, error = %e, "claim rejected; job left pending");
                ClaimDecision::Skip
            }
            Err(e) => {
                warn!(job_id = %id, error = %e, "claim failed; printing anyway");
                ClaimDecision::Unclaimed
            }
        }
    }

    /// Tell the server how a job ended. Undeliverable outcomes are queued
    /// and retried at the start of every cycle.
    pub async fn report(&mut self, id: &JobId, outcome: JobOutcome) {
        match self.queue.report(id, &outcome).await {
            Ok(()) => {
                self.backlog.retain(|(queued, _)| queued != id);
                debug!(job_id = %id, status = ?outcome.status(), "acknowledged");
            }
            Err(e) => {
                warn!(job_id = %id, error = %e, "acknowledgement failed; will resend");
                self.enqueue(id.clone(), outcome);
            }
        }
    }

    /// Queue an outcome without trying to send it now.
    pub fn defer_report(&mut self, id: JobId, outcome: JobOutcome) {
        debug!(job_id = %id, status = ?outcome.status(), "acknowledgement deferred");
        self.enqueue(id, outcome);
    }

    fn enqueue(&mut self, id: JobId, outcome: JobOutcome) {
        self.backlog.retain(|(queued, _)| *queued != id);
        if self.backlog.len() >= MAX_BACKLOG {
            if let Some((dropped, _)) = self.backlog.pop_front() {
                error!(job_id = %dropped, "acknowledgement backlog full; dropping oldest entry");
            }
        }
        self.backlog.push_back((id, outcome));
    }

    /// Re-send queued acknowledgements, keeping the ones that fail again.
    pub async fn flush_backlog(&mut self) {
        if self.backlog.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.backlog);
        let mut delivered = 0usize;
        for (id, outcome) in pending {
            match self.queue.report(&id, &outcome).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(job_id = %id, error = %e, "acknowledgement still undeliverable");
                    self.backlog.push_back((id, outcome));
                }
            }
        }
        if delivered > 0 {
            info!(delivered, remaining = self.backlog.len(), "resent acknowledgements");
        }
    }
}
