// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dispatch loop.
//
// One cycle: fetch pending jobs, then for each job in order render the
// ticket, make sure a printer is available, claim the job, submit it and
// acknowledge the result. Jobs are never printed concurrently.
//
// Only a render failure is reported as FAILED. Every other failure leaves the
// job unacknowledged so the next poll delivers it again. A job this agent has
// claimed but could not print is held in memory and retried first next
// cycle, since a claimed job no longer shows up as pending on the server.
//
// On shutdown, acknowledgements cut short are sent once more and every held
// job is reported FAILED, so none stays in progress at the server with no
// agent working on it. Both are bounded by `RELEASE_DEADLINE`.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use printrelay_core::config::AgentConfig;
use printrelay_core::error::{RelayError, Result};
use printrelay_core::human_errors::humanize_error;
use printrelay_core::types::{ErrorClass, JobId, JobOutcome, PrintJob};
use printrelay_print::resolver::PrinterResolver;
use printrelay_print::retry::{Attempts, RetryDecision, RetryPolicy, classify_error, should_retry};
use printrelay_print::ticket::{self, Ticket};

use crate::shutdown::Shutdown;
use crate::source::{ClaimDecision, JobSourceClient};

/// Upper bound for the final acknowledgements sent after shutdown.
const RELEASE_DEADLINE: Duration = Duration::from_secs(5);

/// Failure reason for claimed jobs released at shutdown.
const RELEASE_REASON: &str = "agent stopped before printing";

/// How one job ended within a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Printed and acknowledged as COMPLETED.
    Printed { printer: String },
    /// Could not be rendered; reported FAILED.
    Failed,
    /// Left pending for a later cycle.
    Deferred,
    /// Another agent claimed it.
    Skipped,
}

/// Per-cycle tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub printed: usize,
    pub failed: usize,
    pub deferred: usize,
    pub skipped: usize,
}

impl CycleSummary {
    fn record(&mut self, delivery: &Delivery) {
        match delivery {
            Delivery::Printed { .. } => self.printed += 1,
            Delivery::Failed => self.failed += 1,
            Delivery::Deferred => self.deferred += 1,
            Delivery::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.printed + self.failed + self.deferred + self.skipped
    }
}

pub struct Dispatcher {
    source: JobSourceClient,
    resolver: PrinterResolver,
    policy: RetryPolicy,
    paper_width: usize,
    submit_timeout: Duration,
    shutdown: Shutdown,
    /// Claimed by this agent but not printed yet.
    held: Vec<PrintJob>,
}

impl Dispatcher {
    pub fn new(
        source: JobSourceClient,
        resolver: PrinterResolver,
        config: &AgentConfig,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            source,
            resolver,
            policy: RetryPolicy::from_config(config),
            paper_width: config.paper_width,
            submit_timeout: config.submit_timeout(),
            shutdown,
            held: Vec::new(),
        }
    }

    /// Poll and dispatch until shutdown is requested.
    pub async fn run(&mut self) {
        info!("dispatch loop started");
        while !self.shutdown.is_requested() {
            let summary = self.run_cycle().await;
            if summary.total() > 0 {
                info!(
                    printed = summary.printed,
                    failed = summary.failed,
                    deferred = summary.deferred,
                    skipped = summary.skipped,
                    "cycle finished"
                );
            }
            let delay = self.source.next_poll_delay();
            if !self.shutdown.sleep(delay).await {
                break;
            }
        }
        self.release().await;
        info!("dispatch loop stopped");
    }

    /// Hand back everything this agent still owes the server before exit.
    pub async fn release(&mut self) {
        for job in std::mem::take(&mut self.held) {
            warn!(job_id = %job.id, "claimed job not printed; releasing it");
            self.source.defer_report(job.id, JobOutcome::failed(RELEASE_REASON));
        }
        if self.source.backlog_len() == 0 {
            return;
        }
        if tokio::time::timeout(RELEASE_DEADLINE, self.source.flush_backlog())
            .await
            .is_err()
        {
            warn!("final acknowledgements timed out");
        }
        let undelivered = self.source.backlog_len();
        if undelivered > 0 {
            warn!(undelivered, "stopping with undelivered acknowledgements");
        }
    }

    /// One poll cycle.
    pub async fn run_cycle(&mut self) -> CycleSummary {
        let mut summary = CycleSummary::default();
        let Some(fetched) = self.shutdown.race(self.source.fetch_pending()).await else {
            return summary;
        };

        let mut batch: Vec<(PrintJob, bool)> =
            std::mem::take(&mut self.held).into_iter().map(|job| (job, true)).collect();
        for job in fetched {
            if !batch.iter().any(|(held, _)| held.id == job.id) {
                batch.push((job, false));
            }
        }
        if !batch.is_empty() {
            debug!(jobs = batch.len(), "dispatching batch");
        }

        let mut batch = batch.into_iter();
        for (job, claimed) in batch.by_ref() {
            if self.shutdown.is_requested() {
                if claimed {
                    self.held.push(job);
                }
                break;
            }
            let delivery = self.dispatch(job, claimed).await;
            summary.record(&delivery);
        }
        // Anything left after a shutdown break that was already claimed.
        self.held
            .extend(batch.filter_map(|(job, claimed)| claimed.then_some(job)));
        summary
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, kind = %job.kind))]
    async fn dispatch(&mut self, job: PrintJob, claimed: bool) -> Delivery {
        let ticket = match ticket::render(&job, self.paper_width, Utc::now()) {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(error = %e, "ticket cannot be rendered; reporting failure");
                self.acknowledge(&job.id, JobOutcome::failed(e.to_string())).await;
                return Delivery::Failed;
            }
        };

        // A job is only claimed once a printer is there to print it.
        if let Err(e) = self.resolver.current_or_resolve().await {
            self.log_deferral(&e);
            self.hold_if(claimed, job);
            return Delivery::Deferred;
        }

        // Not raced against shutdown: once sent, the server may have
        // recorded the claim, so the answer is needed to release the job.
        let owned = if claimed {
            true
        } else {
            match self.source.claim(&job.id).await {
                ClaimDecision::Owned => true,
                ClaimDecision::Unclaimed => false,
                ClaimDecision::Skip => return Delivery::Skipped,
            }
        };

        match self.submit(&ticket).await {
            Ok(printer) => {
                info!(printer = %printer, title = %ticket.title, "ticket printed");
                self.acknowledge(&job.id, JobOutcome::Completed).await;
                Delivery::Printed { printer }
            }
            Err(e) if classify_error(&e) == ErrorClass::Terminal => {
                self.acknowledge(&job.id, JobOutcome::failed(e.to_string())).await;
                Delivery::Failed
            }
            Err(e) => {
                self.log_deferral(&e);
                self.hold_if(owned, job);
                Delivery::Deferred
            }
        }
    }

    /// Report `outcome`; if shutdown cuts the request off, it is kept for
    /// the final flush.
    async fn acknowledge(&mut self, id: &JobId, outcome: JobOutcome) {
        let sent = self
            .shutdown
            .race(self.source.report(id, outcome.clone()))
            .await;
        if sent.is_none() {
            self.source.defer_report(id.clone(), outcome);
        }
    }

    fn hold_if(&mut self, owned: bool, job: PrintJob) {
        if owned {
            self.held.push(job);
        }
    }

    fn log_deferral(&self, err: &RelayError) {
        let human = humanize_error(err);
        warn!(error = %err, "job deferred to next poll: {}", human.suggestion);
    }

    /// Submit with the local retry policy. Returns the printer that took it.
    async fn submit(&mut self, ticket: &Ticket) -> Result<String> {
        let mut attempts = Attempts::default();
        loop {
            let printer = self.resolver.current_or_resolve().await?;
            attempts.made += 1;

            let spooler = self.resolver.spooler().clone();
            let result = match tokio::time::timeout(
                self.submit_timeout,
                spooler.submit(&printer.name, ticket),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(RelayError::Timeout {
                    printer: printer.name.clone(),
                    after: self.submit_timeout,
                }),
            };

            let err = match result {
                Ok(()) => return Ok(printer.name),
                Err(e) => e,
            };

            match should_retry(&err, attempts, &self.policy) {
                RetryDecision::RetryAfter(delay) => {
                    debug!(printer = %printer, error = %err, attempt = attempts.made, "submit failed; retrying");
                    if !self.shutdown.sleep(delay).await {
                        return Err(err);
                    }
                }
                RetryDecision::Reresolve => {
                    warn!(printer = %printer, error = %err, "printer gone; selecting another");
                    self.resolver.invalidate();
                    attempts.reresolved = true;
                }
                RetryDecision::Defer | RetryDecision::GiveUp => return Err(err),
            }
        }
    }
}
