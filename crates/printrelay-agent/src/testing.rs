// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory remote queue and print spooler for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use printrelay_core::error::{RelayError, Result};
use printrelay_core::types::{JobId, JobOutcome, PrintJob};
use printrelay_print::spooler::{PrintSpooler, Probe};
use printrelay_print::ticket::Ticket;

use crate::remote::{ClaimOutcome, RemoteQueue};

#[derive(Default)]
struct QueueState {
    pending: Vec<PrintJob>,
    fetch_error: Option<RelayError>,
    failing_reports: u32,
    claim_answers: VecDeque<Result<ClaimOutcome>>,
    claim_delay: Option<Duration>,
    reports: Vec<(String, JobOutcome)>,
    fetches: u32,
}

/// Behaves like the order server: a job stays pending until it is claimed or
/// an outcome for it is delivered.
#[derive(Default)]
pub struct FakeQueue {
    state: Mutex<QueueState>,
}

impl FakeQueue {
    pub fn push_jobs(&self, jobs: Vec<PrintJob>) {
        self.state.lock().unwrap().pending.extend(jobs);
    }

    /// The next fetch fails with `err`.
    pub fn fail_fetch(&self, err: RelayError) {
        self.state.lock().unwrap().fetch_error = Some(err);
    }

    /// The next `n` reports fail with a transport error.
    pub fn fail_reports(&self, n: u32) {
        self.state.lock().unwrap().failing_reports = n;
    }

    /// Answer for the next claim; claims default to `Claimed`.
    pub fn claim_answer(&self, answer: Result<ClaimOutcome>) {
        self.state.lock().unwrap().claim_answers.push_back(answer);
    }

    /// Every claim takes `delay` to answer.
    pub fn delay_claims(&self, delay: Duration) {
        self.state.lock().unwrap().claim_delay = Some(delay);
    }

    /// Outcomes the server received, in order.
    pub fn reports(&self) -> Vec<(String, JobOutcome)> {
        self.state.lock().unwrap().reports.clone()
    }

    pub fn pending_ids(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.pending.iter().map(|j| j.id.to_string()).collect()
    }

    pub fn fetches(&self) -> u32 {
        self.state.lock().unwrap().fetches
    }
}

#[async_trait]
impl RemoteQueue for FakeQueue {
    async fn fetch_pending(&self) -> Result<Vec<PrintJob>> {
        let mut state = self.state.lock().unwrap();
        state.fetches += 1;
        match state.fetch_error.take() {
            Some(err) => Err(err),
            None => Ok(state.pending.clone()),
        }
    }

    async fn claim(&self, id: &JobId, _agent_id: &str) -> Result<ClaimOutcome> {
        let delay = self.state.lock().unwrap().claim_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        let answer = state.claim_answers.pop_front().unwrap_or(Ok(ClaimOutcome::Claimed));
        if matches!(answer, Ok(ClaimOutcome::Claimed)) {
            // In progress now; no longer offered to anyone.
            state.pending.retain(|j| j.id != *id);
        }
        answer
    }

    async fn report(&self, id: &JobId, outcome: &JobOutcome) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing_reports > 0 {
            state.failing_reports -= 1;
            return Err(RelayError::Transport("connection reset".into()));
        }
        state.pending.retain(|j| j.id != *id);
        state.reports.push((id.to_string(), outcome.clone()));
        Ok(())
    }
}

#[derive(Default)]
struct SpoolerState {
    unusable: HashMap<String, String>,
    /// Scripted submit results per printer, consumed front to back.
    script: HashMap<String, VecDeque<Result<()>>>,
    /// (printer, ticket title) of every submit call.
    submits: Vec<(String, String)>,
}

/// Print spooler with scripted probe and submit results. Submits succeed
/// unless scripted otherwise.
pub struct FakeSpooler {
    printers: Vec<String>,
    state: Mutex<SpoolerState>,
}

impl FakeSpooler {
    pub fn new(printers: &[&str]) -> Self {
        Self {
            printers: printers.iter().map(|p| p.to_string()).collect(),
            state: Mutex::new(SpoolerState::default()),
        }
    }

    pub fn set_unusable(&self, printer: &str, reason: &str) {
        let mut state = self.state.lock().unwrap();
        state.unusable.insert(printer.into(), reason.into());
    }

    /// Queue a submit result for `printer`.
    pub fn script(&self, printer: &str, result: Result<()>) {
        let mut state = self.state.lock().unwrap();
        state.script.entry(printer.into()).or_default().push_back(result);
    }

    pub fn submits(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().submits.clone()
    }
}

#[async_trait]
impl PrintSpooler for FakeSpooler {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn list_printers(&self) -> Result<Vec<String>> {
        Ok(self.printers.clone())
    }

    async fn probe(&self, printer: &str) -> Probe {
        let state = self.state.lock().unwrap();
        match state.unusable.get(printer) {
            Some(reason) => Probe::not_usable(reason.clone()),
            None if self.printers.iter().any(|p| p == printer) => Probe::Usable,
            None => Probe::not_usable("unknown printer"),
        }
    }

    async fn submit(&self, printer: &str, ticket: &Ticket) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.submits.push((printer.to_string(), ticket.title.clone()));
        state
            .script
            .get_mut(printer)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(()))
    }
}
