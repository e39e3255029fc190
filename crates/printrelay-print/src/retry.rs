// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Local retry policy for ticket submission.
//
// Classifies errors into the delivery classes of `ErrorClass` and decides,
// per failed attempt, whether to retry on the same printer, re-resolve the
// printer, or leave the job for the next poll. Only a render failure is ever
// given up on for good.

use std::time::Duration;

use printrelay_core::config::AgentConfig;
use printrelay_core::error::RelayError;
use printrelay_core::types::ErrorClass;
use tracing::{debug, info, warn};

/// Bounds for in-cycle submission retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed for transient sink errors within one cycle.
    pub attempts: u32,
    /// Fixed delay between transient attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            attempts: config.submit_attempts.max(1),
            delay: config.submit_retry_delay(),
        }
    }
}

/// Submission history of one job within the current cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attempts {
    /// Submissions made so far, including the one that just failed.
    pub made: u32,
    /// Whether the printer has already been re-resolved for this job.
    pub reresolved: bool,
}

/// What the dispatcher should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry on the same printer after this delay.
    RetryAfter(Duration),
    /// Drop the cached printer, resolve again, then retry once.
    Reresolve,
    /// Stop for this cycle; the job stays pending at the source.
    Defer,
    /// Never retry; report the job FAILED.
    GiveUp,
}

/// Classify a `RelayError` into an `ErrorClass` for retry decisions.
pub fn classify_error(err: &RelayError) -> ErrorClass {
    match err {
        RelayError::Config(_) => ErrorClass::Fatal,
        RelayError::Auth(_) => ErrorClass::Auth,

        // Transient: network, spooler hiccups, slow devices
        RelayError::Transport(_) => ErrorClass::Transient,
        RelayError::Spooler { .. } => ErrorClass::Transient,
        RelayError::Timeout { .. } => ErrorClass::Transient,

        RelayError::Device { .. } => ErrorClass::Device,

        RelayError::PrinterNotFound(_) => ErrorClass::NoPrinter,
        RelayError::PrinterNotUsable { .. } => ErrorClass::NoPrinter,

        // The payload will not get any better on the next poll
        RelayError::Render(_) => ErrorClass::Terminal,
        RelayError::Serialization(_) => ErrorClass::Terminal,

        RelayError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => ErrorClass::Device,
            _ => ErrorClass::Transient,
        },
    }
}

/// Decide what happens after `err` ended the attempt described by `attempts`.
pub fn should_retry(err: &RelayError, attempts: Attempts, policy: &RetryPolicy) -> RetryDecision {
    match classify_error(err) {
        ErrorClass::Terminal => {
            info!("terminal error, not retrying");
            RetryDecision::GiveUp
        }
        ErrorClass::Device if !attempts.reresolved => {
            debug!("device error, re-resolving printer");
            RetryDecision::Reresolve
        }
        ErrorClass::Device => {
            warn!("device error after re-resolution, deferring job");
            RetryDecision::Defer
        }
        ErrorClass::Transient => {
            if attempts.made >= policy.attempts {
                warn!(made = attempts.made, max = policy.attempts, "retry limit exhausted");
                RetryDecision::Defer
            } else {
                debug!(
                    made = attempts.made,
                    delay_ms = policy.delay.as_millis() as u64,
                    "scheduling retry"
                );
                RetryDecision::RetryAfter(policy.delay)
            }
        }
        ErrorClass::Fatal | ErrorClass::Auth | ErrorClass::NoPrinter => RetryDecision::Defer,
    }
}

/// Exponential backoff: `base * 2^failures`, capped at `max`.
///
/// Zero failures yields `base`, so a success restores the normal interval.
pub fn backoff_delay(base: Duration, failures: u32, max: Duration) -> Duration {
    let base_ms = base.as_millis() as u64;
    let exp_ms = base_ms.saturating_mul(1u64 << failures.min(20));
    Duration::from_millis(exp_ms).min(max.max(base))
}
