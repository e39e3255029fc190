// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic print sink capability.
//
// The resolver and the dispatcher only ever talk to a printer through this
// trait, so the same delivery logic runs against CUPS, raw network printers,
// or a scripted fake in tests.

use std::sync::Arc;

use async_trait::async_trait;

use printrelay_core::config::SpoolerConfig;
use printrelay_core::error::Result;

use crate::ticket::Ticket;

/// Outcome of a usability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// The printer accepted the minimal interaction a real job would need.
    Usable,
    /// Listed by the OS but cannot take a job right now.
    NotUsable { reason: String },
}

impl Probe {
    pub fn not_usable(reason: impl Into<String>) -> Self {
        Self::NotUsable {
            reason: reason.into(),
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Usable)
    }
}

/// A system that can list printers, check them and take jobs.
#[async_trait]
pub trait PrintSpooler: Send + Sync {
    /// Short name for logs (e.g. "cups", "raw-tcp").
    fn name(&self) -> &'static str;

    /// Printer names visible to the OS, in enumeration order.
    async fn list_printers(&self) -> Result<Vec<String>>;

    /// The system default printer, if the platform has that notion.
    async fn default_printer(&self) -> Result<Option<String>> {
        Ok(None)
    }

    /// Check that `printer` can really take a job, not just that it is listed.
    async fn probe(&self, printer: &str) -> Probe;

    /// Send a rendered ticket to `printer`.
    ///
    /// Errors must be one of `RelayError::Device` (printer missing/deleted),
    /// `RelayError::Spooler` or `RelayError::Timeout`.
    async fn submit(&self, printer: &str, ticket: &Ticket) -> Result<()>;
}

/// Build the spooler selected in the config.
pub fn from_config(config: &SpoolerConfig) -> Arc<dyn PrintSpooler> {
    match config {
        SpoolerConfig::Cups => Arc::new(crate::cups::CupsSpooler::new()),
        SpoolerConfig::Raw { printers } => {
            Arc::new(crate::raw_client::RawTcpSpooler::new(printers.clone()))
        }
    }
}
