// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory spooler for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use printrelay_core::error::Result;

use crate::spooler::{PrintSpooler, Probe};
use crate::ticket::Ticket;

/// A spooler whose printer list and probe results are fixed by the test.
/// Printers are usable unless marked otherwise.
pub struct ScriptedSpooler {
    printers: Vec<String>,
    default: Option<String>,
    unusable: Mutex<HashMap<String, String>>,
}

impl ScriptedSpooler {
    pub fn new(printers: &[&str]) -> Self {
        Self {
            printers: printers.iter().map(|p| p.to_string()).collect(),
            default: None,
            unusable: Mutex::new(HashMap::new()),
        }
    }

    pub fn unusable(self, printer: &str, reason: &str) -> Self {
        self.set_unusable(printer, reason);
        self
    }

    pub fn with_default(mut self, printer: &str) -> Self {
        self.default = Some(printer.to_string());
        self
    }

    pub fn set_unusable(&self, printer: &str, reason: &str) {
        self.unusable
            .lock()
            .unwrap()
            .insert(printer.to_string(), reason.to_string());
    }
}

#[async_trait]
impl PrintSpooler for ScriptedSpooler {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn list_printers(&self) -> Result<Vec<String>> {
        Ok(self.printers.clone())
    }

    async fn default_printer(&self) -> Result<Option<String>> {
        Ok(self.default.clone())
    }

    async fn probe(&self, printer: &str) -> Probe {
        match self.unusable.lock().unwrap().get(printer) {
            Some(reason) => Probe::not_usable(reason.clone()),
            None => Probe::Usable,
        }
    }

    async fn submit(&self, _printer: &str, _ticket: &Ticket) -> Result<()> {
        Ok(())
    }
}
