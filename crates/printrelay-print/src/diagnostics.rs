// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer diagnostics.
//
// Probes every printer the spooler lists, the same way the resolver does,
// and turns the results into a report an operator can act on: which printers
// really take jobs, which ones look like receipt printers, and what to try
// for the ones that don't.

use std::fmt::Write as _;

use printrelay_core::types::PrinterCandidate;
use tracing::{info, instrument};

use crate::resolver::{is_virtual_device, rank_candidates};
use crate::spooler::{PrintSpooler, Probe};

/// Probe result for one printer.
#[derive(Debug, Clone)]
pub struct PrinterReport {
    pub name: String,
    /// Name matches a receipt/thermal printer keyword.
    pub thermal: bool,
    /// Print-to-file or similar; never chosen by auto-detect.
    pub virtual_device: bool,
    pub probe: Probe,
}

impl PrinterReport {
    pub fn is_usable(&self) -> bool {
        self.probe.is_usable()
    }
}

/// What the operator should configure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recommendation {
    /// Usable thermal printers, best first.
    Thermal(Vec<String>),
    /// No thermal printer passed, but these did.
    OtherUsable(Vec<String>),
    /// Nothing can print.
    NoUsablePrinter,
}

impl Recommendation {
    /// The printer auto-detect would select.
    pub fn first_choice(&self) -> Option<&str> {
        match self {
            Self::Thermal(names) | Self::OtherUsable(names) => names.first().map(String::as_str),
            Self::NoUsablePrinter => None,
        }
    }
}

/// Full diagnostic report.
#[derive(Debug, Clone)]
pub struct DiagnosticReport {
    /// Spooler that was queried ("cups", "raw-tcp").
    pub spooler: &'static str,
    /// Per-printer results in enumeration order.
    pub printers: Vec<PrinterReport>,
    /// System default printer and its probe, if there is one.
    pub default_printer: Option<(String, Probe)>,
    /// Set when the printer list itself could not be read.
    pub listing_error: Option<String>,
}

impl DiagnosticReport {
    pub fn usable(&self) -> impl Iterator<Item = &PrinterReport> {
        self.printers.iter().filter(|p| p.is_usable())
    }

    pub fn unusable(&self) -> impl Iterator<Item = &PrinterReport> {
        self.printers.iter().filter(|p| !p.is_usable())
    }

    /// Usable printers in the order auto-detect tries them.
    pub fn recommendation(&self) -> Recommendation {
        let ranked = rank_candidates(self.usable().map(|p| p.name.clone()).collect());
        let (thermal, other): (Vec<_>, Vec<_>) =
            ranked.into_iter().partition(PrinterCandidate::is_thermal);
        let names = |group: Vec<PrinterCandidate>| -> Vec<String> {
            group.into_iter().map(|c| c.name).collect()
        };
        if !thermal.is_empty() {
            Recommendation::Thermal(names(thermal))
        } else if !other.is_empty() {
            Recommendation::OtherUsable(names(other))
        } else {
            Recommendation::NoUsablePrinter
        }
    }

    /// Plain-text report for the terminal.
    pub fn render(&self) -> String {
        let rule = "=".repeat(70);
        let mut out = String::new();
        let _ = writeln!(out, "{rule}\n  PRINTER DIAGNOSTICS ({})\n{rule}\n", self.spooler);

        if let Some(err) = &self.listing_error {
            let _ = writeln!(out, "Could not list printers: {err}\n");
        }
        if self.printers.is_empty() {
            let _ = writeln!(out, "No printers found.\n");
            let _ = writeln!(out, "Install the printer (or add it to the config) first.");
            return out;
        }

        let _ = writeln!(out, "Found {} printer(s):\n", self.printers.len());
        for (i, p) in self.printers.iter().enumerate() {
            let verdict = if p.is_usable() { "USABLE" } else { "NOT USABLE" };
            let mut tags = String::new();
            if p.thermal {
                tags.push_str(" [THERMAL]");
            }
            if p.virtual_device {
                tags.push_str(" [VIRTUAL]");
            }
            let _ = writeln!(out, "{}. {}\n   {verdict}{tags}", i + 1, p.name);
            if let Probe::NotUsable { reason } = &p.probe {
                let _ = writeln!(out, "   Error: {reason}");
            }
            out.push('\n');
        }

        let usable = self.usable().count();
        let thermal = self.usable().filter(|p| p.thermal).count();
        let _ = writeln!(out, "{rule}\nSUMMARY\n{rule}");
        let _ = writeln!(out, "Total printers: {}", self.printers.len());
        let _ = writeln!(out, "Usable printers: {usable}");
        let _ = writeln!(out, "Unusable printers: {}", self.printers.len() - usable);
        let _ = writeln!(out, "Thermal printers usable: {thermal}\n");

        let recommendation = self.recommendation();
        match &recommendation {
            Recommendation::Thermal(names) => {
                let _ = writeln!(out, "RECOMMENDED PRINTER(S) FOR AUTO-PRINT:");
                for name in names {
                    let _ = writeln!(out, "  * {name}");
                }
            }
            Recommendation::OtherUsable(names) => {
                let _ = writeln!(out, "NO THERMAL PRINTER DETECTED. Usable printers:");
                for name in names {
                    let _ = writeln!(out, "  * {name}");
                }
            }
            Recommendation::NoUsablePrinter => {
                let _ = writeln!(out, "NO PRINTER CAN TAKE JOBS RIGHT NOW.");
            }
        }
        if let Some(name) = recommendation.first_choice() {
            let _ = writeln!(out, "Auto-detect will use: {name}");
        }
        out.push('\n');

        if self.unusable().next().is_some() {
            let _ = writeln!(out, "HOW TO FIX:");
            for (i, step) in fix_steps(self.spooler).iter().enumerate() {
                let _ = writeln!(out, "  {}. {step}", i + 1);
            }
            out.push('\n');
        }

        match &self.default_printer {
            Some((name, Probe::Usable)) => {
                let _ = writeln!(out, "Default printer: {name} (usable)");
            }
            Some((name, Probe::NotUsable { .. })) => {
                let _ = writeln!(out, "Default printer: {name} (NOT USABLE)");
            }
            None => {
                let _ = writeln!(out, "Default printer: not set");
            }
        }
        out
    }
}

fn fix_steps(spooler: &str) -> &'static [&'static str] {
    match spooler {
        "raw-tcp" => &[
            "Check the printer is powered on and cabled to the network",
            "Check the configured address (print a self-test page to see its IP)",
            "Make sure nothing else holds port 9100 open on the printer",
        ],
        _ => &[
            "Check the printer is powered on and connected",
            "Re-enable a stopped queue: cupsenable NAME && cupsaccept NAME",
            "Remove and re-add the queue (lpadmin -x NAME, then add it again)",
            "Restart CUPS: sudo systemctl restart cups",
        ],
    }
}

/// Probe every printer the spooler lists.
#[instrument(skip_all, fields(spooler = spooler.name()))]
pub async fn run_diagnostics(spooler: &dyn PrintSpooler) -> DiagnosticReport {
    let mut report = DiagnosticReport {
        spooler: spooler.name(),
        printers: Vec::new(),
        default_printer: None,
        listing_error: None,
    };

    let names = match spooler.list_printers().await {
        Ok(names) => names,
        Err(e) => {
            report.listing_error = Some(e.to_string());
            Vec::new()
        }
    };

    for name in names {
        let probe = spooler.probe(&name).await;
        report.printers.push(PrinterReport {
            thermal: PrinterCandidate::new(name.as_str()).is_thermal(),
            virtual_device: is_virtual_device(&name),
            probe,
            name,
        });
    }

    if let Ok(Some(name)) = spooler.default_printer().await {
        let probe = match report.printers.iter().find(|p| p.name == name) {
            Some(p) => p.probe.clone(),
            None => spooler.probe(&name).await,
        };
        report.default_printer = Some((name, probe));
    }

    info!(
        total = report.printers.len(),
        usable = report.usable().count(),
        "diagnostics finished"
    );
    report
}
