// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer selection.
//
// Picks a printer that can really take a job: an explicit name is probed and
// never silently replaced, auto-detect walks the OS printer list (thermal
// printers first, virtual sinks skipped) and keeps the first that passes its
// probe. The choice is cached until the sink reports the device gone.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use printrelay_core::config::AgentConfig;
use printrelay_core::error::{RelayError, Result};
use printrelay_core::types::PrinterCandidate;

use crate::spooler::{PrintSpooler, Probe};

/// Name fragments of printers that never produce paper.
pub const VIRTUAL_KEYWORDS: &[&str] = &[
    "pdf",
    "xps",
    "fax",
    "onenote",
    "send to",
    "to file",
    "document writer",
];

/// Whether `name` looks like a print-to-file or other virtual device.
pub fn is_virtual_device(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    VIRTUAL_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Drop virtual devices and move thermal-looking printers to the front,
/// keeping enumeration order within each group.
pub fn rank_candidates(names: Vec<String>) -> Vec<PrinterCandidate> {
    let (thermal, other): (Vec<_>, Vec<_>) = names
        .into_iter()
        .filter(|name| {
            let keep = !is_virtual_device(name);
            if !keep {
                debug!(printer = %name, "skipping virtual printer");
            }
            keep
        })
        .map(PrinterCandidate::new)
        .partition(PrinterCandidate::is_thermal);
    thermal.into_iter().chain(other).collect()
}

/// Selects and caches the printer tickets go to.
pub struct PrinterResolver {
    spooler: Arc<dyn PrintSpooler>,
    printer_name: Option<String>,
    auto_detect: bool,
    cached: Option<PrinterCandidate>,
}

impl PrinterResolver {
    pub fn new(spooler: Arc<dyn PrintSpooler>, printer_name: Option<String>, auto_detect: bool) -> Self {
        Self {
            spooler,
            printer_name,
            auto_detect,
            cached: None,
        }
    }

    pub fn from_config(spooler: Arc<dyn PrintSpooler>, config: &AgentConfig) -> Self {
        Self::new(spooler, config.printer_name.clone(), config.auto_detect_printer)
    }

    pub fn spooler(&self) -> &Arc<dyn PrintSpooler> {
        &self.spooler
    }

    /// The printer chosen by the last successful resolution.
    pub fn cached(&self) -> Option<&PrinterCandidate> {
        self.cached.as_ref()
    }

    /// Forget the cached printer; the next call resolves from scratch.
    pub fn invalidate(&mut self) {
        if let Some(old) = self.cached.take() {
            info!(printer = %old, "dropping cached printer");
        }
    }

    /// The cached printer, resolving one if there is none.
    pub async fn current_or_resolve(&mut self) -> Result<PrinterCandidate> {
        match &self.cached {
            Some(printer) => Ok(printer.clone()),
            None => self.resolve().await,
        }
    }

    /// Resolve a printer from scratch and cache it.
    #[instrument(skip(self), fields(spooler = self.spooler.name()))]
    pub async fn resolve(&mut self) -> Result<PrinterCandidate> {
        self.cached = None;
        let printer = match (&self.printer_name, self.auto_detect) {
            (Some(name), false) => self.resolve_named(name).await?,
            (preferred, true) => self.auto_detect(preferred.as_deref()).await?,
            (None, false) => self.resolve_default().await?,
        };
        info!(printer = %printer, thermal = printer.is_thermal(), "printer selected");
        self.cached = Some(printer.clone());
        Ok(printer)
    }

    async fn resolve_named(&self, name: &str) -> Result<PrinterCandidate> {
        match self.spooler.probe(name).await {
            Probe::Usable => Ok(PrinterCandidate::new(name)),
            Probe::NotUsable { reason } => {
                warn!(printer = %name, reason = %reason, "configured printer is not usable");
                Err(RelayError::PrinterNotUsable {
                    name: name.to_string(),
                    reason,
                })
            }
        }
    }

    async fn resolve_default(&self) -> Result<PrinterCandidate> {
        let default = self.spooler.default_printer().await.map_err(|e| {
            RelayError::PrinterNotFound(format!("cannot read the default printer: {e}"))
        })?;
        match default {
            Some(name) => self.resolve_named(&name).await,
            None => Err(RelayError::PrinterNotFound(
                "no printer_name configured, auto-detect is off and there is no default printer"
                    .into(),
            )),
        }
    }

    async fn auto_detect(&self, preferred: Option<&str>) -> Result<PrinterCandidate> {
        let names = self
            .spooler
            .list_printers()
            .await
            .map_err(|e| RelayError::PrinterNotFound(format!("cannot list printers: {e}")))?;

        let mut candidates = rank_candidates(names);
        if let Some(name) = preferred {
            candidates.retain(|c| c.name != name);
            candidates.insert(0, PrinterCandidate::new(name));
        }
        if candidates.is_empty() {
            return Err(RelayError::PrinterNotFound("no physical printers are installed".into()));
        }

        let mut rejected = Vec::new();
        for candidate in candidates {
            match self.spooler.probe(&candidate.name).await {
                Probe::Usable => return Ok(candidate),
                Probe::NotUsable { reason } => {
                    debug!(printer = %candidate, reason = %reason, "candidate rejected");
                    rejected.push(format!("{candidate} ({reason})"));
                }
            }
        }
        Err(RelayError::PrinterNotFound(format!(
            "none of the installed printers is usable: {}",
            rejected.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSpooler;

    fn build(spooler: ScriptedSpooler, name: Option<&str>, auto: bool) -> PrinterResolver {
        PrinterResolver::new(Arc::new(spooler), name.map(str::to_string), auto)
    }

    #[test]
    fn virtual_devices_are_filtered() {
        assert!(is_virtual_device("Microsoft Print to PDF"));
        assert!(is_virtual_device("Send To OneNote 2016"));
        assert!(is_virtual_device("Fax"));
        assert!(!is_virtual_device("TP806S"));
    }

    #[test]
    fn thermal_printers_rank_first() {
        let ranked = rank_candidates(vec![
            "HP LaserJet".into(),
            "Microsoft XPS Document Writer".into(),
            "TP806S".into(),
            "Brother".into(),
            "POS-58".into(),
        ]);
        let names: Vec<_> = ranked.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["TP806S", "POS-58", "HP LaserJet", "Brother"]);
    }

    #[tokio::test]
    async fn falls_back_to_first_usable() {
        let spooler = ScriptedSpooler::new(&["A", "B"]).unusable("A", "stale handle");
        let mut resolver = build(spooler, None, true);
        let chosen = resolver.resolve().await.unwrap();
        assert_eq!(chosen.name, "B");
        assert_eq!(resolver.cached().map(|c| c.name.as_str()), Some("B"));
    }

    #[tokio::test]
    async fn explicit_name_is_never_substituted() {
        let spooler = ScriptedSpooler::new(&["TP806S", "Other"]).unusable("TP806S", "disabled");
        let mut resolver = build(spooler, Some("TP806S"), false);
        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, RelayError::PrinterNotUsable { ref name, .. } if name == "TP806S"));
        assert!(resolver.cached().is_none());
    }

    #[tokio::test]
    async fn preferred_name_goes_first_with_auto_detect() {
        let spooler = ScriptedSpooler::new(&["POS-80", "Office"]);
        let mut resolver = build(spooler, Some("Office"), true);
        assert_eq!(resolver.resolve().await.unwrap().name, "Office");
    }

    #[tokio::test]
    async fn preferred_name_falls_back_to_auto_detect() {
        let spooler = ScriptedSpooler::new(&["POS-80", "Office"]).unusable("Office", "offline");
        let mut resolver = build(spooler, Some("Office"), true);
        assert_eq!(resolver.resolve().await.unwrap().name, "POS-80");
    }

    #[tokio::test]
    async fn no_usable_printer_is_not_found() {
        let spooler = ScriptedSpooler::new(&["A", "Microsoft Print to PDF"]).unusable("A", "gone");
        let mut resolver = build(spooler, None, true);
        let err = resolver.resolve().await.unwrap_err();
        match err {
            RelayError::PrinterNotFound(msg) => assert!(msg.contains("A (gone)")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn uses_default_printer_without_name_or_auto_detect() {
        let spooler = ScriptedSpooler::new(&["A", "B"]).with_default("B");
        let mut resolver = build(spooler, None, false);
        assert_eq!(resolver.resolve().await.unwrap().name, "B");

        let spooler = ScriptedSpooler::new(&["A"]);
        let mut resolver = build(spooler, None, false);
        assert!(matches!(
            resolver.resolve().await.unwrap_err(),
            RelayError::PrinterNotFound(_)
        ));
    }

    #[tokio::test]
    async fn re_resolves_after_invalidate() {
        let spooler = Arc::new(ScriptedSpooler::new(&["TP806S", "Backup"]));
        let mut resolver = PrinterResolver::new(spooler.clone(), None, true);
        assert_eq!(resolver.current_or_resolve().await.unwrap().name, "TP806S");

        // The cache answers without probing again.
        spooler.set_unusable("TP806S", "deleted");
        assert_eq!(resolver.current_or_resolve().await.unwrap().name, "TP806S");

        resolver.invalidate();
        assert_eq!(resolver.current_or_resolve().await.unwrap().name, "Backup");
    }
}
