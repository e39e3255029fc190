// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// CUPS print sink, driven through the `lpstat` and `lp` command-line tools.
//
// A CUPS queue can outlive the device behind it: the queue is still listed by
// `lpstat` after the USB printer is unplugged or the driver is removed. The
// probe therefore asks CUPS whether the queue is enabled *and* accepting
// requests, which is what `lp` itself checks before taking a job.

use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use printrelay_core::error::{RelayError, Result};

use crate::spooler::{PrintSpooler, Probe};
use crate::ticket::Ticket;

/// Upper bound for a single `lpstat` call.
const LPSTAT_TIMEOUT: Duration = Duration::from_secs(5);

/// Print sink backed by the local CUPS server.
#[derive(Debug, Clone)]
pub struct CupsSpooler {
    lp: String,
    lpstat: String,
}

impl Default for CupsSpooler {
    fn default() -> Self {
        Self::new()
    }
}

impl CupsSpooler {
    pub fn new() -> Self {
        Self {
            lp: "lp".into(),
            lpstat: "lpstat".into(),
        }
    }

    /// Use alternative binaries (e.g. absolute paths on hosts with a minimal PATH).
    pub fn with_programs(lp: impl Into<String>, lpstat: impl Into<String>) -> Self {
        Self {
            lp: lp.into(),
            lpstat: lpstat.into(),
        }
    }

    async fn lpstat(&self, args: &[&str]) -> std::io::Result<Output> {
        let child = Command::new(&self.lpstat)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();
        tokio::time::timeout(LPSTAT_TIMEOUT, child)
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "lpstat timed out"))?
    }
}

#[async_trait]
impl PrintSpooler for CupsSpooler {
    fn name(&self) -> &'static str {
        "cups"
    }

    #[instrument(skip(self))]
    async fn list_printers(&self) -> Result<Vec<String>> {
        let output = self.lpstat(&["-p"]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // "No destinations added." is an empty list, not a failure.
            if stderr.to_ascii_lowercase().contains("no destinations") {
                return Ok(Vec::new());
            }
            return Err(RelayError::spooler("cups", format!("lpstat -p: {}", stderr.trim())));
        }
        let printers = parse_printer_list(&stdout);
        debug!(count = printers.len(), "listed CUPS printers");
        Ok(printers)
    }

    async fn default_printer(&self) -> Result<Option<String>> {
        let output = self.lpstat(&["-d"]).await?;
        Ok(parse_default(&String::from_utf8_lossy(&output.stdout)))
    }

    #[instrument(skip(self))]
    async fn probe(&self, printer: &str) -> Probe {
        let state = match self.lpstat(&["-p", printer]).await {
            Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).into_owned(),
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                return Probe::not_usable(format!("CUPS does not know this printer: {}", stderr.trim()));
            }
            Err(e) => return Probe::not_usable(format!("lpstat failed: {e}")),
        };
        if let Some(reason) = disabled_reason(&state) {
            return Probe::not_usable(reason);
        }

        match self.lpstat(&["-a", printer]).await {
            Ok(out) if out.status.success() => {
                let text = String::from_utf8_lossy(&out.stdout);
                if is_accepting(&text) {
                    Probe::Usable
                } else {
                    Probe::not_usable("queue is not accepting requests")
                }
            }
            Ok(out) => Probe::not_usable(format!(
                "lpstat -a failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            )),
            Err(e) => Probe::not_usable(format!("lpstat failed: {e}")),
        }
    }

    #[instrument(skip(self, ticket), fields(title = %ticket.title))]
    async fn submit(&self, printer: &str, ticket: &Ticket) -> Result<()> {
        let bytes = ticket.escpos();
        let mut child = Command::new(&self.lp)
            .args(["-d", printer, "-o", "raw", "-t", &ticket.title])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RelayError::spooler(printer, format!("cannot start {}: {e}", self.lp)))?;

        // lp exits early (broken pipe) when the destination is gone, so a
        // write error is only reported after looking at its exit status.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&bytes).await,
            None => Ok(()),
        };

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| RelayError::spooler(printer, format!("waiting for lp: {e}")))?;

        if output.status.success() {
            if let Err(e) = written {
                return Err(RelayError::spooler(printer, format!("writing to lp: {e}")));
            }
            info!(
                printer,
                bytes = bytes.len(),
                request = %String::from_utf8_lossy(&output.stdout).trim(),
                "ticket queued in CUPS"
            );
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(printer, stderr = %stderr, "lp rejected ticket");
        Err(classify_lp_failure(printer, &stderr))
    }
}

/// Names from `lpstat -p` output (`printer NAME is idle.  enabled since ...`).
fn parse_printer_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.strip_prefix("printer "))
        .filter_map(|rest| rest.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Name from `lpstat -d` (`system default destination: NAME`).
fn parse_default(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.split_once("system default destination:"))
        .map(|(_, name)| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Why a queue listed by `lpstat -p NAME` is disabled, if it is.
fn disabled_reason(stdout: &str) -> Option<String> {
    let line = stdout.lines().find(|l| l.starts_with("printer "))?;
    if line.contains(" disabled") {
        // CUPS prints the stop reason on the following indented line.
        let detail = stdout
            .lines()
            .skip_while(|l| !l.starts_with("printer "))
            .nth(1)
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or("queue is disabled");
        Some(format!("queue is disabled ({detail})"))
    } else {
        None
    }
}

fn is_accepting(stdout: &str) -> bool {
    stdout
        .lines()
        .any(|l| l.contains("accepting requests") && !l.contains("not accepting"))
}

/// Map `lp` stderr onto the sink error taxonomy.
fn classify_lp_failure(printer: &str, stderr: &str) -> RelayError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("does not exist")
        || lower.contains("unknown destination")
        || lower.contains("not found")
        || lower.contains("not accepting")
    {
        RelayError::device(printer, stderr)
    } else {
        RelayError::spooler(printer, stderr)
    }
}
