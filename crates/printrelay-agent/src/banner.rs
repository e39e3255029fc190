// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Console text shown at startup and by `check-config`.

use std::fmt::Write as _;

use printrelay_core::config::{AgentConfig, SpoolerConfig};

const WIDTH: usize = 60;

/// Startup banner: where jobs come from and where they go.
pub fn startup_banner(config: &AgentConfig, printers: &[String], selected: Option<&str>) -> String {
    let rule = "=".repeat(WIDTH);
    let mut out = String::new();
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "{:^WIDTH$}", format!("printrelay {}", env!("CARGO_PKG_VERSION")));
    let _ = writeln!(out, "{:^WIDTH$}", "Restaurant print agent");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Server:        {}", config.base_url());
    let _ = writeln!(out, "Token:         sha256:{}", config.token_fingerprint());
    let _ = writeln!(out, "Poll interval: {}s", config.poll_interval_seconds);
    let _ = writeln!(out, "Agent id:      {}", config.agent_id);

    if printers.is_empty() {
        let _ = writeln!(out, "\nAvailable printers: none");
    } else {
        let _ = writeln!(out, "\nAvailable printers:");
        for (i, name) in printers.iter().enumerate() {
            let _ = writeln!(out, "  {}. {name}", i + 1);
        }
    }
    let _ = writeln!(
        out,
        "\nSelected printer: {}",
        selected.unwrap_or("none yet (will retry every poll)")
    );
    let _ = write!(out, "{rule}");
    out
}

/// Effective configuration, with the token reduced to a fingerprint.
pub fn config_summary(config: &AgentConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "server_url              {}", config.base_url());
    let _ = writeln!(out, "api_token               sha256:{}", config.token_fingerprint());
    let _ = writeln!(out, "poll_interval_seconds   {}", config.poll_interval_seconds);
    let _ = writeln!(
        out,
        "printer_name            {}",
        config.printer_name.as_deref().unwrap_or("(not set)")
    );
    let _ = writeln!(out, "auto_detect_printer     {}", config.auto_detect_printer);
    let _ = writeln!(out, "request_timeout_seconds {}", config.request_timeout_seconds);
    let _ = writeln!(out, "submit_attempts         {}", config.submit_attempts);
    let _ = writeln!(out, "submit_retry_delay_ms   {}", config.submit_retry_delay_ms);
    let _ = writeln!(out, "submit_timeout_seconds  {}", config.submit_timeout_seconds);
    let _ = writeln!(out, "auth_backoff_max_secs   {}", config.auth_backoff_max_seconds);
    let _ = writeln!(out, "paper_width             {}", config.paper_width);
    let _ = writeln!(out, "claim_jobs              {}", config.claim_jobs);
    match &config.spooler {
        SpoolerConfig::Cups => {
            let _ = writeln!(out, "spooler                 cups");
        }
        SpoolerConfig::Raw { printers } => {
            let _ = writeln!(out, "spooler                 raw ({} printers)", printers.len());
            for p in printers {
                let _ = writeln!(out, "  {} -> {}", p.name, p.address);
            }
        }
    }
    let _ = write!(out, "agent_id                {}", config.agent_id);
    out
}
