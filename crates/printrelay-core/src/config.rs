// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Agent configuration.
//
// Loaded once at startup from a JSON file and never mutated afterwards.
// Changing a setting means restarting the agent.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{RelayError, Result};

/// Token value written by the installer's template config.
pub const PLACEHOLDER_TOKEN: &str = "YOUR_API_TOKEN_HERE";

/// Which platform print system delivers tickets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpoolerConfig {
    /// The system CUPS spooler, driven through `lp` / `lpstat`.
    Cups,
    /// Network thermal printers reached directly over raw TCP (port 9100).
    Raw { printers: Vec<RawPrinter> },
}

impl Default for SpoolerConfig {
    fn default() -> Self {
        Self::Cups
    }
}

/// A network printer reachable over raw TCP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPrinter {
    pub name: String,
    /// `host:port` or bare `host` (port 9100 is assumed).
    pub address: String,
}

/// Process-wide agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Base URL of the order server's print-job API.
    #[serde(default)]
    pub server_url: String,
    /// Per-restaurant credential. Never logged; see [`AgentConfig::token_fingerprint`].
    #[serde(default)]
    pub api_token: String,
    /// Seconds between polls.
    #[serde(default = "default_poll_interval", alias = "poll_interval")]
    pub poll_interval_seconds: u64,
    /// Explicit printer to use. Empty strings and `"None"` count as unset.
    #[serde(default, deserialize_with = "deserialize_printer_name")]
    pub printer_name: Option<String>,
    /// Search the OS printer list for a usable printer.
    #[serde(default = "default_true")]
    pub auto_detect_printer: bool,
    /// Timeout for each HTTP request to the order server.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Attempts per job for transient print failures within one cycle.
    #[serde(default = "default_submit_attempts")]
    pub submit_attempts: u32,
    /// Fixed delay between those attempts.
    #[serde(default = "default_submit_retry_delay")]
    pub submit_retry_delay_ms: u64,
    /// Upper bound on a single submission to the printer.
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_seconds: u64,
    /// Longest gap between polls while the server keeps rejecting the token.
    #[serde(default = "default_auth_backoff_max")]
    pub auth_backoff_max_seconds: u64,
    /// Ticket width in characters.
    #[serde(default = "default_paper_width")]
    pub paper_width: usize,
    /// Ask the server to claim each job before printing it.
    #[serde(default = "default_true")]
    pub claim_jobs: bool,
    #[serde(default)]
    pub spooler: SpoolerConfig,
    /// Identifier sent with claims. Random per process unless configured.
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
}

fn default_poll_interval() -> u64 {
    5
}
fn default_true() -> bool {
    true
}
fn default_request_timeout() -> u64 {
    10
}
fn default_submit_attempts() -> u32 {
    3
}
fn default_submit_retry_delay() -> u64 {
    500
}
fn default_submit_timeout() -> u64 {
    30
}
fn default_auth_backoff_max() -> u64 {
    300
}
fn default_paper_width() -> usize {
    32
}
fn default_agent_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn deserialize_printer_name<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s != "None"))
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            api_token: String::new(),
            poll_interval_seconds: default_poll_interval(),
            printer_name: None,
            auto_detect_printer: true,
            request_timeout_seconds: default_request_timeout(),
            submit_attempts: default_submit_attempts(),
            submit_retry_delay_ms: default_submit_retry_delay(),
            submit_timeout_seconds: default_submit_timeout(),
            auth_backoff_max_seconds: default_auth_backoff_max(),
            paper_width: default_paper_width(),
            claim_jobs: true,
            spooler: SpoolerConfig::default(),
            agent_id: default_agent_id(),
        }
    }
}

impl AgentConfig {
    /// Read, parse and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::load_unvalidated(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file without checking the server settings.
    /// Used by tools that only need the printer side of the config.
    pub fn load_unvalidated(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    /// Parse and validate config from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let config = Self::parse(text)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| RelayError::Config(format!("invalid config file: {e}")))
    }

    /// Reject settings the agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        let url = self.server_url.trim();
        if url.is_empty() {
            return Err(RelayError::Config("server_url is required".into()));
        }
        let rest = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .ok_or_else(|| {
                RelayError::Config(format!("server_url must start with http:// or https://, got '{url}'"))
            })?;
        if rest.is_empty() || rest.starts_with('/') {
            return Err(RelayError::Config(format!("server_url has no host: '{url}'")));
        }

        let token = self.api_token.trim();
        if token.is_empty() {
            return Err(RelayError::Config("api_token is required".into()));
        }
        if token == PLACEHOLDER_TOKEN {
            return Err(RelayError::Config(
                "api_token is still the placeholder; paste the token from the restaurant dashboard".into(),
            ));
        }

        if self.poll_interval_seconds == 0 {
            return Err(RelayError::Config("poll_interval_seconds must be at least 1".into()));
        }
        if self.submit_attempts == 0 {
            return Err(RelayError::Config("submit_attempts must be at least 1".into()));
        }
        if self.paper_width < 16 {
            return Err(RelayError::Config(format!(
                "paper_width {} is too narrow (minimum 16)",
                self.paper_width
            )));
        }
        if let SpoolerConfig::Raw { printers } = &self.spooler {
            if printers.is_empty() {
                return Err(RelayError::Config("raw spooler needs at least one printer".into()));
            }
        }
        Ok(())
    }

    /// `server_url` without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.server_url.trim().trim_end_matches('/')
    }

    /// Short SHA-256 fingerprint of the token, safe to print in logs.
    pub fn token_fingerprint(&self) -> String {
        let digest = Sha256::digest(self.api_token.trim().as_bytes());
        hex::encode(&digest[..4])
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn submit_retry_delay(&self) -> Duration {
        Duration::from_millis(self.submit_retry_delay_ms)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_seconds)
    }

    pub fn auth_backoff_max(&self) -> Duration {
        Duration::from_secs(self.auth_backoff_max_seconds)
    }
}
