// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for printrelay.

use std::time::Duration;

use thiserror::Error;

/// Top-level error type for all printrelay operations.
#[derive(Debug, Error)]
pub enum RelayError {
    // -- Startup --
    #[error("configuration error: {0}")]
    Config(String),

    // -- Remote job queue --
    #[error("server rejected the API token: {0}")]
    Auth(String),

    #[error("could not reach the job server: {0}")]
    Transport(String),

    // -- Printer selection --
    #[error("no usable printer found: {0}")]
    PrinterNotFound(String),

    #[error("printer '{name}' is not usable: {reason}")]
    PrinterNotUsable { name: String, reason: String },

    // -- Print sink --
    #[error("printer '{printer}' is gone: {detail}")]
    Device { printer: String, detail: String },

    #[error("spooler error on '{printer}': {detail}")]
    Spooler { printer: String, detail: String },

    #[error("printing to '{printer}' timed out after {}s", after.as_secs())]
    Timeout { printer: String, after: Duration },

    // -- Ticket rendering --
    #[error("cannot render ticket: {0}")]
    Render(String),

    // -- Local I/O --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RelayError {
    pub fn device(printer: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Device {
            printer: printer.into(),
            detail: detail.into(),
        }
    }

    pub fn spooler(printer: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Spooler {
            printer: printer.into(),
            detail: detail.into(),
        }
    }

    /// The printer the error concerns, if any.
    pub fn printer(&self) -> Option<&str> {
        match self {
            Self::PrinterNotUsable { name, .. } => Some(name),
            Self::Device { printer, .. }
            | Self::Spooler { printer, .. }
            | Self::Timeout { printer, .. } => Some(printer),
            _ => None,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RelayError>;
