// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operator-facing error messages.
//
// The agent runs unattended next to a kitchen printer; whoever reads its
// console is usually restaurant staff, not a developer. Every error maps to a
// plain sentence and a concrete next step.

use crate::error::RelayError;

/// How urgently a person has to step in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The agent retries on its own.
    Transient,
    /// Someone has to do something (plug in the printer, fix the token).
    ActionRequired,
    /// The job itself is broken and has been marked failed.
    Permanent,
}

/// A plain-English error with a suggested fix.
#[derive(Debug, Clone)]
pub struct HumanError {
    pub message: String,
    pub suggestion: String,
    /// Whether the agent keeps retrying by itself.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `RelayError` into something the person at the till can act on.
pub fn humanize_error(err: &RelayError) -> HumanError {
    match err {
        RelayError::Config(detail) => HumanError {
            message: "The print agent's settings file has a problem.".into(),
            suggestion: format!("Fix config.json and start the agent again. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        RelayError::Auth(_) => HumanError {
            message: "The order server does not accept this agent's API token.".into(),
            suggestion: "Generate a new print token in the restaurant dashboard, put it in config.json and restart the agent.".into(),
            retriable: true,
            severity: Severity::ActionRequired,
        },

        RelayError::Transport(_) => HumanError {
            message: "Can't reach the order server.".into(),
            suggestion: "Check the internet connection. Tickets will print automatically once it is back.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        RelayError::PrinterNotFound(_) => HumanError {
            message: "No working printer was found.".into(),
            suggestion: "Make sure the thermal printer is switched on and connected, then run `printrelay diagnose` to see which printers work.".into(),
            retriable: true,
            severity: Severity::ActionRequired,
        },

        RelayError::PrinterNotUsable { name, .. } => HumanError {
            message: format!("The printer \"{name}\" can't take print jobs right now."),
            suggestion: "Check that it is switched on and has paper, or run `printrelay diagnose` and set printer_name to a printer marked USABLE.".into(),
            retriable: true,
            severity: Severity::ActionRequired,
        },

        RelayError::Device { printer, .. } => HumanError {
            message: format!("The printer \"{printer}\" has disappeared."),
            suggestion: "It may have been unplugged or removed from the system. The agent will look for another printer.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        RelayError::Spooler { printer, .. } => HumanError {
            message: format!("The print system refused a ticket for \"{printer}\"."),
            suggestion: "The agent will try again. If this keeps happening, restart the print spooler service.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        RelayError::Timeout { printer, after } => HumanError {
            message: format!("\"{printer}\" did not respond within {} seconds.", after.as_secs()),
            suggestion: "Check for a paper jam or an open cover. The ticket will be tried again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        RelayError::Render(detail) => HumanError {
            message: "A ticket from the server could not be printed because its data is incomplete.".into(),
            suggestion: format!("The job was marked failed on the server; reprint it from the order screen. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        RelayError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::NotFound {
                HumanError {
                    message: "A file the agent needs is missing.".into(),
                    suggestion: "Check the path given with --config.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            } else {
                HumanError {
                    message: "The agent had trouble reading or writing a file.".into(),
                    suggestion: "Try again. If it keeps happening, check disk space and permissions.".into(),
                    retriable: true,
                    severity: Severity::Transient,
                }
            }
        }

        RelayError::Serialization(_) => HumanError {
            message: "The order server sent data the agent does not understand.".into(),
            suggestion: "Make sure the agent and the server are up to date.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}
