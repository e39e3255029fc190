// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the printrelay print agent.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque identifier assigned to a print job by the remote order server.
///
/// The server may send either a JSON string or an integer; both are held as
/// text so the agent never interprets the value beyond equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for JobId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl Serialize for JobId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => JobId(s),
            Raw::Signed(n) => JobId(n.to_string()),
            Raw::Unsigned(n) => JobId(n.to_string()),
        })
    }
}

/// What kind of ticket a job produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Kitchen order ticket (KOT).
    KitchenOrder,
    /// Bar order ticket (BOT).
    BarOrder,
    /// Payment receipt.
    Receipt,
    /// A kind this agent does not know how to render. Kept so the job can
    /// be reported as failed instead of silently dropped.
    Unrecognised(String),
}

impl JobKind {
    /// Canonical wire keyword.
    pub fn as_str(&self) -> &str {
        match self {
            Self::KitchenOrder => "KITCHEN_ORDER",
            Self::BarOrder => "BAR_ORDER",
            Self::Receipt => "RECEIPT",
            Self::Unrecognised(raw) => raw,
        }
    }

    /// Short tag printed in large type at the top of the ticket.
    pub fn ticket_tag(&self) -> &'static str {
        match self {
            Self::KitchenOrder => "KOT",
            Self::BarOrder => "BOT",
            Self::Receipt => "RECEIPT",
            Self::Unrecognised(_) => "TICKET",
        }
    }
}

impl FromStr for JobKind {
    type Err = std::convert::Infallible;

    /// Accepts both the canonical keywords and the order server's short
    /// codes (`kot`, `bot`, `receipt`). Never fails: unknown values map to
    /// [`JobKind::Unrecognised`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "kitchen_order" | "kot" | "kitchen" => Self::KitchenOrder,
            "bar_order" | "bot" | "bar" => Self::BarOrder,
            "receipt" | "payment_receipt" => Self::Receipt,
            _ => Self::Unrecognised(s.to_string()),
        })
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JobKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        // FromStr for JobKind is infallible.
        Ok(raw.parse().unwrap_or(Self::Unrecognised(raw)))
    }
}

/// Lifecycle states of a print job. The authoritative copy lives on the
/// remote server; the agent only ever sees `Pending` jobs in a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting to be printed.
    #[serde(alias = "pending")]
    Pending,
    /// Claimed by an agent.
    #[serde(alias = "printing", alias = "in_progress")]
    InProgress,
    /// Printed and acknowledged.
    #[serde(alias = "completed")]
    Completed,
    /// Gave up; needs an operator or a server-side re-queue.
    #[serde(alias = "failed")]
    Failed,
}

/// What the agent tells the server about a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed { reason: String },
}

impl JobOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// The status the server will record for this outcome.
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Completed => JobStatus::Completed,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// A job pulled from the remote queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: JobId,
    pub kind: JobKind,
    /// Order or receipt data used to render the ticket. Opaque to the agent
    /// beyond rendering; a JSON string means pre-rendered ticket text.
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub created_at: Option<DateTime<Utc>>,
}

impl PrintJob {
    pub fn new(id: impl Into<JobId>, kind: JobKind, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind,
            payload,
            status: JobStatus::Pending,
            created_at: None,
        }
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Name fragments that identify receipt/thermal printers.
pub const THERMAL_KEYWORDS: &[&str] = &[
    "thermal", "pos", "receipt", "retsol", "tp806", "tp80", "tp58", "xprinter", "epson tm",
    "star tsp", "bixolon", "citizen",
];

/// A named device visible to the OS print system.
///
/// Whether it can actually take a job is never stored here: presence in the
/// printer list says nothing about a stale device handle, so usability is
/// always a fresh probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterCandidate {
    pub name: String,
}

impl PrinterCandidate {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Whether the name looks like a receipt/thermal printer.
    pub fn is_thermal(&self) -> bool {
        let lower = self.name.to_ascii_lowercase();
        THERMAL_KEYWORDS.iter().any(|kw| lower.contains(kw))
    }
}

impl fmt::Display for PrinterCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Classification of errors for the dispatch retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Invalid configuration; the process cannot start.
    Fatal,
    /// Credential rejected; operator must issue a new token.
    Auth,
    /// Temporary failure; safe to retry.
    Transient,
    /// The printer handle is gone; resolve a printer again.
    Device,
    /// No usable printer right now; try again next poll.
    NoPrinter,
    /// Retrying cannot help (malformed payload).
    Terminal,
}
