// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printrelay print: ticket rendering, the print spooler capability with its
// CUPS and raw TCP implementations, printer resolution, the local retry
// policy and printer diagnostics. This crate sits between the domain types in
// `printrelay-core` and the physical printers.

pub mod cups;
pub mod diagnostics;
pub mod raw_client;
pub mod resolver;
pub mod retry;
pub mod spooler;
pub mod ticket;

#[cfg(test)]
mod testing;

pub use cups::CupsSpooler;
pub use raw_client::RawTcpSpooler;
pub use resolver::PrinterResolver;
pub use spooler::{PrintSpooler, Probe};
pub use ticket::Ticket;
