// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printrelay agent: the remote job queue client, job source bookkeeping,
// the dispatch loop and shutdown handling behind the `printrelay` binary.

pub mod banner;
pub mod dispatch;
pub mod remote;
pub mod shutdown;
pub mod source;

#[cfg(test)]
mod testing;

pub use dispatch::Dispatcher;
pub use remote::{HttpRemoteQueue, RemoteQueue};
pub use source::JobSourceClient;
