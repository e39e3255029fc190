// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw TCP print sink (JetDirect, port 9100).
//
// Most networked thermal printers accept ESC/POS bytes on port 9100 with no
// protocol on top: open a socket, write the ticket, close. There is no job
// tracking and no feedback, so the only signals are whether the connection
// opens and whether the write completes.

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, instrument};

use printrelay_core::config::RawPrinter;
use printrelay_core::error::{RelayError, Result};

use crate::spooler::{PrintSpooler, Probe};
use crate::ticket::Ticket;

/// Default raw TCP port (HP JetDirect).
pub const RAW_PORT: u16 = 9100;

/// Timeout for opening a connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Write size; thermal printers have small input buffers.
const CHUNK_SIZE: usize = 4096;

/// Print sink for a fixed set of network printers.
#[derive(Debug, Clone)]
pub struct RawTcpSpooler {
    printers: Vec<RawPrinter>,
}

impl RawTcpSpooler {
    pub fn new(printers: Vec<RawPrinter>) -> Self {
        Self { printers }
    }

    /// `host:port` for a configured printer name.
    fn address_of(&self, printer: &str) -> Option<String> {
        self.printers
            .iter()
            .find(|p| p.name == printer)
            .map(|p| with_default_port(&p.address))
    }

    async fn connect(&self, printer: &str) -> Result<TcpStream> {
        let addr = self
            .address_of(printer)
            .ok_or_else(|| RelayError::device(printer, "not in the configured printer list"))?;

        tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| RelayError::Timeout {
                printer: printer.to_string(),
                after: CONNECT_TIMEOUT,
            })?
            .map_err(|e| classify_connect_error(printer, &addr, e))
    }
}

/// Append the JetDirect port when the address has none.
fn with_default_port(address: &str) -> String {
    let address = address.trim();
    // IPv6 literals are written `[::1]:9100`; a bare `[::1]` has no port.
    let has_port = match address.rfind(']') {
        Some(close) => address[close..].contains(':'),
        None => address.contains(':'),
    };
    if has_port {
        address.to_string()
    } else {
        format!("{address}:{RAW_PORT}")
    }
}

fn classify_connect_error(printer: &str, addr: &str, e: std::io::Error) -> RelayError {
    match e.kind() {
        ErrorKind::TimedOut => RelayError::Timeout {
            printer: printer.to_string(),
            after: CONNECT_TIMEOUT,
        },
        ErrorKind::Interrupted | ErrorKind::WouldBlock => {
            RelayError::spooler(printer, format!("connect to {addr}: {e}"))
        }
        // Refused, unreachable, unknown host: nothing is listening there.
        _ => RelayError::device(printer, format!("connect to {addr}: {e}")),
    }
}

#[async_trait]
impl PrintSpooler for RawTcpSpooler {
    fn name(&self) -> &'static str {
        "raw-tcp"
    }

    async fn list_printers(&self) -> Result<Vec<String>> {
        Ok(self.printers.iter().map(|p| p.name.clone()).collect())
    }

    /// A connection that opens is as close to "would accept a job" as raw
    /// TCP gets. Nothing is written.
    async fn probe(&self, printer: &str) -> Probe {
        match self.connect(printer).await {
            Ok(mut stream) => {
                let _ = stream.shutdown().await;
                Probe::Usable
            }
            Err(e) => Probe::not_usable(e.to_string()),
        }
    }

    #[instrument(skip(self, ticket), fields(title = %ticket.title))]
    async fn submit(&self, printer: &str, ticket: &Ticket) -> Result<()> {
        let bytes = ticket.escpos();
        let mut stream = self.connect(printer).await?;
        info!(printer, total = bytes.len(), "sending ticket via raw TCP");

        let mut sent = 0usize;
        for chunk in bytes.chunks(CHUNK_SIZE) {
            stream.write_all(chunk).await.map_err(|e| {
                RelayError::spooler(printer, format!("raw TCP send failed at byte {sent}: {e}"))
            })?;
            sent += chunk.len();
            debug!(sent, total = bytes.len(), "raw TCP progress");
        }

        stream
            .flush()
            .await
            .map_err(|e| RelayError::spooler(printer, format!("raw TCP flush: {e}")))?;
        stream
            .shutdown()
            .await
            .map_err(|e| RelayError::spooler(printer, format!("raw TCP shutdown: {e}")))?;

        info!(printer, total = bytes.len(), "ticket sent via raw TCP");
        Ok(())
    }
}
