// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket server and connection handling.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use gdp_core::{ErrorKind, GdpError};
use gdp_engine::{Channel, Connection};
use gdp_protocol::{encode, read_pdu, Pdu, ProtocolError};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error};

use crate::lifecycle::DaemonEngine;

/// Initial read buffer; grows for large payloads
const READ_BUF: usize = 8 * 1024;

/// Outbound half of a TCP connection.
///
/// Frames are encoded by the sender and queued for a writer task, so
/// workers and subscription tasks never wait on the socket. The queue is
/// bounded; a send to a full queue fails instead of buffering without
/// limit behind a slow reader.
pub struct TcpChannel {
    id: u64,
    peer: SocketAddr,
    tx: mpsc::Sender<Bytes>,
}

impl TcpChannel {
    pub fn new(id: u64, peer: SocketAddr, tx: mpsc::Sender<Bytes>) -> Self {
        Self { id, peer, tx }
    }
}

impl Channel for TcpChannel {
    fn id(&self) -> u64 {
        self.id
    }

    fn send(&self, pdu: &Pdu) -> gdp_core::Result<()> {
        let bytes = encode(pdu)?;
        debug!(conn = self.id, cmd = %pdu.cmd, rid = ?pdu.rid, recno = ?pdu.recno, "send");
        self.tx.try_send(bytes).map_err(|e| match e {
            TrySendError::Full(_) => GdpError::internal(format!(
                "outbound queue to {} is full",
                self.peer
            )),
            TrySendError::Closed(_) => GdpError::new(
                ErrorKind::RoutingFailure,
                format!("connection to {} closed", self.peer),
            ),
        })
    }

    fn room(&self) -> Option<usize> {
        Some(self.tx.capacity())
    }
}

/// Serve one client until it disconnects
///
/// Frames from one connection are executed in arrival order; the worker
/// semaphore bounds how many execute at once across all connections.
pub async fn handle_connection(
    engine: Arc<DaemonEngine>,
    workers: Arc<Semaphore>,
    outbound: usize,
    conn_id: u64,
    stream: TcpStream,
    peer: SocketAddr,
) -> Result<(), ServerError> {
    debug!(conn = conn_id, %peer, "accepted");
    let _ = stream.set_nodelay(true);
    let (mut reader, mut writer) = stream.into_split();

    let (tx, mut rx) = mpsc::channel::<Bytes>(outbound.max(1));
    let conn = Arc::new(Connection::new(Arc::new(TcpChannel::new(conn_id, peer, tx))));

    tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if let Err(e) = writer.write_all(&bytes).await {
                debug!(conn = conn_id, "write failed: {}", e);
                break;
            }
        }
    });

    let mut buf = BytesMut::with_capacity(READ_BUF);
    let result = loop {
        let pdu = match read_pdu(&mut reader, &mut buf).await {
            Ok(pdu) => pdu,
            Err(ProtocolError::ConnectionClosed) => {
                debug!(conn = conn_id, "client disconnected");
                break Ok(());
            }
            Err(e) => break Err(ServerError::Protocol(e)),
        };
        debug!(
            conn = conn_id,
            cmd = %pdu.cmd,
            rid = ?pdu.rid,
            dst = %pdu.dst.short(),
            "received"
        );

        let Ok(permit) = Arc::clone(&workers).acquire_owned().await else {
            break Err(ServerError::ShuttingDown);
        };
        let engine_ref = Arc::clone(&engine);
        let conn_ref = Arc::clone(&conn);
        let worker = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            engine_ref.dispatch(&conn_ref, pdu);
        });
        if let Err(e) = worker.await {
            error!(conn = conn_id, "worker failed: {}", e);
        }
    };

    engine.disconnect(&conn);
    result
}

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Daemon is shutting down")]
    ShuttingDown,
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
