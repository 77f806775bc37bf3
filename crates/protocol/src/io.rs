// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Async frame I/O over a byte stream

use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::pdu::{decode, encode, Pdu, ProtocolError};

/// Default timeout for writing one frame
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Read the next frame, pulling more bytes into `buf` until one is complete.
///
/// Bytes past the end of the returned frame stay in `buf` for the next call.
/// A clean EOF between frames is [`ProtocolError::ConnectionClosed`].
pub async fn read_pdu<R>(reader: &mut R, buf: &mut BytesMut) -> Result<Pdu, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(pdu) = decode(buf)? {
            return Ok(pdu);
        }
        let n = reader.read_buf(buf).await?;
        if n == 0 {
            if buf.is_empty() {
                return Err(ProtocolError::ConnectionClosed);
            }
            return Err(ProtocolError::Io(format!(
                "connection closed mid-frame ({} bytes buffered)",
                buf.len()
            )));
        }
    }
}

/// [`read_pdu`] bounded by a timeout
pub async fn read_pdu_timeout<R>(
    reader: &mut R,
    buf: &mut BytesMut,
    timeout: Duration,
) -> Result<Pdu, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    tokio::time::timeout(timeout, read_pdu(reader, buf))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

/// Encode and write one frame with a timeout
pub async fn write_pdu<W>(writer: &mut W, pdu: &Pdu, timeout: Duration) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode(pdu)?;
    tokio::time::timeout(timeout, async {
        writer.write_all(&bytes).await?;
        writer.flush().await
    })
    .await
    .map_err(|_| ProtocolError::Timeout)??;
    Ok(())
}
