// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Framed transport (C1): length-prefixed message read/write, plus the raw
//! `read_exact`/`write_all` primitives used to stream `DATA` payload bytes,
//! which travel outside any framed message.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;

/// Refuse to allocate a receive buffer larger than this many bytes for a
/// single framed message. Packets are small fixed records; this bound exists
/// only to stop a corrupt or hostile length prefix from causing an
/// unbounded allocation.
pub const MAX_MESSAGE_LEN: u32 = 64 * 1024;

/// Read one length-prefixed message: a 4-byte big-endian length followed by
/// exactly that many bytes.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(|source| short_or_io(source, 4))?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_LEN {
        return Err(ProtocolError::MessageTooLarge { len });
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await.map_err(|source| short_or_io(source, len as usize))?;
    Ok(buf)
}

/// Write one length-prefixed message.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), ProtocolError> {
    let len = u32::try_from(payload.len()).map_err(|_| ProtocolError::MessageTooLarge {
        len: u32::MAX,
    })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    Ok(())
}

/// Stream exactly `n` raw bytes from `reader` into `writer`, in chunks of at
/// most `buf.len()` bytes. Used to land `DATA` payloads directly to the
/// landing file without buffering the whole payload in memory.
///
/// `buf` is reused across calls by the caller; its length sets the chunk
/// size (§6 "1 MiB" default stream buffer).
pub async fn copy_exact<R, W>(
    reader: &mut R,
    writer: &mut W,
    mut n: u64,
    buf: &mut [u8],
) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    while n > 0 {
        let want = std::cmp::min(n, buf.len() as u64) as usize;
        reader.read_exact(&mut buf[..want]).await.map_err(|source| short_or_io(source, want))?;
        writer.write_all(&buf[..want]).await?;
        n -= want as u64;
    }
    Ok(())
}

fn short_or_io(source: std::io::Error, expected: usize) -> ProtocolError {
    if source.kind() == std::io::ErrorKind::UnexpectedEof {
        ProtocolError::Short { expected }
    } else {
        ProtocolError::Io(source)
    }
}
