// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session Thread (C7): one task per accepted connection, realizing §4.2's
//! CONNECT → (OPEN → (DATA|CLOSE)* )* → DISCONNECT handshake over a `tokio`
//! task instead of an OS thread (RF1 in `SPEC_FULL.md`).

use std::sync::Arc;

use ltsmd_core::IdentityMap;
use ltsmd_storage::LandingStore;
use ltsmd_wire::{
    recv, send, DataHeader, ErrorEnvelope, FileInfo, LoginInfo, Packet, PacketBody, ProtocolError,
    StateFlags, MAX_PATH_LEN,
};
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::queue::QueueSender;

/// Errors a session can hit. Distinguishes session-fatal errors (the
/// connection is torn down) from OPEN-scoped errors (§7: "fatal to the
/// current OPEN, session continues").
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Landing(#[from] ltsmd_storage::LandingError),

    #[error("node {0:?} is not present in the identity map")]
    AuthAccessDenied(String),
}

impl SessionError {
    fn code(&self) -> i32 {
        match self {
            SessionError::Protocol(e) => e.code(),
            SessionError::Landing(ltsmd_storage::LandingError::NameTooLong { .. }) => 20,
            SessionError::Landing(ltsmd_storage::LandingError::AlreadyExists(_)) => 21,
            SessionError::Landing(_) => 22,
            SessionError::AuthAccessDenied(_) => 30,
        }
    }

    /// Whether this error should tear down the whole session, as opposed to
    /// just failing the current OPEN and letting the session continue.
    fn is_open_scoped(&self) -> bool {
        matches!(
            self,
            SessionError::Landing(
                ltsmd_storage::LandingError::NameTooLong { .. }
                    | ltsmd_storage::LandingError::AlreadyExists(_)
            )
        )
    }
}

/// Shared, read-mostly state every session task needs. Built once by the
/// supervisor and handed to each spawned session as an `Arc`.
pub struct SessionContext {
    pub identity: Arc<IdentityMap>,
    pub landing: Arc<LandingStore>,
    pub queue: QueueSender,
    /// Serializes the back-end auth probe during CONNECT (§5: "some
    /// back-ends are not multi-thread-safe during connect").
    pub auth_mutex: Arc<tokio::sync::Mutex<()>>,
    /// Serializes the xattr commit on CLOSE (§5 "defensive against kernels
    /// that have surprised us in practice").
    pub xattr_mutex: Arc<tokio::sync::Mutex<()>>,
    pub session_count: Arc<parking_lot::Mutex<usize>>,
    pub session_cap: usize,
    pub buffer_bytes: usize,
}

/// Decrements the session count on drop, however the session task exits
/// (clean DISCONNECT, fatal error, or panic unwinding).
pub struct SessionGuard {
    count: Arc<parking_lot::Mutex<usize>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        *self.count.lock() -= 1;
    }
}

/// §4.7's cap check: if accepting would exceed `session_cap`, return `None`
/// and the caller closes the new connection without reading a byte.
pub fn try_acquire_session(ctx: &SessionContext) -> Option<SessionGuard> {
    let mut count = ctx.session_count.lock();
    if *count >= ctx.session_cap {
        return None;
    }
    *count += 1;
    Some(SessionGuard { count: ctx.session_count.clone() })
}

/// Run one session to completion. Never panics on protocol or I/O failure:
/// on a session-fatal error this sends exactly one terminal `ERROR|REPLY`
/// (§4.2) before the connection is closed — `run_session_inner` itself
/// never sends an error reply, so there is a single place that does.
pub async fn run_session(stream: TcpStream, ctx: Arc<SessionContext>) {
    let peer = stream.peer_addr().ok();
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(write_half);
    run_session_with_io(&mut reader, &mut writer, &ctx, peer).await;
}

async fn run_session_with_io<R, W>(
    reader: &mut R,
    writer: &mut W,
    ctx: &SessionContext,
    peer: Option<std::net::SocketAddr>,
) where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    if let Err(err) = run_session_inner(reader, writer, ctx).await {
        warn!(?peer, error = %err, "session ended with error");
        let envelope = ErrorEnvelope::new(err.code(), err.to_string());
        let _ = send(writer, &Packet::error_reply(StateFlags::empty(), envelope)).await;
        let _ = writer.flush().await;
    }
}

async fn run_session_inner<R, W>(
    reader: &mut R,
    writer: &mut W,
    ctx: &SessionContext,
) -> Result<(), SessionError>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let entry = connect_phase(reader, writer, ctx).await?;

    loop {
        let request = recv(reader, StateFlags::OPEN | StateFlags::DISCONNECT).await?;
        if request.state_flags().contains(StateFlags::DISCONNECT) {
            return Ok(());
        }
        let file_info = match request.body {
            PacketBody::File(info) => info,
            _ => {
                return Err(SessionError::Protocol(ProtocolError::UnexpectedState {
                    got: request.state,
                    allowed: StateFlags::OPEN.bits(),
                }))
            }
        };

        match open_and_stream(reader, writer, ctx, &file_info, &entry).await {
            Ok(()) => {}
            Err(err) if err.is_open_scoped() => {
                warn!(error = %err, "OPEN failed, session continues");
                let envelope = ErrorEnvelope::new(err.code(), err.to_string());
                send(writer, &Packet::error_reply(StateFlags::OPEN, envelope)).await?;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn connect_phase<R, W>(
    reader: &mut R,
    writer: &mut W,
    ctx: &SessionContext,
) -> Result<ltsmd_core::IdentityEntry, SessionError>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let request = recv(reader, StateFlags::CONNECT).await?;
    let login = match request.body {
        PacketBody::Login(login) => login,
        _ => {
            return Err(SessionError::Protocol(ProtocolError::UnexpectedState {
                got: request.state,
                allowed: StateFlags::CONNECT.bits(),
            }))
        }
    };

    let entry = lookup_and_probe(ctx, &login).await;
    let entry = match entry {
        Some(entry) => entry,
        None => return Err(SessionError::AuthAccessDenied(login.node.clone())),
    };

    info!(node = %login.node, "session connected");
    send(writer, &Packet::reply(StateFlags::CONNECT, PacketBody::None)).await?;
    Ok(entry)
}

/// Identity-map lookup, serialized with the rest of the back-end auth probe
/// per §5's "dedicated mutex" shared-resource policy.
async fn lookup_and_probe(
    ctx: &SessionContext,
    login: &LoginInfo,
) -> Option<ltsmd_core::IdentityEntry> {
    let _guard = ctx.auth_mutex.lock().await;
    ctx.identity.lookup(&login.node).cloned()
}

/// The OPEN ... (DATA|CLOSE)* inner loop for one file (§4.2, §4.7).
async fn open_and_stream<R, W>(
    reader: &mut R,
    writer: &mut W,
    ctx: &SessionContext,
    file_info: &FileInfo,
    entry: &ltsmd_core::IdentityEntry,
) -> Result<(), SessionError>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    if file_info.relative_path.len() > MAX_PATH_LEN || file_info.filesystem_name.len() > MAX_PATH_LEN {
        return Err(SessionError::Landing(ltsmd_storage::LandingError::NameTooLong {
            path: file_info.relative_path.clone(),
            limit: MAX_PATH_LEN,
        }));
    }

    let handle = ctx
        .landing
        .open(&file_info.filesystem_name, &file_info.relative_path, file_info.storage_dest)
        .await?;
    send(writer, &Packet::reply(StateFlags::OPEN, PacketBody::None)).await?;

    let mut handle = handle;
    let mut bytes_progressed: u64 = 0;
    let mut buf = vec![0u8; ctx.buffer_bytes];

    loop {
        let request = recv(reader, StateFlags::DATA | StateFlags::CLOSE).await?;
        if request.state_flags().contains(StateFlags::CLOSE) {
            break;
        }
        let header = match request.body {
            PacketBody::Data(header) => header,
            _ => {
                return Err(SessionError::Protocol(ProtocolError::UnexpectedState {
                    got: request.state,
                    allowed: StateFlags::DATA.bits(),
                }))
            }
        };
        stream_data(reader, &mut handle, &header, &mut buf).await?;
        bytes_progressed += header.payload_bytes;
        send(writer, &Packet::reply(StateFlags::DATA, PacketBody::None)).await?;
    }

    if !handle.is_null {
        handle.file.flush().await.map_err(ProtocolError::from)?;
        let description = ltsmd_wire::truncate_at_char_boundary(
            file_info.description.clone(),
            ltsmd_wire::MAX_DESCRIPTION_LEN,
        );
        let _guard = ctx.xattr_mutex.lock().await;
        if let Some(item) = ctx.landing.finalize(
            &handle,
            &description,
            bytes_progressed,
            entry.archive_id,
            entry.uid,
            entry.gid,
        )? {
            if ctx.queue.enqueue(item).is_err() {
                warn!("queue closed while enqueueing a newly landed file");
            }
        }
    }

    send(writer, &Packet::reply(StateFlags::CLOSE, PacketBody::None)).await?;
    Ok(())
}

async fn stream_data<R>(
    reader: &mut R,
    handle: &mut ltsmd_storage::LandingHandle,
    header: &DataHeader,
    buf: &mut [u8],
) -> Result<(), SessionError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    ltsmd_wire::transport::copy_exact(reader, &mut handle.file, header.payload_bytes, buf).await?;
    Ok(())
}
