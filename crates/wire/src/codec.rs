// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Packet encoding (C2): version byte first, then a `bincode`-encoded body.
//!
//! Keeping the version byte outside the `bincode` payload is what makes the
//! "partial peek can reject version skew before reading the variant body"
//! requirement (§4.2) possible — `peek_version` only looks at `frame[0]`.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::packet::{ErrorEnvelope, Packet, PacketBody, StateFlags, PROTOCOL_VERSION};
use crate::transport;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PacketRest {
    state: u8,
    error: Option<ErrorEnvelope>,
    body: PacketBody,
}

pub fn encode(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    let rest = PacketRest { state: packet.state, error: packet.error.clone(), body: packet.body.clone() };
    let encoded = bincode::serde::encode_to_vec(&rest, bincode::config::standard())?;
    let mut frame = Vec::with_capacity(1 + encoded.len());
    frame.push(packet.version);
    frame.extend_from_slice(&encoded);
    Ok(frame)
}

pub fn peek_version(frame: &[u8]) -> Option<u8> {
    frame.first().copied()
}

pub fn decode(frame: &[u8]) -> Result<Packet, ProtocolError> {
    let version = peek_version(frame).ok_or(ProtocolError::Short { expected: 1 })?;
    let (rest, _): (PacketRest, usize) =
        bincode::serde::decode_from_slice(&frame[1..], bincode::config::standard())?;
    Ok(Packet { version, state: rest.state, error: rest.error, body: rest.body })
}

/// `send(session, state)` (§4.2): encode and write one framed packet.
pub async fn send<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    packet: &Packet,
) -> Result<(), ProtocolError> {
    let frame = encode(packet)?;
    transport::write_message(writer, &frame).await
}

/// `recv(session, allowed_mask)` (§4.2): read one framed packet, reject a
/// version mismatch before decoding the body, then check the state bits
/// intersect `allowed`.
pub async fn recv<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
    allowed: StateFlags,
) -> Result<Packet, ProtocolError> {
    let frame = transport::read_message(reader).await?;
    let peer = peek_version(&frame).ok_or(ProtocolError::Short { expected: 1 })?;
    if peer != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch { local: PROTOCOL_VERSION, peer });
    }
    let packet = decode(&frame)?;
    let got = packet.state_flags();
    if !got.intersects(allowed) {
        return Err(ProtocolError::UnexpectedState { got: got.bits(), allowed: allowed.bits() });
    }
    Ok(packet)
}
