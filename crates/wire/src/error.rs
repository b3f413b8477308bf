// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors from framing, encoding or decoding a packet (§7). None of these
/// are fatal to the process — callers translate them into an `ERROR|REPLY`
/// and close the session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short read or write: expected {expected} bytes")]
    Short { expected: usize },

    #[error("message of {len} bytes exceeds the maximum frame size")]
    MessageTooLarge { len: u32 },

    #[error("protocol version mismatch: local={local} peer={peer}")]
    VersionMismatch { local: u8, peer: u8 },

    #[error("unexpected packet state {got:#04x}, expected one of {allowed:#04x}")]
    UnexpectedState { got: u8, allowed: u8 },

    #[error("failed to encode packet: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode packet: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

impl ProtocolError {
    /// Stable numeric code surfaced to clients inside `ErrorEnvelope`, used
    /// by S4/S5 boundary scenarios and the higher layers' `ERROR` kinds.
    pub fn code(&self) -> i32 {
        match self {
            ProtocolError::Io(_) => 5,
            ProtocolError::Short { .. } => 1,
            ProtocolError::MessageTooLarge { .. } => 2,
            ProtocolError::VersionMismatch { .. } => 3,
            ProtocolError::UnexpectedState { .. } => 4,
            ProtocolError::Encode(_) | ProtocolError::Decode(_) => 6,
        }
    }
}
