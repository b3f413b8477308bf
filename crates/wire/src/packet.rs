// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Current wire protocol version. Bumped whenever `Packet`'s on-wire layout
/// changes in a way that isn't backward compatible.
pub const PROTOCOL_VERSION: u8 = 1;

bitflags! {
    /// State bits carried on every packet. `recv` matches the received bits
    /// against a caller-supplied mask; `send` sets exactly the bits for the
    /// operation in flight.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StateFlags: u8 {
        const CONNECT    = 0x01;
        const OPEN       = 0x02;
        const DATA       = 0x04;
        const CLOSE      = 0x08;
        const DISCONNECT = 0x10;
        const REPLY      = 0x20;
        const ERROR      = 0x40;
    }
}

/// `{code, message}` carried alongside `ERROR|REPLY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: i32,
    pub message: String,
}

/// Longest `ErrorEnvelope::message` accepted on encode.
pub const MAX_ERROR_MESSAGE: usize = 1024;

impl ErrorEnvelope {
    /// Build an envelope, truncating `message` at a `char` boundary so it
    /// never exceeds `MAX_ERROR_MESSAGE` bytes on the wire (§3 "`message:
    /// string[≤1024]`").
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: truncate_at_char_boundary(message.into(), MAX_ERROR_MESSAGE) }
    }
}

/// Truncate `s` to at most `max_bytes` bytes without splitting a UTF-8
/// character.
pub fn truncate_at_char_boundary(mut s: String, max_bytes: usize) -> String {
    if s.len() > max_bytes {
        let mut cut = max_bytes;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
    }
    s
}

/// `CONNECT` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginInfo {
    pub node: String,
    pub password: String,
    pub hostname: String,
    pub port: u16,
}

/// `OPEN` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub filesystem_name: String,
    pub relative_path: String,
    pub description: String,
    pub storage_dest: ltsmd_core::StorageDest,
}

/// Longest `relative_path`/`filesystem_name` accepted, matching the xattr
/// ceiling on `fpath` (§3 Persistent Tags).
pub const MAX_PATH_LEN: usize = 2048;
/// Longest `description` accepted, matching the `desc` xattr ceiling.
pub const MAX_DESCRIPTION_LEN: usize = 255;

/// `DATA` body: the header preceding exactly `payload_bytes` raw bytes on
/// the wire. The payload itself is never part of `Packet` — it is streamed
/// separately by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataHeader {
    pub payload_bytes: u64,
}

/// The variant body a packet carries, chosen by the caller to match the
/// state bits being sent — the body is not separately tagged on the wire;
/// which variant is expected is implied by `state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketBody {
    None,
    Login(LoginInfo),
    File(FileInfo),
    Data(DataHeader),
}

/// One protocol packet (§4.2). `version` is encoded first on the wire, ahead
/// of everything else, so a peer can reject a version mismatch without
/// decoding the rest of the frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub version: u8,
    pub state: u8,
    pub error: Option<ErrorEnvelope>,
    pub body: PacketBody,
}

impl Packet {
    pub fn new(state: StateFlags, body: PacketBody) -> Self {
        Self { version: PROTOCOL_VERSION, state: state.bits(), error: None, body }
    }

    pub fn reply(state: StateFlags, body: PacketBody) -> Self {
        Self::new(state | StateFlags::REPLY, body)
    }

    pub fn error_reply(state: StateFlags, error: ErrorEnvelope) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            state: (state | StateFlags::REPLY | StateFlags::ERROR).bits(),
            error: Some(error),
            body: PacketBody::None,
        }
    }

    pub fn state_flags(&self) -> StateFlags {
        StateFlags::from_bits_truncate(self.state)
    }

    pub fn is_error(&self) -> bool {
        self.state_flags().contains(StateFlags::ERROR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_passes_short_messages_through_unchanged() {
        let envelope = ErrorEnvelope::new(5, "short message");
        assert_eq!(envelope.message, "short message");
    }

    #[test]
    fn error_envelope_truncates_overlong_messages_at_a_char_boundary() {
        let long = "é".repeat(MAX_ERROR_MESSAGE); // 2 bytes each, well past the limit
        let envelope = ErrorEnvelope::new(1, long);
        assert!(envelope.message.len() <= MAX_ERROR_MESSAGE);
        assert!(envelope.message.is_char_boundary(envelope.message.len()));
    }

    #[test]
    fn truncate_at_char_boundary_never_splits_a_multibyte_character() {
        let s = "a".repeat(9) + "é"; // byte 10 would land mid-character
        let truncated = truncate_at_char_boundary(s, 10);
        assert_eq!(truncated, "a".repeat(9));
    }
}
