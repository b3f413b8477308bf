// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The wire protocol (C1/C2): framed transport, packet types, and the
//! version-gated codec shared by the daemon's session handler and the
//! client library.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod codec;
mod error;
mod packet;
pub mod transport;

pub use codec::{decode, encode, peek_version, recv, send};
pub use error::ProtocolError;
pub use packet::{
    truncate_at_char_boundary, DataHeader, ErrorEnvelope, FileInfo, LoginInfo, Packet, PacketBody,
    StateFlags, MAX_DESCRIPTION_LEN, MAX_ERROR_MESSAGE, MAX_PATH_LEN, PROTOCOL_VERSION,
};
