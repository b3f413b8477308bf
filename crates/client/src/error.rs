// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors surfaced to a caller of `ltsmd-client` (C11 is symmetric to C2/C7:
/// local protocol errors propagate directly, and a `REPLY|ERROR` from the
/// server is translated into `Remote`).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Protocol(#[from] ltsmd_wire::ProtocolError),

    #[error("server error {code}: {message}")]
    Remote { code: i32, message: String },
}
