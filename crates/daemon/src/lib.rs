// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ltsmd: the landing/staging daemon that lands client-streamed files
//! locally, then promotes them to a parallel filesystem and/or HSM archival
//! tier in the background, journaling progress in xattrs so the pipeline
//! survives a crash.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod backend;
pub mod config;
pub mod logging;
pub mod queue;
pub mod session;
pub mod supervisor;
pub mod worker;

pub use backend::{ArchiveBackend, ArchiveState, BackendError, FireAndForgetBackend, PollingBackend};
pub use config::{ConfigError, DaemonConfig};
pub use supervisor::Supervisor;
