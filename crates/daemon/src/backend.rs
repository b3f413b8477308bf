// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Archive backend capability (§9 Design Notes: "the only real polymorphism
//! point"). The worker only ever reaches the HSM/tape system through this
//! trait, so swapping in a real TSM client means writing one more impl, not
//! touching `worker.rs`.

use async_trait::async_trait;
use thiserror::Error;

/// Errors a backend call can fail with. `worker.rs` folds any of these into
/// the Action Item's `error_count` and a `*_ERROR` state (§4.5).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend rejected {fpath}: {message}")]
    Rejected { fpath: String, message: String },

    #[error("backend unreachable: {0}")]
    Unreachable(String),
}

/// Result of `poll_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveState {
    Pending,
    Archived,
}

/// The HSM/archival backend, modelled as an opaque capability with two
/// methods. `poll_state` is optional in spirit: the default implementation
/// reports the object as already archived, which gives callers the
/// fire-and-forget behavior described in the spec without forcing every
/// backend to implement polling.
#[async_trait]
pub trait ArchiveBackend: Send + Sync + 'static {
    /// `request_archive(path, archive_id)` (§4.5 `LUSTRE_COPY_DONE` step 2).
    async fn request_archive(&self, fpath: &str, archive_id: u16) -> Result<(), BackendError>;

    /// `poll_state(path)`: re-checked every 50ms while `TSM_ARCHIVE_RUN` is
    /// in polling mode. Default: archived immediately, matching the
    /// fire-and-forget backend below.
    async fn poll_state(&self, _fpath: &str) -> Result<ArchiveState, BackendError> {
        Ok(ArchiveState::Archived)
    }

    /// Whether the worker should poll after a successful `request_archive`,
    /// or treat the request itself as the completed transition.
    fn polls(&self) -> bool {
        false
    }
}

/// Default backend: `request_archive` always succeeds and the state machine
/// moves to `TSM_ARCHIVE_DONE` immediately, without ever calling
/// `poll_state`. This is the behavior the original source left undefined
/// (`LTSMFSQ_POLL_ARCHIVE_FINISHED`-undefined mode).
#[derive(Debug, Clone, Copy, Default)]
pub struct FireAndForgetBackend;

#[async_trait]
impl ArchiveBackend for FireAndForgetBackend {
    async fn request_archive(&self, fpath: &str, archive_id: u16) -> Result<(), BackendError> {
        tracing::debug!(fpath, archive_id, "fire-and-forget archive request accepted");
        Ok(())
    }
}

/// A backend that accepts every request immediately but only reports the
/// object archived after `delay` polls, exercising the polling path without
/// needing a real HSM connection.
#[derive(Debug, Clone)]
pub struct PollingBackend {
    delay: u32,
    polls_done: std::sync::Arc<std::sync::atomic::AtomicU32>,
}

impl PollingBackend {
    pub fn new(delay: u32) -> Self {
        Self { delay, polls_done: std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0)) }
    }
}

#[async_trait]
impl ArchiveBackend for PollingBackend {
    async fn request_archive(&self, fpath: &str, archive_id: u16) -> Result<(), BackendError> {
        tracing::debug!(fpath, archive_id, "archive request accepted, will be polled");
        Ok(())
    }

    async fn poll_state(&self, _fpath: &str) -> Result<ArchiveState, BackendError> {
        let done = self.polls_done.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        if done >= self.delay {
            Ok(ArchiveState::Archived)
        } else {
            Ok(ArchiveState::Pending)
        }
    }

    fn polls(&self) -> bool {
        true
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::{ArchiveBackend, ArchiveState, BackendError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// A backend scripted to fail its first `fail_count` calls to
    /// `request_archive` for a given path, then succeed. Used to exercise
    /// the error-count/retry path (see S6: transient backend failure).
    #[derive(Clone)]
    pub struct ScriptedBackend {
        fail_count: u32,
        attempts: Arc<Mutex<std::collections::HashMap<String, u32>>>,
    }

    impl ScriptedBackend {
        pub fn failing(fail_count: u32) -> Self {
            Self { fail_count, attempts: Arc::new(Mutex::new(std::collections::HashMap::new())) }
        }

        pub fn attempts_for(&self, fpath: &str) -> u32 {
            self.attempts.lock().get(fpath).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl ArchiveBackend for ScriptedBackend {
        async fn request_archive(&self, fpath: &str, _archive_id: u16) -> Result<(), BackendError> {
            let mut attempts = self.attempts.lock();
            let count = attempts.entry(fpath.to_string()).or_insert(0);
            *count += 1;
            if *count <= self.fail_count {
                return Err(BackendError::Unreachable(format!("attempt {count} of {}", self.fail_count)));
            }
            Ok(())
        }

        async fn poll_state(&self, _fpath: &str) -> Result<ArchiveState, BackendError> {
            Ok(ArchiveState::Archived)
        }
    }
}
