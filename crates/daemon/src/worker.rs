// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker Thread (C8): dequeues Action Items and advances each by one state
//! transition (§4.5), realized as `N_workers` long-lived `tokio::task`s
//! pulling from the shared work queue (RF1 in `SPEC_FULL.md`). Workers never
//! touch the client socket; all wire-protocol I/O stays in `session.rs`.

use std::os::unix::fs::DirBuilderExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ltsmd_core::{ActionItem, ActionState};
use ltsmd_storage::LandingError;
use nix::unistd::{fchown, Gid, Uid};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::backend::{ArchiveBackend, ArchiveState};
use crate::queue::{QueueReceiver, QueueSender};

/// Stream buffer for the landing-store-to-parallel-FS copy, matching the
/// 1 MiB default carried in `DaemonConfig` (§6, `BUF_SIZE` in the original).
const COPY_BUFFER_BYTES: usize = 1 << 20;
/// Poll interval while `TSM_ARCHIVE_RUN` is waiting on a polling backend
/// (§4.5 "sleep 50 ms").
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Directory/file modes used on the parallel-FS side of the copy (§4.5 step
/// 2: "create missing parent directories (mode 0755) ... open destination
/// ... 0640").
const PARALLEL_DIR_MODE: u32 = 0o755;
const PARALLEL_FILE_MODE: u32 = 0o640;

/// Shared state every worker task needs.
pub struct WorkerContext {
    pub backend: Arc<dyn ArchiveBackend>,
    pub queue: QueueSender,
    /// Serializes the xattr write path (§5: shared with the session's
    /// finalize step, "defensive against kernels that have surprised us").
    pub xattr_mutex: Arc<tokio::sync::Mutex<()>>,
    /// `tolerr` (§6): `error_count > tolerance` poisons the item (I5).
    pub tolerance: u32,
}

/// One worker loop: dequeue, advance by one transition, re-enqueue or drop.
/// Exits once the queue is permanently empty (every sender dropped), which
/// only happens during process teardown.
pub async fn run(rx: QueueReceiver, ctx: Arc<WorkerContext>) {
    while let Some(item) = rx.dequeue().await {
        match advance(item, &ctx).await {
            Some(next) => {
                if ctx.queue.enqueue(next).is_err() {
                    warn!("queue closed while re-enqueueing an action item");
                }
            }
            None => {}
        }
    }
}

/// Advance one Action Item by a single state-machine step (§4.5). Returns
/// `Some(item)` to re-enqueue, or `None` once the item has reached a
/// terminal state (`FILE_KEEP`/`FILE_OMITTED`) and has been freed.
async fn advance(mut item: ActionItem, ctx: &WorkerContext) -> Option<ActionItem> {
    // I5: checked before every transition, regardless of current state.
    if item.is_poisoned(ctx.tolerance) {
        poison(&mut item, ctx).await;
        return None;
    }

    match item.state {
        ActionState::LocalCopyDone => {
            if item.storage_destination_reached() {
                return finish(item, ctx).await;
            }
            if let Err(()) = persist_state(&item, ActionState::LustreCopyRun, ctx).await {
                item.error_count += 1;
                return Some(item);
            }
            item.state = ActionState::LustreCopyRun;

            match copy_to_parallel_fs(&item).await {
                Ok(()) => {
                    item.timestamps[2] = now_secs();
                    if persist_state(&item, ActionState::LustreCopyDone, ctx).await.is_err() {
                        item.error_count += 1;
                        return Some(item);
                    }
                    item.state = ActionState::LustreCopyDone;
                    if item.storage_destination_reached() {
                        return finish(item, ctx).await;
                    }
                    Some(item)
                }
                Err(err) => {
                    warn!(fpath = %item.fpath, error = %err, "parallel-FS copy failed, retrying");
                    item.state = ActionState::LustreCopyError;
                    item.error_count += 1;
                    Some(item)
                }
            }
        }

        ActionState::LustreCopyError => {
            if persist_state(&item, ActionState::LocalCopyDone, ctx).await.is_err() {
                item.error_count += 1;
                return Some(item);
            }
            item.state = ActionState::LocalCopyDone;
            Some(item)
        }

        ActionState::LustreCopyDone => {
            if item.storage_destination_reached() {
                return finish(item, ctx).await;
            }
            if persist_state(&item, ActionState::TsmArchiveRun, ctx).await.is_err() {
                item.error_count += 1;
                return Some(item);
            }
            item.state = ActionState::TsmArchiveRun;

            match ctx.backend.request_archive(&item.fpath, item.archive_id).await {
                Ok(()) => {
                    if ctx.backend.polls() {
                        Some(item)
                    } else {
                        item.timestamps[3] = now_secs();
                        if persist_state(&item, ActionState::TsmArchiveDone, ctx).await.is_err() {
                            item.error_count += 1;
                            return Some(item);
                        }
                        item.state = ActionState::TsmArchiveDone;
                        if item.storage_destination_reached() {
                            return finish(item, ctx).await;
                        }
                        Some(item)
                    }
                }
                Err(err) => {
                    warn!(fpath = %item.fpath, error = %err, "archive request failed, retrying");
                    item.state = ActionState::TsmArchiveError;
                    item.error_count += 1;
                    Some(item)
                }
            }
        }

        ActionState::TsmArchiveRun => {
            tokio::time::sleep(POLL_INTERVAL).await;
            match ctx.backend.poll_state(&item.fpath).await {
                Ok(ArchiveState::Archived) => {
                    item.timestamps[3] = now_secs();
                    if persist_state(&item, ActionState::TsmArchiveDone, ctx).await.is_err() {
                        item.error_count += 1;
                        return Some(item);
                    }
                    item.state = ActionState::TsmArchiveDone;
                    if item.storage_destination_reached() {
                        return finish(item, ctx).await;
                    }
                    Some(item)
                }
                Ok(ArchiveState::Pending) => Some(item),
                Err(err) => {
                    warn!(fpath = %item.fpath, error = %err, "archive poll failed, retrying");
                    item.state = ActionState::TsmArchiveError;
                    item.error_count += 1;
                    Some(item)
                }
            }
        }

        ActionState::TsmArchiveError => {
            if persist_state(&item, ActionState::LustreCopyDone, ctx).await.is_err() {
                item.error_count += 1;
                return Some(item);
            }
            item.state = ActionState::LustreCopyDone;
            Some(item)
        }

        ActionState::FileOmitted | ActionState::FileKeep => {
            // Terminal states are never dequeued (I4, I5); a worker only
            // ever sees one here if a bug elsewhere re-enqueued a finished
            // item. Drop it rather than loop forever.
            warn!(fpath = %item.fpath, state = %item.state, "dequeued an item already in a terminal state");
            None
        }

        ActionState::LustreCopyRun | ActionState::TsmArchiveDone => {
            // Neither state is ever held across a dequeue boundary in normal
            // operation: LUSTRE_COPY_RUN resolves to LUSTRE_COPY_DONE/ERROR
            // within the same transition, and TSM_ARCHIVE_DONE is folded
            // into `finish` immediately. Seeing one here means an item
            // survived an unclean shutdown mid-transition; redrive it from
            // the top rather than lose it.
            warn!(fpath = %item.fpath, state = %item.state, "redriving an item found mid-transition");
            if persist_state(&item, ActionState::LocalCopyDone, ctx).await.is_err() {
                item.error_count += 1;
                return Some(item);
            }
            item.state = ActionState::LocalCopyDone;
            Some(item)
        }
    }
}

/// §4.5 "storage_destination_reached?": persist `FILE_KEEP`, clean up
/// whichever copies the destination doesn't need, and free the item.
async fn finish(item: ActionItem, ctx: &WorkerContext) -> Option<ActionItem> {
    if persist_state(&item, ActionState::FileKeep, ctx).await.is_err() {
        let mut item = item;
        item.error_count += 1;
        return Some(item);
    }
    info!(fpath = %item.fpath, storage_dest = %item.storage_dest, "file reached its requested storage tier");

    let had_parallel_copy = item.storage_dest != ltsmd_core::StorageDest::Local;
    if had_parallel_copy && !item.storage_dest.keeps_lustre_copy() {
        if let Err(err) = tokio::fs::remove_file(&item.fpath).await {
            warn!(fpath = %item.fpath, error = %err, "failed to unlink parallel-FS copy after archival");
        }
    }
    if item.storage_dest.drops_landing_copy() {
        if let Err(err) = tokio::fs::remove_file(&item.landing_path).await {
            warn!(path = %item.landing_path, error = %err, "failed to unlink landing copy after completion");
        }
    }
    None
}

/// I5: once poisoned, persist `FILE_OMITTED` and free the item. The landing
/// copy is deliberately left in place — an operator must investigate and
/// trigger a reset (I3).
async fn poison(item: &mut ActionItem, ctx: &WorkerContext) {
    warn!(
        fpath = %item.fpath,
        error_count = item.error_count,
        "error tolerance exceeded, poisoning file"
    );
    if persist_state(item, ActionState::FileOmitted, ctx).await.is_err() {
        warn!(fpath = %item.fpath, "failed to persist FILE_OMITTED; file remains in its last good state on disk");
    }
}

/// Every persisted transition updates the on-disk xattr before the
/// in-memory copy follows (§4.5: "MUST first update the on-disk xattr
/// `state`"). Serialized by the shared xattr mutex (§5).
async fn persist_state(item: &ActionItem, state: ActionState, ctx: &WorkerContext) -> Result<(), ()> {
    let path = PathBuf::from(&item.landing_path);
    let _guard = ctx.xattr_mutex.lock().await;
    let result = tokio::task::spawn_blocking(move || ltsmd_storage::write_state(&path, state))
        .await
        .unwrap_or_else(|join_err| {
            Err(LandingError::io(&item.landing_path, std::io::Error::other(join_err)))
        });
    result.map_err(|err| {
        warn!(path = %item.landing_path, error = %err, "failed to persist xattr state");
    })
}

/// §4.5 `LOCAL_COPY_DONE` step 2: copy the landed file to its target path on
/// the parallel FS, creating missing parent directories and matching
/// ownership to the identity-map entry.
async fn copy_to_parallel_fs(item: &ActionItem) -> Result<(), LandingError> {
    let dest_path = PathBuf::from(&item.fpath);
    let parent = dest_path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("/"));
    let uid = Uid::from_raw(item.uid);
    let gid = Gid::from_raw(item.gid);

    let parent_for_blocking = parent.clone();
    let mkdir_result = tokio::task::spawn_blocking(move || -> Result<(), LandingError> {
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(PARALLEL_DIR_MODE)
            .create(&parent_for_blocking)
            .map_err(|source| LandingError::io(&parent_for_blocking, source))?;
        nix::unistd::chown(&parent_for_blocking, Some(uid), Some(gid))
            .map_err(|errno| LandingError::io(&parent_for_blocking, std::io::Error::from(errno)))
    })
    .await
    .unwrap_or_else(|join_err| Err(LandingError::io(&parent, std::io::Error::other(join_err))));
    mkdir_result?;

    let landing_path = PathBuf::from(&item.landing_path);
    let source_meta = tokio::fs::metadata(&landing_path)
        .await
        .map_err(|source| LandingError::io(&landing_path, source))?;
    if source_meta.len() != item.size {
        return Err(LandingError::RangeMismatch {
            path: landing_path,
            expected: item.size,
            found: source_meta.len(),
        });
    }

    let dest_path_for_blocking = dest_path.clone();
    let dest_std_file = tokio::task::spawn_blocking(move || {
        std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(PARALLEL_FILE_MODE)
            .open(&dest_path_for_blocking)
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::AlreadyExists {
                    LandingError::AlreadyExists(dest_path_for_blocking.clone())
                } else {
                    LandingError::io(&dest_path_for_blocking, source)
                }
            })
    })
    .await
    .unwrap_or_else(|join_err| Err(LandingError::io(&dest_path, std::io::Error::other(join_err))))?;

    let mut src = tokio::fs::File::open(&landing_path)
        .await
        .map_err(|source| LandingError::io(&landing_path, source))?;
    let mut dst = tokio::fs::File::from_std(dest_std_file);
    let mut buf = vec![0u8; COPY_BUFFER_BYTES];
    loop {
        let n = tokio::io::AsyncReadExt::read(&mut src, &mut buf)
            .await
            .map_err(|source| LandingError::io(&landing_path, source))?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n]).await.map_err(|source| LandingError::io(&dest_path, source))?;
    }
    dst.flush().await.map_err(|source| LandingError::io(&dest_path, source))?;

    fchown(dst.as_raw_fd(), Some(uid), Some(gid))
        .map_err(|errno| LandingError::io(&dest_path, std::io::Error::from(errno)))?;
    Ok(())
}

fn now_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}
