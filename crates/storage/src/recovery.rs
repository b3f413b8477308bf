// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery Scan (C9): walks the landing tree at startup and re-enqueues
//! anything that was interrupted mid-pipeline.
//!
//! Re-drive policy follows RF2 in `SPEC_FULL.md`: every non-terminal state
//! (not only `FILE_OMITTED`) is reset to `LOCAL_COPY_DONE` and re-enqueued.
//! `FILE_OMITTED` is left alone unless the operator passes `reset_omitted`
//! (I3 requires an explicit trigger). `FILE_KEEP` is always left alone.

use std::os::unix::fs::MetadataExt;
use std::time::{SystemTime, UNIX_EPOCH};

use ltsmd_core::{ActionItem, ActionState};
use tracing::warn;

use crate::error::LandingError;
use crate::landing::LandingStore;
use crate::tags;

#[derive(Debug, Default)]
pub struct RecoveryReport {
    pub visited: usize,
    pub skipped_foreign: usize,
    pub skipped_terminal: usize,
    pub reenqueued: Vec<ActionItem>,
}

/// Walk `store`'s root and return the items that need re-driving.
///
/// `reset_omitted` corresponds to the `--reset-omitted` CLI flag: when set,
/// `FILE_OMITTED` files are also reset to `LOCAL_COPY_DONE` and re-enqueued.
pub fn scan(store: &LandingStore, reset_omitted: bool) -> Result<RecoveryReport, LandingError> {
    let mut report = RecoveryReport::default();

    for entry in walkdir::WalkDir::new(store.root()).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        report.visited += 1;
        let path = entry.path();

        let tags = match tags::read_all(path) {
            Ok(tags) => tags,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping foreign file during recovery scan");
                report.skipped_foreign += 1;
                continue;
            }
        };

        let should_enqueue = match tags.state {
            ActionState::FileKeep => false,
            ActionState::FileOmitted => reset_omitted,
            _ => true,
        };
        if !should_enqueue {
            report.skipped_terminal += 1;
            continue;
        }

        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(source) => {
                warn!(path = %path.display(), error = %source, "could not stat file during recovery scan");
                report.skipped_foreign += 1;
                continue;
            }
        };

        let redriven = tags.state.recovery_redrive();
        if let Err(err) = tags::write_state(path, redriven) {
            warn!(path = %path.display(), error = %err, "failed to persist re-drive state, leaving file for next scan");
            continue;
        }

        let now = now_secs();
        report.reenqueued.push(ActionItem {
            state: redriven,
            landing_path: path.display().to_string(),
            filesystem_name: tags.fs,
            fpath: tags.fpath,
            description: tags.desc,
            storage_dest: tags.storage_dest,
            size: metadata.len(),
            bytes_progressed: metadata.len(),
            error_count: 0,
            timestamps: [now, now, 0.0, 0.0],
            archive_id: tags.archive_id.max(0) as u16,
            uid: metadata.uid(),
            gid: metadata.gid(),
        });
    }

    Ok(report)
}

fn now_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landing::LandingStore;
    use crate::tags::Tags;
    use ltsmd_core::StorageDest;

    fn write_tagged_file(dir: &std::path::Path, name: &str, state: ActionState) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"hello").unwrap();
        tags::write_all(
            &path,
            &Tags {
                state,
                archive_id: 1,
                fs: "/lustre".into(),
                fpath: format!("/lustre/{name}"),
                desc: "".into(),
                storage_dest: StorageDest::Lustre,
            },
        )
        .unwrap();
        path
    }

    #[test]
    fn redrives_intermediate_states_but_leaves_file_keep_alone() {
        let dir = tempfile::tempdir().unwrap();
        write_tagged_file(dir.path(), "mid.bin", ActionState::LustreCopyRun);
        write_tagged_file(dir.path(), "done.bin", ActionState::FileKeep);

        let store = LandingStore::new(dir.path());
        let report = scan(&store, false).unwrap();

        assert_eq!(report.reenqueued.len(), 1);
        assert_eq!(report.reenqueued[0].state, ActionState::LocalCopyDone);
        assert_eq!(report.skipped_terminal, 1);
    }

    #[test]
    fn leaves_file_omitted_alone_unless_reset_requested() {
        let dir = tempfile::tempdir().unwrap();
        write_tagged_file(dir.path(), "omitted.bin", ActionState::FileOmitted);

        let store = LandingStore::new(dir.path());
        assert_eq!(scan(&store, false).unwrap().reenqueued.len(), 0);
        assert_eq!(scan(&store, true).unwrap().reenqueued.len(), 1);
    }

    #[test]
    fn untagged_file_is_skipped_as_foreign() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stray.txt"), b"not ours").unwrap();

        let store = LandingStore::new(dir.path());
        let report = scan(&store, false).unwrap();
        assert_eq!(report.skipped_foreign, 1);
        assert!(report.reenqueued.is_empty());
    }

    #[test]
    fn running_scan_twice_with_no_intervening_writes_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_tagged_file(dir.path(), "mid.bin", ActionState::LustreCopyRun);
        let store = LandingStore::new(dir.path());

        let first = scan(&store, false).unwrap();
        let second = scan(&store, false).unwrap();
        assert_eq!(first.reenqueued.len(), second.reenqueued.len());
        assert_eq!(second.reenqueued[0].state, ActionState::LocalCopyDone);
    }
}
