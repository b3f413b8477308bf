// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Landing Store (C4): path construction, directory/file creation, and the
//! xattr finalize step that turns a landed file into an `ActionItem`.

use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use ltsmd_core::{ActionItem, ActionState, StorageDest};
use tokio::fs::File;

use crate::error::LandingError;
use crate::tags::{self, Tags};

/// Ceiling on each half of a landing path, matching the `fpath`/`fs` xattr
/// length limit (§3 Persistent Tags, §9 Design Notes on path-length).
pub const MAX_TAG_LEN: usize = 2048;

/// Directory creation mode for intermediate landing directories.
const DIR_MODE: u32 = 0o755;
/// File creation mode for a newly landed file.
const FILE_MODE: u32 = 0o660;

/// A landed file still being written by a session, before `finalize` commits
/// its xattrs and yields an `ActionItem`.
pub struct LandingHandle {
    pub file: File,
    pub landing_path: PathBuf,
    pub fs: String,
    pub relative_path: String,
    pub storage_dest: StorageDest,
    pub is_null: bool,
}

pub struct LandingStore {
    root: PathBuf,
}

impl LandingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `extract_hl_ll(fpath, fs) -> (high, low)` (§4.4): split `fpath` at
    /// its last `/`, after stripping a leading `fs` prefix. `low` includes
    /// the leading slash; `high` is the (possibly empty) directory prefix.
    pub fn extract_hl_ll(fpath: &str, fs: &str) -> Result<(String, String), LandingError> {
        let stripped = fpath.strip_prefix(fs).unwrap_or(fpath);
        let idx = stripped.rfind('/').unwrap_or(0);
        let (high, low) = stripped.split_at(idx);
        let low = if low.is_empty() { "/" } else { low };
        if high.len() > MAX_TAG_LEN {
            return Err(LandingError::NameTooLong { path: high.to_string(), limit: MAX_TAG_LEN });
        }
        if low.len() > MAX_TAG_LEN {
            return Err(LandingError::NameTooLong { path: low.to_string(), limit: MAX_TAG_LEN });
        }
        Ok((high.to_string(), low.to_string()))
    }

    fn path_for(&self, high: &str, low: &str) -> PathBuf {
        self.root.join(high.trim_start_matches('/')).join(low.trim_start_matches('/'))
    }

    /// Open a new landing file for `(fs, relative_path)`. `NULL` destinations
    /// open the system null device instead of constructing a path under the
    /// landing root (§4.4).
    pub async fn open(
        &self,
        fs: &str,
        relative_path: &str,
        storage_dest: StorageDest,
    ) -> Result<LandingHandle, LandingError> {
        if storage_dest == StorageDest::Null {
            let file = File::create("/dev/null")
                .await
                .map_err(|source| LandingError::io("/dev/null", source))?;
            return Ok(LandingHandle {
                file,
                landing_path: PathBuf::from("/dev/null"),
                fs: fs.to_string(),
                relative_path: relative_path.to_string(),
                storage_dest,
                is_null: true,
            });
        }

        let (high, low) = Self::extract_hl_ll(relative_path, fs)?;
        let landing_path = self.path_for(&high, &low);
        let parent = landing_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        let landing_path_for_blocking = landing_path.clone();
        let file = tokio::task::spawn_blocking(move || -> Result<std::fs::File, LandingError> {
            std::fs::DirBuilder::new()
                .recursive(true)
                .mode(DIR_MODE)
                .create(&parent)
                .map_err(|source| LandingError::io(&parent, source))?;
            std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(FILE_MODE)
                .open(&landing_path_for_blocking)
                .map_err(|source| {
                    if source.kind() == std::io::ErrorKind::AlreadyExists {
                        LandingError::AlreadyExists(landing_path_for_blocking.clone())
                    } else {
                        LandingError::io(&landing_path_for_blocking, source)
                    }
                })
        })
        .await
        .unwrap_or_else(|join_err| Err(LandingError::io(&landing_path, std::io::Error::other(join_err))))?;

        Ok(LandingHandle {
            file: File::from_std(file),
            landing_path,
            fs: fs.to_string(),
            relative_path: relative_path.to_string(),
            storage_dest,
            is_null: false,
        })
    }

    /// Commit the six xattrs and build the `ActionItem` for a completed
    /// landing (§4.4: "Only then does the session thread create and enqueue
    /// an Action Item"). Returns `None` for `NULL` destinations, which never
    /// get xattrs or an Action Item.
    pub fn finalize(
        &self,
        handle: &LandingHandle,
        desc: &str,
        size: u64,
        archive_id: u16,
        uid: u32,
        gid: u32,
    ) -> Result<Option<ActionItem>, LandingError> {
        if handle.is_null {
            return Ok(None);
        }

        let tags = Tags {
            state: ActionState::LocalCopyDone,
            archive_id: archive_id as i32,
            fs: handle.fs.clone(),
            fpath: handle.relative_path.clone(),
            desc: desc.to_string(),
            storage_dest: handle.storage_dest,
        };
        tags::write_all(&handle.landing_path, &tags)?;

        let landed_at = now_secs();
        Ok(Some(ActionItem {
            state: ActionState::LocalCopyDone,
            landing_path: handle.landing_path.display().to_string(),
            filesystem_name: handle.fs.clone(),
            fpath: handle.relative_path.clone(),
            description: desc.to_string(),
            storage_dest: handle.storage_dest,
            size,
            bytes_progressed: size,
            error_count: 0,
            timestamps: [landed_at, landed_at, 0.0, 0.0],
            archive_id,
            uid,
            gid,
        }))
    }
}

fn now_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}
