// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The six persistent xattrs that make the landing tree its own journal
//! (§3 "Persistent Tags", I1). Keys are namespaced `user.fsq.*` — the
//! `user.` prefix is required for unprivileged xattrs on regular files on
//! Linux. Integer fields are stored as decimal ASCII text, not native-endian
//! bytes, so `getfattr -d` stays readable and encoding is endianness-free.

use std::path::Path;

use ltsmd_core::{ActionState, StorageDest};

use crate::error::LandingError;

pub const KEY_STATE: &str = "user.fsq.state";
pub const KEY_ARCHIVE_ID: &str = "user.fsq.archive_id";
pub const KEY_FS: &str = "user.fsq.fs";
pub const KEY_FPATH: &str = "user.fsq.fpath";
pub const KEY_DESC: &str = "user.fsq.desc";
pub const KEY_STORAGE_DEST: &str = "user.fsq.storage_dest";

pub const ALL_KEYS: [&str; 6] =
    [KEY_STATE, KEY_ARCHIVE_ID, KEY_FS, KEY_FPATH, KEY_DESC, KEY_STORAGE_DEST];

/// The six tags as typed values, as read back from or about to be written to
/// a landed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tags {
    pub state: ActionState,
    pub archive_id: i32,
    pub fs: String,
    pub fpath: String,
    pub desc: String,
    pub storage_dest: StorageDest,
}

/// Atomically-enough (from the caller's point of view — each `xattr::set`
/// call is itself atomic; see the daemon's xattr-write mutex for true
/// atomicity across the six keys) write all six tags onto `path`.
pub fn write_all(path: &Path, tags: &Tags) -> Result<(), LandingError> {
    set_u32(path, KEY_STATE, tags.state.as_u32())?;
    set_i32(path, KEY_ARCHIVE_ID, tags.archive_id)?;
    set_text(path, KEY_FS, &tags.fs)?;
    set_text(path, KEY_FPATH, &tags.fpath)?;
    set_text(path, KEY_DESC, &tags.desc)?;
    set_u32(path, KEY_STORAGE_DEST, tags.storage_dest.as_u32())?;
    Ok(())
}

/// Update just the `state` tag — the hot path during state-machine
/// transitions (§4.5: "every state change ... MUST first update the on-disk
/// xattr `state`").
pub fn write_state(path: &Path, state: ActionState) -> Result<(), LandingError> {
    set_u32(path, KEY_STATE, state.as_u32())
}

/// Read all six tags. Returns `MissingXattr` for the first absent key (the
/// file is then treated as foreign by the recovery scan, per §4.9.1).
pub fn read_all(path: &Path) -> Result<Tags, LandingError> {
    let state_raw = get_u32(path, KEY_STATE)?;
    let state = ActionState::from_u32(state_raw).ok_or_else(|| LandingError::InvalidXattr {
        path: path.to_path_buf(),
        key: KEY_STATE,
        value: state_raw.to_string(),
    })?;
    let archive_id = get_i32(path, KEY_ARCHIVE_ID)?;
    let fs = get_text(path, KEY_FS)?;
    let fpath = get_text(path, KEY_FPATH)?;
    let desc = get_text(path, KEY_DESC)?;
    let storage_dest_raw = get_u32(path, KEY_STORAGE_DEST)?;
    let storage_dest =
        StorageDest::from_u32(storage_dest_raw).ok_or_else(|| LandingError::InvalidXattr {
            path: path.to_path_buf(),
            key: KEY_STORAGE_DEST,
            value: storage_dest_raw.to_string(),
        })?;
    Ok(Tags { state, archive_id, fs, fpath, desc, storage_dest })
}

fn set_text(path: &Path, key: &'static str, value: &str) -> Result<(), LandingError> {
    xattr::set(path, key, value.as_bytes()).map_err(|source| LandingError::io(path, source))
}

fn set_u32(path: &Path, key: &'static str, value: u32) -> Result<(), LandingError> {
    set_text(path, key, &value.to_string())
}

fn set_i32(path: &Path, key: &'static str, value: i32) -> Result<(), LandingError> {
    set_text(path, key, &value.to_string())
}

fn get_text(path: &Path, key: &'static str) -> Result<String, LandingError> {
    let raw = xattr::get(path, key)
        .map_err(|source| LandingError::io(path, source))?
        .ok_or_else(|| LandingError::MissingXattr { path: path.to_path_buf(), key })?;
    String::from_utf8(raw).map_err(|e| LandingError::InvalidXattr {
        path: path.to_path_buf(),
        key,
        value: String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

fn get_u32(path: &Path, key: &'static str) -> Result<u32, LandingError> {
    let text = get_text(path, key)?;
    text.parse().map_err(|_| LandingError::InvalidXattr {
        path: path.to_path_buf(),
        key,
        value: text,
    })
}

fn get_i32(path: &Path, key: &'static str) -> Result<i32, LandingError> {
    let text = get_text(path, key)?;
    text.parse().map_err(|_| LandingError::InvalidXattr {
        path: path.to_path_buf(),
        key,
        value: text,
    })
}
