// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Final storage tier requested for a landed file.
///
/// Persisted on the wire as part of `FileInfo` and on disk as the `storage_dest`
/// xattr (as its `u32` discriminant, matching the other xattr-encoded fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageDest {
    /// Discard after landing; never enqueued, no xattrs written.
    Null,
    /// Terminal state is "landed" — stays on the local landing store.
    Local,
    /// Terminal state is "copied to the parallel FS".
    Lustre,
    /// Terminal state is "archived"; the local landing copy is deleted.
    Tsm,
    /// Terminal state is "archived"; the parallel-FS copy is kept too.
    LustreTsm,
}

impl StorageDest {
    pub fn as_u32(self) -> u32 {
        match self {
            StorageDest::Null => 0,
            StorageDest::Local => 1,
            StorageDest::Lustre => 2,
            StorageDest::Tsm => 3,
            StorageDest::LustreTsm => 4,
        }
    }

    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(StorageDest::Null),
            1 => Some(StorageDest::Local),
            2 => Some(StorageDest::Lustre),
            3 => Some(StorageDest::Tsm),
            4 => Some(StorageDest::LustreTsm),
            _ => None,
        }
    }

    /// Whether the parallel-FS copy should be kept once archival completes.
    pub fn keeps_lustre_copy(self) -> bool {
        matches!(self, StorageDest::Lustre | StorageDest::LustreTsm)
    }

    /// Whether the landing-store copy should be unlinked once the
    /// destination's terminal state is reached.
    pub fn drops_landing_copy(self) -> bool {
        !matches!(self, StorageDest::Local)
    }
}

impl std::fmt::Display for StorageDest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StorageDest::Null => "null",
            StorageDest::Local => "local",
            StorageDest::Lustre => "lustre",
            StorageDest::Tsm => "tsm",
            StorageDest::LustreTsm => "lustre_tsm",
        })
    }
}
