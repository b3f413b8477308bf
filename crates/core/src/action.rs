// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use crate::StorageDest;

/// The state of one in-flight file as it moves from landed to its final
/// storage tier (§4.5). Every value here is also the `state` xattr's
/// decimal encoding (`as_u32`/`from_u32`) — the on-disk representation IS
/// this enum, not a separate wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionState {
    LocalCopyDone,
    LustreCopyRun,
    LustreCopyError,
    LustreCopyDone,
    TsmArchiveRun,
    TsmArchiveError,
    TsmArchiveDone,
    FileOmitted,
    FileKeep,
}

impl ActionState {
    pub fn as_u32(self) -> u32 {
        match self {
            ActionState::LocalCopyDone => 0,
            ActionState::LustreCopyRun => 1,
            ActionState::LustreCopyError => 2,
            ActionState::LustreCopyDone => 3,
            ActionState::TsmArchiveRun => 4,
            ActionState::TsmArchiveError => 5,
            ActionState::TsmArchiveDone => 6,
            ActionState::FileOmitted => 7,
            ActionState::FileKeep => 8,
        }
    }

    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => ActionState::LocalCopyDone,
            1 => ActionState::LustreCopyRun,
            2 => ActionState::LustreCopyError,
            3 => ActionState::LustreCopyDone,
            4 => ActionState::TsmArchiveRun,
            5 => ActionState::TsmArchiveError,
            6 => ActionState::TsmArchiveDone,
            7 => ActionState::FileOmitted,
            8 => ActionState::FileKeep,
            _ => return None,
        })
    }

    /// `FILE_KEEP` and `FILE_OMITTED` are terminal: no worker ever dequeues
    /// an item already in one of these states (I4, I5).
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionState::FileKeep | ActionState::FileOmitted)
    }

    /// Recovery-scan re-drive target for a non-terminal state found on disk
    /// (RF2 in SPEC_FULL.md: every intermediate state re-drives from the top,
    /// not only `FILE_OMITTED`).
    pub fn recovery_redrive(self) -> ActionState {
        match self {
            ActionState::FileOmitted | ActionState::FileKeep => self,
            _ => ActionState::LocalCopyDone,
        }
    }
}

impl std::fmt::Display for ActionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ActionState::LocalCopyDone => "LOCAL_COPY_DONE",
            ActionState::LustreCopyRun => "LUSTRE_COPY_RUN",
            ActionState::LustreCopyError => "LUSTRE_COPY_ERROR",
            ActionState::LustreCopyDone => "LUSTRE_COPY_DONE",
            ActionState::TsmArchiveRun => "TSM_ARCHIVE_RUN",
            ActionState::TsmArchiveError => "TSM_ARCHIVE_ERROR",
            ActionState::TsmArchiveDone => "TSM_ARCHIVE_DONE",
            ActionState::FileOmitted => "FILE_OMITTED",
            ActionState::FileKeep => "FILE_KEEP",
        })
    }
}

/// In-memory record describing one in-flight file (§3 "Action Item").
///
/// Owned by whichever thread/task currently holds it: a session thread
/// builds it after landing a file, the work queue holds it between hops,
/// and exactly one worker owns it while advancing its state (I4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub state: ActionState,
    /// Absolute path to the file inside the landing store.
    pub landing_path: String,
    /// `fs` from the open request (the client-supplied filesystem name).
    pub filesystem_name: String,
    /// `fpath` from the open request: target path on the parallel FS.
    pub fpath: String,
    pub description: String,
    pub storage_dest: StorageDest,
    pub size: u64,
    pub bytes_progressed: u64,
    pub error_count: u32,
    /// [received, landed, copied, archived], seconds since the Unix epoch.
    pub timestamps: [f64; 4],
    pub archive_id: u16,
    pub uid: u32,
    pub gid: u32,
}

impl ActionItem {
    /// §4.5 "storage_destination_reached?" check: is `state` the terminal
    /// state implied by `storage_dest`?
    pub fn storage_destination_reached(&self) -> bool {
        match self.storage_dest {
            StorageDest::Local => self.state == ActionState::LocalCopyDone,
            StorageDest::Lustre => self.state == ActionState::LustreCopyDone,
            StorageDest::Tsm | StorageDest::LustreTsm => self.state == ActionState::TsmArchiveDone,
            StorageDest::Null => false,
        }
    }

    /// I5: once `error_count` exceeds `tolerance` the item must be poisoned
    /// on the next transition attempt, regardless of which state it is in.
    pub fn is_poisoned(&self, tolerance: u32) -> bool {
        self.error_count > tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(state: ActionState, dest: StorageDest) -> ActionItem {
        ActionItem {
            state,
            landing_path: "/landing/a/b".into(),
            filesystem_name: "/lustre".into(),
            fpath: "/lustre/a/b".into(),
            description: String::new(),
            storage_dest: dest,
            size: 0,
            bytes_progressed: 0,
            error_count: 0,
            timestamps: [0.0; 4],
            archive_id: 1,
            uid: 100,
            gid: 100,
        }
    }

    #[test]
    fn state_u32_round_trips() {
        for state in [
            ActionState::LocalCopyDone,
            ActionState::LustreCopyRun,
            ActionState::LustreCopyError,
            ActionState::LustreCopyDone,
            ActionState::TsmArchiveRun,
            ActionState::TsmArchiveError,
            ActionState::TsmArchiveDone,
            ActionState::FileOmitted,
            ActionState::FileKeep,
        ] {
            assert_eq!(ActionState::from_u32(state.as_u32()), Some(state));
        }
    }

    #[test]
    fn destination_reached_matches_table() {
        assert!(item(ActionState::LocalCopyDone, StorageDest::Local).storage_destination_reached());
        assert!(!item(ActionState::LocalCopyDone, StorageDest::Lustre).storage_destination_reached());
        assert!(item(ActionState::LustreCopyDone, StorageDest::Lustre).storage_destination_reached());
        assert!(item(ActionState::TsmArchiveDone, StorageDest::Tsm).storage_destination_reached());
        assert!(item(ActionState::TsmArchiveDone, StorageDest::LustreTsm).storage_destination_reached());
        assert!(!item(ActionState::LustreCopyDone, StorageDest::Tsm).storage_destination_reached());
    }

    #[test]
    fn poison_bound_is_strictly_greater_than_tolerance() {
        let mut a = item(ActionState::LustreCopyError, StorageDest::Lustre);
        a.error_count = 4;
        assert!(!a.is_poisoned(4));
        a.error_count = 5;
        assert!(a.is_poisoned(4));
    }

    #[test]
    fn recovery_redrive_resets_intermediate_states_but_not_terminal_ones() {
        assert_eq!(ActionState::LustreCopyRun.recovery_redrive(), ActionState::LocalCopyDone);
        assert_eq!(ActionState::TsmArchiveError.recovery_redrive(), ActionState::LocalCopyDone);
        assert_eq!(ActionState::FileKeep.recovery_redrive(), ActionState::FileKeep);
        assert_eq!(ActionState::FileOmitted.recovery_redrive(), ActionState::FileOmitted);
    }
}
