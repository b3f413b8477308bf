// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the landing store and recovery scan (§7).
#[derive(Debug, Error)]
pub enum LandingError {
    #[error("I/O error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("path exceeds the {limit}-byte xattr ceiling: {path}")]
    NameTooLong { path: String, limit: usize },

    #[error("landing file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("file {path} is missing xattr {key}, treating as foreign")]
    MissingXattr { path: PathBuf, key: &'static str },

    #[error("file {path} has an unparsable {key} xattr: {value:?}")]
    InvalidXattr { path: PathBuf, key: &'static str, value: String },

    #[error("size mismatch for {path}: expected {expected}, found {found}")]
    RangeMismatch { path: PathBuf, expected: u64, found: u64 },
}

impl LandingError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LandingError::Io { path: path.into(), source }
    }
}
