// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config Loader (C12): parses the key-value config file and CLI flags into
//! a `DaemonConfig`, merging the two with flags winning (§6).

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

/// Concrete defaults, grounded in the original source's constants
/// (`port=7625`, `sthreads=4`, `qthreads=4`, `tolerr=16`, `BUF_SIZE=0xfffff`).
pub const DEFAULT_PORT: u16 = 7625;
pub const DEFAULT_STHREADS: u32 = 4;
pub const MAX_STHREADS: u32 = 64;
pub const DEFAULT_QTHREADS: u32 = 4;
pub const MAX_QTHREADS: u32 = 64;
pub const DEFAULT_TOLERR: u32 = 16;
pub const DEFAULT_BUFFER_BYTES: usize = 1 << 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("sthreads must be between 1 and {MAX_STHREADS}, got {0}")]
    SthreadsOutOfRange(u32),

    #[error("qthreads must be between 1 and {MAX_QTHREADS}, got {0}")]
    QthreadsOutOfRange(u32),
}

/// Daemon configuration (C12), merged from defaults, an optional config
/// file, and CLI flags, in that order of increasing precedence.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Parallel-FS mount root, the positional CLI argument.
    pub lustre_mount_point: PathBuf,
    /// `localfs`: landing-store mount root.
    pub localfs: PathBuf,
    /// `identmap`: path to the identity map file.
    pub identmap: PathBuf,
    /// `port`: listen port.
    pub port: u16,
    /// `sthreads`: max concurrent session tasks.
    pub sthreads: u32,
    /// `qthreads`: worker task pool size.
    pub qthreads: u32,
    /// `tolerr`: per-item error tolerance before `FILE_OMITTED`.
    pub tolerr: u32,
    /// `verbose`: `error|warn|message|info|debug`.
    pub verbose: String,
    /// Stream buffer size for parallel-FS copies; not config-file exposed in
    /// the original but kept adjustable for tests.
    pub buffer_bytes: usize,
}

impl DaemonConfig {
    pub fn new(lustre_mount_point: impl Into<PathBuf>) -> Self {
        Self {
            lustre_mount_point: lustre_mount_point.into(),
            localfs: PathBuf::from("/var/spool/ltsmd"),
            identmap: PathBuf::from("/etc/ltsmd/identmap"),
            port: DEFAULT_PORT,
            sthreads: DEFAULT_STHREADS,
            qthreads: DEFAULT_QTHREADS,
            tolerr: DEFAULT_TOLERR,
            verbose: "info".to_string(),
            buffer_bytes: DEFAULT_BUFFER_BYTES,
        }
    }

    /// Apply `key value` pairs from a config file (§6). Unknown keys warn
    /// and are ignored; `#` and blank lines are skipped.
    pub fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.splitn(2, char::is_whitespace);
            let key = parts.next().unwrap_or_default();
            let value = parts.next().unwrap_or_default().trim();
            self.apply(key, value)?;
        }
        Ok(())
    }

    /// Apply one `key=value` CLI override, same key set as the config file.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "localfs" => self.localfs = PathBuf::from(value),
            "identmap" => self.identmap = PathBuf::from(value),
            "port" => {
                if let Ok(port) = value.parse() {
                    self.port = port;
                } else {
                    warn!(value, "ignoring malformed port value");
                }
            }
            "sthreads" => {
                let n: u32 = value.parse().unwrap_or(self.sthreads);
                if n == 0 || n > MAX_STHREADS {
                    return Err(ConfigError::SthreadsOutOfRange(n));
                }
                self.sthreads = n;
            }
            "qthreads" => {
                let n: u32 = value.parse().unwrap_or(self.qthreads);
                if n == 0 || n > MAX_QTHREADS {
                    return Err(ConfigError::QthreadsOutOfRange(n));
                }
                self.qthreads = n;
            }
            "tolerr" => {
                if let Ok(n) = value.parse() {
                    self.tolerr = n;
                } else {
                    warn!(value, "ignoring malformed tolerr value");
                }
            }
            "verbose" => self.verbose = value.to_string(),
            other => warn!(key = other, "unrecognized config key, ignoring"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_source_constants() {
        let config = DaemonConfig::new("/mnt/lustre");
        assert_eq!(config.port, 7625);
        assert_eq!(config.sthreads, 4);
        assert_eq!(config.qthreads, 4);
        assert_eq!(config.tolerr, 16);
        assert_eq!(config.buffer_bytes, 1 << 20);
    }

    #[test]
    fn merge_file_applies_known_keys_and_ignores_unknown_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ltsmd.conf");
        std::fs::write(
            &path,
            "# comment\nlocalfs /spool\nport 9000\nsthreads 8\nbogus nonsense\n",
        )
        .unwrap();

        let mut config = DaemonConfig::new("/mnt/lustre");
        config.merge_file(&path).unwrap();
        assert_eq!(config.localfs, PathBuf::from("/spool"));
        assert_eq!(config.port, 9000);
        assert_eq!(config.sthreads, 8);
    }

    #[test]
    fn sthreads_out_of_range_is_rejected() {
        let mut config = DaemonConfig::new("/mnt/lustre");
        assert!(config.apply("sthreads", "0").is_err());
        assert!(config.apply("sthreads", "65").is_err());
        assert!(config.apply("sthreads", "64").is_ok());
    }
}
