// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

/// One line of the identity map: maps a client node name to the backend
/// server that handles its archive requests, plus the uid/gid that owns its
/// files once they land on the parallel filesystem.
///
/// Immutable after load; the map itself is read-only for the lifetime of the
/// daemon process (§4.3, §5 "Shared-resource policy").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityEntry {
    pub node_name: String,
    pub backend_server_name: String,
    pub archive_id: u16,
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Error)]
pub enum IdentityMapError {
    #[error("failed to read identity map {path}: {source}")]
    Read { path: String, source: std::io::Error },
}

/// Static `node -> IdentityEntry` table loaded once at startup (§4.3).
#[derive(Debug, Default, Clone)]
pub struct IdentityMap {
    entries: HashMap<String, IdentityEntry>,
}

impl IdentityMap {
    /// Parse the identity map file format from §6:
    ///
    /// ```text
    /// # node       servername         archive_id  uid   gid
    /// node-alpha   tape-backend-01    1           2001  2001
    /// ```
    ///
    /// Blank lines and `#`-prefixed comments are ignored. A line that does
    /// not parse into exactly 5 whitespace-separated tokens, or whose
    /// numeric fields don't parse, is warned about and skipped rather than
    /// failing the whole load. Duplicate `node` entries: last line wins.
    pub fn load(path: &Path) -> Result<Self, IdentityMapError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| IdentityMapError::Read { path: path.display().to_string(), source })?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        let mut entries = HashMap::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_line(line) {
                Some(entry) => {
                    entries.insert(entry.node_name.clone(), entry);
                }
                None => {
                    tracing::warn!(line = lineno + 1, text = raw, "skipping invalid identity map line");
                }
            }
        }
        Self { entries }
    }

    pub fn lookup(&self, node_name: &str) -> Option<&IdentityEntry> {
        self.entries.get(node_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_line(line: &str) -> Option<IdentityEntry> {
    let mut fields = line.split_whitespace();
    let node_name = fields.next()?.to_string();
    let backend_server_name = fields.next()?.to_string();
    let archive_id: u16 = fields.next()?.parse().ok()?;
    let uid: u32 = fields.next()?.parse().ok()?;
    let gid: u32 = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some(IdentityEntry { node_name, backend_server_name, archive_id, uid, gid })
}
