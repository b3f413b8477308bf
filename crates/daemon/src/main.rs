// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ltsmd`: the landing/staging daemon binary. Parses CLI flags and an
//! optional config file into a `DaemonConfig`, loads the identity map, and
//! hands off to the supervisor.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use ltsmd_core::IdentityMap;
use ltsmd_daemon::{config, logging, DaemonConfig, FireAndForgetBackend, Supervisor};
use ltsmd_storage::LandingStore;
use tracing::error;

/// Landing/staging daemon: lands client-streamed files locally, then
/// promotes them to a parallel filesystem and/or HSM archival tier.
#[derive(Debug, Parser)]
#[command(name = "ltsmd", version)]
struct Cli {
    /// Parallel filesystem mount root files are ultimately staged under.
    lustre_mount_point: PathBuf,

    /// Path to a `key value` config file, applied before CLI flag overrides.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Landing-store mount root.
    #[arg(long)]
    localfs: Option<PathBuf>,

    /// Path to the identity map file.
    #[arg(long)]
    identmap: Option<PathBuf>,

    /// Listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Max concurrent session tasks.
    #[arg(long)]
    sthreads: Option<u32>,

    /// Worker task pool size.
    #[arg(long)]
    qthreads: Option<u32>,

    /// Per-item error tolerance before `FILE_OMITTED`.
    #[arg(long)]
    tolerr: Option<u32>,

    /// One of error|warn|message|info|debug.
    #[arg(short = 'v', long)]
    verbose: Option<String>,

    /// Reset FILE_OMITTED entries found during the startup recovery scan,
    /// re-driving them from LOCAL_COPY_DONE instead of leaving them alone.
    #[arg(long)]
    reset_omitted: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut cfg = DaemonConfig::new(&cli.lustre_mount_point);

    if let Some(path) = &cli.config {
        if let Err(err) = cfg.merge_file(path) {
            eprintln!("failed to load config file {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    }
    if let Err(err) = apply_cli_overrides(&mut cfg, &cli) {
        eprintln!("invalid CLI flag: {err}");
        return ExitCode::FAILURE;
    }

    logging::init(&cfg.verbose);
    logging::log_startup_banner(cfg.port, &cfg.lustre_mount_point);

    if let Err(err) = validate_mount_point(&cfg.lustre_mount_point) {
        error!(error = %err, mount = %cfg.lustre_mount_point.display(), "invalid parallel-FS mount point");
        return ExitCode::FAILURE;
    }

    let identity = match IdentityMap::load(&cfg.identmap) {
        Ok(map) => map,
        Err(err) => {
            error!(error = %err, "failed to load identity map");
            return ExitCode::FAILURE;
        }
    };
    let landing = LandingStore::new(cfg.localfs.clone());

    let supervisor = Supervisor::new(cfg, identity, landing, Arc::new(FireAndForgetBackend));
    let result = supervisor.run(cli.reset_omitted).await;
    logging::log_shutdown_banner();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "daemon exited with an error");
            ExitCode::FAILURE
        }
    }
}

/// §4.10/§6: "exit non-zero on fatal startup failure (invalid mount, ...)".
/// Grounded in the original's `stat()`-and-`S_ISDIR` check on
/// `opt.o_local_mount` before the accept loop starts (`fsqd.c`, "Verify we
/// have a valid local mount point"); the core treats the parallel FS as an
/// opaque POSIX mount (§1), so this is a name-resolution check, not a real
/// Lustre-specific probe.
fn validate_mount_point(path: &std::path::Path) -> std::io::Result<()> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_dir() {
        return Err(std::io::Error::other(format!("{} is not a directory", path.display())));
    }
    Ok(())
}

fn apply_cli_overrides(cfg: &mut DaemonConfig, cli: &Cli) -> Result<(), config::ConfigError> {
    if let Some(v) = &cli.localfs {
        cfg.apply("localfs", &v.display().to_string())?;
    }
    if let Some(v) = &cli.identmap {
        cfg.apply("identmap", &v.display().to_string())?;
    }
    if let Some(v) = cli.port {
        cfg.apply("port", &v.to_string())?;
    }
    if let Some(v) = cli.sthreads {
        cfg.apply("sthreads", &v.to_string())?;
    }
    if let Some(v) = cli.qthreads {
        cfg.apply("qthreads", &v.to_string())?;
    }
    if let Some(v) = cli.tolerr {
        cfg.apply("tolerr", &v.to_string())?;
    }
    if let Some(v) = &cli.verbose {
        cfg.apply("verbose", v)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_mount_point_accepts_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_mount_point(dir.path()).is_ok());
    }

    #[test]
    fn validate_mount_point_rejects_a_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_mount_point(&dir.path().join("does-not-exist")).is_err());
    }

    #[test]
    fn validate_mount_point_rejects_a_plain_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(validate_mount_point(file.path()).is_err());
    }
}
