// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Logging setup (C13): maps the `verbose` config key / `-v` flag onto a
//! `tracing_subscriber::EnvFilter`, with `RUST_LOG` taking precedence when
//! set.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber. `level` is one of
/// `error|warn|message|info|debug` (§6); `message` has no direct tracing
/// equivalent and is mapped to `info`.
pub fn init(level: &str) {
    let directive = match level {
        "error" => "error",
        "warn" => "warn",
        "message" | "info" => "info",
        "debug" => "debug",
        other => {
            eprintln!("unrecognized verbose level {other:?}, defaulting to info");
            "info"
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Emitted once at startup, after the listener is bound.
pub fn log_startup_banner(port: u16, mount: &std::path::Path) {
    tracing::info!(port, mount = %mount.display(), "ltsmd started");
}

/// Emitted once during graceful shutdown, before the process exits.
pub fn log_shutdown_banner() {
    tracing::info!("ltsmd shutdown complete");
}
