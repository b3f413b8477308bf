// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon Supervisor (C10): owns the listening socket, the worker pool, and
//! the shutdown sequence. Ties together recovery (C9), the session acceptor
//! (C5/C7), and the worker pool (C8) into one running process.

use std::sync::Arc;

use ltsmd_core::IdentityMap;
use ltsmd_storage::LandingStore;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backend::ArchiveBackend;
use crate::config::DaemonConfig;
use crate::queue;
use crate::session::{try_acquire_session, SessionContext};
use crate::worker::{self, WorkerContext};

pub struct Supervisor {
    config: DaemonConfig,
    identity: Arc<IdentityMap>,
    landing: Arc<LandingStore>,
    backend: Arc<dyn ArchiveBackend>,
}

impl Supervisor {
    pub fn new(
        config: DaemonConfig,
        identity: IdentityMap,
        landing: LandingStore,
        backend: Arc<dyn ArchiveBackend>,
    ) -> Self {
        Self { config, identity: Arc::new(identity), landing: Arc::new(landing), backend }
    }

    /// Run the recovery scan (§7), then accept connections until a shutdown
    /// signal arrives, then drain per RF3 (stop accepting, cancel workers,
    /// leave pending items on disk for the next startup's recovery scan).
    pub async fn run(&self, reset_omitted: bool) -> std::io::Result<()> {
        let landing = self.landing.clone();
        let report = tokio::task::spawn_blocking(move || ltsmd_storage::scan(&landing, reset_omitted))
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))?
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        info!(
            visited = report.visited,
            reenqueued = report.reenqueued.len(),
            skipped_foreign = report.skipped_foreign,
            skipped_terminal = report.skipped_terminal,
            "recovery scan complete"
        );

        let (tx, rx) = queue::channel();
        for item in report.reenqueued {
            if tx.enqueue(item).is_err() {
                warn!("failed to enqueue a recovered item: queue closed immediately at startup");
            }
        }

        let cancel = CancellationToken::new();
        let xattr_mutex = Arc::new(tokio::sync::Mutex::new(()));
        let worker_ctx = Arc::new(WorkerContext {
            backend: self.backend.clone(),
            queue: tx.clone(),
            xattr_mutex: xattr_mutex.clone(),
            tolerance: self.config.tolerr,
        });

        let mut worker_handles = Vec::with_capacity(self.config.qthreads as usize);
        for id in 0..self.config.qthreads {
            let rx = rx.clone();
            let ctx = worker_ctx.clone();
            let cancel = cancel.clone();
            worker_handles.push(tokio::spawn(async move {
                tokio::select! {
                    _ = worker::run(rx, ctx) => {}
                    _ = cancel.cancelled() => {}
                }
                info!(worker_id = id, "worker task stopped");
            }));
        }

        let listener = bind_listener(self.config.port).await?;
        info!(port = self.config.port, "accepting connections");

        let session_ctx = Arc::new(SessionContext {
            identity: self.identity.clone(),
            landing: self.landing.clone(),
            queue: tx,
            auth_mutex: Arc::new(tokio::sync::Mutex::new(())),
            xattr_mutex,
            session_count: Arc::new(parking_lot::Mutex::new(0)),
            session_cap: self.config.sthreads as usize,
            buffer_bytes: self.config.buffer_bytes,
        });

        let mut shutdown = shutdown_signal();
        let mut session_tasks = Vec::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let Some(guard) = try_acquire_session(&session_ctx) else {
                                warn!(%peer, "session cap reached, rejecting connection");
                                drop(stream);
                                continue;
                            };
                            let ctx = session_ctx.clone();
                            session_tasks.push(tokio::spawn(async move {
                                let _guard = guard;
                                crate::session::run_session(stream, ctx).await;
                            }));
                        }
                        Err(err) => {
                            error!(error = %err, "accept() failed");
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        // RF3: cancel the worker pool and let any in-flight items' xattr
        // state stand as the journal for the next startup's recovery scan.
        // Session tasks already in flight are allowed to finish landing
        // whatever they're mid-stream on; we don't forcibly abort them.
        cancel.cancel();
        for handle in worker_handles {
            let _ = handle.await;
        }
        for handle in session_tasks {
            let _ = handle.await;
        }
        Ok(())
    }
}

async fn bind_listener(port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind(("0.0.0.0", port)).await
}

/// Waits for SIGINT or SIGTERM (§6: "the daemon MUST shut down cleanly on
/// SIGINT/SIGTERM").
fn shutdown_signal() -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
                unreachable!()
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    })
}
