// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work Queue (C6): an async mpsc channel standing in for the "mutex +
//! condition variable" FIFO described in §4.6 — `tokio::sync::mpsc` already
//! is the idiomatic realization of that primitive under `tokio` (see RF1 in
//! `SPEC_FULL.md`). `enqueue`/`dequeue` move the `ActionItem` by value, so
//! ownership transfer (I4) holds without any extra locking.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ltsmd_core::ActionItem;
use tokio::sync::mpsc;

#[derive(Debug)]
struct Inner {
    len: AtomicUsize,
}

/// Producer handle, held by session tasks and the worker pool (for
/// re-enqueueing an item after a transition).
#[derive(Clone)]
pub struct QueueSender {
    tx: mpsc::UnboundedSender<ActionItem>,
    inner: Arc<Inner>,
}

/// Consumer handle, held by worker tasks. Cloneable and shareable across the
/// whole worker pool: the inner `mpsc::UnboundedReceiver` is wrapped in a
/// `tokio::sync::Mutex` so that "single consumer class" (§4.6) means "one
/// logical queue", not "one task" — this is the mutex half of the spec's
/// "mutex + condition variable" FIFO, with `tokio::sync::mpsc`'s own
/// notification standing in for the condition variable.
#[derive(Clone)]
pub struct QueueReceiver {
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<ActionItem>>>,
    inner: Arc<Inner>,
}

/// Build a fresh queue and split it into its producer/consumer halves.
pub fn channel() -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let inner = Arc::new(Inner { len: AtomicUsize::new(0) });
    (QueueSender { tx, inner: inner.clone() }, QueueReceiver { rx: Arc::new(tokio::sync::Mutex::new(rx)), inner })
}

impl QueueSender {
    /// `enqueue(item)` (§4.6). Fails only if every receiver has been
    /// dropped, which only happens during process teardown.
    pub fn enqueue(&self, item: ActionItem) -> Result<(), ActionItem> {
        self.inner.len.fetch_add(1, Ordering::SeqCst);
        self.tx.send(item).map_err(|e| {
            self.inner.len.fetch_sub(1, Ordering::SeqCst);
            e.0
        })
    }

    /// `size()` (§4.6): diagnostic only, per the spec's own caveat callers
    /// must not rely on this for correctness.
    pub fn size(&self) -> usize {
        self.inner.len.load(Ordering::SeqCst)
    }
}

impl QueueReceiver {
    /// `dequeue() -> item` (§4.6): waits for an item; returns `None` only
    /// once every sender has been dropped (used during shutdown). Safe to
    /// call from any number of cloned handles concurrently — at most one
    /// task holds the lock at a time, so exactly one of them wins each item
    /// (I4: an item is never owned by two workers at once).
    pub async fn dequeue(&self) -> Option<ActionItem> {
        let item = self.rx.lock().await.recv().await;
        if item.is_some() {
            self.inner.len.fetch_sub(1, Ordering::SeqCst);
        }
        item
    }

    pub fn size(&self) -> usize {
        self.inner.len.load(Ordering::SeqCst)
    }
}
