// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Cooperative cancellation tokens

use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::watch;

use crate::errors::{BuildlineError, BuildlineResult};

/// A cancellation token that can be awaited
///
/// Tokens form a tree: cancelling a token cancels every child created from
/// it, while cancelling a child leaves the parent untouched.
#[derive(Debug, Clone)]
pub struct Cancellable {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    flag: watch::Sender<bool>,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn cancel(&self) {
        if self.flag.send_replace(true) {
            return;
        }

        let children = std::mem::take(
            &mut *self.children.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

impl Cancellable {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                flag,
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Request cancellation of this token and all of its children
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.flag.borrow()
    }

    /// Fail with [`BuildlineError::Cancelled`] if cancellation was requested
    pub fn check(&self) -> BuildlineResult<()> {
        if self.is_cancelled() {
            Err(BuildlineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve once the token is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.inner.flag.subscribe();
        // The sender lives in `self.inner`, so `changed` cannot fail here.
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Create a token that is cancelled together with this one
    pub fn child(&self) -> Self {
        let child = Self::new();
        {
            let mut children = self
                .inner
                .children
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }

        // Covers a parent cancelled before or while the child was linked.
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }
}

impl Default for Cancellable {
    fn default() -> Self {
        Self::new()
    }
}
