// Copyright (C) 2026 The beatline authors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::watch;

/// A cancel handle is shared between the transport and whatever it spawned:
/// polling loops select on it between ticks and the render path checks it
/// per block. Cancellation is one-way and idempotent.
#[derive(Clone)]
pub struct CancelHandle {
    /// Set to true once the underlying operation should stop. Kept as an
    /// atomic so the render path can check without locking.
    cancelled: Arc<AtomicBool>,
    /// Wakes async tasks waiting on cancellation.
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelHandle {
    /// Creates a new cancel handle.
    pub fn new() -> CancelHandle {
        let (tx, rx) = watch::channel(false);
        CancelHandle {
            cancelled: Arc::new(AtomicBool::new(false)),
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Returns true if the handle has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Cancels the handle and wakes any waiters.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _ = self.tx.send(true);
    }

    /// Waits until the handle is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        CancelHandle::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cancel_is_idempotent() {
        let cancel_handle = CancelHandle::new();
        assert!(!cancel_handle.is_cancelled());

        cancel_handle.cancel();
        assert!(cancel_handle.is_cancelled());
        cancel_handle.cancel();
        assert!(cancel_handle.is_cancelled());
    }

    #[test]
    fn test_clones_share_state() {
        let cancel_handle = CancelHandle::new();
        let clone = cancel_handle.clone();
        clone.cancel();
        assert!(cancel_handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let cancel_handle = CancelHandle::new();

        let waiter = {
            let cancel_handle = cancel_handle.clone();
            tokio::spawn(async move { cancel_handle.cancelled().await })
        };

        cancel_handle.cancel();
        waiter.await.expect("waiter completes");
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let cancel_handle = CancelHandle::new();
        cancel_handle.cancel();
        cancel_handle.cancelled().await;
    }
}
