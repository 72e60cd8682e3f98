//! Cancellation token for cooperative cancellation.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// A callback type for cancellation notifications.
pub type CancelCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Inner {
    /// Whether cancellation has been requested.
    cancelled: AtomicBool,
    /// The reason for cancellation (first one wins).
    reason: RwLock<Option<String>>,
    /// Callbacks to invoke on cancellation.
    callbacks: RwLock<Vec<CancelCallback>>,
    /// Wakes every task parked in [`CancellationObserver::cancelled`].
    notify: Notify,
}

impl Inner {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed.
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// A broadcast signal for cooperative cancellation.
///
/// The token starts open and is closed at most once; closing is irreversible.
/// Clones share state. Code that only needs to react to cancellation should
/// hold a [`CancellationObserver`] obtained from [`observe`](Self::observe).
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a new, open cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes the token.
    ///
    /// This is idempotent - only the first reason is kept.
    /// Callbacks are invoked immediately. Panics in callbacks are logged and suppressed.
    pub fn cancel(&self, reason: impl Into<String>) {
        let inner = &self.inner;
        if inner
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let reason = reason.into();
        debug!(reason = %reason, "Cancellation signalled");
        *inner.reason.write() = Some(reason);
        inner.notify.notify_waiters();

        let callbacks = std::mem::take(&mut *inner.callbacks.write());
        for callback in callbacks {
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback();
            })) {
                warn!("Cancellation callback panicked: {:?}", e);
            }
        }
    }

    /// Alias of [`cancel`](Self::cancel).
    pub fn signal(&self, reason: impl Into<String>) {
        self.cancel(reason);
    }

    /// Registers a callback to be invoked on cancellation.
    ///
    /// If already cancelled, the callback is invoked immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.is_cancelled() {
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback();
            })) {
                warn!("Cancellation callback panicked: {:?}", e);
            }
            return;
        }

        let mut callbacks = self.inner.callbacks.write();
        if self.is_cancelled() {
            // Lost the race with `cancel`, which already drained the list.
            drop(callbacks);
            callback();
        } else {
            callbacks.push(Box::new(callback));
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().clone()
    }

    /// Returns a read-only handle that can wait for cancellation but cannot signal it.
    #[must_use]
    pub fn observe(&self) -> CancellationObserver {
        CancellationObserver {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Waits until the token is closed.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }

    /// Returns a guard that closes this token when dropped.
    #[must_use]
    pub fn drop_guard(&self, reason: impl Into<String>) -> CancelOnDrop {
        CancelOnDrop {
            token: Some(self.clone()),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

/// Read-only view of a [`CancellationToken`].
#[derive(Clone)]
pub struct CancellationObserver {
    inner: Arc<Inner>,
}

impl CancellationObserver {
    /// Returns whether the token has been closed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().clone()
    }

    /// Resolves once the token is closed. Resolves immediately if it already is.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }
}

impl std::fmt::Debug for CancellationObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationObserver")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Closes a token when dropped, including during panic unwinding.
#[derive(Debug)]
pub struct CancelOnDrop {
    token: Option<CancellationToken>,
    reason: String,
}

impl CancelOnDrop {
    /// Disarms the guard, preventing cancellation on drop.
    pub fn disarm(&mut self) {
        self.token = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel(std::mem::take(&mut self.reason));
        }
    }
}
