//! Operation Context Module
//!
//! Deadline and cancellation carried by every public data-access call.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{Result, StoreError};

// == Cancellation Token ==
/// Cloneable flag a caller flips to abandon in-flight operations.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the token cancelled and wakes every waiter.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent cancel() is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

// == Operation Context ==
/// Per-call deadline and cancellation.
///
/// The HTTP layer builds one per request; tests usually pass
/// `OpContext::background()`.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl OpContext {
    /// A context with no deadline that is never cancelled unless its token is.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            token: CancellationToken::new(),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Time left before the deadline, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Runs `fut` bounded by `limit` and by this context.
    ///
    /// The effective bound is the smaller of `limit` and the time left before
    /// the deadline. Cancellation wins over completion when both are ready.
    pub async fn bound<T, F>(&self, operation: &'static str, limit: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(StoreError::Cancelled(operation));
        }
        let limit = match self.remaining() {
            Some(left) => left.min(limit),
            None => limit,
        };
        if limit.is_zero() {
            return Err(StoreError::Timeout {
                operation,
                timeout_ms: 0,
            });
        }

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(StoreError::Cancelled(operation)),
            res = tokio::time::timeout(limit, fut) => match res {
                Ok(inner) => inner,
                Err(_) => Err(StoreError::Timeout {
                    operation,
                    timeout_ms: limit.as_millis() as u64,
                }),
            },
        }
    }

    /// Sleeps for `duration` unless cancelled or past the deadline first.
    pub async fn sleep(&self, operation: &'static str, duration: Duration) -> Result<()> {
        if let Some(left) = self.remaining() {
            if left < duration {
                return Err(StoreError::Timeout {
                    operation,
                    timeout_ms: left.as_millis() as u64,
                });
            }
        }

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(StoreError::Cancelled(operation)),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
