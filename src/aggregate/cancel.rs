//! Cooperative cancellation.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::fetch::{FetchError, FetchResult};

/// A cancellation flag shared by every fetch of one operation.
///
/// Clones observe the same flag. Once cancelled it stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Completes once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            // The sender lives as long as `self`; unreachable in practice
            std::future::pending::<()>().await;
        }
    }

    /// Drive `operation` unless the signal fires first.
    ///
    /// Dropping the losing future aborts an in-flight request.
    pub async fn run<T, F>(&self, operation: F) -> FetchResult<T>
    where
        F: Future<Output = FetchResult<T>>,
    {
        if self.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(FetchError::Cancelled),
            result = operation => result,
        }
    }
}
