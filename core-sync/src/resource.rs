//! # Resource Emitter
//!
//! Tri-state progress channel between a running sync operation and its
//! consumer.
//!
//! A consumer observes `Loading(true)`, zero or more `Success`, then either
//! one `Error` or a final `Loading(false)`. Nothing follows an `Error`.
//!
//! The producer runs as its own Tokio task. Dropping the [`ResourceStream`]
//! cancels it: pending network calls guarded by [`Emitter::guard`] resolve
//! to [`SyncError::Cancelled`] and no further emissions are attempted.

use crate::error::{Result, SyncError};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

/// One emission of a sync operation.
#[derive(Debug, Clone)]
pub enum SyncResult<T> {
    Loading(bool),
    /// `network_data` is `None` when the value was served from the cache only.
    Success {
        cache_data: T,
        network_data: Option<T>,
    },
    Error {
        message: String,
        cause: Arc<SyncError>,
    },
}

impl<T> SyncResult<T> {
    pub fn error(cause: SyncError) -> Self {
        SyncResult::Error {
            message: cause.to_string(),
            cause: Arc::new(cause),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SyncResult::Loading(true))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SyncResult::Success { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SyncResult::Error { .. })
    }

    /// Cached data of a `Success`.
    pub fn cache_data(&self) -> Option<&T> {
        match self {
            SyncResult::Success { cache_data, .. } => Some(cache_data),
            _ => None,
        }
    }

    /// Network data of a `Success` confirmed against the server.
    pub fn network_data(&self) -> Option<&T> {
        match self {
            SyncResult::Success { network_data, .. } => network_data.as_ref(),
            _ => None,
        }
    }

    pub fn cause(&self) -> Option<&SyncError> {
        match self {
            SyncResult::Error { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

/// Producer half, owned by the operation task.
pub struct Emitter<T> {
    tx: mpsc::Sender<SyncResult<T>>,
    cancel: CancellationToken,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<T: Send + 'static> Emitter<T> {
    /// Returns `Cancelled` once the consumer is gone.
    pub async fn emit(&self, result: SyncResult<T>) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        self.tx.send(result).await.map_err(|_| SyncError::Cancelled)
    }

    pub async fn loading(&self, loading: bool) -> Result<()> {
        self.emit(SyncResult::Loading(loading)).await
    }

    pub async fn success(&self, cache_data: T, network_data: Option<T>) -> Result<()> {
        self.emit(SyncResult::Success {
            cache_data,
            network_data,
        })
        .await
    }

    /// Terminal error. Delivery is best-effort.
    pub async fn fail(&self, cause: SyncError) {
        let _ = self.emit(SyncResult::error(cause)).await;
    }

    /// Run `fut` unless the consumer cancels first.
    ///
    /// Only network calls go through here; cache writes always run to
    /// completion so a page is either merged whole or not at all.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SyncError::Cancelled),
            output = fut => Ok(output),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Consumer half. Dropping it cancels the producing task.
pub struct ResourceStream<T> {
    rx: mpsc::Receiver<SyncResult<T>>,
    _cancel_on_drop: DropGuard,
}

impl<T> ResourceStream<T> {
    /// Next emission, or `None` once the operation finished.
    pub async fn recv(&mut self) -> Option<SyncResult<T>> {
        self.rx.recv().await
    }

    /// Drain every remaining emission.
    pub async fn collect_all(mut self) -> Vec<SyncResult<T>> {
        let mut results = Vec::new();
        while let Some(result) = self.rx.recv().await {
            results.push(result);
        }
        results
    }
}

impl<T> Stream for ResourceStream<T> {
    type Item = SyncResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Create a connected emitter/stream pair.
pub fn channel<T>(capacity: usize) -> (Emitter<T>, ResourceStream<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let cancel = CancellationToken::new();
    let emitter = Emitter {
        tx,
        cancel: cancel.clone(),
    };
    let stream = ResourceStream {
        rx,
        _cancel_on_drop: cancel.drop_guard(),
    };
    (emitter, stream)
}

/// Spawn `producer` on the current Tokio runtime and hand back its stream.
///
/// Must be called from within a runtime.
pub fn spawn_resource<T, F, Fut>(capacity: usize, producer: F) -> ResourceStream<T>
where
    T: Send + 'static,
    F: FnOnce(Emitter<T>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (emitter, stream) = channel(capacity);
    tokio::spawn(producer(emitter));
    stream
}
