//! Bookkeeping for in-flight requests.
//!
//! # Design
//! Every send gets the next id and two Tokio tasks: the exchange, which runs
//! the transport and whose `AbortHandle` is stored under that id, and a
//! watcher that awaits the exchange. Presence of the entry is the only
//! cancellation guard:
//!
//! - the watcher removes the entry first and delivers only if the removal
//!   succeeded, whether the exchange returned, failed or panicked;
//! - `cancel` removes the entry and then aborts the task.
//!
//! Whichever of the two reaches the table first wins, and the other finds
//! nothing and does nothing. An id is never reused.
//!
//! The entry is inserted while the table lock is held across the spawn, so
//! the watcher cannot finish before its own entry exists.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::http::{RawResponse, TransportRequest};
use crate::transport::Transport;

/// Identifies one send. Cheap to copy and safe to use after the request has
/// finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestHandle(u64);

impl RequestHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a pending request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The transport finished. A status of 0 means it failed.
    Response(RawResponse),
    /// The request was cancelled before it completed.
    Cancelled,
}

#[derive(Default)]
struct Table {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, AbortHandle>>,
}

impl Table {
    /// Remove `id`, reporting whether it was still pending.
    fn take(&self, id: u64) -> Option<AbortHandle> {
        self.pending.lock().remove(&id)
    }
}

/// Tracks in-flight requests by id. Clones share the same table.
#[derive(Clone, Default)]
pub struct RequestRegistry {
    table: Arc<Table>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch `request` over `transport` and register it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn send<T: Transport>(&self, transport: Arc<T>, request: TransportRequest) -> PendingResponse {
        let id = self.table.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        let table = Arc::clone(&self.table);
        let started = Instant::now();

        let mut pending = self.table.pending.lock();
        let exchange = tokio::spawn(async move { transport.execute(request).await });
        pending.insert(id, exchange.abort_handle());
        drop(pending);

        tokio::spawn(async move {
            let result = exchange.await;
            if table.take(id).is_none() {
                debug!(id, "late completion for a cancelled request ignored");
                return;
            }
            let mut raw = match result {
                Ok(Ok(raw)) => raw,
                Ok(Err(e)) => {
                    warn!(id, error = %e, "transport failed");
                    RawResponse::failed()
                }
                Err(e) => {
                    warn!(id, error = %e, "transport task did not finish");
                    RawResponse::failed()
                }
            };
            raw.elapsed = started.elapsed();
            let _ = tx.send(raw);
        });

        debug!(id, "request registered");
        PendingResponse {
            handle: RequestHandle(id),
            rx,
        }
    }

    /// Cancel one request. Returns `false` if it had already completed or
    /// been cancelled; calling this any number of times is harmless.
    pub fn cancel(&self, handle: RequestHandle) -> bool {
        match self.table.take(handle.0) {
            Some(abort) => {
                abort.abort();
                debug!(id = handle.0, "request cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every pending request; returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<u64> = self.table.pending.lock().keys().copied().collect();
        ids.into_iter()
            .filter(|id| self.cancel(RequestHandle(*id)))
            .count()
    }

    pub fn is_pending(&self, handle: RequestHandle) -> bool {
        self.table.pending.lock().contains_key(&handle.0)
    }

    pub fn len(&self) -> usize {
        self.table.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for RequestRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRegistry")
            .field("pending", &self.len())
            .finish()
    }
}

/// The awaiting side of a send.
#[derive(Debug)]
pub struct PendingResponse {
    handle: RequestHandle,
    rx: oneshot::Receiver<RawResponse>,
}

impl PendingResponse {
    pub fn handle(&self) -> RequestHandle {
        self.handle
    }

    /// Wait for the request to complete or be cancelled.
    pub async fn wait(self) -> Completion {
        match self.rx.await {
            Ok(raw) => Completion::Response(raw),
            Err(_) => Completion::Cancelled,
        }
    }
}
