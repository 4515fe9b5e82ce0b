//! Strictly ordered execution of persistence operations.
//!
//! ```text
//!  submit(A) ─┐                      ┌─► oneshot A ─► OpHandle A
//!  submit(B) ─┼─► mpsc ─► worker ────┼─► oneshot B ─► OpHandle B
//!  submit(C) ─┘    (one task, one    └─► broadcast ─► failure subscribers
//!                   job at a time)
//! ```
//!
//! Jobs are enqueued when `submit` is called, not when the returned handle is
//! first polled, so execution order is submission order even if handles are
//! awaited out of order or dropped. A job runs to completion before the next
//! one starts. Errors and panics inside a job are caught at this boundary:
//! they are logged, published to failure subscribers, and the job's handle
//! resolves to `None`. The worker keeps going.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{PersistenceError, PersistenceResult};

/// Capacity of the failure broadcast; slow subscribers observe `Lagged`.
const FAILURE_CHANNEL_CAPACITY: usize = 64;

type Job<C> = Box<dyn FnOnce(Arc<C>) -> BoxFuture<'static, ()> + Send>;

/// A queued operation that did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedOperation {
    /// Public operation name, e.g. `"append_update"`
    pub operation: &'static str,
    /// Document the operation targeted, if any
    pub doc_name: Option<String>,
    pub error: PersistenceError,
}

/// Pending result of a queued operation.
///
/// Resolves to `Some(value)` on success and `None` when the operation failed
/// or was submitted after the queue closed.
#[must_use = "the operation runs regardless, but its result is only observable through the handle"]
pub struct OpHandle<T> {
    receiver: Option<oneshot::Receiver<Option<T>>>,
}

impl<T> OpHandle<T> {
    fn pending(receiver: oneshot::Receiver<Option<T>>) -> Self {
        Self {
            receiver: Some(receiver),
        }
    }

    fn rejected() -> Self {
        Self { receiver: None }
    }
}

impl<T> Future for OpHandle<T> {
    type Output = Option<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.receiver.as_mut() {
            // A dropped sender means the worker went away mid-job
            Some(receiver) => Pin::new(receiver).poll(cx).map(|r| r.ok().flatten()),
            None => Poll::Ready(None),
        }
    }
}

/// Single-consumer job queue bound to a shared context `C`.
pub struct ExecutionQueue<C> {
    sender: Mutex<Option<mpsc::UnboundedSender<Job<C>>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    failures: broadcast::Sender<FailedOperation>,
}

impl<C: Send + Sync + 'static> ExecutionQueue<C> {
    /// Spawn the worker task on the current tokio runtime.
    pub fn start(context: Arc<C>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job<C>>();
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);

        let worker = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                job(Arc::clone(&context)).await;
            }
            log::debug!("Execution queue drained, worker exiting");
        });

        Self {
            sender: Mutex::new(Some(sender)),
            worker: tokio::sync::Mutex::new(Some(worker)),
            failures,
        }
    }

    /// Enqueue `body` behind every previously submitted job.
    pub fn submit<T, F, Fut>(
        &self,
        operation: &'static str,
        doc_name: Option<&str>,
        body: F,
    ) -> OpHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<C>) -> Fut + Send + 'static,
        Fut: Future<Output = PersistenceResult<T>> + Send + 'static,
    {
        let doc_name = doc_name.map(str::to_string);
        let (result_tx, result_rx) = oneshot::channel();
        let failures = self.failures.clone();
        let job_doc = doc_name.clone();

        let job: Job<C> = Box::new(move |context| {
            async move {
                let outcome = AssertUnwindSafe(async move { body(context).await })
                    .catch_unwind()
                    .await;
                let error = match outcome {
                    Ok(Ok(value)) => {
                        let _ = result_tx.send(Some(value));
                        return;
                    }
                    Ok(Err(error)) => {
                        log::warn!(
                            "{operation} failed for doc {}: {error}",
                            job_doc.as_deref().unwrap_or("*")
                        );
                        error
                    }
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        log::error!(
                            "{operation} panicked for doc {}: {message}",
                            job_doc.as_deref().unwrap_or("*")
                        );
                        PersistenceError::Panicked(message)
                    }
                };
                let _ = failures.send(FailedOperation {
                    operation,
                    doc_name: job_doc,
                    error,
                });
                let _ = result_tx.send(None);
            }
            .boxed()
        });

        let sent = match self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        };
        if sent {
            return OpHandle::pending(result_rx);
        }

        log::warn!("{operation} rejected: persistence instance is closed");
        let _ = self.failures.send(FailedOperation {
            operation,
            doc_name,
            error: PersistenceError::Closed,
        });
        OpHandle::rejected()
    }

    /// Receive every future operation failure.
    pub fn subscribe(&self) -> broadcast::Receiver<FailedOperation> {
        self.failures.subscribe()
    }

    /// Stop accepting jobs. Already queued jobs still run.
    pub fn seal(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_sealed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Wait for the worker to finish every queued job. Only returns once the
    /// queue has been sealed.
    ///
    /// Concurrent callers queue up on the worker lock, so every caller returns
    /// only after the drain has completed.
    pub async fn join(&self) {
        let mut worker = self.worker.lock().await;
        if let Some(handle) = worker.as_mut() {
            // Awaited in place: a cancelled join leaves the handle for the next caller
            if let Err(e) = handle.await {
                log::error!("Execution queue worker terminated abnormally: {e}");
            }
            *worker = None;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
