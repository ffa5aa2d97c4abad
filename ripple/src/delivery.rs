//! Where and how a session hands its output to the consumer.

use std::future::Future;

use ripple_types::{FrameError, SessionHandle, StreamError, StreamHandler, StreamOutcome};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Execution context for handler callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Call the handler on the session's own task, between chunk reads.
    #[default]
    Inline,
    /// Call the handler on a separate task, fed through a bounded queue.
    ///
    /// The session stops reading from the network while the queue is full.
    Queued {
        /// Queue capacity. Zero is treated as one.
        capacity: usize,
    },
}

impl Delivery {
    /// Queued delivery with the given capacity.
    #[must_use]
    pub fn queued(capacity: usize) -> Self {
        Self::Queued { capacity }
    }
}

/// The consumer end of a running session.
///
/// `result` and `error` return `false` once the consumer is gone, which the
/// session treats like a cancellation.
pub(crate) trait Deliver<T>: Send {
    fn result(&mut self, result: T) -> impl Future<Output = bool> + Send;
    fn error(&mut self, error: FrameError) -> impl Future<Output = bool> + Send;
    fn complete(self, outcome: StreamOutcome) -> impl Future<Output = ()> + Send;
}

pub(crate) struct InlineDelivery<H> {
    handler: H,
    handle: SessionHandle,
}

impl<H> InlineDelivery<H> {
    pub(crate) fn new(handler: H, handle: SessionHandle) -> Self {
        Self { handler, handle }
    }
}

impl<T, H> Deliver<T> for InlineDelivery<H>
where
    T: Send + 'static,
    H: StreamHandler<T>,
{
    fn result(&mut self, result: T) -> impl Future<Output = bool> + Send {
        self.handler.on_result(&self.handle, result);
        std::future::ready(true)
    }

    fn error(&mut self, error: FrameError) -> impl Future<Output = bool> + Send {
        self.handler.on_error(&self.handle, error);
        std::future::ready(true)
    }

    fn complete(mut self, outcome: StreamOutcome) -> impl Future<Output = ()> + Send {
        self.handler.on_complete(&self.handle, outcome);
        std::future::ready(())
    }
}

enum Envelope<T> {
    Result(T),
    Error(FrameError),
    Complete(StreamOutcome),
}

pub(crate) struct QueuedDelivery<T> {
    tx: mpsc::Sender<Envelope<T>>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> QueuedDelivery<T> {
    /// Spawn the delivery task. Must be called inside a tokio runtime.
    pub(crate) fn spawn<H>(handler: H, handle: SessionHandle, capacity: usize) -> Self
    where
        H: StreamHandler<T>,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(run_queue(handler, handle, rx));
        Self { tx, task }
    }
}

async fn run_queue<T, H>(mut handler: H, handle: SessionHandle, mut rx: mpsc::Receiver<Envelope<T>>)
where
    H: StreamHandler<T>,
{
    while let Some(envelope) = rx.recv().await {
        match envelope {
            // Anything still queued when the consumer cancels is dropped.
            Envelope::Result(_) | Envelope::Error(_) if handle.is_cancelled() => {}
            Envelope::Result(result) => handler.on_result(&handle, result),
            Envelope::Error(error) => handler.on_error(&handle, error),
            Envelope::Complete(outcome) => {
                handler.on_complete(&handle, outcome);
                return;
            }
        }
    }
}

impl<T: Send + 'static> Deliver<T> for QueuedDelivery<T> {
    fn result(&mut self, result: T) -> impl Future<Output = bool> + Send {
        let tx = self.tx.clone();
        async move { tx.send(Envelope::Result(result)).await.is_ok() }
    }

    fn error(&mut self, error: FrameError) -> impl Future<Output = bool> + Send {
        let tx = self.tx.clone();
        async move { tx.send(Envelope::Error(error)).await.is_ok() }
    }

    fn complete(self, outcome: StreamOutcome) -> impl Future<Output = ()> + Send {
        async move {
            if self.tx.send(Envelope::Complete(outcome)).await.is_err() {
                tracing::warn!("delivery task exited before completion");
            }
            drop(self.tx);
            if let Err(err) = self.task.await {
                tracing::warn!(error = %err, "delivery task failed");
            }
        }
    }
}

/// Feeds an [`EventStream`](crate::EventStream).
pub(crate) struct ChannelDelivery<T> {
    tx: mpsc::Sender<Result<T, StreamError>>,
}

impl<T> ChannelDelivery<T> {
    pub(crate) fn new(tx: mpsc::Sender<Result<T, StreamError>>) -> Self {
        Self { tx }
    }
}

impl<T: Send + 'static> Deliver<T> for ChannelDelivery<T> {
    fn result(&mut self, result: T) -> impl Future<Output = bool> + Send {
        let tx = self.tx.clone();
        async move { tx.send(Ok(result)).await.is_ok() }
    }

    fn error(&mut self, error: FrameError) -> impl Future<Output = bool> + Send {
        let tx = self.tx.clone();
        async move { tx.send(Err(error.into())).await.is_ok() }
    }

    fn complete(self, outcome: StreamOutcome) -> impl Future<Output = ()> + Send {
        async move {
            if let Some(err) = outcome.into_error() {
                // The reader may already be gone; nothing left to tell it.
                let _ = self.tx.send(Err(err.into())).await;
            }
        }
    }
}
