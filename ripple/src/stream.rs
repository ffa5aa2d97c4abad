//! Reading a session as a [`Stream`].

use std::pin::Pin;

use futures::Stream;
use ripple_types::{Decode, SessionHandle, StreamError, StreamRequest, Transport};
use tokio::sync::mpsc;

use crate::delivery::{ChannelDelivery, Delivery};
use crate::session::StreamingSession;

/// Items buffered between the session and the reader under inline delivery.
const DEFAULT_CAPACITY: usize = 32;

/// A session's output as a stream.
///
/// Results are `Ok`. A frame that fails to decode is an `Err` and the stream
/// carries on. A transport failure is a final `Err`. Normal completion and
/// cancellation simply end the stream.
///
/// Dropping the stream cancels the session.
pub type EventStream<T> = Pin<Box<dyn Stream<Item = Result<T, StreamError>> + Send>>;

/// Cancels the session when the reader goes away.
struct CancelOnDrop(SessionHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

impl<Tr, D> StreamingSession<Tr, D>
where
    Tr: Transport + 'static,
    D: Decode,
{
    /// Issue `request` and return its events as an [`EventStream`].
    ///
    /// The reader applies backpressure: the session stops reading from the
    /// network while the buffer between them is full. Under
    /// [`Delivery::Queued`] the buffer has the configured capacity.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn into_stream(self, request: StreamRequest) -> EventStream<D::Output> {
        let capacity = match self.config().delivery {
            Delivery::Inline => DEFAULT_CAPACITY,
            Delivery::Queued { capacity } => capacity.max(1),
        };
        let (tx, mut rx) = mpsc::channel(capacity);
        let handle = SessionHandle::new();
        self.spawn(request, handle.clone(), ChannelDelivery::new(tx));

        let guard = CancelOnDrop(handle);
        Box::pin(async_stream::stream! {
            let _guard = guard;
            while let Some(item) = rx.recv().await {
                yield item;
            }
        })
    }
}
