//! The seams of a streaming session: transport, decoder and consumer.

use std::future::Future;

use crate::error::{FrameError, TransportError};
use crate::handle::SessionHandle;
use crate::types::{ByteStream, StreamOutcome, StreamRequest};

/// Something that can issue a request and deliver its body incrementally.
///
/// `open` resolves once the response head is in. Non-success statuses
/// should resolve to [`TransportError::Status`] rather than a body stream.
pub trait Transport: Send + Sync {
    /// Issue `request` and return its body.
    fn open(
        &self,
        request: StreamRequest,
    ) -> impl Future<Output = Result<ByteStream, TransportError>> + Send;
}

/// Turns one event payload into a typed result.
///
/// Implemented for [`JsonDecoder`](crate::JsonDecoder) and for any
/// `Fn(&[u8]) -> Result<T, FrameError>`.
pub trait Decode: Send + 'static {
    /// The decoded result type.
    type Output: Send + 'static;

    /// Decode one payload.
    fn decode(&self, payload: &[u8]) -> Result<Self::Output, FrameError>;
}

impl<T, F> Decode for F
where
    F: Fn(&[u8]) -> Result<T, FrameError> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn decode(&self, payload: &[u8]) -> Result<T, FrameError> {
        self(payload)
    }
}

/// Receives everything a session produces.
///
/// Results and errors arrive in the order their frames appear in the body.
/// `on_complete` is called exactly once and is always the last call.
pub trait StreamHandler<T>: Send + 'static {
    /// A frame decoded successfully.
    fn on_result(&mut self, handle: &SessionHandle, result: T);

    /// A frame failed to decode. The stream continues.
    fn on_error(&mut self, handle: &SessionHandle, error: FrameError);

    /// The session ended.
    fn on_complete(&mut self, handle: &SessionHandle, outcome: StreamOutcome);
}

/// A [`StreamHandler`] made of three closures. See [`callbacks`].
pub struct FnHandler<R, E, C> {
    on_result: R,
    on_error: E,
    on_complete: Option<C>,
}

/// Build a [`StreamHandler`] from closures.
///
/// ```
/// use ripple_types::{callbacks, SessionHandle, StreamHandler, StreamOutcome};
///
/// let mut seen = Vec::new();
/// let mut handler = callbacks(
///     move |_: &SessionHandle, n: u32| seen.push(n),
///     |_, err| eprintln!("bad frame: {err}"),
///     |_, outcome: StreamOutcome| assert!(outcome.error().is_none()),
/// );
/// handler.on_result(&SessionHandle::new(), 7);
/// handler.on_complete(&SessionHandle::new(), StreamOutcome::Completed);
/// ```
pub fn callbacks<T, R, E, C>(on_result: R, on_error: E, on_complete: C) -> FnHandler<R, E, C>
where
    R: FnMut(&SessionHandle, T) + Send + 'static,
    E: FnMut(&SessionHandle, FrameError) + Send + 'static,
    C: FnOnce(&SessionHandle, StreamOutcome) + Send + 'static,
{
    FnHandler {
        on_result,
        on_error,
        on_complete: Some(on_complete),
    }
}

impl<T, R, E, C> StreamHandler<T> for FnHandler<R, E, C>
where
    R: FnMut(&SessionHandle, T) + Send + 'static,
    E: FnMut(&SessionHandle, FrameError) + Send + 'static,
    C: FnOnce(&SessionHandle, StreamOutcome) + Send + 'static,
{
    fn on_result(&mut self, handle: &SessionHandle, result: T) {
        (self.on_result)(handle, result);
    }

    fn on_error(&mut self, handle: &SessionHandle, error: FrameError) {
        (self.on_error)(handle, error);
    }

    fn on_complete(&mut self, handle: &SessionHandle, outcome: StreamOutcome) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(handle, outcome);
        }
    }
}
