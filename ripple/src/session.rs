//! One request's streaming lifecycle.
//!
//! A [`StreamingSession`] owns the transport, the decoder and (once started)
//! the connection. [`start`](StreamingSession::start) spawns a driver task
//! and returns a [`SessionHandle`] straight away. The driver:
//!
//! 1. opens the request,
//! 2. feeds each body chunk to its [`FrameInterpreter`] and delivers whatever
//!    the chunk completed, in order,
//! 3. on end of body, transport failure or cancellation, drops the body
//!    stream (releasing the connection) and then reports the outcome once.
//!
//! The driver is the only code that touches the interpreter, so chunks are
//! processed strictly one at a time and in arrival order.

use futures::StreamExt;
use ripple_types::{
    Decode, FrameError, SessionHandle, StreamHandler, StreamOutcome, StreamRequest, Transport,
    callbacks,
};
use tracing::Instrument;

use crate::delivery::{Deliver, Delivery, InlineDelivery, QueuedDelivery};
use crate::interpreter::{DONE_SENTINEL, Emitted, FrameInterpreter};

/// Session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Where handler callbacks run.
    pub delivery: Delivery,
    /// Data value that ends the stream.
    pub sentinel: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            delivery: Delivery::Inline,
            sentinel: DONE_SENTINEL.to_owned(),
        }
    }
}

impl SessionConfig {
    /// Override the delivery policy.
    #[must_use]
    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Override the end-of-stream sentinel.
    #[must_use]
    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = sentinel.into();
        self
    }
}

/// A not-yet-started streaming request.
///
/// Starting consumes the session, so a session can only ever be started once.
///
/// # Example
///
/// ```no_run
/// use ripple::{HttpTransport, JsonDecoder, StreamRequest, StreamingSession};
///
/// # async fn run() {
/// let request = StreamRequest::post("https://api.openai.com/v1/chat/completions")
///     .bearer_auth("sk-...")
///     .json(&serde_json::json!({"model": "gpt-4o", "stream": true, "messages": []}))
///     .unwrap();
///
/// let handle = StreamingSession::new(HttpTransport::new(), JsonDecoder::<serde_json::Value>::new())
///     .start_with_callbacks(
///         request,
///         |_, chunk| println!("{chunk}"),
///         |_, err| eprintln!("skipped frame: {err}"),
///         |_, outcome| println!("done: {outcome:?}"),
///     );
///
/// // Later, from anywhere:
/// handle.cancel();
/// # }
/// ```
pub struct StreamingSession<Tr, D> {
    transport: Tr,
    decoder: D,
    config: SessionConfig,
}

impl<Tr, D> StreamingSession<Tr, D>
where
    Tr: Transport + 'static,
    D: Decode,
{
    /// A session using `transport` and `decoder` with default settings.
    pub fn new(transport: Tr, decoder: D) -> Self {
        Self {
            transport,
            decoder,
            config: SessionConfig::default(),
        }
    }

    /// Replace the session settings.
    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// The session settings.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Issue `request` and stream its events into `handler`.
    ///
    /// Returns immediately. `handler` sees results and frame errors in body
    /// order and then exactly one [`StreamOutcome`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start<H>(self, request: StreamRequest, handler: H) -> SessionHandle
    where
        H: StreamHandler<D::Output>,
    {
        let handle = SessionHandle::new();
        match self.config.delivery {
            Delivery::Inline => {
                let delivery = InlineDelivery::new(handler, handle.clone());
                self.spawn(request, handle.clone(), delivery);
            }
            Delivery::Queued { capacity } => {
                let delivery = QueuedDelivery::spawn(handler, handle.clone(), capacity);
                self.spawn(request, handle.clone(), delivery);
            }
        }
        handle
    }

    /// [`start`](Self::start) with three closures instead of a handler.
    pub fn start_with_callbacks<R, E, C>(
        self,
        request: StreamRequest,
        on_result: R,
        on_error: E,
        on_complete: C,
    ) -> SessionHandle
    where
        R: FnMut(&SessionHandle, D::Output) + Send + 'static,
        E: FnMut(&SessionHandle, FrameError) + Send + 'static,
        C: FnOnce(&SessionHandle, StreamOutcome) + Send + 'static,
    {
        self.start(
            request,
            callbacks::<D::Output, _, _, _>(on_result, on_error, on_complete),
        )
    }

    pub(crate) fn spawn<Dl>(self, request: StreamRequest, handle: SessionHandle, delivery: Dl)
    where
        Dl: Deliver<D::Output> + 'static,
    {
        let span = tracing::debug_span!("ripple.session", session = %handle.id());
        tokio::spawn(self.run(request, handle, delivery).instrument(span));
    }

    async fn run<Dl>(self, request: StreamRequest, handle: SessionHandle, mut delivery: Dl)
    where
        Dl: Deliver<D::Output>,
    {
        let StreamingSession {
            transport,
            decoder,
            config,
        } = self;
        let mut interpreter =
            FrameInterpreter::new(decoder, Vec::new()).with_sentinel(config.sentinel);

        let outcome = drive(&transport, request, &mut interpreter, &mut delivery, &handle).await;
        match &outcome {
            StreamOutcome::Completed => tracing::debug!("stream completed"),
            StreamOutcome::Failed(err) => tracing::warn!(error = %err, "stream failed"),
            StreamOutcome::Cancelled => tracing::debug!("stream cancelled"),
        }
        delivery.complete(outcome).await;
    }
}

/// Run the request to its end and decide the outcome.
///
/// The body stream is dropped before this returns.
async fn drive<Tr, D, Dl>(
    transport: &Tr,
    request: StreamRequest,
    interpreter: &mut FrameInterpreter<D, Vec<Emitted<D::Output>>>,
    delivery: &mut Dl,
    handle: &SessionHandle,
) -> StreamOutcome
where
    Tr: Transport,
    D: Decode,
    Dl: Deliver<D::Output>,
{
    tracing::debug!(method = request.method().as_str(), url = request.url(), "opening stream");

    let mut body = tokio::select! {
        biased;
        () = handle.cancelled() => return StreamOutcome::Cancelled,
        opened = transport.open(request) => match opened {
            Ok(body) => body,
            Err(err) => return StreamOutcome::Failed(err),
        },
    };

    let outcome = loop {
        let next = tokio::select! {
            biased;
            () = handle.cancelled() => break StreamOutcome::Cancelled,
            next = body.next() => next,
        };

        let ended = match next {
            Some(Ok(chunk)) => {
                tracing::trace!(len = chunk.len(), "chunk received");
                interpreter.process_chunk(&chunk);
                false
            }
            Some(Err(err)) => break StreamOutcome::Failed(err),
            None => {
                interpreter.finish();
                true
            }
        };

        if !flush(interpreter, delivery, handle).await {
            break StreamOutcome::Cancelled;
        }
        if ended {
            break StreamOutcome::Completed;
        }
    };

    drop(body);
    outcome
}

/// Deliver everything the interpreter has collected.
///
/// Returns `false` if the session was cancelled or the consumer went away
/// part way through.
async fn flush<D, Dl>(
    interpreter: &mut FrameInterpreter<D, Vec<Emitted<D::Output>>>,
    delivery: &mut Dl,
    handle: &SessionHandle,
) -> bool
where
    D: Decode,
    Dl: Deliver<D::Output>,
{
    for emitted in std::mem::take(interpreter.sink_mut()) {
        if handle.is_cancelled() {
            return false;
        }
        let delivered = match emitted {
            Emitted::Result(result) => {
                tokio::select! {
                    biased;
                    () = handle.cancelled() => false,
                    delivered = delivery.result(result) => delivered,
                }
            }
            Emitted::Error(error) => {
                tokio::select! {
                    biased;
                    () = handle.cancelled() => false,
                    delivered = delivery.error(error) => delivered,
                }
            }
        };
        if !delivered {
            return false;
        }
    }
    true
}
