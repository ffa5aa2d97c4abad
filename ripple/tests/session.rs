//! Session lifecycle tests against scripted in-memory transports.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use ripple::{
    ByteStream, Delivery, FrameError, JsonDecoder, SessionConfig, SessionHandle, StreamError,
    StreamHandler, StreamOutcome, StreamRequest, StreamingSession, Transport, TransportError,
};
use serde::Deserialize;
use tokio::sync::{Notify, mpsc};

#[derive(Debug, Deserialize)]
struct Event {
    id: u32,
}

/// What a handler saw, in order.
#[derive(Debug)]
enum Seen {
    Result(u32),
    Error(String),
    Complete(StreamOutcome),
}

struct Recorder {
    tx: mpsc::UnboundedSender<Seen>,
}

impl StreamHandler<Event> for Recorder {
    fn on_result(&mut self, _: &SessionHandle, result: Event) {
        let _ = self.tx.send(Seen::Result(result.id));
    }

    fn on_error(&mut self, _: &SessionHandle, error: FrameError) {
        let _ = self.tx.send(Seen::Error(error.payload().into_owned()));
    }

    fn on_complete(&mut self, _: &SessionHandle, outcome: StreamOutcome) {
        let _ = self.tx.send(Seen::Complete(outcome));
    }
}

fn recorder() -> (Recorder, mpsc::UnboundedReceiver<Seen>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Recorder { tx }, rx)
}

/// Collect everything until the session drops its handler.
async fn collect(mut rx: mpsc::UnboundedReceiver<Seen>) -> Vec<Seen> {
    let mut seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(item) = rx.recv().await {
            seen.push(item);
        }
    })
    .await
    .expect("session did not finish");
    seen
}

fn completions(seen: &[Seen]) -> usize {
    seen.iter()
        .filter(|s| matches!(s, Seen::Complete(_)))
        .count()
}

fn request() -> StreamRequest {
    StreamRequest::post("http://scripted.invalid/v1/stream")
}

/// Sets a flag when the body stream is dropped.
struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A transport whose body is written by the test.
struct ScriptedTransport {
    body: Mutex<Option<mpsc::UnboundedReceiver<Result<Bytes, TransportError>>>>,
    opened: Arc<Notify>,
    released: Arc<AtomicBool>,
}

/// The test's end of a [`ScriptedTransport`].
struct Script {
    tx: mpsc::UnboundedSender<Result<Bytes, TransportError>>,
    opened: Arc<Notify>,
    released: Arc<AtomicBool>,
}

impl Script {
    fn send(&self, chunk: &str) {
        let _ = self.tx.send(Ok(Bytes::copy_from_slice(chunk.as_bytes())));
    }

    fn fail(&self, err: TransportError) {
        let _ = self.tx.send(Err(err));
    }

    async fn wait_opened(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.opened.notified())
            .await
            .expect("transport was never opened");
    }

    fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

fn scripted() -> (ScriptedTransport, Script) {
    let (tx, rx) = mpsc::unbounded_channel();
    let opened = Arc::new(Notify::new());
    let released = Arc::new(AtomicBool::new(false));
    let transport = ScriptedTransport {
        body: Mutex::new(Some(rx)),
        opened: Arc::clone(&opened),
        released: Arc::clone(&released),
    };
    (
        transport,
        Script {
            tx,
            opened,
            released,
        },
    )
}

impl Transport for ScriptedTransport {
    fn open(
        &self,
        _request: StreamRequest,
    ) -> impl Future<Output = Result<ByteStream, TransportError>> + Send {
        let rx = self.body.lock().unwrap().take();
        let guard = ReleaseGuard(Arc::clone(&self.released));
        self.opened.notify_one();
        async move {
            let mut rx = rx.expect("transport opened twice");
            let body = async_stream::stream! {
                let _guard = guard;
                while let Some(item) = rx.recv().await {
                    yield item;
                }
            };
            Ok(Box::pin(body) as ByteStream)
        }
    }
}

/// A transport whose request never gets a response.
struct PendingTransport {
    calls: Arc<AtomicUsize>,
}

impl Transport for PendingTransport {
    fn open(
        &self,
        _request: StreamRequest,
    ) -> impl Future<Output = Result<ByteStream, TransportError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        futures::future::pending()
    }
}

/// A transport that rejects every request.
struct RejectingTransport;

impl Transport for RejectingTransport {
    fn open(
        &self,
        _request: StreamRequest,
    ) -> impl Future<Output = Result<ByteStream, TransportError>> + Send {
        std::future::ready(Err(TransportError::Status {
            status: 401,
            body: "invalid api key".into(),
        }))
    }
}

fn session<Tr: Transport + 'static>(transport: Tr) -> StreamingSession<Tr, JsonDecoder<Event>> {
    StreamingSession::new(transport, JsonDecoder::new())
}

#[tokio::test]
async fn results_arrive_in_order_then_completion() {
    let (transport, script) = scripted();
    let (handler, rx) = recorder();
    session(transport).start(request(), handler);

    script.send("data: {\"id\":1}\n");
    script.send("\n");
    script.send("data: {\"id\":2}\n\ndata: [DONE]\n\n");
    let released = Arc::clone(&script.released);
    drop(script);

    let seen = collect(rx).await;
    assert!(
        matches!(
            &seen[..],
            [Seen::Result(1), Seen::Result(2), Seen::Complete(StreamOutcome::Completed)]
        ),
        "unexpected: {seen:?}"
    );
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn sentinel_suppresses_later_frames() {
    let (transport, script) = scripted();
    let (handler, rx) = recorder();
    session(transport).start(request(), handler);

    script.send("data: [DONE]\n\n");
    script.send("data: {\"id\":2}\n\n");
    drop(script);

    let seen = collect(rx).await;
    assert!(
        matches!(&seen[..], [Seen::Complete(StreamOutcome::Completed)]),
        "unexpected: {seen:?}"
    );
}

#[tokio::test]
async fn malformed_frame_is_reported_and_stream_continues() {
    let (transport, script) = scripted();
    let (handler, rx) = recorder();
    session(transport).start(request(), handler);

    script.send("data: {bad json\n\n");
    script.send("data: {\"id\":3}\n\n");
    drop(script);

    let seen = collect(rx).await;
    assert!(
        matches!(
            &seen[..],
            [Seen::Error(payload), Seen::Result(3), Seen::Complete(StreamOutcome::Completed)]
                if payload == "{bad json"
        ),
        "unexpected: {seen:?}"
    );
}

#[tokio::test]
async fn unterminated_final_frame_is_flushed_on_completion() {
    let (transport, script) = scripted();
    let (handler, rx) = recorder();
    session(transport).start(request(), handler);

    script.send("data: {\"id\":9}");
    drop(script);

    let seen = collect(rx).await;
    assert!(
        matches!(&seen[..], [Seen::Result(9), Seen::Complete(StreamOutcome::Completed)]),
        "unexpected: {seen:?}"
    );
}

#[tokio::test]
async fn transport_error_ends_the_stream() {
    let (transport, script) = scripted();
    let (handler, rx) = recorder();
    session(transport).start(request(), handler);

    script.send("data: {\"id\":1}\n\ndata: {\"id\"");
    script.fail(TransportError::Network(Box::new(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        "reset by peer",
    ))));
    script.send("data: {\"id\":2}\n\n");
    let released = Arc::clone(&script.released);

    let seen = collect(rx).await;
    assert!(
        matches!(
            &seen[..],
            [
                Seen::Result(1),
                Seen::Complete(StreamOutcome::Failed(TransportError::Network(_)))
            ]
        ),
        "unexpected: {seen:?}"
    );
    assert!(released.load(Ordering::SeqCst));
    drop(script);
}

#[tokio::test]
async fn rejected_request_fails_without_results() {
    let (handler, rx) = recorder();
    session(RejectingTransport).start(request(), handler);

    let seen = collect(rx).await;
    assert!(
        matches!(
            &seen[..],
            [Seen::Complete(StreamOutcome::Failed(TransportError::Status { status: 401, .. }))]
        ),
        "unexpected: {seen:?}"
    );
}

#[tokio::test]
async fn cancel_before_response_completes_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (handler, rx) = recorder();
    let handle = session(PendingTransport {
        calls: Arc::clone(&calls),
    })
    .start(request(), handler);

    handle.cancel();

    let seen = collect(rx).await;
    assert!(
        matches!(&seen[..], [Seen::Complete(StreamOutcome::Cancelled)]),
        "unexpected: {seen:?}"
    );
    assert!(calls.load(Ordering::SeqCst) <= 1);
}

#[tokio::test]
async fn cancel_before_any_bytes_releases_connection() {
    let (transport, script) = scripted();
    let (handler, rx) = recorder();
    let handle = session(transport).start(request(), handler);

    script.wait_opened().await;
    handle.cancel();
    handle.cancel();

    let seen = collect(rx).await;
    assert!(
        matches!(&seen[..], [Seen::Complete(StreamOutcome::Cancelled)]),
        "unexpected: {seen:?}"
    );
    assert!(script.released());
    assert!(handle.is_cancelled());
}

#[tokio::test]
async fn cancel_from_handler_stops_further_results() {
    let (transport, script) = scripted();
    let (tx, rx) = mpsc::unbounded_channel();
    let results = tx.clone();
    let errors = tx.clone();

    session(transport).start_with_callbacks(
        request(),
        move |handle: &SessionHandle, event: Event| {
            let _ = results.send(Seen::Result(event.id));
            handle.cancel();
        },
        move |_, err| {
            let _ = errors.send(Seen::Error(err.to_string()));
        },
        move |_, outcome| {
            let _ = tx.send(Seen::Complete(outcome));
        },
    );

    script.send("data: {\"id\":1}\n\ndata: {\"id\":2}\n\ndata: {\"id\":3}\n\n");

    let seen = collect(rx).await;
    assert!(
        matches!(
            &seen[..],
            [Seen::Result(1), Seen::Complete(StreamOutcome::Cancelled)]
        ),
        "unexpected: {seen:?}"
    );
    assert!(script.released());
}

#[tokio::test]
async fn connection_is_released_before_completion() {
    let (transport, script) = scripted();
    let released = Arc::clone(&script.released);
    let (tx, rx) = mpsc::unbounded_channel();

    session(transport).start_with_callbacks(
        request(),
        |_, _| {},
        |_, _| {},
        move |_, outcome| {
            let _ = tx.send((outcome, released.load(Ordering::SeqCst)));
        },
    );

    script.send("data: {\"id\":1}\n\n");
    drop(script);

    let mut rx = rx;
    let (outcome, released_at_completion) =
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no completion")
            .expect("completion channel closed");
    assert!(matches!(outcome, StreamOutcome::Completed));
    assert!(released_at_completion);
}

#[tokio::test]
async fn queued_delivery_preserves_order() {
    let (transport, script) = scripted();
    let (handler, rx) = recorder();
    session(transport)
        .with_config(SessionConfig::default().with_delivery(Delivery::queued(1)))
        .start(request(), handler);

    let body: String = (0..10).map(|id| format!("data: {{\"id\":{id}}}\n\n")).collect();
    // Deliberately awkward chunking.
    for piece in body.as_bytes().chunks(7) {
        script.send(std::str::from_utf8(piece).unwrap());
    }
    drop(script);

    let seen = collect(rx).await;
    let ids: Vec<u32> = seen
        .iter()
        .filter_map(|s| match s {
            Seen::Result(id) => Some(*id),
            _ => None,
        })
        .collect();
    assert_eq!(ids, (0..10).collect::<Vec<_>>());
    assert!(matches!(seen.last(), Some(Seen::Complete(StreamOutcome::Completed))));
    assert_eq!(completions(&seen), 1);
}

#[tokio::test]
async fn completion_fires_once_when_cancel_races_end_of_body() {
    for _ in 0..20 {
        let (transport, script) = scripted();
        let (handler, rx) = recorder();
        let handle = session(transport).start(request(), handler);

        script.send("data: {\"id\":1}\n\n");
        drop(script);
        handle.cancel();

        let seen = collect(rx).await;
        assert_eq!(completions(&seen), 1, "unexpected: {seen:?}");
        assert!(matches!(seen.last(), Some(Seen::Complete(_))));
    }
}

#[tokio::test]
async fn custom_sentinel() {
    let (transport, script) = scripted();
    let (handler, rx) = recorder();
    session(transport)
        .with_config(SessionConfig::default().with_sentinel("END"))
        .start(request(), handler);

    script.send("data: {\"id\":1}\n\ndata: END\n\ndata: {\"id\":2}\n\n");
    drop(script);

    let seen = collect(rx).await;
    assert!(
        matches!(&seen[..], [Seen::Result(1), Seen::Complete(StreamOutcome::Completed)]),
        "unexpected: {seen:?}"
    );
}

#[tokio::test]
async fn into_stream_yields_results_and_frame_errors() {
    let (transport, script) = scripted();
    let events = session(transport).into_stream(request());

    script.send("data: {\"id\":1}\n\ndata: nope\n\n");
    script.send("data: {\"id\":2}\n\ndata: [DONE]\n\n");
    drop(script);

    let items: Vec<Result<Event, StreamError>> = tokio::time::timeout(
        Duration::from_secs(5),
        events.collect(),
    )
    .await
    .expect("stream did not end");

    assert_eq!(items.len(), 3);
    assert!(matches!(&items[0], Ok(Event { id: 1 })));
    assert!(matches!(&items[1], Err(StreamError::Frame(_))));
    assert!(matches!(&items[2], Ok(Event { id: 2 })));
}

#[tokio::test]
async fn into_stream_ends_with_transport_error() {
    let (transport, script) = scripted();
    let events = session(transport).into_stream(request());

    script.send("data: {\"id\":1}\n\n");
    script.fail(TransportError::Timeout);

    let items: Vec<Result<Event, StreamError>> = tokio::time::timeout(
        Duration::from_secs(5),
        events.collect(),
    )
    .await
    .expect("stream did not end");

    assert_eq!(items.len(), 2);
    assert!(matches!(&items[0], Ok(Event { id: 1 })));
    assert!(matches!(
        &items[1],
        Err(StreamError::Transport(TransportError::Timeout))
    ));
    drop(script);
}

#[tokio::test]
async fn dropping_stream_cancels_session() {
    let (transport, script) = scripted();
    let mut events = session(transport).into_stream(request());

    script.send("data: {\"id\":1}\n\n");
    let first = tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .expect("no first item");
    assert!(matches!(first, Some(Ok(Event { id: 1 }))));

    drop(events);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !script.released() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("connection was not released");
}
