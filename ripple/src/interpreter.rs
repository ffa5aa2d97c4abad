//! Incremental frame interpreter for `text/event-stream` bodies.
//!
//! The transport hands over bytes in whatever pieces the network produced.
//! A frame can straddle any number of chunks, and so can a line ending or a
//! multi-byte character. The interpreter keeps the unconsumed suffix in a
//! carry buffer and only looks at a frame once its terminating blank line
//! has arrived:
//!
//! ```text
//! event: message
//! data: {"id":1}
//!
//! : keep-alive
//!
//! data: [DONE]
//!
//! ```
//!
//! Frames without `data` (comments, keep-alives, bare `event:` lines) are
//! dropped. A frame whose data is the sentinel ends the stream; everything
//! after it is ignored.

use bytes::BytesMut;
use ripple_types::{Decode, FrameError};

/// Data value that marks the end of the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Receives what a [`FrameInterpreter`] produces, in frame order.
pub trait FrameSink<T> {
    /// A frame decoded successfully.
    fn on_result(&mut self, result: T);

    /// A frame failed to decode.
    fn on_error(&mut self, error: FrameError);
}

/// One delivery from the interpreter, as recorded by the `Vec` sink.
#[derive(Debug)]
pub enum Emitted<T> {
    /// A decoded result.
    Result(T),
    /// A frame that failed to decode.
    Error(FrameError),
}

impl<T> FrameSink<T> for Vec<Emitted<T>> {
    fn on_result(&mut self, result: T) {
        self.push(Emitted::Result(result));
    }

    fn on_error(&mut self, error: FrameError) {
        self.push(Emitted::Error(error));
    }
}

/// A [`FrameSink`] made of two closures.
pub struct FnSink<R, E> {
    on_result: R,
    on_error: E,
}

impl<R, E> FnSink<R, E> {
    /// Wrap the two closures.
    pub fn new(on_result: R, on_error: E) -> Self {
        Self {
            on_result,
            on_error,
        }
    }
}

impl<T, R, E> FrameSink<T> for FnSink<R, E>
where
    R: FnMut(T),
    E: FnMut(FrameError),
{
    fn on_result(&mut self, result: T) {
        (self.on_result)(result);
    }

    fn on_error(&mut self, error: FrameError) {
        (self.on_error)(error);
    }
}

enum FrameKind {
    Data(String),
    Sentinel,
    Ignorable,
}

/// One complete frame, parsed out of the carry buffer.
#[derive(Default)]
struct Frame<'a> {
    event: Option<&'a str>,
    id: Option<&'a str>,
    data: Option<String>,
}

impl<'a> Frame<'a> {
    fn parse(text: &'a str) -> Self {
        let mut frame = Frame::default();
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "data" => match &mut frame.data {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => frame.data = Some(value.to_owned()),
                },
                "event" => frame.event = Some(value),
                "id" => frame.id = Some(value),
                // `retry` and unknown fields carry nothing we act on.
                _ => {}
            }
        }
        frame
    }

    fn classify(self, sentinel: &str) -> FrameKind {
        match self.data {
            None => FrameKind::Ignorable,
            Some(data) if data.trim().is_empty() => FrameKind::Ignorable,
            Some(data) if data.trim() == sentinel => FrameKind::Sentinel,
            Some(data) => FrameKind::Data(data),
        }
    }
}

/// Turns an ordered sequence of byte chunks into decoded results.
///
/// The decoder and sink are fixed at construction, so there is no window in
/// which frames could be parsed with nobody listening. Results and errors
/// reach the sink synchronously, from inside [`process_chunk`](Self::process_chunk),
/// in the order their frames appear in the body.
///
/// ```
/// use ripple::{Emitted, FrameInterpreter, JsonDecoder};
///
/// let mut interpreter = FrameInterpreter::new(
///     JsonDecoder::<serde_json::Value>::new(),
///     Vec::<Emitted<serde_json::Value>>::new(),
/// );
/// interpreter.process_chunk(b"data: {\"id\":1}\n");
/// assert!(interpreter.sink().is_empty());
/// interpreter.process_chunk(b"\n");
/// assert!(matches!(&interpreter.sink()[..], [Emitted::Result(v)] if v["id"] == 1));
/// ```
pub struct FrameInterpreter<D, S> {
    decoder: D,
    sink: S,
    sentinel: String,
    /// Bytes received but not yet consumed as part of a complete frame.
    buffer: BytesMut,
    /// Prefix of `buffer` already searched for a line ending.
    scanned: usize,
    /// Start of the line currently being assembled.
    line_start: usize,
    finished: bool,
}

impl<D, S> FrameInterpreter<D, S>
where
    D: Decode,
    S: FrameSink<D::Output>,
{
    /// An interpreter delivering into `sink`, ending on [`DONE_SENTINEL`].
    pub fn new(decoder: D, sink: S) -> Self {
        Self {
            decoder,
            sink,
            sentinel: DONE_SENTINEL.to_owned(),
            buffer: BytesMut::new(),
            scanned: 0,
            line_start: 0,
            finished: false,
        }
    }

    /// Use a different end-of-stream data value.
    #[must_use]
    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = sentinel.into();
        self
    }

    /// Append `chunk` and deliver every frame it completes.
    ///
    /// Zero-length chunks are fine. Once the sentinel has been seen this
    /// does nothing.
    pub fn process_chunk(&mut self, chunk: &[u8]) {
        if self.finished {
            return;
        }
        self.buffer.extend_from_slice(chunk);

        while !self.finished {
            let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') else {
                self.scanned = self.buffer.len();
                break;
            };
            let line_end = self.scanned + offset;
            self.scanned = line_end + 1;

            let line = &self.buffer[self.line_start..line_end];
            if line.is_empty() || line == b"\r" {
                let body_end = self.line_start;
                let frame = self.buffer.split_to(self.scanned);
                self.scanned = 0;
                self.line_start = 0;
                self.dispatch(&frame[..body_end]);
            } else {
                self.line_start = self.scanned;
            }
        }

        if self.finished {
            self.release();
        }
    }

    /// The body ended normally: deliver a final frame that was not followed
    /// by a blank line, then stop.
    ///
    /// Calling this more than once has no further effect.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        let rest = self.buffer.split();
        self.release();
        if !rest.iter().all(u8::is_ascii_whitespace) {
            tracing::debug!(len = rest.len(), "flushing unterminated final frame");
            self.dispatch(&rest);
        }
        self.finished = true;
    }

    /// Whether the sentinel (or [`finish`](Self::finish)) has ended the stream.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Bytes held in the carry buffer.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// The sink.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the sink, e.g. to drain collected results.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consume the interpreter and return the sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    fn dispatch(&mut self, raw: &[u8]) {
        let text = match std::str::from_utf8(raw) {
            Ok(text) => text,
            Err(err) => {
                tracing::debug!(error = %err, len = raw.len(), "frame is not valid UTF-8");
                self.sink.on_error(FrameError::Encoding {
                    payload: raw.to_vec(),
                });
                return;
            }
        };

        let frame = Frame::parse(text);
        tracing::trace!(event = frame.event, id = frame.id, "frame complete");

        match frame.classify(&self.sentinel) {
            FrameKind::Ignorable => {}
            FrameKind::Sentinel => {
                tracing::debug!("end-of-stream sentinel received");
                self.finished = true;
            }
            FrameKind::Data(data) => match self.decoder.decode(data.as_bytes()) {
                Ok(result) => self.sink.on_result(result),
                Err(err) => {
                    tracing::debug!(error = %err, "frame failed to decode");
                    self.sink.on_error(err);
                }
            },
        }
    }

    fn release(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.line_start = 0;
    }
}
