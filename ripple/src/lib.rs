#![doc = include_str!("../README.md")]

pub(crate) mod delivery;
pub(crate) mod error;
pub mod interpreter;
pub mod session;
pub mod stream;
pub mod transport;

pub use delivery::Delivery;
pub use interpreter::{DONE_SENTINEL, Emitted, FnSink, FrameInterpreter, FrameSink};
pub use session::{SessionConfig, StreamingSession};
pub use stream::EventStream;
pub use transport::HttpTransport;

pub use ripple_types::{
    ApiError, ByteStream, Decode, FnHandler, FrameError, JsonDecoder, Method, SessionHandle,
    SessionId, StreamError, StreamHandler, StreamOutcome, StreamRequest, Transport,
    TransportError, callbacks,
};
