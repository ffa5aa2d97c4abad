//! Error types for ripple streaming sessions.

use std::borrow::Cow;

use serde::Deserialize;

/// An error object sent by the server in place of an event payload.
///
/// Matches the common `{"error": {"message": ..., "type": ..., "code": ..., "param": ...}}`
/// envelope used by OpenAI-compatible APIs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    /// Human-readable error message.
    pub message: String,
    /// Error category (`type` on the wire).
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Machine-readable code. Servers send either a string or a number.
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    /// The request parameter the error refers to, if any.
    #[serde(default)]
    pub param: Option<String>,
}

/// Wire envelope wrapping an [`ApiError`].
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorEnvelope {
    pub(crate) error: ApiError,
}

/// A single frame could not be turned into a result.
///
/// Frame errors are local to one event. The stream keeps going after one.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload did not match the expected schema.
    #[error("malformed payload: {source}")]
    Malformed {
        /// The offending payload.
        payload: String,
        /// The underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },

    /// The frame bytes were not valid UTF-8.
    #[error("frame is not valid UTF-8 ({} bytes)", .payload.len())]
    Encoding {
        /// The raw frame bytes.
        payload: Vec<u8>,
    },

    /// The server sent an error object instead of a result.
    #[error("server error: {error}")]
    Api {
        /// The offending payload.
        payload: String,
        /// The decoded error object.
        error: ApiError,
    },

    /// A custom decoder rejected the payload.
    #[error("rejected payload: {source}")]
    Rejected {
        /// The offending payload.
        payload: String,
        /// Why the decoder rejected it.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl FrameError {
    /// The payload that failed to decode.
    ///
    /// Non-UTF-8 payloads are converted lossily.
    #[must_use]
    pub fn payload(&self) -> Cow<'_, str> {
        match self {
            Self::Malformed { payload, .. }
            | Self::Api { payload, .. }
            | Self::Rejected { payload, .. } => Cow::Borrowed(payload),
            Self::Encoding { payload } => String::from_utf8_lossy(payload),
        }
    }

    /// Build a [`FrameError::Rejected`] from any error.
    pub fn rejected(
        payload: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Rejected {
            payload: payload.into(),
            source: source.into(),
        }
    }
}

/// The connection failed. Transport errors end the stream.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, read in full.
        body: String,
    },

    /// The request-level timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// Network-level error (connection reset, DNS failure, broken body, etc.).
    #[error("network error: {0}")]
    Network(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The request descriptor could not be turned into a request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Whether a fresh attempt could plausibly succeed.
    ///
    /// Network failures, timeouts, `429` and `5xx` are retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Status { status, .. } => *status == 429 || (500..=599).contains(status),
            Self::InvalidRequest(_) => false,
        }
    }
}

/// Either kind of error, for consumers that read a session as a stream.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// One frame failed to decode. More items may follow.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// The transport failed. This is the last item.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
