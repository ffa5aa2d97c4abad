//! Request descriptors, body streams and terminal outcomes.

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use serde::Serialize;

use crate::error::TransportError;

/// A response body delivered incrementally, in send order.
///
/// Dropping the stream releases the underlying connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// How a streaming session ended. Set exactly once per session.
#[derive(Debug)]
pub enum StreamOutcome {
    /// The server finished the body.
    Completed,
    /// The transport failed.
    Failed(TransportError),
    /// The consumer cancelled the session.
    Cancelled,
}

impl StreamOutcome {
    /// The transport error, if the session failed.
    ///
    /// Normal completion and cancellation both return `None`.
    #[must_use]
    pub fn error(&self) -> Option<&TransportError> {
        match self {
            Self::Failed(err) => Some(err),
            Self::Completed | Self::Cancelled => None,
        }
    }

    /// Owned variant of [`StreamOutcome::error`].
    #[must_use]
    pub fn into_error(self) -> Option<TransportError> {
        match self {
            Self::Failed(err) => Some(err),
            Self::Completed | Self::Cancelled => None,
        }
    }

    /// Whether the session ended because it was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// HTTP method of a [`StreamRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    #[default]
    Post,
}

impl Method {
    /// The method as it appears on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// A fully-formed request. Sessions hand it to the transport untouched.
///
/// # Example
///
/// ```
/// use ripple_types::StreamRequest;
///
/// let request = StreamRequest::post("https://api.openai.com/v1/chat/completions")
///     .bearer_auth("sk-...")
///     .json(&serde_json::json!({"model": "gpt-4o", "stream": true}))
///     .unwrap();
/// assert_eq!(request.header_value("content-type"), Some("application/json"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StreamRequest {
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
}

impl StreamRequest {
    /// A request with the given method and URL and nothing else.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// A `GET` request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// A `POST` request.
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    /// Append a header. Repeated names are sent repeatedly.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set `Authorization: Bearer <token>`.
    #[must_use]
    pub fn bearer_auth(self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.header("authorization", value)
    }

    /// Set a raw body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body and set `content-type`.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(self.header("content-type", "application/json").body(body))
    }

    /// The HTTP method.
    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// The target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// All headers in insertion order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of the named header, compared case-insensitively.
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The body, if any.
    #[must_use]
    pub fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}
