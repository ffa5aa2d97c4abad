//! HTTP transport backed by `reqwest`.

use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use ripple_types::{ByteStream, Method, StreamRequest, Transport, TransportError};

use crate::error::{map_http_status, map_reqwest_error};

/// Streams response bodies over HTTP.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use ripple::HttpTransport;
///
/// let transport = HttpTransport::new().timeout(Duration::from_secs(600));
/// ```
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    /// Shared HTTP client.
    pub(crate) client: reqwest::Client,
    /// Whole-request timeout, body included.
    pub(crate) timeout: Option<Duration>,
}

impl HttpTransport {
    /// A transport with a fresh client and no timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing client (connection pool, proxies, TLS settings).
    #[must_use]
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Fail the request with [`TransportError::Timeout`] if it has not
    /// finished, body included, within `timeout`.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn build(&self, request: &StreamRequest) -> reqwest::RequestBuilder {
        let method = match request.method() {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };
        let mut builder = self
            .client
            .request(method, request.url())
            .header("accept", "text/event-stream");
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body_bytes() {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }
}

impl Transport for HttpTransport {
    /// Send `request` and return the response body as a byte stream.
    ///
    /// Non-success statuses are read in full and returned as
    /// [`TransportError::Status`].
    fn open(
        &self,
        request: StreamRequest,
    ) -> impl Future<Output = Result<ByteStream, TransportError>> + Send {
        let builder = self.build(&request);

        async move {
            tracing::debug!(url = request.url(), "sending streaming request");

            let response = builder.send().await.map_err(map_reqwest_error)?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.map_err(map_reqwest_error)?;
                return Err(map_http_status(status, &body));
            }

            let body = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(map_reqwest_error));
            Ok(Box::pin(body) as ByteStream)
        }
    }
}
