//! The default JSON payload decoder.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::error::{ApiErrorEnvelope, FrameError};
use crate::traits::Decode;

/// Decodes each payload as JSON into `T`.
///
/// When a payload does not match `T` but does match the
/// `{"error": {...}}` envelope, the result is [`FrameError::Api`] rather
/// than [`FrameError::Malformed`], so servers that report failures in-band
/// surface as server errors.
pub struct JsonDecoder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDecoder<T> {
    /// A decoder for `T`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonDecoder<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonDecoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonDecoder")
            .field("output", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> Decode for JsonDecoder<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn decode(&self, payload: &[u8]) -> Result<T, FrameError> {
        serde_json::from_slice(payload).map_err(|source| {
            let payload = String::from_utf8_lossy(payload).into_owned();
            match serde_json::from_str::<ApiErrorEnvelope>(&payload) {
                Ok(envelope) => FrameError::Api {
                    payload,
                    error: envelope.error,
                },
                Err(_) => FrameError::Malformed { payload, source },
            }
        })
    }
}
