//! Cancel-only capability for an in-flight session.

use std::fmt;

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

/// Identifies one streaming session in logs and handler callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// A fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Handle to the network resource behind a stream.
///
/// The only thing a handle can do to a session is cancel it. Cancelling is
/// cooperative: the session stops reading, releases its connection and then
/// reports [`StreamOutcome::Cancelled`](crate::StreamOutcome::Cancelled)
/// through its handler. Clones refer to the same session.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    id: SessionId,
    token: CancellationToken,
}

impl SessionHandle {
    /// A handle for a new, not yet cancelled session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            token: CancellationToken::new(),
        }
    }

    /// The session id.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Request cancellation. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once cancellation has been requested.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}
