//! Error taxonomy for the adapter.
//!
//! # Design Decisions
//! - One error type per operation family, so callers match only what can happen
//! - `TransportError` is `Clone`: a single listener error fails the pending bind
//!   and is also forwarded to the request stream
//! - Unsupported features fail immediately with `UnsupportedOperation`,
//!   never by silently doing nothing

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::lifecycle::ServerState;

/// Features this adapter intentionally does not implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UnsupportedOperation {
    /// Binding several listener instances to one socket (`shared = true`).
    #[error("shared listener binding is not supported")]
    SharedBinding,

    /// Closing a server while forcibly terminating in-flight connections.
    #[error("forced close is not supported")]
    ForcedClose,

    /// Session storage on requests.
    #[error("sessions are not supported")]
    Session,

    /// Client certificate access on requests.
    #[error("client certificates are not supported")]
    ClientCertificate,

    /// Taking over the raw socket of a response.
    #[error("socket detachment is not supported")]
    DetachSocket,

    /// Transparent response compression.
    #[error("automatic compression is not supported")]
    AutoCompress,

    /// Per-connection idle timeouts.
    #[error("idle timeouts are not supported")]
    IdleTimeout,

    /// Toggling output buffering.
    #[error("output buffering control is not supported")]
    BufferOutput,

    /// Response deadlines.
    #[error("response deadlines are not supported")]
    Deadline,
}

/// Native listener-level or connection-level failure.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Socket-level I/O failure.
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    /// The native transport reported a protocol violation.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer, or the transport side of an exchange, went away.
    #[error("connection closed")]
    ConnectionClosed,
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::Io(Arc::new(err))
    }
}

impl From<hyper::Error> for TransportError {
    fn from(err: hyper::Error) -> Self {
        TransportError::Protocol(err.to_string())
    }
}

/// Listener setup failed.
#[derive(Debug, Error)]
pub enum BindError {
    #[error(transparent)]
    Unsupported(#[from] UnsupportedOperation),

    /// The host name could not be resolved.
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    /// The resolver returned no candidates.
    #[error("no addresses found for {0}")]
    NoAddresses(String),

    /// The native listener reported an error before it started listening.
    #[error("listener failed to start: {0}")]
    Listen(#[source] TransportError),

    /// The native listener went away without reporting anything.
    #[error("listener was dropped before it started listening")]
    Aborted,
}

/// Closing a server failed.
#[derive(Debug, Error)]
pub enum CloseError {
    #[error(transparent)]
    Unsupported(#[from] UnsupportedOperation),

    /// Another close call is still waiting for listener teardown.
    #[error("server is already closing")]
    InProgress,
}

/// Subscribing to the request stream failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubscribeError {
    #[error("request stream already has a subscriber")]
    AlreadySubscribed,

    #[error("server is {0}")]
    Closed(ServerState),
}

/// A header, status or reason phrase was mutated after the response head
/// was sent, or a request header was mutated at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot modify {target}: headers are immutable")]
pub struct HeaderImmutableError {
    pub target: String,
}

impl HeaderImmutableError {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

/// Writing to a response failed.
#[derive(Debug, Clone, Error)]
pub enum ResponseError {
    #[error(transparent)]
    HeaderImmutable(#[from] HeaderImmutableError),

    #[error(transparent)]
    Unsupported(#[from] UnsupportedOperation),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Output was written after `close()`.
    #[error("response already closed")]
    Closed,
}

/// Reading a request body failed.
#[derive(Debug, Clone, Error)]
pub enum BodyError {
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// The externally visible request URI could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    #[error("invalid request URI {uri}: {source}")]
    Invalid {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    /// Neither forwarding headers, `host`, nor the local socket named a host.
    #[error("request has no host and the local address is unknown")]
    NoHost,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_converts_into_bind_and_close_errors() {
        let bind: BindError = UnsupportedOperation::SharedBinding.into();
        assert!(matches!(
            bind,
            BindError::Unsupported(UnsupportedOperation::SharedBinding)
        ));

        let close: CloseError = UnsupportedOperation::ForcedClose.into();
        assert_eq!(close.to_string(), "forced close is not supported");
    }

    #[test]
    fn transport_error_is_cloneable_from_io() {
        let err = TransportError::from(io::Error::new(io::ErrorKind::AddrInUse, "taken"));
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
        assert!(err.to_string().contains("taken"));
    }

    #[test]
    fn header_immutable_names_target() {
        let err = HeaderImmutableError::new("set-cookie");
        assert_eq!(
            err.to_string(),
            "cannot modify set-cookie: headers are immutable"
        );
    }
}
