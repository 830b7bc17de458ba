//! Client error types.
//!
//! [`ClientError`] is the error reported to [`crate::socket::SocketHandler::on_error`].
//! Payload errors are recoverable and leave the connection open; every other
//! variant ends the connection and is followed by a close event.

use std::time::Duration;

use tokio_tungstenite::tungstenite;

/// Errors raised while deriving the socket URL from a location.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    /// The origin could not be parsed at all.
    #[error("invalid origin: {0:?}")]
    InvalidOrigin(String),

    /// The origin uses a scheme other than `http` or `https`.
    #[error("unsupported origin scheme: {0}")]
    UnsupportedScheme(String),

    /// The origin parsed but carries no host.
    #[error("origin has no host: {0:?}")]
    MissingHost(String),

    /// The socket path is empty or contains whitespace.
    #[error("invalid socket path: {0:?}")]
    InvalidPath(String),
}

/// Errors raised while decoding an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    /// The frame was empty or whitespace only.
    #[error("empty payload")]
    Empty,

    /// A binary frame did not contain UTF-8 text.
    #[error("binary payload is not valid UTF-8")]
    NotUtf8,

    /// The frame text is not a sequence of JSON values.
    #[error("malformed JSON payload: {message}")]
    Malformed {
        /// 1-based line of the first error.
        line: usize,
        /// 1-based column of the first error.
        column: usize,
        /// Parser message.
        message: String,
    },
}

impl From<serde_json::Error> for PayloadError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed {
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        }
    }
}

/// Errors observed over the lifetime of a services socket.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The target URL could not be derived.
    #[error(transparent)]
    Location(#[from] LocationError),

    /// The handshake failed (refused, rejected upgrade, bad URL).
    #[error("connection failed: {0}")]
    Connect(#[source] tungstenite::Error),

    /// The handshake did not finish in time.
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The established connection failed.
    #[error("transport error: {0}")]
    Transport(#[source] tungstenite::Error),

    /// An inbound frame could not be decoded.
    #[error("invalid payload: {0}")]
    Payload(#[from] PayloadError),

    /// The connection task panicked or was cancelled.
    #[error("socket task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ClientError {
    /// Returns `true` if this error ends the connection.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Payload(_))
    }

    /// Short machine-readable label, used as a log field.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Location(_) => "location",
            Self::Connect(_) => "connect",
            Self::ConnectTimeout(_) => "connect_timeout",
            Self::Transport(_) => "transport",
            Self::Payload(_) => "payload",
            Self::Task(_) => "task",
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn payload_errors_are_not_fatal() {
        let err = ClientError::from(PayloadError::Empty);
        assert!(!err.is_fatal());
        assert_eq!(err.kind(), "payload");
    }

    #[test]
    fn connect_errors_are_fatal() {
        let err = ClientError::Connect(tungstenite::Error::ConnectionClosed);
        assert!(err.is_fatal());
        assert_eq!(err.kind(), "connect");

        let err = ClientError::ConnectTimeout(Duration::from_secs(3));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("3s"));
    }

    #[test]
    fn malformed_json_keeps_position() {
        let Err(json_err) = serde_json::from_str::<serde_json::Value>("{\"a\":") else {
            panic!("expected a parse error");
        };
        let PayloadError::Malformed { line, column, .. } = PayloadError::from(json_err) else {
            panic!("expected Malformed");
        };
        assert_eq!(line, 1);
        assert!(column > 0);
    }

    #[test]
    fn location_error_is_transparent() {
        let err = ClientError::from(LocationError::MissingHost("http://".to_string()));
        assert_eq!(err.to_string(), "origin has no host: \"http://\"");
    }
}
