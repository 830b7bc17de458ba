//! Lifecycle events and ready state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Connection state, numbered like the browser's `WebSocket.readyState`.
///
/// States only ever move forward: `Connecting` → `Open` → `Closing` →
/// `Closed`, with `Closing` (and `Open`) skippable on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ReadyState {
    /// Handshake in progress.
    Connecting = 0,
    /// Handshake complete; frames flow.
    Open = 1,
    /// A close frame was sent or received.
    Closing = 2,
    /// Connection finished.
    Closed = 3,
}

impl ReadyState {
    /// Numeric value as exposed by browsers.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns `true` if moving from `self` to `next` is a forward step.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        (next as u8) > (self as u8)
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// Fired once when the handshake completes.
#[derive(Debug, Clone, Serialize)]
pub struct OpenEvent {
    /// Identifier of this connection, for log correlation.
    pub connection_id: Uuid,
    /// URL the socket connected to.
    pub url: String,
    /// When the handshake completed.
    pub opened_at: DateTime<Utc>,
}

/// Fired for every inbound frame that decodes as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct MessageEvent {
    /// Identifier of this connection.
    pub connection_id: Uuid,
    /// Decoded values, in frame order. Batched frames carry more than one.
    pub values: Vec<serde_json::Value>,
    /// When the frame was read.
    pub received_at: DateTime<Utc>,
}

/// Fired exactly once when the connection ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseEvent {
    /// Identifier of this connection.
    pub connection_id: Uuid,
    /// Close code from the peer's close frame, or a synthetic code.
    pub code: u16,
    /// Close reason from the peer's close frame.
    pub reason: String,
    /// `true` if the closing handshake completed.
    pub was_clean: bool,
}

impl CloseEvent {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// A close frame arrived without a status code.
    pub const NO_STATUS: u16 = 1005;
    /// The connection ended without a close frame.
    pub const ABNORMAL: u16 = 1006;

    /// Close event for a connection that ended without a closing handshake.
    #[must_use]
    pub fn abnormal(connection_id: Uuid) -> Self {
        Self {
            connection_id,
            code: Self::ABNORMAL,
            reason: String::new(),
            was_clean: false,
        }
    }
}
