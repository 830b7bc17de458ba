//! Lifecycle callbacks.
//!
//! A [`SocketHandler`] is registered with the socket when it is opened and
//! owned by the connection task from then on. Callbacks run sequentially on
//! that task and must not block.

use super::events::{CloseEvent, MessageEvent, OpenEvent};
use crate::error::ClientError;

/// Callbacks for the services socket lifecycle.
///
/// Ordering: `on_open` fires before any `on_message`; `on_close` fires
/// exactly once and nothing fires after it. `on_open` never fires if the
/// handshake fails.
pub trait SocketHandler: Send + 'static {
    /// The handshake completed.
    fn on_open(&mut self, _event: &OpenEvent) {}

    /// A frame decoded to one or more JSON values.
    fn on_message(&mut self, event: &MessageEvent);

    /// Something went wrong. Fatal errors are followed by `on_close`;
    /// payload errors leave the connection open.
    fn on_error(&mut self, _error: &ClientError) {}

    /// The connection ended.
    fn on_close(&mut self, _event: &CloseEvent) {}
}

/// Handler that logs every lifecycle event through `tracing`.
#[derive(Debug, Default)]
pub struct LoggingHandler {
    received: u64,
    errors: u64,
}

impl LoggingHandler {
    /// Creates a handler with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of JSON values received so far.
    #[must_use]
    pub const fn received(&self) -> u64 {
        self.received
    }

    /// Number of errors reported so far.
    #[must_use]
    pub const fn errors(&self) -> u64 {
        self.errors
    }
}

impl SocketHandler for LoggingHandler {
    fn on_open(&mut self, event: &OpenEvent) {
        tracing::info!(
            connection_id = %event.connection_id,
            url = %event.url,
            "services socket open"
        );
    }

    fn on_message(&mut self, event: &MessageEvent) {
        for value in &event.values {
            self.received += 1;
            tracing::info!(
                connection_id = %event.connection_id,
                message = %value,
                "received message from server"
            );
        }
    }

    fn on_error(&mut self, error: &ClientError) {
        self.errors += 1;
        if error.is_fatal() {
            tracing::error!(kind = error.kind(), error = %error, "services socket error");
        } else {
            tracing::warn!(kind = error.kind(), error = %error, "dropped undecodable frame");
        }
    }

    fn on_close(&mut self, event: &CloseEvent) {
        tracing::info!(
            connection_id = %event.connection_id,
            code = event.code,
            reason = %event.reason,
            was_clean = event.was_clean,
            received = self.received,
            "services socket closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PayloadError;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn counts_every_value_in_a_batch() {
        let mut handler = LoggingHandler::new();
        handler.on_message(&MessageEvent {
            connection_id: Uuid::new_v4(),
            values: vec![json!({"id": 1}), json!({"id": 2})],
            received_at: Utc::now(),
        });
        assert_eq!(handler.received(), 2);
    }

    #[test]
    fn counts_errors() {
        let mut handler = LoggingHandler::new();
        handler.on_error(&ClientError::Payload(PayloadError::Empty));
        handler.on_error(&ClientError::ConnectTimeout(std::time::Duration::from_secs(1)));
        assert_eq!(handler.errors(), 2);
        assert_eq!(handler.received(), 0);
    }

    #[test]
    fn close_does_not_touch_counters() {
        let mut handler = LoggingHandler::new();
        handler.on_close(&CloseEvent::abnormal(Uuid::new_v4()));
        assert_eq!(handler.received(), 0);
        assert_eq!(handler.errors(), 0);
    }
}
