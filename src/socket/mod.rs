//! Services socket: connection task, lifecycle events, callbacks, decoding.
//!
//! The discovery server pushes service updates over a WebSocket mounted at
//! [`crate::location::SERVICES_SOCKET_PATH`]. This module opens that socket
//! once and reports open, message, error and close events to a
//! [`SocketHandler`].

pub mod client;
pub mod events;
pub mod handler;
pub mod payload;

pub use client::{ServicesSocket, SocketOptions};
pub use events::{CloseEvent, MessageEvent, OpenEvent, ReadyState};
pub use handler::{LoggingHandler, SocketHandler};
