//! # services-socket
//!
//! WebSocket client for the discovery server's services socket.
//!
//! The client derives a `ws://` URL from the server's origin, opens exactly
//! one socket to `/services-socket`, and reports its lifecycle (open,
//! message, error, close) to a registered handler. Inbound frames carry bare
//! JSON values which are decoded and handed over, never stored.
//!
//! ## Architecture
//!
//! ```text
//! ClientConfig (env / .env)
//!     │
//!     ├── PageLocation → SocketEndpoint (location/)
//!     │
//!     ├── ServicesSocket (socket/client)
//!     │       ├── ReadyState watch
//!     │       └── payload decoding (socket/payload)
//!     │
//!     └── SocketHandler callbacks (socket/handler)
//! ```

pub mod config;
pub mod error;
pub mod location;
pub mod socket;
