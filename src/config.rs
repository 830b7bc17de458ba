//! Client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).
//!
//! | Variable               | Default                 |
//! |------------------------|-------------------------|
//! | `SERVICES_ORIGIN`      | `http://localhost:9876` |
//! | `SERVICES_SOCKET_PATH` | `/services-socket`      |
//! | `CONNECT_TIMEOUT_SECS` | `10`                    |
//! | `CLOSE_TIMEOUT_SECS`   | `5`                     |
//! | `LOG_FORMAT`           | `text`                  |

use std::str::FromStr;
use std::time::Duration;

use crate::error::LocationError;
use crate::location::{PageLocation, SERVICES_SOCKET_PATH, SocketEndpoint, normalize_path};
use crate::socket::SocketOptions;

/// Origin used when `SERVICES_ORIGIN` is not set: the discovery server's
/// default listen port on the local machine.
pub const DEFAULT_ORIGIN: &str = "http://localhost:9876";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Reads `LOG_FORMAT` on its own, so logging can start before the rest
    /// of the configuration is validated.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads `LOG_FORMAT` from an arbitrary key lookup, defaulting to text.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        parse_var(&lookup, "LOG_FORMAT", Self::Text)
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Top-level client configuration.
///
/// Loaded once at startup via [`ClientConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server the socket is derived from.
    pub location: PageLocation,

    /// Normalised socket route.
    pub socket_path: String,

    /// Handshake timeout.
    pub connect_timeout: Duration,

    /// Wait for the peer's close frame after a local close.
    pub close_timeout: Duration,

    /// Log output format.
    pub log_format: LogFormat,
}

impl ClientConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `SERVICES_ORIGIN` or `SERVICES_SOCKET_PATH` is
    /// set but unusable.
    pub fn from_env() -> Result<Self, LocationError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Numeric and format settings fall back to their defaults when missing
    /// or invalid.
    ///
    /// # Errors
    ///
    /// Returns an error if the origin or the socket path is unusable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LocationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let origin = lookup("SERVICES_ORIGIN").unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        let location = PageLocation::parse(&origin)?;

        let socket_path = lookup("SERVICES_SOCKET_PATH")
            .unwrap_or_else(|| SERVICES_SOCKET_PATH.to_string());
        let socket_path = normalize_path(&socket_path)?;

        let connect_timeout = Duration::from_secs(parse_var(&lookup, "CONNECT_TIMEOUT_SECS", 10));
        let close_timeout = Duration::from_secs(parse_var(&lookup, "CLOSE_TIMEOUT_SECS", 5));
        let log_format = LogFormat::from_lookup(&lookup);

        Ok(Self {
            location,
            socket_path,
            connect_timeout,
            close_timeout,
            log_format,
        })
    }

    /// Replaces the location with one parsed from `origin`.
    ///
    /// # Errors
    ///
    /// Returns an error if `origin` is unusable.
    pub fn with_origin(mut self, origin: &str) -> Result<Self, LocationError> {
        self.location = PageLocation::parse(origin)?;
        Ok(self)
    }

    /// WebSocket endpoint derived from the location and socket path.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket path is unusable, which cannot happen
    /// for a configuration built by [`ClientConfig::from_lookup`].
    pub fn endpoint(&self) -> Result<SocketEndpoint, LocationError> {
        SocketEndpoint::for_location(&self.location, &self.socket_path)
    }

    /// Connection timeouts.
    #[must_use]
    pub const fn socket_options(&self) -> SocketOptions {
        SocketOptions {
            connect_timeout: self.connect_timeout,
            close_timeout: self.close_timeout,
        }
    }
}

/// Parses a variable as `T`, returning `default` on missing or invalid values.
fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ClientConfig, LocationError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ClientConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let Ok(config) = load(&[]) else {
            panic!("defaults should load");
        };
        assert_eq!(config.socket_path, SERVICES_SOCKET_PATH);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.close_timeout, Duration::from_secs(5));
        assert_eq!(config.log_format, LogFormat::Text);
        let Ok(endpoint) = config.endpoint() else {
            panic!("default endpoint should derive");
        };
        assert_eq!(endpoint.as_str(), "ws://localhost:9876/services-socket");
    }

    #[test]
    fn values_from_lookup() {
        let Ok(config) = load(&[
            ("SERVICES_ORIGIN", "https://discovery.example:8443"),
            ("SERVICES_SOCKET_PATH", "services-socket/"),
            ("CONNECT_TIMEOUT_SECS", "3"),
            ("CLOSE_TIMEOUT_SECS", "1"),
            ("LOG_FORMAT", "JSON"),
        ]) else {
            panic!("config should load");
        };
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.socket_options().close_timeout, Duration::from_secs(1));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.endpoint().ok().map(|e| e.to_string()).as_deref(),
            Some("wss://discovery.example:8443/services-socket")
        );
    }

    #[test]
    fn invalid_numbers_fall_back() {
        let Ok(config) = load(&[("CONNECT_TIMEOUT_SECS", "soon"), ("LOG_FORMAT", "xml")]) else {
            panic!("config should load");
        };
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn invalid_origin_is_an_error() {
        assert!(matches!(
            load(&[("SERVICES_ORIGIN", "gopher://old.net")]),
            Err(LocationError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            load(&[("SERVICES_SOCKET_PATH", "/")]),
            Err(LocationError::InvalidPath(_))
        ));
    }

    #[test]
    fn log_format_without_valid_origin() {
        let lookup = |key: &str| match key {
            "LOG_FORMAT" => Some("json".to_string()),
            "SERVICES_ORIGIN" => Some("http://host:99999".to_string()),
            _ => None,
        };
        assert_eq!(LogFormat::from_lookup(lookup), LogFormat::Json);
        assert!(ClientConfig::from_lookup(lookup).is_err());
        assert_eq!(LogFormat::from_lookup(|_| None), LogFormat::Text);
    }

    #[test]
    fn origin_override() {
        let Ok(config) = load(&[]) else {
            panic!("defaults should load");
        };
        let Ok(config) = config.with_origin("10.0.0.7:5923") else {
            panic!("override should parse");
        };
        assert_eq!(
            config.endpoint().ok().map(|e| e.to_string()).as_deref(),
            Some("ws://10.0.0.7:5923/services-socket")
        );
    }
}
