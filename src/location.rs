//! Socket URL derivation.
//!
//! A [`PageLocation`] plays the role of a browser's `location`: the scheme,
//! host and port of the server that owns the socket. [`SocketEndpoint`] turns
//! it into the `ws://` (or `wss://`) URL of a socket route on that server.

use std::borrow::Cow;
use std::fmt;

use tokio_tungstenite::tungstenite::http::Uri;

use crate::error::LocationError;

/// Route the discovery server mounts its services socket on.
pub const SERVICES_SOCKET_PATH: &str = "/services-socket";

/// Scheme of the page/server origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plain HTTP; sockets use `ws`.
    Http,
    /// HTTP over TLS; sockets use `wss`.
    Https,
}

impl Scheme {
    /// WebSocket scheme matching this origin scheme.
    #[must_use]
    pub const fn socket_scheme(self) -> &'static str {
        match self {
            Self::Http => "ws",
            Self::Https => "wss",
        }
    }
}

/// Scheme, host and port of the server the socket belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    scheme: Scheme,
    hostname: String,
    port: Option<u16>,
}

impl PageLocation {
    /// Creates a location from its parts. `hostname` is stored without
    /// IPv6 brackets.
    #[must_use]
    pub fn new(scheme: Scheme, hostname: impl Into<String>, port: Option<u16>) -> Self {
        let hostname = hostname.into();
        let hostname = hostname
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .map_or_else(|| hostname.clone(), str::to_string);
        Self {
            scheme,
            hostname,
            port,
        }
    }

    /// Parses an origin such as `http://localhost:9876`.
    ///
    /// A bare `host[:port]` is accepted and treated as `http`. Any path,
    /// query or fragment on the origin is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError`] if the origin is empty or unparsable, uses
    /// a scheme other than `http`/`https`, or has no host.
    pub fn parse(origin: &str) -> Result<Self, LocationError> {
        let trimmed = origin.trim();
        if trimmed.is_empty() {
            return Err(LocationError::InvalidOrigin(origin.to_string()));
        }

        let with_scheme: Cow<'_, str> = if trimmed.contains("://") {
            Cow::Borrowed(trimmed)
        } else {
            Cow::Owned(format!("http://{trimmed}"))
        };

        let uri: Uri = with_scheme
            .parse()
            .map_err(|_| LocationError::InvalidOrigin(origin.to_string()))?;

        let scheme = match uri.scheme_str() {
            Some(s) if s.eq_ignore_ascii_case("http") => Scheme::Http,
            Some(s) if s.eq_ignore_ascii_case("https") => Scheme::Https,
            Some(other) => return Err(LocationError::UnsupportedScheme(other.to_string())),
            None => return Err(LocationError::InvalidOrigin(origin.to_string())),
        };

        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| LocationError::MissingHost(origin.to_string()))?;

        let port = match uri.authority() {
            Some(authority) => explicit_port(authority.as_str(), host)
                .ok_or_else(|| LocationError::InvalidOrigin(origin.to_string()))?,
            None => None,
        };

        Ok(Self::new(scheme, host, port))
    }

    /// Origin scheme.
    #[must_use]
    pub const fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Host name, without IPv6 brackets.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Explicit port, if the origin carried one.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    /// `host[:port]` as it appears in a URL authority.
    #[must_use]
    pub fn host(&self) -> String {
        let name = if self.hostname.contains(':') {
            format!("[{}]", self.hostname)
        } else {
            self.hostname.clone()
        };
        match self.port {
            Some(port) => format!("{name}:{port}"),
            None => name,
        }
    }
}

impl fmt::Display for PageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            Scheme::Http => "http",
            Scheme::Https => "https",
        };
        write!(f, "{scheme}://{}", self.host())
    }
}

/// Port written after `host` in `authority`.
///
/// Returns `Some(None)` when there is no port, `None` when the port text is
/// present but not a valid `u16` (including an empty `host:`).
fn explicit_port(authority: &str, host: &str) -> Option<Option<u16>> {
    let rest = authority.rsplit_once(host).map_or("", |(_, rest)| rest);
    if rest.is_empty() {
        return Some(None);
    }
    rest.strip_prefix(':')?.parse::<u16>().ok().map(Some)
}

/// Normalises a route path: one leading `/`, no trailing `/`.
///
/// # Errors
///
/// Returns [`LocationError::InvalidPath`] if nothing is left after trimming
/// slashes, or if the path contains whitespace.
pub fn normalize_path(path: &str) -> Result<String, LocationError> {
    let inner = path.trim().trim_matches('/');
    if inner.is_empty() || inner.contains(char::is_whitespace) {
        return Err(LocationError::InvalidPath(path.to_string()));
    }
    Ok(format!("/{inner}"))
}

/// Fully derived WebSocket URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SocketEndpoint {
    url: String,
}

impl SocketEndpoint {
    /// Endpoint of the services socket on `location`.
    #[must_use]
    pub fn services(location: &PageLocation) -> Self {
        Self::build(location, SERVICES_SOCKET_PATH)
    }

    /// Endpoint of an arbitrary socket route on `location`.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::InvalidPath`] if `path` is not a usable route.
    pub fn for_location(location: &PageLocation, path: &str) -> Result<Self, LocationError> {
        let path = normalize_path(path)?;
        Ok(Self::build(location, &path))
    }

    fn build(location: &PageLocation, path: &str) -> Self {
        Self {
            url: format!(
                "{}://{}{path}",
                location.scheme().socket_scheme(),
                location.host()
            ),
        }
    }

    /// The URL as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}
