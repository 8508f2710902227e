//! Target URL derivation

use std::net::{SocketAddr, ToSocketAddrs};
use crate::error::TestClientError;

/// Prefixes of URIs that are used as they are
const ABSOLUTE_PREFIXES: [&str; 7] = ["http:", "https:", "ftp:", "ftps://", "//", "ws:", "wss:"];

/// URL scheme of a request cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plain HTTP request
    Http,
    /// WebSocket handshake
    Ws,
}

impl Scheme {
    #[inline]
    fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Ws => "ws",
        }
    }
}

/// Returns `true` if `uri` already carries a scheme or an authority
#[inline]
pub fn is_absolute(uri: &str) -> bool {
    ABSOLUTE_PREFIXES.iter().any(|prefix| uri.starts_with(prefix))
}

/// Builds `{scheme}://{host}:{port}{path}` for a relative `uri`,
/// prefixing it with `/` when missing; absolute URIs pass through.
///
/// # Example
/// ```
/// use wicket_testing::url::{target_url, Scheme};
///
/// assert_eq!(target_url(Scheme::Http, "127.0.0.1", 8080, "users"), "http://127.0.0.1:8080/users");
/// assert_eq!(target_url(Scheme::Ws, "127.0.0.1", 8080, "/ws"), "ws://127.0.0.1:8080/ws");
/// assert_eq!(target_url(Scheme::Http, "127.0.0.1", 8080, "https://example.com/"), "https://example.com/");
/// ```
pub fn target_url(scheme: Scheme, host: &str, port: u16, uri: &str) -> String {
    if is_absolute(uri) {
        return uri.to_owned();
    }

    let scheme = scheme.as_str();
    if uri.starts_with('/') {
        format!("{scheme}://{host}:{port}{uri}")
    } else {
        format!("{scheme}://{host}:{port}/{uri}")
    }
}

/// Resolves `host:port` to the first matching socket address
pub(crate) fn resolve(host: &str, port: u16) -> Result<SocketAddr, TestClientError> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| TestClientError::InvalidRequest(format!("unable to resolve {host}:{port}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_passes_absolute_uris_through() {
        for uri in [
            "http://a.b/c",
            "https://a.b/c",
            "ftp://a.b",
            "ftps://a.b",
            "//a.b/c",
            "ws://a.b/c",
            "wss://a.b/c",
        ] {
            assert_eq!(target_url(Scheme::Http, "127.0.0.1", 1, uri), uri);
        }
    }

    #[test]
    fn it_normalizes_relative_paths() {
        assert_eq!(target_url(Scheme::Http, "mockserver", 1234, "users/1"), "http://mockserver:1234/users/1");
        assert_eq!(target_url(Scheme::Http, "mockserver", 1234, "/users/1?x=2"), "http://mockserver:1234/users/1?x=2");
        assert_eq!(target_url(Scheme::Http, "mockserver", 1234, ""), "http://mockserver:1234/");
    }

    #[test]
    fn it_uses_ws_scheme_for_websockets() {
        assert_eq!(target_url(Scheme::Ws, "127.0.0.1", 42, "/ws"), "ws://127.0.0.1:42/ws");
    }

    #[test]
    fn it_resolves_ip_address() {
        let addr = resolve("127.0.0.1", 8080).unwrap();

        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 8080)));
    }
}
