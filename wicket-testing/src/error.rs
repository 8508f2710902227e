//! Error type of the test clients

use std::{
    error::Error as StdError,
    fmt,
    io::Error as IoError,
};

use tokio_tungstenite::tungstenite;

/// Close codes that end a WebSocket session normally
const CLEAN_CLOSE_CODES: [u16; 2] = [1000, 1001];

/// An error produced while driving a request cycle
#[derive(Debug)]
pub enum TestClientError {
    /// Outbound calls failed inside a server cycle.
    ///
    /// Collected while the server runs and raised once it has stopped.
    Request(Vec<TestClientError>),

    /// No response was obtained and `allow_none` was not set
    NoResponse {
        /// Whether the inbound request was captured anyway
        request_captured: bool,
    },

    /// The server failed to start or to shut down
    Server(IoError),

    /// A lifecycle listener or the application failed
    App(wicket::error::Error),

    /// The HTTP client failed
    Http(reqwest::Error),

    /// The WebSocket client failed
    WebSocket(tungstenite::Error),

    /// The WebSocket peer closed the connection
    ConnectionClosed {
        /// Close code, `None` if the connection ended without a close frame
        code: Option<u16>,

        /// Close reason
        reason: String,
    },

    /// The request could not be built
    InvalidRequest(String),

    /// The response body is not the expected JSON
    Json(serde_json::Error),

    /// The reusable client has no running server
    NotRunning,
}

impl fmt::Display for TestClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(errors) => {
                f.write_str("Exception during request: [")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{err}")?;
                }
                f.write_str("]")
            },
            Self::NoResponse { request_captured: true } => {
                f.write_str("Request and response object expected, got (request, None)")
            },
            Self::NoResponse { request_captured: false } => {
                f.write_str("No response returned to the test client")
            },
            Self::Server(err) => write!(f, "Server error: {err}"),
            Self::App(err) => write!(f, "Application error: {err}"),
            Self::Http(err) => write!(f, "HTTP client error: {err}"),
            Self::WebSocket(err) => write!(f, "WebSocket error: {err}"),
            Self::ConnectionClosed { code: Some(code), reason } => {
                write!(f, "WebSocket connection closed: {code} {reason}")
            },
            Self::ConnectionClosed { code: None, .. } => {
                f.write_str("WebSocket connection closed")
            },
            Self::InvalidRequest(message) => write!(f, "Invalid request: {message}"),
            Self::Json(err) => write!(f, "JSON error: {err}"),
            Self::NotRunning => f.write_str("Test server is not running, call `run()` first"),
        }
    }
}

impl StdError for TestClientError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Server(err) => Some(err),
            Self::App(err) => Some(err),
            Self::Http(err) => Some(err),
            Self::WebSocket(err) => Some(err),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<IoError> for TestClientError {
    #[inline]
    fn from(err: IoError) -> Self {
        Self::Server(err)
    }
}

impl From<wicket::error::Error> for TestClientError {
    #[inline]
    fn from(err: wicket::error::Error) -> Self {
        Self::App(err)
    }
}

impl From<reqwest::Error> for TestClientError {
    #[inline]
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

impl From<serde_json::Error> for TestClientError {
    #[inline]
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

impl From<tungstenite::Error> for TestClientError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::ConnectionClosed { code: None, reason: String::new() }
            },
            err => Self::WebSocket(err),
        }
    }
}

impl TestClientError {
    /// Returns `true` if the WebSocket peer ended the session normally
    #[inline]
    pub fn is_clean_close(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed { code: None, .. }
        ) || matches!(
            self,
            Self::ConnectionClosed { code: Some(code), .. } if CLEAN_CLOSE_CODES.contains(code)
        )
    }
}
