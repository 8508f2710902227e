//! Error handling tools

use std::{
    convert::Infallible,
    fmt,
    io::{ErrorKind, Error as IoError},
    error::Error as StdError
};

use bytes::Bytes;
use crate::{
    headers::{HeaderValue, CONTENT_TYPE},
    http::StatusCode,
    HttpResponse
};

pub(crate) type BoxError = Box<
    dyn StdError
    + Send
    + Sync
>;

/// Generic error
#[derive(Debug)]
pub struct Error {
    /// HTTP status code
    pub status: StatusCode,

    /// An instance where this error happened
    pub instance: Option<String>,

    /// Inner error object
    pub(crate) inner: BoxError,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.inner.as_ref())
    }
}

impl From<Infallible> for Error {
    fn from(infallible: Infallible) -> Error {
        match infallible {}
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Self::client_error(err)
    }
}

impl From<serde_urlencoded::de::Error> for Error {
    fn from(err: serde_urlencoded::de::Error) -> Error {
        Self::client_error(err)
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Error {
        Self::client_error(err)
    }
}

impl From<IoError> for Error {
    #[inline]
    fn from(err: IoError) -> Self {
        let status = match err.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe => StatusCode::BAD_GATEWAY,
            ErrorKind::AlreadyExists => StatusCode::CONFLICT,
            ErrorKind::InvalidInput | ErrorKind::InvalidData => StatusCode::BAD_REQUEST,
            ErrorKind::TimedOut => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR
        };

        Self {
            instance: None,
            inner: err.into(),
            status
        }
    }
}

impl From<hyper::http::Error> for Error {
    #[inline]
    fn from(err: hyper::http::Error) -> Self {
        Self::server_error(err)
    }
}

impl From<Error> for IoError {
    #[inline]
    fn from(err: Error) -> Self {
        Self::other(err)
    }
}

impl Error {
    /// Creates a new [`Error`]
    pub fn new(instance: &str, err: impl Into<BoxError>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            inner: err.into(),
            instance: Some(instance.into())
        }
    }

    /// Creates an internal server error
    #[inline]
    pub fn server_error(err: impl Into<BoxError>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            inner: err.into(),
            instance: None,
        }
    }

    /// Creates a client error
    #[inline]
    pub fn client_error(err: impl Into<BoxError>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            inner: err.into(),
            instance: None,
        }
    }

    /// Creates [`Error`] from status code, instance and underlying error
    #[inline]
    pub fn from_parts(status: StatusCode, instance: Option<String>, err: impl Into<BoxError>) -> Self {
        Self { status, instance, inner: err.into() }
    }

    /// Unwraps the inner error
    pub fn into_inner(self) -> BoxError {
        self.inner
    }

    /// Check if the status is within 500-599.
    #[inline]
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Check if the status is within 400-499.
    #[inline]
    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }
}

/// Turns an unhandled [`Error`] into a plain-text response.
///
/// Client errors carry their message. Server errors carry it only when
/// `debug` is set, otherwise the canonical reason phrase is sent.
pub(crate) fn default_error_response(err: Error, debug: bool) -> HttpResponse {
    #[cfg(feature = "tracing")]
    if err.is_server_error() {
        tracing::error!(status = %err.status, instance = ?err.instance, "unhandled error: {err:#}");
    } else {
        tracing::debug!(status = %err.status, instance = ?err.instance, "request rejected: {err:#}");
    }

    let message = if err.is_server_error() && !debug {
        err.status
            .canonical_reason()
            .unwrap_or("Internal Server Error")
            .to_owned()
    } else {
        err.to_string()
    };

    let mut response = HttpResponse::new(err.status, Bytes::from(message));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(crate::http::response::TEXT_UTF_8));
    response
}
