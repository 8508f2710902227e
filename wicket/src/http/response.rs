//! HTTP response types and conversions

use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use hyper::Response;

use crate::{
    error::Error,
    headers::{HeaderMap, HeaderValue, CONTENT_TYPE},
    http::{StatusCode, Version},
};

pub(crate) const TEXT_UTF_8: &str = "text/plain; charset=utf-8";

/// Result of a request handler or a middleware
pub type HttpResult = Result<HttpResponse, Error>;

/// A fully buffered outgoing response
pub struct HttpResponse {
    inner: Response<Bytes>,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.inner.status())
            .field("headers", self.inner.headers())
            .field("body_len", &self.inner.body().len())
            .finish()
    }
}

impl From<Response<Bytes>> for HttpResponse {
    #[inline]
    fn from(inner: Response<Bytes>) -> Self {
        Self { inner }
    }
}

impl HttpResponse {
    /// Creates a response with the given status and body
    #[inline]
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        let mut inner = Response::new(body.into());
        *inner.status_mut() = status;
        Self { inner }
    }

    /// Returns the status code
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    /// Returns the mutable status code
    #[inline]
    pub fn status_mut(&mut self) -> &mut StatusCode {
        self.inner.status_mut()
    }

    /// Returns the HTTP version
    #[inline]
    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// Returns the response headers
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Returns the mutable response headers
    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    /// Returns the body bytes
    #[inline]
    pub fn body(&self) -> &Bytes {
        self.inner.body()
    }

    /// Returns the mutable body
    #[inline]
    pub fn body_mut(&mut self) -> &mut Bytes {
        self.inner.body_mut()
    }

    /// Unwraps into the underlying [`Response`]
    #[inline]
    pub fn into_inner(self) -> Response<Bytes> {
        self.inner
    }

    /// Adds a header, replacing any previous value
    pub fn with_header(mut self, name: &'static str, value: HeaderValue) -> Self {
        self.inner.headers_mut().insert(name, value);
        self
    }
}

/// Shortcuts for common responses
#[derive(Debug)]
pub struct Results;

impl Results {
    /// `200 OK` without a body
    #[inline]
    pub fn ok() -> HttpResult {
        Ok(HttpResponse::new(StatusCode::OK, Bytes::new()))
    }

    /// `200 OK` with a `text/plain; charset=utf-8` body
    #[inline]
    pub fn text(text: impl Into<String>) -> HttpResult {
        Ok(text_response(StatusCode::OK, text.into()))
    }

    /// `200 OK` with a JSON body
    #[inline]
    pub fn json<T: Serialize + ?Sized>(value: &T) -> HttpResult {
        json_response(StatusCode::OK, value)
    }

    /// Empty response with the given status
    #[inline]
    pub fn status(status: StatusCode) -> HttpResult {
        Ok(HttpResponse::new(status, Bytes::new()))
    }

    /// `404 Not Found`
    #[inline]
    pub fn not_found() -> HttpResult {
        Self::status(StatusCode::NOT_FOUND)
    }
}

/// Wraps a serializable value to be sent as `application/json`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

/// Conversion of handler return values into an [`HttpResult`]
pub trait IntoResponse {
    /// Performs the conversion
    fn into_response(self) -> HttpResult;
}

impl IntoResponse for HttpResponse {
    #[inline]
    fn into_response(self) -> HttpResult {
        Ok(self)
    }
}

impl IntoResponse for () {
    #[inline]
    fn into_response(self) -> HttpResult {
        Results::ok()
    }
}

impl IntoResponse for &'static str {
    #[inline]
    fn into_response(self) -> HttpResult {
        Ok(text_response(StatusCode::OK, Bytes::from_static(self.as_bytes())))
    }
}

impl IntoResponse for String {
    #[inline]
    fn into_response(self) -> HttpResult {
        Ok(text_response(StatusCode::OK, self))
    }
}

impl IntoResponse for StatusCode {
    #[inline]
    fn into_response(self) -> HttpResult {
        Results::status(self)
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    #[inline]
    fn into_response(self) -> HttpResult {
        json_response(StatusCode::OK, &self.0)
    }
}

impl<T: IntoResponse> IntoResponse for (StatusCode, T) {
    #[inline]
    fn into_response(self) -> HttpResult {
        let (status, inner) = self;
        let mut response = inner.into_response()?;
        *response.status_mut() = status;
        Ok(response)
    }
}

impl<T, E> IntoResponse for Result<T, E>
where
    T: IntoResponse,
    E: Into<Error>
{
    #[inline]
    fn into_response(self) -> HttpResult {
        match self {
            Ok(ok) => ok.into_response(),
            Err(err) => Err(err.into()),
        }
    }
}

#[inline]
fn text_response(status: StatusCode, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = HttpResponse::new(status, body);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_UTF_8));
    response
}

#[inline]
fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> HttpResult {
    let body = serde_json::to_vec(value).map_err(Error::server_error)?;
    let mut response = HttpResponse::new(status, body);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(mime::APPLICATION_JSON.as_ref()));
    Ok(response)
}
