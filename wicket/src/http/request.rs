//! Buffered HTTP request

use bytes::Bytes;
use serde::de::DeserializeOwned;
use smallvec::SmallVec;
use std::{fmt, net::SocketAddr};

use hyper::http::request::Parts;
use crate::{
    error::Error,
    headers::{HeaderMap, HeaderName, HeaderValue},
    http::{Method, Uri, Version},
};

#[cfg(feature = "ws")]
use hyper::upgrade::OnUpgrade;

const DEFAULT_PARAMS_CAPACITY: usize = 4;

/// A single path parameter with its value, e.g. `id` = `42` for `/users/{id}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathArg {
    /// Parameter name
    pub name: Box<str>,

    /// Raw segment value
    pub value: Box<str>,
}

pub(crate) type PathArgs = SmallVec<[PathArg; DEFAULT_PARAMS_CAPACITY]>;

/// Where a WebSocket handler gets its stream from
#[cfg(feature = "ws")]
#[derive(Debug, Clone)]
pub(crate) enum UpgradeSource {
    /// A real connection upgraded by hyper after the `101` response
    Connection(OnUpgrade),

    /// No underlying socket; used by in-process calls
    Detached,
}

/// A fully buffered incoming request.
///
/// Cloning is cheap: the body is reference-counted.
#[derive(Clone)]
pub struct HttpRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    params: PathArgs,
    peer_addr: Option<SocketAddr>,
    #[cfg(feature = "ws")]
    upgrade: Option<UpgradeSource>,
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("version", &self.version)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("params", &self.params)
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}

impl HttpRequest {
    /// Creates a [`HttpRequestBuilder`] for synthesizing requests,
    /// e.g. for [`App::call`](crate::App::call).
    #[inline]
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder::new()
    }

    pub(crate) fn from_parts(parts: Parts, body: Bytes, peer_addr: SocketAddr) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            params: PathArgs::new(),
            peer_addr: Some(peer_addr),
            #[cfg(feature = "ws")]
            upgrade: None,
        }
    }

    /// Returns the HTTP method
    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI
    #[inline]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the path part of the URI
    #[inline]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Returns the raw query string, if any
    #[inline]
    pub fn query_string(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Returns the HTTP version
    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the request headers
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the mutable request headers
    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Returns the first value of a header as `&str`,
    /// `None` if it is missing or not visible ASCII
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
    }

    /// Returns the raw body bytes
    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the body as UTF-8 text
    pub fn text(&self) -> Result<&str, Error> {
        std::str::from_utf8(&self.body).map_err(Error::from)
    }

    /// Deserializes the JSON body into `T`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(Error::from)
    }

    /// Deserializes the `application/x-www-form-urlencoded` body into `T`
    pub fn form<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_urlencoded::from_bytes(&self.body).map_err(Error::from)
    }

    /// Deserializes the query string into `T`
    pub fn query<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_urlencoded::from_str(self.query_string().unwrap_or_default()).map_err(Error::from)
    }

    /// Returns the value of a path parameter captured by the matched route
    #[inline]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| &*p.name == name)
            .map(|p| &*p.value)
    }

    /// Returns all captured path parameters in route order
    #[inline]
    pub fn params(&self) -> &[PathArg] {
        &self.params
    }

    /// Returns the remote address, `None` for in-process requests
    #[inline]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    #[inline]
    pub(crate) fn set_params(&mut self, params: PathArgs) {
        self.params = params;
    }

    #[cfg(feature = "ws")]
    #[inline]
    pub(crate) fn set_upgrade(&mut self, upgrade: UpgradeSource) {
        self.upgrade = Some(upgrade);
    }

    #[cfg(feature = "ws")]
    #[inline]
    pub(crate) fn take_upgrade(&mut self) -> Option<UpgradeSource> {
        self.upgrade.take()
    }
}

/// Builds an [`HttpRequest`] without a socket.
///
/// The first invalid part is remembered and reported by [`build`](Self::build).
///
/// # Example
/// ```
/// use wicket::HttpRequest;
///
/// let req = HttpRequest::builder()
///     .method("POST")
///     .uri("/users?active=true")
///     .header("content-type", "application/json")
///     .body(r#"{"name":"ann"}"#)
///     .build()
///     .unwrap();
///
/// assert_eq!(req.path(), "/users");
/// ```
#[derive(Debug)]
pub struct HttpRequestBuilder {
    inner: Result<HttpRequest, Error>,
}

impl Default for HttpRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRequestBuilder {
    /// Creates a builder for `GET /`
    pub fn new() -> Self {
        Self {
            inner: Ok(HttpRequest {
                method: Method::GET,
                uri: Uri::from_static("/"),
                version: Version::HTTP_11,
                headers: HeaderMap::new(),
                body: Bytes::new(),
                params: PathArgs::new(),
                peer_addr: None,
                #[cfg(feature = "ws")]
                upgrade: None,
            })
        }
    }

    /// Sets the HTTP method
    pub fn method<M>(self, method: M) -> Self
    where
        Method: TryFrom<M>,
        <Method as TryFrom<M>>::Error: Into<hyper::http::Error>,
    {
        self.and_then(|mut req| {
            req.method = Method::try_from(method).map_err(into_error)?;
            Ok(req)
        })
    }

    /// Sets the URI, either a path with an optional query or an absolute URL
    pub fn uri<U>(self, uri: U) -> Self
    where
        Uri: TryFrom<U>,
        <Uri as TryFrom<U>>::Error: Into<hyper::http::Error>,
    {
        self.and_then(|mut req| {
            req.uri = Uri::try_from(uri).map_err(into_error)?;
            Ok(req)
        })
    }

    /// Sets the HTTP version
    pub fn version(self, version: Version) -> Self {
        self.and_then(|mut req| {
            req.version = version;
            Ok(req)
        })
    }

    /// Appends a header; repeated names keep all values
    pub fn header(self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.and_then(|mut req| {
            let name = HeaderName::from_bytes(name.as_ref().as_bytes())
                .map_err(Error::client_error)?;
            let value = HeaderValue::from_str(value.as_ref())
                .map_err(Error::client_error)?;
            req.headers.append(name, value);
            Ok(req)
        })
    }

    /// Sets the body
    pub fn body(self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.and_then(|mut req| {
            req.body = body;
            Ok(req)
        })
    }

    /// Attaches a detached socket so WebSocket routes
    /// can complete a handshake without a connection
    #[cfg(feature = "ws")]
    pub fn detached_socket(self) -> Self {
        self.and_then(|mut req| {
            req.upgrade = Some(UpgradeSource::Detached);
            Ok(req)
        })
    }

    /// Returns the built request or the first error encountered
    pub fn build(self) -> Result<HttpRequest, Error> {
        self.inner
    }

    #[inline]
    fn and_then<F>(self, f: F) -> Self
    where
        F: FnOnce(HttpRequest) -> Result<HttpRequest, Error>
    {
        Self { inner: self.inner.and_then(f) }
    }
}

#[inline]
fn into_error<E: Into<hyper::http::Error>>(err: E) -> Error {
    Error::client_error(err.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Paging {
        page: u32,
        size: u32,
    }

    #[test]
    fn it_builds_request() {
        let req = HttpRequest::builder()
            .method("PATCH")
            .uri("/users/1?page=2&size=10")
            .header("x-api-key", "abc")
            .body("hello")
            .build()
            .unwrap();

        assert_eq!(req.method(), Method::PATCH);
        assert_eq!(req.path(), "/users/1");
        assert_eq!(req.query_string(), Some("page=2&size=10"));
        assert_eq!(req.header("x-api-key"), Some("abc"));
        assert_eq!(req.text().unwrap(), "hello");
        assert_eq!(req.peer_addr(), None);
    }

    #[test]
    fn it_reports_invalid_header() {
        let req = HttpRequest::builder()
            .header("bad header", "value")
            .uri("/")
            .build();

        assert!(req.is_err());
    }

    #[test]
    fn it_reports_invalid_method() {
        let req = HttpRequest::builder()
            .method("GE T")
            .build();

        assert!(req.is_err());
    }

    #[test]
    fn it_keeps_repeated_headers() {
        let req = HttpRequest::builder()
            .header("cookie", "a=1")
            .header("cookie", "b=2")
            .build()
            .unwrap();

        assert_eq!(req.headers().get_all("cookie").iter().count(), 2);
    }

    #[test]
    fn it_parses_query() {
        let req = HttpRequest::builder()
            .uri("/items?page=3&size=25")
            .build()
            .unwrap();

        let paging: Paging = req.query().unwrap();

        assert_eq!(paging.page, 3);
        assert_eq!(paging.size, 25);
    }

    #[test]
    fn it_parses_json_body() {
        let req = HttpRequest::builder()
            .body(r#"{"page":1,"size":5}"#)
            .build()
            .unwrap();

        let paging: Paging = req.json().unwrap();

        assert_eq!(paging.size, 5);
    }

    #[test]
    fn it_rejects_invalid_json_body_as_client_error() {
        let req = HttpRequest::builder()
            .body("{")
            .build()
            .unwrap();

        let err = req.json::<Paging>().unwrap_err();

        assert!(err.is_client_error());
    }

    #[test]
    fn it_finds_params() {
        let mut req = HttpRequest::builder().build().unwrap();
        let mut params = PathArgs::new();
        params.push(PathArg { name: "id".into(), value: "42".into() });
        req.set_params(params);

        assert_eq!(req.param("id"), Some("42"));
        assert_eq!(req.param("name"), None);
    }
}
