//! Test-friendly response wrapper

use bytes::Bytes;
use cookie::Cookie;
use serde::de::DeserializeOwned;
use std::{collections::HashMap, fmt, sync::OnceLock};

use wicket::{
    HttpResponse,
    headers::{HeaderMap, CONTENT_TYPE, SET_COOKIE},
    http::{StatusCode, Version},
};

use crate::error::TestClientError;

/// A response received by a test client.
///
/// The body is fully buffered, so all accessors are synchronous.
/// The JSON view of the body is parsed on first use and cached.
pub struct TestingResponse {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    url: String,
    body: Bytes,
    json: OnceLock<Option<serde_json::Value>>,
    raw_cookies: Option<HashMap<String, Cookie<'static>>>,
}

impl fmt::Debug for TestingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestingResponse")
            .field("status", &self.status)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl TestingResponse {
    /// Buffers a response of the HTTP client.
    ///
    /// A body that fails to read is replaced with an empty one,
    /// so the status and headers are still available.
    pub(crate) async fn from_reqwest(response: reqwest::Response, raw_cookies: bool) -> Self {
        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let url = response.url().to_string();

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!("failed to read the response body of {url}: {err:#}");
                Bytes::new()
            }
        };

        Self::new(status, version, headers, url, body, raw_cookies)
    }

    /// Wraps a response produced in-process
    pub(crate) fn from_http(response: HttpResponse, url: String, raw_cookies: bool) -> Self {
        let (parts, body) = response.into_inner().into_parts();
        Self::new(parts.status, parts.version, parts.headers, url, body, raw_cookies)
    }

    fn new(
        status: StatusCode,
        version: Version,
        headers: HeaderMap,
        url: String,
        body: Bytes,
        raw_cookies: bool
    ) -> Self {
        let raw_cookies = raw_cookies.then(|| parse_set_cookies(&headers)
            .map(|cookie| (cookie.name().to_owned(), cookie))
            .collect());

        Self {
            status,
            version,
            headers,
            url,
            body,
            json: OnceLock::new(),
            raw_cookies,
        }
    }

    /// Returns the status code
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the status code as a number
    #[inline]
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Returns the HTTP version
    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the response headers
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the first value of a header as `&str`
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
    }

    /// Returns the requested URL
    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the body bytes
    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the body as text, replacing invalid UTF-8 sequences
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Returns the `Content-Type` header
    #[inline]
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    /// Returns the body parsed as JSON, `None` if it is not valid JSON
    pub fn json(&self) -> Option<&serde_json::Value> {
        self.json
            .get_or_init(|| serde_json::from_slice(&self.body).ok())
            .as_ref()
    }

    /// Deserializes the body into `T`
    pub fn json_as<T: DeserializeOwned>(&self) -> Result<T, TestClientError> {
        serde_json::from_slice(&self.body).map_err(TestClientError::from)
    }

    /// Returns the cookies set by the response, keyed by name.
    ///
    /// `None` unless requested with [`RequestOptions::raw_cookies`](crate::RequestOptions::raw_cookies).
    #[inline]
    pub fn raw_cookies(&self) -> Option<&HashMap<String, Cookie<'static>>> {
        self.raw_cookies.as_ref()
    }

    /// Parses every `Set-Cookie` header of the response
    pub fn cookies(&self) -> impl Iterator<Item = Cookie<'static>> + '_ {
        parse_set_cookies(&self.headers)
    }
}

/// Parses `Set-Cookie` headers, skipping malformed ones
pub(crate) fn parse_set_cookies(headers: &HeaderMap) -> impl Iterator<Item = Cookie<'static>> + '_ {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| Cookie::parse_encoded(value.to_owned()).ok())
}
