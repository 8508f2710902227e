//! Per-call request options

use bytes::Bytes;
use serde::Serialize;
use std::time::Duration;

use wicket::headers::{HeaderName, HeaderValue, CONTENT_TYPE, COOKIE};

use crate::{error::TestClientError, websocket::Mimic};

const APPLICATION_JSON: &str = "application/json";
const APPLICATION_FORM: &str = "application/x-www-form-urlencoded";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Options of a single request cycle.
///
/// By default the inbound request is captured, a missing response is an
/// error and server errors are not exposed.
///
/// # Example
/// ```no_run
/// use wicket_testing::RequestOptions;
///
/// let options = RequestOptions::new()
///     .header("x-api-key", "secret")
///     .query("page", "2")
///     .text("hello");
/// ```
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) cookies: Vec<(String, String)>,
    pub(crate) body: Option<Bytes>,
    pub(crate) content_type: Option<&'static str>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) gather_request: bool,
    pub(crate) allow_none: bool,
    pub(crate) debug: bool,
    pub(crate) raw_cookies: bool,
    pub(crate) host: Option<String>,
    pub(crate) subprotocols: Vec<String>,
    pub(crate) mimic: Option<Mimic>,
    invalid: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestOptions {
    /// Creates default options
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
            query: Vec::new(),
            cookies: Vec::new(),
            body: None,
            content_type: None,
            timeout: None,
            gather_request: true,
            allow_none: false,
            debug: false,
            raw_cookies: false,
            host: None,
            subprotocols: Vec::new(),
            mimic: None,
            invalid: None,
        }
    }

    /// Appends a request header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Appends a query parameter
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Adds a cookie to the `Cookie` header
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// Sets a raw body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets a `text/plain` body
    pub fn text(self, text: impl Into<String>) -> Self {
        let text: String = text.into();
        self.typed_body(TEXT_PLAIN, Ok(Bytes::from(text)))
    }

    /// Sets a JSON body
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Self {
        let body = serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|err| err.to_string());
        self.typed_body(APPLICATION_JSON, body)
    }

    /// Sets a URL-encoded form body
    pub fn form<T: Serialize + ?Sized>(self, value: &T) -> Self {
        let body = serde_urlencoded::to_string(value)
            .map(Bytes::from)
            .map_err(|err| err.to_string());
        self.typed_body(APPLICATION_FORM, body)
    }

    /// Sets a timeout of the outbound call
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Controls whether the inbound request is captured
    ///
    /// Default: `true`
    pub fn gather_request(mut self, gather: bool) -> Self {
        self.gather_request = gather;
        self
    }

    /// Returns `(None, None)` instead of an error when no response arrives
    pub fn allow_none(mut self, allow: bool) -> Self {
        self.allow_none = allow;
        self
    }

    /// Runs the server in debug mode, exposing server error messages
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Keeps the parsed `Set-Cookie` values of the response by name
    pub fn raw_cookies(mut self, raw: bool) -> Self {
        self.raw_cookies = raw;
        self
    }

    /// Overrides the host of the target URL
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Requests WebSocket subprotocols, in order of preference
    pub fn subprotocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subprotocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Drives the WebSocket session with a scripted client
    pub fn mimic(mut self, mimic: Mimic) -> Self {
        self.mimic = Some(mimic);
        self
    }

    #[inline]
    fn typed_body(mut self, content_type: &'static str, body: Result<Bytes, String>) -> Self {
        match body {
            Ok(body) => {
                self.body = Some(body);
                self.content_type = Some(content_type);
            },
            Err(err) => self.invalid = Some(err),
        }
        self
    }

    /// Returns the header list with the body content type and cookies applied,
    /// or the first error recorded while building the options
    pub(crate) fn resolved_headers(&self) -> Result<Vec<(HeaderName, HeaderValue)>, TestClientError> {
        if let Some(err) = &self.invalid {
            return Err(TestClientError::InvalidRequest(err.clone()));
        }

        let mut headers = Vec::with_capacity(self.headers.len() + 2);
        for (name, value) in &self.headers {
            headers.push(parse_header(name, value)?);
        }
        if let Some(content_type) = self.content_type
            && !self.headers.iter().any(|(name, _)| name.eq_ignore_ascii_case(CONTENT_TYPE.as_str())) {
            headers.push((CONTENT_TYPE, HeaderValue::from_static(content_type)));
        }
        if !self.cookies.is_empty() {
            let cookies = self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            headers.push(parse_header(COOKIE.as_str(), &cookies)?);
        }
        Ok(headers)
    }

    /// Returns the encoded query, `None` if there are no parameters
    pub(crate) fn query_string(&self) -> Result<Option<String>, TestClientError> {
        if self.query.is_empty() {
            return Ok(None);
        }
        serde_urlencoded::to_string(&self.query)
            .map(Some)
            .map_err(|err| TestClientError::InvalidRequest(err.to_string()))
    }

    /// Applies headers, query, body and timeout to an outbound request
    pub(crate) fn apply(&self, mut builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, TestClientError> {
        for (name, value) in self.resolved_headers()? {
            builder = builder.header(name, value);
        }
        if !self.query.is_empty() {
            builder = builder.query(&self.query);
        }
        if let Some(body) = &self.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder)
    }
}

#[inline]
fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), TestClientError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|err| TestClientError::InvalidRequest(format!("{name}: {err}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|err| TestClientError::InvalidRequest(format!("{name}: {err}")))?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Login<'a> {
        user: &'a str,
        remember: bool,
    }

    #[test]
    fn it_gathers_request_by_default() {
        let options = RequestOptions::new();

        assert!(options.gather_request);
        assert!(!options.allow_none);
        assert!(options.resolved_headers().unwrap().is_empty());
    }

    #[test]
    fn it_sets_json_body_and_content_type() {
        let options = RequestOptions::new().json(&Login { user: "john", remember: true });
        let headers = options.resolved_headers().unwrap();

        assert_eq!(options.body.as_deref(), Some(&br#"{"user":"john","remember":true}"#[..]));
        assert_eq!(headers, vec![(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON))]);
    }

    #[test]
    fn it_keeps_explicit_content_type() {
        let options = RequestOptions::new()
            .header("Content-Type", "application/vnd.api+json")
            .json(&[1, 2]);
        let headers = options.resolved_headers().unwrap();

        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].1, "application/vnd.api+json");
    }

    #[test]
    fn it_sets_form_body() {
        let options = RequestOptions::new().form(&Login { user: "john", remember: false });

        assert_eq!(options.body.as_deref(), Some(&b"user=john&remember=false"[..]));
    }

    #[test]
    fn it_joins_cookies() {
        let options = RequestOptions::new()
            .cookie("a", "1")
            .cookie("b", "2");
        let headers = options.resolved_headers().unwrap();

        assert_eq!(headers, vec![(COOKIE, HeaderValue::from_static("a=1; b=2"))]);
    }

    #[test]
    fn it_encodes_query() {
        let options = RequestOptions::new()
            .query("q", "a b")
            .query("page", "2");

        assert_eq!(options.query_string().unwrap().as_deref(), Some("q=a+b&page=2"));
        assert_eq!(RequestOptions::new().query_string().unwrap(), None);
    }

    #[test]
    fn it_rejects_invalid_header() {
        let options = RequestOptions::new().header("bad header", "x");

        assert!(matches!(options.resolved_headers(), Err(TestClientError::InvalidRequest(_))));
    }
}
