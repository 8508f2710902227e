//! In-process client calling the application without sockets

use cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Mutex};

use wicket::{
    App,
    HttpRequest,
    HttpResponse,
    app::{Phase, ServerContext},
    headers::{HeaderName, HeaderValue, HOST, SEC_WEBSOCKET_PROTOCOL},
    http::{Method, StatusCode},
};

use crate::{
    IN_PROCESS_HOST,
    IN_PROCESS_PORT,
    capture::RequestSlot,
    error::TestClientError,
    lock,
    options::RequestOptions,
    response::{parse_set_cookies, TestingResponse},
    url::{target_url, Scheme},
};

/// Handshake headers sent unless the caller provides their own
const WEBSOCKET_DEFAULTS: [(&str, &str); 4] = [
    ("connection", "upgrade"),
    ("upgrade", "websocket"),
    ("sec-websocket-key", "testserver=="),
    ("sec-websocket-version", "13"),
];

/// Serializable part of an [`InProcessClient`].
///
/// The cookie jar is not part of the state; a restored client starts empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientState {
    /// Virtual host of the request URLs
    pub host: String,

    /// Virtual port of the request URLs
    pub port: u16,

    /// Logs lifecycle listener failures instead of returning them
    pub suppress_exceptions: bool,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            host: IN_PROCESS_HOST.into(),
            port: IN_PROCESS_PORT,
            suppress_exceptions: false,
        }
    }
}

/// Outcome of an in-process WebSocket handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketHandshake {
    opened: bool,
    status: StatusCode,
    protocol: Option<String>,
}

impl WebSocketHandshake {
    /// Returns `true` if the application switched protocols
    #[inline]
    pub fn opened(&self) -> bool {
        self.opened
    }

    /// Returns the handshake response status
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the subprotocol selected by the application
    #[inline]
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }
}

/// Calls the [`App`] directly, bypassing sockets entirely.
///
/// Requests go through the same routing, middleware and error handling as
/// network requests. Each call fires the four lifecycle phases around the
/// dispatch, so `after_server_start` and `before_server_stop` listeners run
/// once per call. Cookies set by responses are kept and sent back on
/// following calls.
///
/// # Example
/// ```no_run
/// use wicket::App;
/// use wicket_testing::{InProcessClient, RequestOptions};
///
/// # async fn docs() {
/// let app = App::new();
/// app.map_get("/", |_| async { "foo" });
///
/// let client = InProcessClient::new(app);
/// let (_, response) = client.get("/", RequestOptions::new()).await.unwrap();
///
/// assert_eq!(response.text(), "foo");
/// # }
/// ```
pub struct InProcessClient {
    app: App,
    state: ClientState,
    jar: Mutex<CookieJar>,
}

impl fmt::Debug for InProcessClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessClient")
            .field("app", &self.app)
            .field("state", &self.state)
            .finish()
    }
}

impl InProcessClient {
    /// Creates a client for `http://mockserver:1234`
    pub fn new(app: App) -> Self {
        Self::from_state(app, ClientState::default())
    }

    /// Restores a client from its serialized state with an empty cookie jar
    pub fn from_state(app: App, state: ClientState) -> Self {
        Self {
            app,
            state,
            jar: Mutex::new(CookieJar::new()),
        }
    }

    /// Logs lifecycle listener failures instead of returning them
    pub fn with_suppress_exceptions(mut self, suppress: bool) -> Self {
        self.state.suppress_exceptions = suppress;
        self
    }

    /// Returns the serializable state
    #[inline]
    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// Returns the application under test
    #[inline]
    pub fn app(&self) -> &App {
        &self.app
    }

    /// Returns the base URL of the virtual server
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.state.host, self.state.port)
    }

    /// Returns the value of a cookie kept from previous responses
    pub fn cookie(&self, name: &str) -> Option<String> {
        lock(&self.jar)
            .get(name)
            .map(|cookie| cookie.value().to_owned())
    }

    /// Forgets all kept cookies
    pub fn clear_cookies(&self) {
        *lock(&self.jar) = CookieJar::new();
    }

    /// Sends a request with an arbitrary method
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        options: RequestOptions
    ) -> Result<(Option<HttpRequest>, TestingResponse), TestClientError> {
        let host = options.host.as_deref().unwrap_or(&self.state.host);
        let mut url = target_url(Scheme::Http, host, self.state.port, uri);
        if let Some(query) = options.query_string()? {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query);
        }

        let options = self.with_jar_cookies(options);
        let req = self.build_request(method, &url, &options, &[])?;

        let (request, response) = self.dispatch(req, &options).await?;
        self.keep_cookies(&response);

        Ok((request, TestingResponse::from_http(response, url, options.raw_cookies)))
    }

    /// Sends a `GET` request
    pub async fn get(&self, uri: &str, options: RequestOptions) -> Result<(Option<HttpRequest>, TestingResponse), TestClientError> {
        self.request(Method::GET, uri, options).await
    }

    /// Sends a `POST` request
    pub async fn post(&self, uri: &str, options: RequestOptions) -> Result<(Option<HttpRequest>, TestingResponse), TestClientError> {
        self.request(Method::POST, uri, options).await
    }

    /// Sends a `PUT` request
    pub async fn put(&self, uri: &str, options: RequestOptions) -> Result<(Option<HttpRequest>, TestingResponse), TestClientError> {
        self.request(Method::PUT, uri, options).await
    }

    /// Sends a `DELETE` request
    pub async fn delete(&self, uri: &str, options: RequestOptions) -> Result<(Option<HttpRequest>, TestingResponse), TestClientError> {
        self.request(Method::DELETE, uri, options).await
    }

    /// Sends a `PATCH` request
    pub async fn patch(&self, uri: &str, options: RequestOptions) -> Result<(Option<HttpRequest>, TestingResponse), TestClientError> {
        self.request(Method::PATCH, uri, options).await
    }

    /// Sends an `OPTIONS` request
    pub async fn options(&self, uri: &str, options: RequestOptions) -> Result<(Option<HttpRequest>, TestingResponse), TestClientError> {
        self.request(Method::OPTIONS, uri, options).await
    }

    /// Sends a `HEAD` request
    pub async fn head(&self, uri: &str, options: RequestOptions) -> Result<(Option<HttpRequest>, TestingResponse), TestClientError> {
        self.request(Method::HEAD, uri, options).await
    }

    /// Performs a WebSocket handshake against a detached socket.
    ///
    /// The handler runs to completion; messages it sends are discarded
    /// and it receives none.
    pub async fn websocket(&self, uri: &str, options: RequestOptions) -> Result<(Option<HttpRequest>, WebSocketHandshake), TestClientError> {
        let host = options.host.as_deref().unwrap_or(&self.state.host);
        let url = target_url(Scheme::Ws, host, self.state.port, uri);

        let mut defaults: Vec<(HeaderName, String)> = WEBSOCKET_DEFAULTS
            .iter()
            .map(|&(name, value)| (HeaderName::from_static(name), value.to_owned()))
            .collect();
        if !options.subprotocols.is_empty() {
            defaults.push((SEC_WEBSOCKET_PROTOCOL, options.subprotocols.join(", ")));
        }

        let req = self.build_request(Method::GET, &url, &options, &defaults)?;
        let (request, response) = self.dispatch(req, &options).await?;

        let status = response.status();
        let protocol = response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|p| p.to_str().ok())
            .map(str::to_owned);

        let handshake = WebSocketHandshake {
            opened: status == StatusCode::SWITCHING_PROTOCOLS,
            status,
            protocol,
        };
        Ok((request, handshake))
    }

    /// Builds an absolute-URL request; `defaults` apply to headers
    /// the options leave unset
    fn build_request(
        &self,
        method: Method,
        url: &str,
        options: &RequestOptions,
        defaults: &[(HeaderName, String)]
    ) -> Result<HttpRequest, TestClientError> {
        let mut builder = HttpRequest::builder()
            .method(method.as_str())
            .uri(url);
        if let Some(body) = &options.body {
            builder = builder.body(body.clone());
        }
        if !defaults.is_empty() {
            builder = builder.detached_socket();
        }

        let mut req = builder.build()?;
        let headers = req.headers_mut();
        for (name, value) in options.resolved_headers()? {
            headers.append(name, value);
        }
        for (name, value) in defaults {
            if !headers.contains_key(name) {
                let value = HeaderValue::from_str(value)
                    .map_err(|err| TestClientError::InvalidRequest(format!("{name}: {err}")))?;
                headers.insert(name.clone(), value);
            }
        }
        if !headers.contains_key(HOST) {
            let host = options.host.as_deref().unwrap_or(&self.state.host);
            let value = HeaderValue::from_str(&format!("{host}:{}", self.state.port))
                .map_err(|err| TestClientError::InvalidRequest(err.to_string()))?;
            headers.insert(HOST, value);
        }
        Ok(req)
    }

    /// Runs one lifecycle cycle around the dispatch of `req`.
    ///
    /// A failing `after_server_start` listener skips the dispatch; the stop
    /// phases still run and the first error is returned afterwards.
    async fn dispatch(
        &self,
        req: HttpRequest,
        options: &RequestOptions
    ) -> Result<(Option<HttpRequest>, HttpResponse), TestClientError> {
        let app = if options.debug {
            self.app.clone().with_debug()
        } else {
            self.app.clone()
        };

        let slot = RequestSlot::default();
        let capture = options.gather_request.then(|| slot.attach(&app));

        app.startup();
        let ctx = ServerContext::detached(&app);

        self.fire(&app, Phase::BeforeServerStart, &ctx).await?;
        let mut failure = self.fire(&app, Phase::AfterServerStart, &ctx).await.err();

        let response = match failure {
            None => Some(app.call(req).await),
            Some(_) => None,
        };

        if let Err(err) = self.fire(&app, Phase::BeforeServerStop, &ctx).await {
            failure.get_or_insert(err);
        }
        if let Err(err) = self.fire(&app, Phase::AfterServerStop, &ctx).await {
            failure.get_or_insert(err);
        }

        drop(capture);
        match (failure, response) {
            (None, Some(response)) => Ok((slot.take(), response)),
            (Some(err), _) => Err(err),
            (None, None) => Err(TestClientError::NoResponse { request_captured: false }),
        }
    }

    async fn fire(&self, app: &App, phase: Phase, ctx: &ServerContext) -> Result<(), TestClientError> {
        match app.trigger(phase, ctx).await {
            Ok(()) => Ok(()),
            Err(err) if self.state.suppress_exceptions => {
                tracing::error!(%phase, "lifecycle listener failed: {err}");
                Ok(())
            },
            Err(err) => Err(err.into()),
        }
    }

    /// Puts the kept cookies in front of the explicit ones,
    /// so an explicit cookie wins over a kept one with the same name
    fn with_jar_cookies(&self, mut options: RequestOptions) -> RequestOptions {
        let jar = lock(&self.jar);
        let mut cookies: Vec<(String, String)> = jar
            .iter()
            .filter(|cookie| !options.cookies.iter().any(|(name, _)| name == cookie.name()))
            .map(|cookie| (cookie.name().to_owned(), cookie.value().to_owned()))
            .collect();
        cookies.append(&mut options.cookies);
        options.cookies = cookies;
        options
    }

    /// Stores `Set-Cookie` values of a response; a zero max-age removes the cookie
    fn keep_cookies(&self, response: &HttpResponse) {
        let mut jar = lock(&self.jar);
        for cookie in parse_set_cookies(response.headers()) {
            if cookie.max_age().is_some_and(|age| age.is_zero()) {
                jar.remove(Cookie::new(cookie.name().to_owned(), ""));
            } else {
                jar.add(cookie);
            }
        }
    }
}
