//! Real-socket test client

use futures_util::{future::BoxFuture, FutureExt};
use std::{
    any::Any,
    future::Future,
    net::TcpListener,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex},
    time::Duration,
};

use wicket::{
    App,
    Bind,
    HttpRequest,
    ServeOptions,
    app::{Phase, ServerContext},
    http::Method,
};

use crate::{
    HOST,
    capture::RequestSlot,
    error::TestClientError,
    lock,
    options::RequestOptions,
    response::TestingResponse,
    url::{resolve, target_url, Scheme},
    websocket::{websocket_proxy, WebSocketProxy},
};

/// Outbound call performed once the server is listening
type Job<T> = Box<
    dyn FnOnce() -> BoxFuture<'static, Result<Option<T>, TestClientError>>
    + Send
>;

/// What the one-shot listener hands back to the caller
struct Outcome<T> {
    value: Mutex<Option<T>>,
    errors: Mutex<Vec<TestClientError>>,
    panic: Mutex<Option<Box<dyn Any + Send>>>,
}

/// Drives one full server lifecycle per call.
///
/// Every request starts the [`App`] on a real socket, performs the call from
/// an `after_server_start` listener, stops the server and returns the captured
/// request along with the response. Calls block the current thread, so they
/// must not be made from inside an async runtime.
///
/// # Example
/// ```no_run
/// use wicket::App;
/// use wicket_testing::{RequestOptions, TestClient};
///
/// let app = App::new();
/// app.map_get("/", |_| async { "foo" });
///
/// let client = TestClient::new(app);
/// let (request, response) = client.get("/", RequestOptions::new()).unwrap();
///
/// assert_eq!(request.unwrap().path(), "/");
/// assert_eq!(response.text(), "foo");
/// ```
#[derive(Debug, Clone)]
pub struct TestClient {
    app: App,
    host: String,
    port: Option<u16>,
    timeout: Option<Duration>,
}

impl TestClient {
    /// Creates a client bound to `127.0.0.1` on a random port
    pub fn new(app: App) -> Self {
        Self {
            app,
            host: HOST.into(),
            port: None,
            timeout: None,
        }
    }

    /// Sets the host the server binds to
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Binds every server run to a fixed port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets a default timeout of outbound calls
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the application under test
    #[inline]
    pub fn app(&self) -> &App {
        &self.app
    }

    /// Returns the configured host
    #[inline]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the fixed port, `None` if every run binds a random one
    #[inline]
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Sends a request with an arbitrary method.
    ///
    /// Returns `(None, None)` when no response arrived and
    /// [`RequestOptions::allow_none`] is set. The verb shorthands
    /// always fail with [`TestClientError::NoResponse`] instead.
    pub fn request(
        &self,
        method: Method,
        uri: &str,
        options: RequestOptions
    ) -> Result<(Option<HttpRequest>, Option<TestingResponse>), TestClientError> {
        let host = options.host.clone().unwrap_or_else(|| self.host.clone());
        let (bind, port) = self.bind(&host)?;
        let url = target_url(Scheme::Http, &host, port, uri);
        let timeout = options.timeout.or(self.timeout);

        let call_options = options.clone();
        let (request, response) = self.run_cycle(&options, bind, move || async move {
            tracing::debug!(%method, %url, "sending request");
            let session = new_session(timeout)?;
            match send_request(&session, method, &url, &call_options).await? {
                Some(response) => Ok(Some(TestingResponse::from_reqwest(response, call_options.raw_cookies).await)),
                None => Ok(None),
            }
        })?;

        settle(request, response, options.allow_none)
    }

    /// Sends a `GET` request
    pub fn get(&self, uri: &str, options: RequestOptions) -> Result<(Option<HttpRequest>, TestingResponse), TestClientError> {
        self.expect_response(Method::GET, uri, options)
    }

    /// Sends a `POST` request
    pub fn post(&self, uri: &str, options: RequestOptions) -> Result<(Option<HttpRequest>, TestingResponse), TestClientError> {
        self.expect_response(Method::POST, uri, options)
    }

    /// Sends a `PUT` request
    pub fn put(&self, uri: &str, options: RequestOptions) -> Result<(Option<HttpRequest>, TestingResponse), TestClientError> {
        self.expect_response(Method::PUT, uri, options)
    }

    /// Sends a `DELETE` request
    pub fn delete(&self, uri: &str, options: RequestOptions) -> Result<(Option<HttpRequest>, TestingResponse), TestClientError> {
        self.expect_response(Method::DELETE, uri, options)
    }

    /// Sends a `PATCH` request
    pub fn patch(&self, uri: &str, options: RequestOptions) -> Result<(Option<HttpRequest>, TestingResponse), TestClientError> {
        self.expect_response(Method::PATCH, uri, options)
    }

    /// Sends an `OPTIONS` request
    pub fn options(&self, uri: &str, options: RequestOptions) -> Result<(Option<HttpRequest>, TestingResponse), TestClientError> {
        self.expect_response(Method::OPTIONS, uri, options)
    }

    /// Sends a `HEAD` request
    pub fn head(&self, uri: &str, options: RequestOptions) -> Result<(Option<HttpRequest>, TestingResponse), TestClientError> {
        self.expect_response(Method::HEAD, uri, options)
    }

    /// Opens a WebSocket, runs the [`Mimic`](crate::Mimic) script
    /// from `options` if any and closes the connection
    pub fn websocket(&self, uri: &str, options: RequestOptions) -> Result<(Option<HttpRequest>, WebSocketProxy), TestClientError> {
        let host = options.host.clone().unwrap_or_else(|| self.host.clone());
        let (bind, port) = self.bind(&host)?;
        let url = target_url(Scheme::Ws, &host, port, uri);

        let mut call_options = options.clone();
        call_options.timeout = options.timeout.or(self.timeout);
        let (request, proxy) = self.run_cycle(&options, bind, move || async move {
            tracing::debug!(%url, "opening websocket");
            websocket_proxy(&url, &call_options).await.map(Some)
        })?;

        match proxy {
            Some(proxy) => Ok((request, proxy)),
            None => Err(TestClientError::NoResponse { request_captured: request.is_some() }),
        }
    }

    fn expect_response(
        &self,
        method: Method,
        uri: &str,
        options: RequestOptions
    ) -> Result<(Option<HttpRequest>, TestingResponse), TestClientError> {
        match self.request(method, uri, options)? {
            (request, Some(response)) => Ok((request, response)),
            (request, None) => Err(TestClientError::NoResponse { request_captured: request.is_some() }),
        }
    }

    /// Picks the bind target and the port the URL points to
    fn bind(&self, host: &str) -> Result<(Bind, u16), TestClientError> {
        match self.port {
            Some(port) => Ok((Bind::Socket(resolve(host, port)?), port)),
            None => {
                let listener = TcpListener::bind((host, 0))?;
                let port = listener.local_addr()?.port();
                Ok((Bind::Listener(listener), port))
            }
        }
    }

    /// Runs the server until `call` completes and returns the captured
    /// request along with the value `call` produced.
    ///
    /// A panic inside `call` stops the server and is resumed once the
    /// stop phases have run.
    fn run_cycle<T, F, Fut>(
        &self,
        options: &RequestOptions,
        bind: Bind,
        call: F
    ) -> Result<(Option<HttpRequest>, Option<T>), TestClientError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, TestClientError>> + Send + 'static,
    {
        let slot = RequestSlot::default();
        let capture = options.gather_request.then(|| slot.attach(&self.app));

        let job: Job<T> = Box::new(move || Box::pin(call()));
        let job = Arc::new(Mutex::new(Some(job)));
        let outcome = Arc::new(Outcome {
            value: Mutex::new(None),
            errors: Mutex::new(Vec::new()),
            panic: Mutex::new(None),
        });

        let collect = self.app.scoped_listener(Phase::AfterServerStart, {
            let outcome = outcome.clone();
            move |ctx: ServerContext| {
                let job = lock(&job).take();
                let outcome = outcome.clone();
                async move {
                    if let Some(job) = job {
                        match AssertUnwindSafe(job()).catch_unwind().await {
                            Ok(Ok(value)) => *lock(&outcome.value) = value,
                            Ok(Err(err)) => {
                                tracing::error!("request cycle failed: {err}");
                                lock(&outcome.errors).push(err);
                            }
                            Err(payload) => {
                                tracing::error!("request cycle panicked, stopping the server");
                                *lock(&outcome.panic) = Some(payload);
                            }
                        }
                        ctx.stop();
                    }
                    Ok(())
                }
            }
        });

        let serve_options = ServeOptions::new()
            .bind(bind)
            .with_debug(options.debug)
            .with_test_mode(true);
        let served = self.app.run_blocking_with(serve_options);

        drop(collect);
        drop(capture);

        let panicked = lock(&outcome.panic).take();
        if let Some(payload) = panicked {
            panic::resume_unwind(payload);
        }
        served?;

        let errors = std::mem::take(&mut *lock(&outcome.errors));
        if !errors.is_empty() {
            return Err(TestClientError::Request(errors));
        }

        let value = lock(&outcome.value).take();
        Ok((slot.take(), value))
    }
}

/// Pairs the captured request with the response,
/// applying the `allow_none` rule to a missing response
pub(crate) fn settle(
    request: Option<HttpRequest>,
    response: Option<TestingResponse>,
    allow_none: bool
) -> Result<(Option<HttpRequest>, Option<TestingResponse>), TestClientError> {
    match response {
        Some(response) => Ok((request, Some(response))),
        None if allow_none => Ok((None, None)),
        None => Err(TestClientError::NoResponse { request_captured: request.is_some() }),
    }
}

/// Creates an HTTP session that accepts any certificate
pub(crate) fn new_session(timeout: Option<Duration>) -> Result<reqwest::Client, TestClientError> {
    let mut builder = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .no_proxy();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(TestClientError::from)
}

/// Sends a request; a transport failure is logged and yields `None`
pub(crate) async fn send_request(
    session: &reqwest::Client,
    method: Method,
    url: &str,
    options: &RequestOptions
) -> Result<Option<reqwest::Response>, TestClientError> {
    let request = options.apply(session.request(method.clone(), url))?;
    match request.send().await {
        Ok(response) => Ok(Some(response)),
        Err(err) => {
            tracing::error!("{method} {url} received no response! {err:#}");
            Ok(None)
        }
    }
}
