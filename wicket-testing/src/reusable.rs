//! Test client keeping one server running across many requests

use std::ops::{Deref, DerefMut};
use tokio::runtime::{Builder, Runtime};

use wicket::{
    App,
    HttpRequest,
    ServerHandle,
    app::{Phase, ServerContext},
    http::Method,
};

use crate::{
    HOST,
    capture::RequestSlot,
    client::{new_session, send_request, settle},
    error::TestClientError,
    options::RequestOptions,
    response::TestingResponse,
    url::{resolve, target_url, Scheme},
    websocket::{websocket_proxy, WebSocketProxy},
};

/// Starts the server once and sends every request through one HTTP session.
///
/// The client owns its own runtime, so its methods block the calling thread
/// and must not be called from inside an async runtime.
///
/// # Example
/// ```no_run
/// use wicket::App;
/// use wicket_testing::{RequestOptions, ReusableClient};
///
/// let app = App::new();
/// app.map_get("/", |_| async { "foo" });
///
/// let mut client = ReusableClient::new(app).unwrap();
/// let scope = client.start().unwrap();
///
/// let (_, first) = scope.get("/", RequestOptions::new()).unwrap();
/// let (_, second) = scope.get("/", RequestOptions::new()).unwrap();
///
/// assert_eq!(first.text(), second.text());
/// ```
pub struct ReusableClient {
    app: App,
    host: String,
    port: Option<u16>,
    runtime: Runtime,
    session: Option<reqwest::Client>,
    server: Option<ServerHandle>,
    ctx: Option<ServerContext>,
}

impl std::fmt::Debug for ReusableClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReusableClient")
            .field("app", &self.app)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("running", &self.is_running())
            .finish()
    }
}

impl ReusableClient {
    /// Creates a client bound to `127.0.0.1` on a random port
    ///
    /// # Errors
    /// Fails if the runtime or the HTTP session cannot be created.
    pub fn new(app: App) -> Result<Self, TestClientError> {
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .build()?;

        Ok(Self {
            app,
            host: HOST.into(),
            port: None,
            runtime,
            session: Some(new_session(None)?),
            server: None,
            ctx: None,
        })
    }

    /// Sets the host the server binds to
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Binds the server to a fixed port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Returns `true` while the server is running
    #[inline]
    pub fn is_running(&self) -> bool {
        self.server.is_some()
    }

    /// Returns the port of the running server
    #[inline]
    pub fn port(&self) -> Option<u16> {
        self.server
            .as_ref()
            .map(|server| server.local_addr().port())
    }

    /// Starts the server: router startup, `before_server_start` listeners,
    /// bind, `after_server_start` listeners.
    ///
    /// Does nothing if the server is already running.
    pub fn run(&mut self) -> Result<(), TestClientError> {
        if self.server.is_some() {
            return Ok(());
        }
        if self.session.is_none() {
            self.session = Some(new_session(None)?);
        }

        let addr = resolve(&self.host, self.port.unwrap_or(0))?;
        let app = self.app.clone();
        app.startup();

        let (server, ctx) = self.runtime.block_on(async move {
            let ctx = ServerContext::detached(&app);
            app.trigger(Phase::BeforeServerStart, &ctx).await?;

            let server = app.start_server(addr).await?;
            let ctx = ctx.with_local_addr(server.local_addr());
            app.trigger(Phase::AfterServerStart, &ctx).await?;

            Ok::<_, TestClientError>((server, ctx))
        })?;

        tracing::debug!("test server listening on {}", server.local_addr());
        self.server = Some(server);
        self.ctx = Some(ctx);
        Ok(())
    }

    /// Stops the server: `before_server_stop` listeners, listener close,
    /// session close, `after_server_stop` listeners.
    ///
    /// Does nothing if the server is not running.
    pub fn stop(&mut self) -> Result<(), TestClientError> {
        let Some(server) = self.server.take() else {
            return Ok(());
        };
        let ctx = self.ctx
            .take()
            .unwrap_or_else(|| ServerContext::detached(&self.app));
        let session = self.session.take();
        let app = self.app.clone();

        self.runtime.block_on(async move {
            let before = app.trigger(Phase::BeforeServerStop, &ctx).await;

            server.close();
            server.wait_closed().await;
            drop(session);

            let after = app.trigger(Phase::AfterServerStop, &ctx).await;
            before.and(after)
        })?;
        Ok(())
    }

    /// Runs the server and returns a scope that stops it when dropped
    pub fn start(&mut self) -> Result<ClientScope<'_>, TestClientError> {
        self.run()?;
        Ok(ClientScope { client: self })
    }

    /// Sends a request with an arbitrary method.
    ///
    /// Returns `(None, None)` when no response arrived and
    /// [`RequestOptions::allow_none`] is set.
    pub fn request(
        &self,
        method: Method,
        uri: &str,
        options: RequestOptions
    ) -> Result<(Option<HttpRequest>, Option<TestingResponse>), TestClientError> {
        let (session, url) = self.target(Scheme::Http, uri, &options)?;

        let slot = RequestSlot::default();
        let capture = options.gather_request.then(|| slot.attach(&self.app));

        let response = self.runtime.block_on(async {
            match send_request(session, method, &url, &options).await? {
                Some(response) => Ok::<_, TestClientError>(Some(TestingResponse::from_reqwest(response, options.raw_cookies).await)),
                None => Ok(None),
            }
        })?;

        drop(capture);
        settle(slot.take(), response, options.allow_none)
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

    /// Opens a WebSocket on the running server
    pub fn websocket(&self, uri: &str, options: RequestOptions) -> Result<(Option<HttpRequest>, WebSocketProxy), TestClientError> {
        let (_, url) = self.target(Scheme::Ws, uri, &options)?;

        let slot = RequestSlot::default();
        let capture = options.gather_request.then(|| slot.attach(&self.app));

        let proxy = self.runtime.block_on(websocket_proxy(&url, &options));

        drop(capture);
        Ok((slot.take(), proxy?))
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

    /// Returns the session and the URL of `uri` on the running server
    fn target(
        &self,
        scheme: Scheme,
        uri: &str,
        options: &RequestOptions
    ) -> Result<(&reqwest::Client, String), TestClientError> {
        let (Some(server), Some(session)) = (&self.server, &self.session) else {
            return Err(TestClientError::NotRunning);
        };
        let host = options.host.as_deref().unwrap_or(&self.host);
        let url = target_url(scheme, host, server.local_addr().port(), uri);
        Ok((session, url))
    }
}

impl Drop for ReusableClient {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::error!("failed to stop the test server: {err}");
        }
    }
}

/// A running [`ReusableClient`] that is stopped when the scope is dropped
#[derive(Debug)]
pub struct ClientScope<'a> {
    client: &'a mut ReusableClient,
}

impl Deref for ClientScope<'_> {
    type Target = ReusableClient;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.client
    }
}

impl DerefMut for ClientScope<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.client
    }
}

impl Drop for ClientScope<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.client.stop() {
            tracing::error!("failed to stop the test server: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_requires_running_server() {
        let client = ReusableClient::new(App::new()).unwrap();

        let err = client.get("/", RequestOptions::new()).unwrap_err();

        assert!(matches!(err, TestClientError::NotRunning));
        assert!(!client.is_running());
        assert_eq!(client.port(), None);
    }

    #[test]
    fn it_stops_when_scope_drops() {
        let mut client = ReusableClient::new(App::new()).unwrap();
        {
            let scope = client.start().unwrap();
            assert!(scope.is_running());
            assert!(scope.port().is_some());
        }

        assert!(!client.is_running());
    }

    #[test]
    fn it_treats_repeated_run_and_stop_as_noop() {
        let mut client = ReusableClient::new(App::new()).unwrap();

        client.run().unwrap();
        let port = client.port();
        client.run().unwrap();
        assert_eq!(client.port(), port);

        client.stop().unwrap();
        client.stop().unwrap();
        assert!(!client.is_running());
    }
}
