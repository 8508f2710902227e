//! Main application entry point

use hyper_util::rt::TokioIo;
use crate::{
    http::endpoints::Endpoints,
    middleware::Middlewares,
    server::Server,
    Limit
};

use std::{
    fmt,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak
    }
};

use tokio::{
    io,
    net::{TcpListener, TcpStream},
    signal,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use lifecycle::Listeners;

pub use self::{
    connection::Connection,
    lifecycle::{Phase, ListenerId, ListenerGuard, ServerContext},
};
pub(crate) use env::ServerEnv;

pub mod lifecycle;
pub(crate) mod scope;
mod connection;
mod env;
mod pipeline;
mod router;

/// The main entry point for building and running a Wicket application.
///
/// `App` configures the HTTP server, holds routes, middleware and lifecycle
/// listeners, and runs them either over a TCP listener ([`App::run`],
/// [`App::run_blocking`], [`App::serve`]) or in-process ([`App::call`]).
///
/// Cloning an `App` is cheap: clones share routes, middleware and listeners,
/// while the configuration set by builder methods is copied.
///
/// # Async Example
/// ```no_run
/// use wicket::App;
///
/// #[tokio::main]
/// async fn main() -> std::io::Result<()> {
///     let app = App::new().bind("127.0.0.1:7878");
///     app.map_get("/", |_| async { "Hello, World!" });
///     app.run().await
/// }
/// ```
///
/// # Blocking Example
/// ```no_run
/// use wicket::App;
///
/// let app = App::new().bind("127.0.0.1:7878");
/// app.run_blocking().unwrap();
/// ```
#[derive(Clone)]
pub struct App {
    /// TCP connection parameters
    connection: Connection,

    /// Request body limit
    ///
    /// Default: 5 MB
    pub(crate) body_limit: Limit<usize>,

    /// Maximum number of HTTP request headers.
    pub(crate) max_header_count: Limit<usize>,

    /// `TCP_NODELAY` flag
    ///
    /// Default: `false`
    no_delay: bool,

    /// Determines whether to show a welcome screen
    ///
    /// Default: `true` in debug builds
    show_greeter: bool,

    /// Controls whether `map_get` also registers `HEAD`
    implicit_head: bool,

    /// Exposes server error messages in responses
    debug: bool,

    /// State shared between clones
    pub(crate) shared: Arc<AppShared>,
}

/// Routes, middleware and listeners shared by all clones of an [`App`]
#[derive(Default)]
pub(crate) struct AppShared {
    pub(crate) endpoints: RwLock<Endpoints>,
    pub(crate) middlewares: RwLock<Middlewares>,
    pub(crate) listeners: Mutex<Listeners>,
    running: Mutex<Option<CancellationToken>>,
    ids: AtomicU64,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("connection", &self.connection)
            .field("body_limit", &self.body_limit)
            .field("max_header_count", &self.max_header_count)
            .field("no_delay", &self.no_delay)
            .field("show_greeter", &self.show_greeter)
            .field("implicit_head", &self.implicit_head)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

/// Where [`App::serve`] accepts connections
#[derive(Debug)]
pub enum Bind {
    /// Bind a new listener to this address
    Socket(SocketAddr),

    /// Use an already bound listener
    Listener(std::net::TcpListener),
}

impl From<SocketAddr> for Bind {
    #[inline]
    fn from(addr: SocketAddr) -> Self {
        Self::Socket(addr)
    }
}

impl From<std::net::TcpListener> for Bind {
    #[inline]
    fn from(listener: std::net::TcpListener) -> Self {
        Self::Listener(listener)
    }
}

/// Per-run options of [`App::serve`]
#[derive(Debug, Default)]
pub struct ServeOptions {
    bind: Option<Bind>,
    debug: bool,
    test_mode: bool,
}

impl ServeOptions {
    /// Creates options that serve on the address configured with [`App::bind`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the bind target
    pub fn bind(mut self, bind: impl Into<Bind>) -> Self {
        self.bind = Some(bind.into());
        self
    }

    /// Exposes server error messages for this run
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Runs for tests: no greeter and no Ctrl-C handler
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }
}

/// A listener accepting connections in the background.
///
/// Created by [`App::start_server`]. It fires no lifecycle listeners.
/// Dropping the handle stops accepting connections.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Returns the bound address
    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting new connections
    #[inline]
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Returns `true` once [`close`](Self::close) was called
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Waits until the listener is closed and open connections finished,
    /// bounded by the graceful shutdown timeout
    pub async fn wait_closed(mut self) {
        if let Some(handle) = self.handle.take()
            && let Err(_err) = handle.await {
            #[cfg(feature = "tracing")]
            tracing::error!("server task failed: {_err:#}");
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Clears the running token of an [`App`] when a run ends
struct RunningGuard<'a>(&'a App);

impl<'a> RunningGuard<'a> {
    fn new(app: &'a App, token: CancellationToken) -> Self {
        *lock(&app.shared.running) = Some(token);
        Self(app)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        lock(&self.0.shared.running).take();
    }
}

/// General impl
impl App {
    /// Initializes a new instance of the [`App`] which will be bound to the 0.0.0.0:7878 socket by default.
    ///
    ///# Examples
    /// ```no_run
    /// use wicket::App;
    ///
    /// let app = App::new();
    /// ```
    pub fn new() -> Self {
        Self {
            connection: Default::default(),
            body_limit: Limit::Default,
            max_header_count: Limit::Default,
            no_delay: false,
            implicit_head: true,
            debug: false,
            #[cfg(debug_assertions)]
            show_greeter: true,
            #[cfg(not(debug_assertions))]
            show_greeter: false,
            shared: Arc::new(AppShared::default()),
        }
    }

    /// Binds the `App` to the specified `socket` address.
    ///
    ///# Examples
    /// ```no_run
    ///use wicket::App;
    ///
    ///let app = App::new().bind("127.0.0.1:7878");
    ///let app = App::new().bind(([127,0,0,1], 7878));
    /// ```
    pub fn bind<S: Into<Connection>>(mut self, socket: S) -> Self {
        self.connection = socket.into();
        self
    }

    /// Sets a specific HTTP request body limit (in bytes)
    ///
    /// Default: 5 MB
    pub fn with_body_limit(mut self, limit: Limit<usize>) -> Self {
        self.body_limit = limit;
        self
    }

    /// Disables a request body limit
    pub fn without_body_limit(mut self) -> Self {
        self.body_limit = Limit::Unlimited;
        self
    }

    /// Sets the value of the `TCP_NODELAY` option on accepted sockets.
    pub fn with_no_delay(mut self) -> Self {
        self.no_delay = true;
        self
    }

    /// Disables a welcome message on start
    pub fn without_greeter(mut self) -> Self {
        self.show_greeter = false;
        self
    }

    /// Disables automatic registration of a `HEAD` route
    /// for the `GET` handler.
    ///
    /// Affects routes mapped after this call.
    pub fn without_implicit_head(mut self) -> Self {
        self.implicit_head = false;
        self
    }

    /// Sets the maximum allowed number of HTTP request headers.
    ///
    /// When exceeded, the HTTP/1 parser rejects the request
    /// with `431 Request Header Fields Too Large`.
    pub fn with_max_header_count(mut self, count: Limit<usize>) -> Self {
        self.max_header_count = count;
        self
    }

    /// Exposes the messages of server errors in responses
    pub fn with_debug(mut self) -> Self {
        self.debug = true;
        self
    }

    /// Returns the configured bind address
    #[inline]
    pub fn socket(&self) -> SocketAddr {
        self.connection.socket
    }

    /// Returns `true` if server error messages are exposed
    #[inline]
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Starts the [`App`] with its own Tokio runtime and blocks until it stops.
    ///
    /// **Note:** This method **must not** be called from within an existing Tokio runtime,
    /// it returns an error in that case. Use [`App::run`] instead.
    ///
    /// # Example
    /// ```no_run
    /// use wicket::App;
    ///
    ///  let app = App::new().bind("127.0.0.1:7878");
    ///  app.run_blocking().unwrap();
    /// ```
    pub fn run_blocking(&self) -> io::Result<()> {
        self.run_blocking_with(ServeOptions::new())
    }

    /// Same as [`App::run_blocking`] with explicit [`ServeOptions`]
    pub fn run_blocking_with(&self, options: ServeOptions) -> io::Result<()> {
        let runtime = create_tokio_runtime()?;
        let result = runtime.block_on(self.serve(options));

        #[cfg(feature = "tracing")]
        if let Err(err) = &result {
            tracing::error!("failed to run the server: {err:#}");
        }

        result
    }

    /// Runs the [`App`] using the current asynchronous runtime.
    ///
    /// # Errors
    /// Returns an `io::Error` if the server fails to start or a lifecycle listener fails.
    pub async fn run(&self) -> io::Result<()> {
        self.serve(ServeOptions::new()).await
    }

    /// Runs the [`App`] through its whole lifecycle:
    ///
    /// 1. router startup
    /// 2. `before_server_start` listeners
    /// 3. bind and start accepting connections
    /// 4. `after_server_start` listeners
    /// 5. wait for [`App::stop`], [`ServerContext::stop`] or Ctrl-C
    /// 6. `before_server_stop` listeners
    /// 7. close the listener and wait for open connections
    /// 8. `after_server_stop` listeners
    ///
    /// A failing `after_server_start` listener stops the server; its error is
    /// returned once the shutdown completed.
    pub async fn serve(&self, options: ServeOptions) -> io::Result<()> {
        let ServeOptions { bind, debug, test_mode } = options;
        let debug = debug || self.debug;
        let bind = bind.unwrap_or(Bind::Socket(self.connection.socket));

        self.startup();

        let shutdown = CancellationToken::new();
        let _running = RunningGuard::new(self, shutdown.clone());

        let ctx = ServerContext::new(self.clone(), shutdown.clone(), test_mode, debug);
        self.trigger(Phase::BeforeServerStart, &ctx).await?;

        let server = self.start_server_with(bind, debug).await?;
        let socket = server.local_addr();
        let ctx = ctx.with_local_addr(socket);

        if !test_mode {
            Self::shutdown_signal(shutdown.clone());

            #[cfg(debug_assertions)]
            self.print_welcome(socket);
        }

        #[cfg(feature = "tracing")]
        tracing::info!("listening on: http://{socket}");

        let mut failure = self.trigger(Phase::AfterServerStart, &ctx).await.err();
        if let Some(_err) = &failure {
            #[cfg(feature = "tracing")]
            tracing::error!("after_server_start listener failed: {_err:#}");
            shutdown.cancel();
        }

        shutdown.cancelled().await;

        if let Err(err) = self.trigger(Phase::BeforeServerStop, &ctx).await {
            failure.get_or_insert(err);
        }

        server.close();
        server.wait_closed().await;

        if let Err(err) = self.trigger(Phase::AfterServerStop, &ctx).await {
            failure.get_or_insert(err);
        }

        match failure {
            Some(err) => Err(err.into()),
            None => Ok(())
        }
    }

    /// Stops the run in progress, if any
    pub fn stop(&self) {
        if let Some(token) = lock(&self.shared.running).as_ref() {
            token.cancel();
        }
    }

    /// Returns `true` while [`App::serve`] is running
    pub fn is_running(&self) -> bool {
        lock(&self.shared.running).is_some()
    }

    /// Binds a listener and accepts connections in the background.
    ///
    /// Unlike [`App::serve`], no lifecycle listeners are fired and the router
    /// is not reset.
    pub async fn start_server(&self, bind: impl Into<Bind>) -> io::Result<ServerHandle> {
        self.start_server_with(bind.into(), self.debug).await
    }

    async fn start_server_with(&self, bind: Bind, debug: bool) -> io::Result<ServerHandle> {
        let tcp_listener = match bind {
            Bind::Socket(addr) => TcpListener::bind(addr).await?,
            Bind::Listener(listener) => {
                listener.set_nonblocking(true)?;
                TcpListener::from_std(listener)?
            }
        };

        let local_addr = tcp_listener.local_addr()?;
        let env = Arc::new(ServerEnv::new(self, debug));
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(Self::accept_loop(
            tcp_listener,
            env,
            shutdown.clone(),
            self.no_delay));

        Ok(ServerHandle {
            local_addr,
            shutdown,
            handle: Some(handle),
        })
    }

    async fn accept_loop(
        tcp_listener: TcpListener,
        env: Arc<ServerEnv>,
        shutdown: CancellationToken,
        no_delay: bool
    ) {
        loop {
            let (stream, _) = tokio::select! {
                accepted = tcp_listener.accept() => match accepted {
                    Ok(connection) => connection,
                    Err(_err) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("failed to accept connection: {_err:#}");
                        continue;
                    }
                },
                _ = shutdown.cancelled() => break,
            };

            if let Err(_err) = stream.set_nodelay(no_delay) {
                #[cfg(feature = "tracing")]
                tracing::warn!("failed to set TCP_NODELAY on incoming connection: {_err:#}");
            }

            let env = Arc::downgrade(&env);
            tokio::spawn(Self::handle_connection(stream, env));
        }

        drop(tcp_listener);

        if let Some(env) = Arc::into_inner(env) {
            env.shutdown().await;
        }
    }

    #[inline]
    async fn handle_connection(stream: TcpStream, env: Weak<ServerEnv>) {
        let peer_addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::error!("failed to get peer address: {_err:#}");
                return;
            }
        };

        Server::new(TokioIo::new(stream), peer_addr).serve(env).await;
    }

    #[inline]
    fn shutdown_signal(shutdown: CancellationToken) {
        tokio::spawn(async move {
            tokio::select! {
                result = signal::ctrl_c() => {
                    if let Err(_err) = result {
                        #[cfg(feature = "tracing")]
                        tracing::error!("unable to listen for shutdown signal: {_err:#}");
                        return;
                    }
                    #[cfg(feature = "tracing")]
                    tracing::trace!("shutdown signal received, not accepting new requests");
                    shutdown.cancel();
                },
                _ = shutdown.cancelled() => (),
            }
        });
    }

    #[inline]
    pub(crate) fn next_id(&self) -> u64 {
        self.shared.ids.fetch_add(1, Ordering::Relaxed)
    }

    #[cfg(debug_assertions)]
    fn print_welcome(&self, addr: SocketAddr) {
        if !self.show_greeter {
            return;
        }

        let version = env!("CARGO_PKG_VERSION");
        let url = format!("http://{addr}");

        println!();
        println!("\x1b[1;34m╭───────────────────────────────────────────────╮");
        println!("│                >> Wicket v{version:<5}               │");
        println!("│     Listening on: {url:<28}│");
        println!("╰───────────────────────────────────────────────╯\x1b[0m");

        for (method, pattern) in read_lock(&self.shared.endpoints).collect() {
            println!("  {method:<8}{pattern}");
        }
    }
}

#[inline]
fn create_tokio_runtime() -> io::Result<tokio::runtime::Runtime> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(io::Error::other(
            "`App::run_blocking()` cannot be called inside an existing Tokio runtime. Use `run().await` instead."
        ));
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}

#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[inline]
pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

#[inline]
pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
