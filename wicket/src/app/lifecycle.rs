//! Server lifecycle events and listeners

use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use std::{fmt, future::Future, net::SocketAddr, sync::Arc};
use tokio_util::sync::CancellationToken;

use super::{App, lock};
use crate::error::Error;

const PHASES: usize = 4;

/// A point in the server lifecycle where listeners fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Before the listener socket is bound
    BeforeServerStart,

    /// After the server accepts connections
    AfterServerStart,

    /// After a stop was requested, before the listener is closed
    BeforeServerStop,

    /// After all connections are closed
    AfterServerStop,
}

impl Phase {
    #[inline]
    fn index(self) -> usize {
        match self {
            Phase::BeforeServerStart => 0,
            Phase::AfterServerStart => 1,
            Phase::BeforeServerStop => 2,
            Phase::AfterServerStop => 3,
        }
    }

    /// Stop phases run their listeners in reverse registration order
    #[inline]
    pub fn is_reversed(self) -> bool {
        matches!(self, Phase::BeforeServerStop | Phase::AfterServerStop)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::BeforeServerStart => "before_server_start",
            Phase::AfterServerStart => "after_server_start",
            Phase::BeforeServerStop => "before_server_stop",
            Phase::AfterServerStop => "after_server_stop",
        })
    }
}

/// Identifies a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub(crate) type ListenerFn = Arc<
    dyn Fn(ServerContext) -> BoxFuture<'static, Result<(), Error>>
    + Send
    + Sync
>;

/// What a listener sees about the running server
#[derive(Clone)]
pub struct ServerContext {
    app: App,
    local_addr: Option<SocketAddr>,
    shutdown: CancellationToken,
    test_mode: bool,
    debug: bool,
}

impl fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerContext")
            .field("local_addr", &self.local_addr)
            .field("stopping", &self.shutdown.is_cancelled())
            .field("test_mode", &self.test_mode)
            .field("debug", &self.debug)
            .finish()
    }
}

impl ServerContext {
    #[inline]
    pub(crate) fn new(app: App, shutdown: CancellationToken, test_mode: bool, debug: bool) -> Self {
        Self { app, local_addr: None, shutdown, test_mode, debug }
    }

    /// Creates a context that is not bound to a socket,
    /// used to fire listeners around in-process calls
    pub fn detached(app: &App) -> Self {
        Self::new(app.clone(), CancellationToken::new(), true, app.is_debug())
    }

    /// Sets the bound address
    #[inline]
    pub fn with_local_addr(mut self, addr: SocketAddr) -> Self {
        self.local_addr = Some(addr);
        self
    }

    /// Sets the test mode flag
    #[inline]
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    /// Requests the server to stop
    #[inline]
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Returns `true` once a stop was requested
    #[inline]
    pub fn is_stopping(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Returns the bound address, `None` before binding or in-process
    #[inline]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Returns `true` if the server runs for tests
    #[inline]
    pub fn is_test_mode(&self) -> bool {
        self.test_mode
    }

    /// Returns `true` if the server runs in debug mode
    #[inline]
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Returns the application
    #[inline]
    pub fn app(&self) -> &App {
        &self.app
    }
}

/// Registered listeners per phase
#[derive(Default)]
pub(crate) struct Listeners {
    phases: [IndexMap<ListenerId, ListenerFn>; PHASES],
}

impl Listeners {
    #[inline]
    fn add(&mut self, phase: Phase, id: ListenerId, listener: ListenerFn) {
        self.phases[phase.index()].insert(id, listener);
    }

    #[inline]
    fn remove(&mut self, phase: Phase, id: ListenerId) -> bool {
        self.phases[phase.index()].shift_remove(&id).is_some()
    }

    #[inline]
    fn len(&self, phase: Phase) -> usize {
        self.phases[phase.index()].len()
    }

    /// Snapshots listeners in firing order
    fn snapshot(&self, phase: Phase) -> Vec<ListenerFn> {
        let listeners = self.phases[phase.index()].values().cloned();
        if phase.is_reversed() {
            listeners.rev().collect()
        } else {
            listeners.collect()
        }
    }
}

/// Removes a listener from its [`App`] when dropped.
///
/// Returned by [`App::scoped_listener`].
#[must_use = "the listener is removed as soon as the guard is dropped"]
pub struct ListenerGuard {
    app: App,
    phase: Phase,
    id: ListenerId,
}

impl fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerGuard")
            .field("phase", &self.phase)
            .field("id", &self.id)
            .finish()
    }
}

impl ListenerGuard {
    /// Returns the id of the guarded listener
    #[inline]
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if !self.app.remove_listener(self.phase, self.id) {
            #[cfg(feature = "tracing")]
            tracing::trace!(phase = %self.phase, id = ?self.id, "listener was already removed");
        }
    }
}

/// Lifecycle specific impl
impl App {
    /// Registers a fallible listener for `phase`.
    ///
    /// # Example
    /// ```no_run
    /// use wicket::{App, app::Phase};
    ///
    /// let app = App::new();
    ///
    /// app.listener(Phase::AfterServerStart, |ctx| async move {
    ///     println!("listening on {:?}", ctx.local_addr());
    ///     Ok(())
    /// });
    /// ```
    pub fn listener<F, Fut>(&self, phase: Phase, listener: F) -> ListenerId
    where
        F: Fn(ServerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let id = ListenerId(self.next_id());
        let listener: ListenerFn = Arc::new(move |ctx| Box::pin(listener(ctx)));
        lock(&self.shared.listeners).add(phase, id, listener);
        id
    }

    /// Registers an infallible listener fired before the server starts
    pub fn before_server_start<F, Fut>(&self, listener: F) -> ListenerId
    where
        F: Fn(ServerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.infallible(Phase::BeforeServerStart, listener)
    }

    /// Registers an infallible listener fired after the server started
    pub fn after_server_start<F, Fut>(&self, listener: F) -> ListenerId
    where
        F: Fn(ServerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.infallible(Phase::AfterServerStart, listener)
    }

    /// Registers an infallible listener fired before the server stops
    pub fn before_server_stop<F, Fut>(&self, listener: F) -> ListenerId
    where
        F: Fn(ServerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.infallible(Phase::BeforeServerStop, listener)
    }

    /// Registers an infallible listener fired after the server stopped
    pub fn after_server_stop<F, Fut>(&self, listener: F) -> ListenerId
    where
        F: Fn(ServerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.infallible(Phase::AfterServerStop, listener)
    }

    /// Same as [`App::listener`], but the listener is removed
    /// when the returned guard is dropped
    pub fn scoped_listener<F, Fut>(&self, phase: Phase, listener: F) -> ListenerGuard
    where
        F: Fn(ServerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let id = self.listener(phase, listener);
        ListenerGuard { app: self.clone(), phase, id }
    }

    /// Removes a listener; returns `false` if it was not registered
    pub fn remove_listener(&self, phase: Phase, id: ListenerId) -> bool {
        lock(&self.shared.listeners).remove(phase, id)
    }

    /// Returns the number of listeners registered for `phase`
    pub fn listener_count(&self, phase: Phase) -> usize {
        lock(&self.shared.listeners).len(phase)
    }

    /// Fires all listeners of `phase` one after another.
    ///
    /// Stops at the first failing listener and returns its error.
    pub async fn trigger(&self, phase: Phase, ctx: &ServerContext) -> Result<(), Error> {
        let listeners = lock(&self.shared.listeners).snapshot(phase);

        #[cfg(feature = "tracing")]
        tracing::trace!(%phase, count = listeners.len(), "firing listeners");

        for listener in listeners {
            listener(ctx.clone()).await?;
        }
        Ok(())
    }

    #[inline]
    fn infallible<F, Fut>(&self, phase: Phase, listener: F) -> ListenerId
    where
        F: Fn(ServerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = Arc::new(listener);
        self.listener(phase, move |ctx| {
            let listener = listener.clone();
            async move {
                listener(ctx).await;
                Ok(())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder(app: &App, phase: Phase, name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) {
        let log = log.clone();
        app.listener(phase, move |_| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(name);
                Ok(())
            }
        });
    }

    #[tokio::test]
    async fn it_fires_start_phase_in_registration_order() {
        let app = App::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&app, Phase::AfterServerStart, "a", &log);
        recorder(&app, Phase::AfterServerStart, "b", &log);

        app.trigger(Phase::AfterServerStart, &ServerContext::detached(&app)).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn it_fires_stop_phase_in_reverse_order() {
        let app = App::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&app, Phase::BeforeServerStop, "a", &log);
        recorder(&app, Phase::BeforeServerStop, "b", &log);

        app.trigger(Phase::BeforeServerStop, &ServerContext::detached(&app)).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn it_stops_at_first_failing_listener() {
        let app = App::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        app.listener(Phase::BeforeServerStart, |_| async { Err(Error::server_error("boom")) });
        recorder(&app, Phase::BeforeServerStart, "never", &log);

        let result = app.trigger(Phase::BeforeServerStart, &ServerContext::detached(&app)).await;

        assert_eq!(result.unwrap_err().to_string(), "boom");
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn it_removes_scoped_listener_on_drop() {
        let app = App::new();
        {
            let _guard = app.scoped_listener(Phase::AfterServerStart, |_| async { Ok(()) });
            assert_eq!(app.listener_count(Phase::AfterServerStart), 1);
        }

        assert_eq!(app.listener_count(Phase::AfterServerStart), 0);
    }

    #[test]
    fn it_ignores_already_removed_listener() {
        let app = App::new();
        let guard = app.scoped_listener(Phase::AfterServerStop, |_| async { Ok(()) });

        assert!(app.remove_listener(Phase::AfterServerStop, guard.id()));
        assert!(!app.remove_listener(Phase::AfterServerStop, guard.id()));
        drop(guard);

        assert_eq!(app.listener_count(Phase::AfterServerStop), 0);
    }

    #[test]
    fn it_stops_through_context() {
        let app = App::new();
        let ctx = ServerContext::detached(&app);

        ctx.stop();

        assert!(ctx.is_stopping());
        assert!(ctx.is_test_mode());
    }
}
