//! Middleware tools

use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use std::{fmt, future::Future, sync::Arc};

use crate::{
    app::{App, read_lock, write_lock},
    http::endpoints::RouteHandler,
    HttpRequest,
    HttpResult,
};

const DEFAULT_MW_CAPACITY: usize = 8;

/// Points to a middleware function
pub(crate) type MiddlewareFn = Arc<
    dyn Fn(HttpRequest, Next) -> BoxFuture<'static, HttpResult>
    + Send
    + Sync
>;

/// Identifies a registered middleware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MiddlewareId(u64);

/// Points to the next middleware or the request handler.
///
/// Awaiting [`Next::run`] passes the request down the pipeline.
#[derive(Clone)]
pub struct Next {
    chain: Arc<[MiddlewareFn]>,
    index: usize,
    endpoint: RouteHandler,
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &(self.chain.len() - self.index))
            .finish()
    }
}

impl Next {
    #[inline]
    pub(crate) fn new(chain: Arc<[MiddlewareFn]>, endpoint: RouteHandler) -> Self {
        Self { chain, index: 0, endpoint }
    }

    /// Calls the next middleware, or the request handler after the last one
    pub fn run(self, req: HttpRequest) -> BoxFuture<'static, HttpResult> {
        match self.chain.get(self.index).cloned() {
            Some(mw) => {
                let next = Self { index: self.index + 1, ..self };
                mw(req, next)
            },
            None => (self.endpoint)(req),
        }
    }
}

/// Middleware pipeline in execution order
pub(crate) struct Middlewares {
    pipeline: IndexMap<MiddlewareId, MiddlewareFn>,
}

impl Default for Middlewares {
    fn default() -> Self {
        Self::new()
    }
}

impl Middlewares {
    pub(crate) fn new() -> Self {
        Self { pipeline: IndexMap::with_capacity(DEFAULT_MW_CAPACITY) }
    }

    /// Appends a middleware
    #[inline]
    pub(crate) fn add(&mut self, id: MiddlewareId, middleware: MiddlewareFn) {
        self.pipeline.insert(id, middleware);
    }

    /// Prepends a middleware so it runs before all others
    #[inline]
    pub(crate) fn add_first(&mut self, id: MiddlewareId, middleware: MiddlewareFn) {
        self.pipeline.shift_insert(0, id, middleware);
    }

    #[inline]
    pub(crate) fn remove(&mut self, id: MiddlewareId) -> bool {
        self.pipeline.shift_remove(&id).is_some()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.pipeline.len()
    }

    /// Snapshots the pipeline for a single request
    #[inline]
    pub(crate) fn snapshot(&self) -> Arc<[MiddlewareFn]> {
        self.pipeline.values().cloned().collect()
    }
}

/// Removes a middleware from its [`App`] when dropped.
///
/// Returned by [`App::scoped_wrap_first`].
#[must_use = "the middleware is removed as soon as the guard is dropped"]
pub struct MiddlewareGuard {
    app: App,
    id: MiddlewareId,
}

impl fmt::Debug for MiddlewareGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareGuard")
            .field("id", &self.id)
            .finish()
    }
}

impl MiddlewareGuard {
    /// Returns the id of the guarded middleware
    #[inline]
    pub fn id(&self) -> MiddlewareId {
        self.id
    }
}

impl Drop for MiddlewareGuard {
    fn drop(&mut self) {
        if !self.app.remove_middleware(self.id) {
            #[cfg(feature = "tracing")]
            tracing::trace!(id = ?self.id, "middleware was already removed");
        }
    }
}

#[inline]
fn make_fn<F, Fut>(middleware: F) -> MiddlewareFn
where
    F: Fn(HttpRequest, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResult> + Send + 'static,
{
    Arc::new(move |req, next| Box::pin(middleware(req, next)))
}

/// Middleware specific impl
impl App {
    /// Appends a middleware to the request pipeline.
    ///
    /// Middlewares run for every request, including ones that end up
    /// as `404` or `405`.
    ///
    /// # Example
    /// ```no_run
    /// use wicket::App;
    ///
    /// let app = App::new();
    ///
    /// app.wrap(|req, next| async move {
    ///     next.run(req).await
    /// });
    /// ```
    pub fn wrap<F, Fut>(&self, middleware: F) -> MiddlewareId
    where
        F: Fn(HttpRequest, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResult> + Send + 'static,
    {
        let id = MiddlewareId(self.next_id());
        write_lock(&self.shared.middlewares).add(id, make_fn(middleware));
        id
    }

    /// Prepends a middleware so it runs before every other one
    pub fn wrap_first<F, Fut>(&self, middleware: F) -> MiddlewareId
    where
        F: Fn(HttpRequest, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResult> + Send + 'static,
    {
        let id = MiddlewareId(self.next_id());
        write_lock(&self.shared.middlewares).add_first(id, make_fn(middleware));
        id
    }

    /// Same as [`App::wrap_first`], but the middleware is removed
    /// when the returned guard is dropped
    pub fn scoped_wrap_first<F, Fut>(&self, middleware: F) -> MiddlewareGuard
    where
        F: Fn(HttpRequest, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResult> + Send + 'static,
    {
        let id = self.wrap_first(middleware);
        MiddlewareGuard { app: self.clone(), id }
    }

    /// Removes a middleware; returns `false` if it was not registered
    pub fn remove_middleware(&self, id: MiddlewareId) -> bool {
        write_lock(&self.shared.middlewares).remove(id)
    }

    /// Returns the number of registered middlewares
    pub fn middleware_count(&self) -> usize {
        read_lock(&self.shared.middlewares).len()
    }

    #[inline]
    pub(crate) fn middleware_snapshot(&self) -> Arc<[MiddlewareFn]> {
        read_lock(&self.shared.middlewares).snapshot()
    }
}
