//! Route mapping and the router lifecycle

use std::{future::Future, sync::Arc};

use super::{App, read_lock, write_lock};
use crate::http::{
    endpoints::{RouteHandler, RouteTable},
    IntoResponse,
    HttpRequest,
    Method,
};

macro_rules! map_method {
    ($(#[$doc:meta])* $name:ident, $method:expr) => {
        $(#[$doc])*
        pub fn $name<F, Fut, R>(&self, pattern: &str, handler: F) -> &Self
        where
            F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: IntoResponse + 'static,
        {
            self.map_route($method, pattern, handler)
        }
    };
}

/// Routes mapping
impl App {
    /// Maps a `GET` request handler.
    ///
    /// Unless disabled with [`App::without_implicit_head`], the same handler
    /// also serves `HEAD`, with the body dropped.
    ///
    /// # Example
    /// ```no_run
    /// use wicket::App;
    ///
    /// let app = App::new();
    ///
    /// app.map_get("/hello/{name}", |req| async move {
    ///     format!("Hello, {}!", req.param("name").unwrap_or("world"))
    /// });
    /// ```
    pub fn map_get<F, Fut, R>(&self, pattern: &str, handler: F) -> &Self
    where
        F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse + 'static,
    {
        let handler = make_handler(handler);
        let mut endpoints = write_lock(&self.shared.endpoints);
        if self.implicit_head && !endpoints.contains(&Method::HEAD, pattern) {
            endpoints.map_route(Method::HEAD, pattern, handler.clone());
        }
        endpoints.map_route(Method::GET, pattern, handler);
        drop(endpoints);
        self
    }

    map_method!(
        /// Maps a `POST` request handler
        map_post, Method::POST
    );

    map_method!(
        /// Maps a `PUT` request handler
        map_put, Method::PUT
    );

    map_method!(
        /// Maps a `PATCH` request handler
        map_patch, Method::PATCH
    );

    map_method!(
        /// Maps a `DELETE` request handler
        map_delete, Method::DELETE
    );

    map_method!(
        /// Maps a `HEAD` request handler; replaces the implicit one
        map_head, Method::HEAD
    );

    map_method!(
        /// Maps an `OPTIONS` request handler
        map_options, Method::OPTIONS
    );

    map_method!(
        /// Maps a `CONNECT` request handler
        map_connect, Method::CONNECT
    );

    /// Maps a request handler to an arbitrary HTTP method
    pub fn map_route<F, Fut, R>(&self, method: Method, pattern: &str, handler: F) -> &Self
    where
        F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse + 'static,
    {
        self.map_handler(method, pattern, make_handler(handler));
        self
    }

    #[inline]
    pub(crate) fn map_handler(&self, method: Method, pattern: &str, handler: RouteHandler) {
        write_lock(&self.shared.endpoints).map_route(method, pattern, handler);
    }
}

/// Router lifecycle
impl App {
    /// Drops the finalized route table
    pub fn reset(&self) {
        write_lock(&self.shared.endpoints).reset();
    }

    /// Builds the route table from everything mapped so far.
    ///
    /// Does nothing if the table is already built.
    pub fn finalize(&self) {
        write_lock(&self.shared.endpoints).finalize();
    }

    /// Resets and finalizes the router,
    /// making every route mapped so far visible
    pub fn startup(&self) {
        let mut endpoints = write_lock(&self.shared.endpoints);
        endpoints.reset();
        endpoints.finalize();
    }

    /// Returns `true` if the route table is built
    pub fn is_finalized(&self) -> bool {
        read_lock(&self.shared.endpoints).is_finalized()
    }

    /// Returns the route table, building it on first use
    pub(crate) fn route_table(&self) -> Arc<RouteTable> {
        if let Some(table) = read_lock(&self.shared.endpoints).table() {
            return table;
        }
        write_lock(&self.shared.endpoints).finalize()
    }
}

#[inline]
fn make_handler<F, Fut, R>(handler: F) -> RouteHandler
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + 'static,
{
    Arc::new(move |req| {
        let fut = handler(req);
        Box::pin(async move { fut.await.into_response() })
    })
}
