//! Endpoints mapping utilities

use futures_util::future::BoxFuture;
use std::sync::Arc;

use crate::http::{Method, HttpRequest, HttpResult, request::PathArgs};
use self::route::{RouteNode, RouteEndpoint};

pub(crate) mod route;

/// Type-erased request handler
pub(crate) type RouteHandler = Arc<
    dyn Fn(HttpRequest) -> BoxFuture<'static, HttpResult>
    + Send
    + Sync
>;

/// Specifies statuses that could be returned after route matching
pub(crate) enum FindResult {
    RouteNotFound,
    MethodNotFound(String),
    Ok(Endpoint)
}

/// A matched request handler with its path parameters
pub(crate) struct Endpoint {
    pub(crate) handler: RouteHandler,
    pub(crate) params: PathArgs,
}

/// A registered route, kept so the table can be rebuilt on reset
struct RouteDef {
    method: Method,
    pattern: Box<str>,
    handler: RouteHandler,
}

/// Finalized, immutable route lookup structure
pub(crate) struct RouteTable {
    routes: RouteNode,
}

/// Registered routes plus the finalized table built from them.
///
/// Routes mapped after [`finalize`](Self::finalize) are only visible
/// after the next [`reset`](Self::reset).
#[derive(Default)]
pub(crate) struct Endpoints {
    defs: Vec<RouteDef>,
    table: Option<Arc<RouteTable>>,
}

impl RouteTable {
    /// Gets the handler for `method` and `path`
    pub(crate) fn find(&self, method: &Method, path: &str) -> FindResult {
        let Some(found) = self.routes.find(path) else {
            return FindResult::RouteNotFound;
        };

        match found.route.handler(method) {
            Some(RouteEndpoint { handler, .. }) => FindResult::Ok(Endpoint {
                handler: handler.clone(),
                params: found.params,
            }),
            None => FindResult::MethodNotFound(found.route.allowed()),
        }
    }
}

impl Endpoints {
    #[inline]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Maps the request handler to the HTTP verb and route pattern
    #[inline]
    pub(crate) fn map_route(&mut self, method: Method, pattern: &str, handler: RouteHandler) {
        self.defs.push(RouteDef {
            method,
            pattern: pattern.into(),
            handler,
        });
    }

    /// Drops the finalized table
    #[inline]
    pub(crate) fn reset(&mut self) {
        self.table = None;
    }

    /// Builds the table if it is not built yet and returns it
    pub(crate) fn finalize(&mut self) -> Arc<RouteTable> {
        if let Some(table) = &self.table {
            return table.clone();
        }

        let mut routes = RouteNode::new();
        for def in &self.defs {
            routes.insert(&def.pattern, RouteEndpoint {
                method: def.method.clone(),
                handler: def.handler.clone(),
            });
        }

        let table = Arc::new(RouteTable { routes });
        self.table = Some(table.clone());
        table
    }

    /// Returns the finalized table, if any
    #[inline]
    pub(crate) fn table(&self) -> Option<Arc<RouteTable>> {
        self.table.clone()
    }

    #[inline]
    pub(crate) fn is_finalized(&self) -> bool {
        self.table.is_some()
    }

    #[inline]
    pub(crate) fn contains(&self, method: &Method, pattern: &str) -> bool {
        self.defs
            .iter()
            .any(|d| &d.method == method && &*d.pattern == pattern)
    }

    /// Collects `(method, pattern)` pairs in registration order
    pub(crate) fn collect(&self) -> Vec<(Method, String)> {
        self.defs
            .iter()
            .map(|d| (d.method.clone(), d.pattern.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Results;

    fn handler() -> RouteHandler {
        Arc::new(|_| Box::pin(async { Results::ok() }))
    }

    #[test]
    fn it_maps_and_gets_endpoint() {
        let mut endpoints = Endpoints::new();
        endpoints.map_route(Method::POST, "path/to/handler", handler());

        let table = endpoints.finalize();

        assert!(matches!(table.find(&Method::POST, "/path/to/handler"), FindResult::Ok(_)));
    }

    #[test]
    fn it_returns_route_not_found() {
        let mut endpoints = Endpoints::new();
        endpoints.map_route(Method::POST, "path/to/handler", handler());

        let table = endpoints.finalize();

        assert!(matches!(table.find(&Method::POST, "/path/to/another-handler"), FindResult::RouteNotFound));
    }

    #[test]
    fn it_returns_method_not_found() {
        let mut endpoints = Endpoints::new();
        endpoints.map_route(Method::GET, "path/to/handler", handler());

        let table = endpoints.finalize();

        match table.find(&Method::POST, "/path/to/handler") {
            FindResult::MethodNotFound(allow) => assert_eq!(allow, "GET"),
            _ => panic!("must be in the `MethodNotFound` state")
        }
    }

    #[test]
    fn it_hides_routes_mapped_after_finalize_until_reset() {
        let mut endpoints = Endpoints::new();
        endpoints.map_route(Method::GET, "/a", handler());
        endpoints.finalize();

        endpoints.map_route(Method::GET, "/b", handler());
        let table = endpoints.finalize();
        assert!(matches!(table.find(&Method::GET, "/b"), FindResult::RouteNotFound));

        endpoints.reset();
        assert!(!endpoints.is_finalized());

        let table = endpoints.finalize();
        assert!(matches!(table.find(&Method::GET, "/b"), FindResult::Ok(_)));
    }

    #[test]
    fn it_has_route_after_map() {
        let mut endpoints = Endpoints::new();
        endpoints.map_route(Method::GET, "path/to/handler", handler());

        assert!(endpoints.contains(&Method::GET, "path/to/handler"));
        assert!(!endpoints.contains(&Method::PUT, "path/to/handler"));
    }
}
