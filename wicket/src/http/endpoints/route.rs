//! Route tree

use smallvec::SmallVec;
use std::fmt;

use crate::{
    http::{Method, request::{PathArg, PathArgs}},
    utils::str::split_nonempty,
};

use super::RouteHandler;

const PATH_SEPARATOR: u8 = b'/';
const ALLOW_METHOD_SEPARATOR: &str = ", ";
const OPEN_BRACKET: char = '{';
const CLOSE_BRACKET: char = '}';
const DEFAULT_HANDLERS_CAPACITY: usize = 4;

/// Handler bound to a method on a route node
#[derive(Clone)]
pub(crate) struct RouteEndpoint {
    pub(crate) method: Method,
    pub(crate) handler: RouteHandler,
}

/// A node of the route tree.
///
/// Static children are kept sorted for binary search and always win
/// over the single parameterised child.
#[derive(Default)]
pub(crate) struct RouteNode {
    static_routes: Vec<RouteEntry>,
    dynamic_route: Option<Box<RouteEntry>>,
    handlers: SmallVec<[RouteEndpoint; DEFAULT_HANDLERS_CAPACITY]>,
}

struct RouteEntry {
    path: Box<str>,
    node: RouteNode,
}

/// A matched node with the captured path parameters
pub(crate) struct RouteParams<'a> {
    pub(crate) route: &'a RouteNode,
    pub(crate) params: PathArgs,
}

impl fmt::Debug for RouteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteNode")
            .field("static_routes", &self.static_routes.len())
            .field("dynamic_route", &self.dynamic_route.as_ref().map(|r| &r.path))
            .field("handlers", &self.handlers.iter().map(|h| &h.method).collect::<Vec<_>>())
            .finish()
    }
}

impl RouteNode {
    #[inline]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Inserts a handler; a second handler for the same method and path replaces the first
    pub(crate) fn insert(&mut self, pattern: &str, endpoint: RouteEndpoint) {
        let mut current = self;
        for segment in split_path(pattern) {
            current = match param_name(segment) {
                Some(name) => {
                    let entry = current.dynamic_route.get_or_insert_with(|| Box::new(RouteEntry {
                        path: name.into(),
                        node: RouteNode::new(),
                    }));
                    &mut entry.node
                },
                None => {
                    let i = match current.static_routes.binary_search_by(|r| (*r.path).cmp(segment)) {
                        Ok(i) => i,
                        Err(i) => {
                            current.static_routes.insert(i, RouteEntry {
                                path: segment.into(),
                                node: RouteNode::new(),
                            });
                            i
                        }
                    };
                    &mut current.static_routes[i].node
                }
            };
        }

        match current.handlers.binary_search_by(|h| h.method.as_str().cmp(endpoint.method.as_str())) {
            Ok(i) => current.handlers[i] = endpoint,
            Err(i) => current.handlers.insert(i, endpoint),
        }
    }

    /// Finds the node for `path`, collecting parameter values on the way
    pub(crate) fn find(&self, path: &str) -> Option<RouteParams<'_>> {
        let mut current = self;
        let mut params = PathArgs::new();

        for segment in split_path(path) {
            if let Ok(i) = current.static_routes.binary_search_by(|r| (*r.path).cmp(segment)) {
                current = &current.static_routes[i].node;
                continue;
            }

            if let Some(next) = &current.dynamic_route {
                params.push(PathArg {
                    name: next.path.clone(),
                    value: segment.into()
                });
                current = &next.node;
                continue;
            }

            return None;
        }

        (!current.handlers.is_empty()).then_some(RouteParams {
            route: current,
            params,
        })
    }

    /// Returns the handler registered for `method`
    #[inline]
    pub(crate) fn handler(&self, method: &Method) -> Option<&RouteEndpoint> {
        self.handlers
            .binary_search_by(|h| h.method.as_str().cmp(method.as_str()))
            .ok()
            .map(|i| &self.handlers[i])
    }

    /// Builds the `Allow` header value for this node
    pub(crate) fn allowed(&self) -> String {
        let mut allowed = String::new();
        for (i, h) in self.handlers.iter().enumerate() {
            if i > 0 {
                allowed.push_str(ALLOW_METHOD_SEPARATOR);
            }
            allowed.push_str(h.method.as_str());
        }
        allowed
    }
}

#[inline(always)]
fn split_path(path: &str) -> impl Iterator<Item = &str> {
    split_nonempty(PATH_SEPARATOR, path.as_bytes())
        .filter_map(|s| std::str::from_utf8(s).ok())
}

#[inline]
fn param_name(segment: &str) -> Option<&str> {
    segment
        .strip_prefix(OPEN_BRACKET)
        .and_then(|s| s.strip_suffix(CLOSE_BRACKET))
}
