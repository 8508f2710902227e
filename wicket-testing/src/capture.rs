//! One-shot capture of the inbound request

use std::sync::{Arc, Mutex};
use wicket::{App, HttpRequest, middleware::MiddlewareGuard};
use crate::lock;

/// Holds the first request seen by the application during one call
#[derive(Debug, Clone, Default)]
pub(crate) struct RequestSlot(Arc<Mutex<Option<HttpRequest>>>);

impl RequestSlot {
    /// Prepends a capturing middleware to `app`.
    ///
    /// The middleware stays registered until the returned guard is dropped.
    pub(crate) fn attach(&self, app: &App) -> MiddlewareGuard {
        let slot = self.clone();
        app.scoped_wrap_first(move |req, next| {
            slot.fill(&req);
            next.run(req)
        })
    }

    /// Stores `req` unless a request was already captured
    #[inline]
    pub(crate) fn fill(&self, req: &HttpRequest) {
        let mut slot = lock(&self.0);
        if slot.is_none() {
            *slot = Some(req.clone());
        }
    }

    /// Takes the captured request
    #[inline]
    pub(crate) fn take(&self) -> Option<HttpRequest> {
        lock(&self.0).take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> HttpRequest {
        HttpRequest::builder().uri(uri).build().unwrap()
    }

    #[test]
    fn it_keeps_first_request() {
        let slot = RequestSlot::default();

        slot.fill(&request("/first"));
        slot.fill(&request("/second"));

        assert_eq!(slot.take().unwrap().path(), "/first");
        assert!(slot.take().is_none());
    }

    #[tokio::test]
    async fn it_captures_through_middleware_until_guard_drops() {
        let app = App::new();
        app.map_get("/", |_| async { "ok" });
        let slot = RequestSlot::default();

        let guard = slot.attach(&app);
        app.call(request("/?q=1")).await;
        drop(guard);

        assert_eq!(app.middleware_count(), 0);
        assert_eq!(slot.take().unwrap().query_string(), Some("q=1"));

        app.call(request("/")).await;
        assert!(slot.take().is_none());
    }
}
