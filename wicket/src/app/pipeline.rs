//! Request dispatching

use bytes::Bytes;
use std::sync::Arc;

use super::App;
use crate::{
    error::{Error, default_error_response},
    headers::{HeaderMap, HeaderValue, ALLOW, CONTENT_LENGTH, CONTENT_TYPE},
    http::{
        endpoints::{Endpoint, FindResult, RouteHandler},
        response::TEXT_UTF_8,
        Method,
        StatusCode,
    },
    middleware::Next,
    HttpRequest,
    HttpResponse,
};

/// Request processing
impl App {
    /// Dispatches a request in-process, bypassing sockets entirely.
    ///
    /// The request runs through the same middleware pipeline, routing and
    /// error handling as one received over the network.
    ///
    /// # Example
    /// ```no_run
    /// use wicket::{App, HttpRequest};
    ///
    /// # async fn docs() {
    /// let app = App::new();
    /// app.map_get("/", |_| async { "foo" });
    ///
    /// let req = HttpRequest::builder().uri("/").build().unwrap();
    /// let response = app.call(req).await;
    ///
    /// assert_eq!(response.body().as_ref(), b"foo");
    /// # }
    /// ```
    pub async fn call(&self, req: HttpRequest) -> HttpResponse {
        self.dispatch(req, self.debug).await
    }

    pub(crate) async fn dispatch(&self, mut req: HttpRequest, debug: bool) -> HttpResponse {
        let is_head = req.method() == Method::HEAD;

        let endpoint = match self.route_table().find(req.method(), req.path()) {
            FindResult::Ok(Endpoint { handler, params }) => {
                req.set_params(params);
                handler
            },
            FindResult::RouteNotFound => not_found(),
            FindResult::MethodNotFound(allowed) => method_not_allowed(allowed),
        };

        let next = Next::new(self.middleware_snapshot(), endpoint);
        let mut response = match next.run(req).await {
            Ok(response) => response,
            Err(err) => default_error_response(err, debug),
        };

        if is_head {
            keep_content_length(response.body().len(), response.headers_mut());
            *response.body_mut() = Bytes::new();
        }
        response
    }
}

#[inline]
fn not_found() -> RouteHandler {
    Arc::new(|req| Box::pin(async move {
        let path = req.path();
        Err(Error::from_parts(
            StatusCode::NOT_FOUND,
            Some(path.into()),
            format!("Requested URL {path} not found")))
    }))
}

#[inline]
fn method_not_allowed(allowed: String) -> RouteHandler {
    Arc::new(move |req| {
        let allowed = allowed.clone();
        Box::pin(async move {
            let message = format!("Method {} not allowed for URL {}", req.method(), req.path());
            let mut response = HttpResponse::new(StatusCode::METHOD_NOT_ALLOWED, message);
            let headers = response.headers_mut();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_UTF_8));
            headers.insert(ALLOW, HeaderValue::try_from(allowed).map_err(Error::server_error)?);
            Ok(response)
        })
    })
}

#[inline]
fn keep_content_length(size: usize, headers: &mut HeaderMap) {
    if headers.contains_key(CONTENT_LENGTH) {
        return;
    }

    let mut buffer = itoa::Buffer::new();
    if let Ok(value) = HeaderValue::from_str(buffer.format(size)) {
        headers.insert(CONTENT_LENGTH, value);
    }
}
