//! HTTP request and response types

pub use hyper::{Method, StatusCode, Uri, Version};

pub use self::{
    request::{HttpRequest, HttpRequestBuilder, PathArg},
    response::{HttpResponse, HttpResult, IntoResponse, Json, Results},
};

pub mod request;
pub mod response;
pub(crate) mod endpoints;
