//! HTTP header names and values

pub use hyper::header::{
    HeaderMap,
    HeaderName,
    HeaderValue,
    ALLOW,
    CONNECTION,
    CONTENT_LENGTH,
    CONTENT_TYPE,
    COOKIE,
    HOST,
    SEC_WEBSOCKET_ACCEPT,
    SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_PROTOCOL,
    SEC_WEBSOCKET_VERSION,
    SET_COOKIE,
    UPGRADE,
};
