//! # Wicket Testing
//! Test clients for [Wicket](https://docs.rs/wicket) applications.
//!
//! Three ways to drive an [`App`](wicket::App) from tests:
//! - [`TestClient`] runs the whole server lifecycle on a real socket for every request
//! - [`ReusableClient`] keeps one server running across many requests
//! - [`InProcessClient`] calls the application directly, without sockets
//!
//! Every call returns the request the application received along with the response.
//!
//! ## Example
//! ```no_run
//! use wicket::App;
//! use wicket_testing::{AppTestExt, RequestOptions};
//!
//! let app = App::new();
//! app.map_get("/hello/{name}", |req| async move {
//!     format!("Hello, {}!", req.param("name").unwrap_or_default())
//! });
//!
//! let (request, response) = app
//!     .test_client()
//!     .get("/hello/world", RequestOptions::new())
//!     .unwrap();
//!
//! assert_eq!(request.unwrap().param("name"), Some("world"));
//! assert_eq!(response.text(), "Hello, world!");
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod url;
pub mod error;
mod capture;
mod client;
mod in_process;
mod manager;
mod options;
mod response;
mod reusable;
mod websocket;

pub use crate::{
    client::TestClient,
    error::TestClientError,
    in_process::{ClientState, InProcessClient, WebSocketHandshake},
    manager::{AppTestExt, TestManager},
    options::RequestOptions,
    response::TestingResponse,
    reusable::{ClientScope, ReusableClient},
    websocket::{Mimic, MimicSocket, Payload, WebSocketProxy},
};

/// Host the real-socket clients bind to by default
pub const HOST: &str = "127.0.0.1";

/// Virtual host of the in-process client
pub const IN_PROCESS_HOST: &str = "mockserver";

/// Virtual port of the in-process client
pub const IN_PROCESS_PORT: u16 = 1234;

#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
