//! # Wicket
//!
//! > Small web framework for Rust based on [Tokio](https://tokio.rs/) runtime and [hyper](https://hyper.rs/),
//! > built to be driven by tests as easily as by real clients.
//!
//! ## Features
//! * HTTP/1 server with graceful shutdown
//! * Routing with path parameters and implicit `HEAD`
//! * Ordered middleware pipeline
//! * Lifecycle listeners around server start and stop
//! * In-process entry point that bypasses sockets
//! * WebSockets
//!
//! ## Example
//! ```no_run
//! use wicket::App;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let app = App::new();
//!
//!     app.map_get("/hello/{name}", |req| async move {
//!         format!("Hello {}!", req.param("name").unwrap_or("world"))
//!     });
//!
//!     app.run().await
//! }
//! ```

mod server;
pub(crate) mod utils;

pub mod app;
pub mod http;
pub mod headers;
pub mod error;
pub mod limits;
pub mod middleware;
#[cfg(feature = "ws")]
pub mod ws;

pub use crate::app::{App, Bind, ServeOptions, ServerHandle};
pub use crate::limits::Limit;
pub use crate::middleware::Next;
pub use crate::http::{
    HttpRequest,
    HttpResponse,
    HttpResult,
    IntoResponse,
    Json,
    Results
};
