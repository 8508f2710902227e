//! Tools and data structures for WebSocket connections

use std::{future::Future, sync::Arc};
use tokio_tungstenite::tungstenite;

use crate::{
    App,
    HttpRequest,
    error::Error,
    http::{Method, endpoints::RouteHandler},
};

pub use tungstenite::Message;
pub use self::websocket::WebSocket;
pub(crate) use self::connection::WebSocketConnection;

mod connection;
mod websocket;

const WEBSOCKET: &str = "websocket";
const UPGRADE: &str = "upgrade";
const VERSION: &str = "13";
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Handshake errors
pub(crate) struct WebSocketError;

impl WebSocketError {
    #[inline]
    pub(crate) fn invalid_upgrade_header() -> Error {
        Error::client_error("WebSocket error: invalid or missing \"Upgrade\" header")
    }

    #[inline]
    pub(crate) fn invalid_connection_header() -> Error {
        Error::client_error("WebSocket error: invalid or missing \"Connection\" header")
    }

    #[inline]
    pub(crate) fn invalid_version_header() -> Error {
        Error::client_error("WebSocket error: invalid or missing \"Sec-WebSocket-Version\" header")
    }

    #[inline]
    pub(crate) fn websocket_key_missing() -> Error {
        Error::client_error("WebSocket error: missing \"Sec-WebSocket-Key\" header")
    }

    #[inline]
    pub(crate) fn not_upgradable_connection() -> Error {
        Error::client_error("WebSocket error: connection is not upgradable")
    }
}

impl From<tungstenite::Error> for Error {
    #[inline]
    fn from(err: tungstenite::Error) -> Self {
        Self::server_error(err)
    }
}

/// WebSocket routes
impl App {
    /// Maps a WebSocket handler.
    ///
    /// The handler receives the handshake request and the established socket.
    /// Over a real connection it runs after the `101 Switching Protocols`
    /// response is sent; for in-process calls the socket is detached and
    /// the handler is awaited before the response is returned.
    ///
    /// # Example
    /// ```no_run
    /// use wicket::{App, ws::Message};
    ///
    /// let app = App::new();
    ///
    /// app.map_websocket("/ws", |_req, mut ws| async move {
    ///     while let Some(Ok(msg)) = ws.recv().await {
    ///         if ws.send(msg).await.is_err() {
    ///             break;
    ///         }
    ///     }
    /// });
    /// ```
    pub fn map_websocket<F, Fut>(&self, pattern: &str, handler: F) -> &Self
    where
        F: Fn(HttpRequest, WebSocket) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.map_websocket_with_protocols(pattern, [], handler)
    }

    /// Maps a WebSocket handler that negotiates one of the `protocols`.
    ///
    /// The first protocol known to the server and requested by the client
    /// wins; it is echoed in the `Sec-WebSocket-Protocol` header.
    pub fn map_websocket_with_protocols<const N: usize, F, Fut>(
        &self,
        pattern: &str,
        protocols: [&'static str; N],
        handler: F
    ) -> &Self
    where
        F: Fn(HttpRequest, WebSocket) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let route: RouteHandler = Arc::new(move |mut req: HttpRequest| {
            let handler = handler.clone();
            Box::pin(async move {
                let connection = WebSocketConnection::try_from(&req)?
                    .with_protocols(&protocols);
                let source = req
                    .take_upgrade()
                    .ok_or_else(WebSocketError::not_upgradable_connection)?;

                connection
                    .on(req, source, move |req, ws| handler(req, ws))
                    .await
            })
        });
        self.map_handler(Method::GET, pattern, route);
        self
    }
}
