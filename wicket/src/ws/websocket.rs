//! WebSocket streaming and messaging utils

use crate::{error::Error, headers::HeaderValue};
use super::Message;

use futures_util::{SinkExt, StreamExt};
use hyper_util::rt::TokioIo;
use hyper::upgrade::Upgraded;

use tokio_tungstenite::{tungstenite, WebSocketStream};
use tokio_tungstenite::tungstenite::{
    Error as WsError,
    protocol::CloseFrame
};

enum Transport {
    Upgraded(Box<WebSocketStream<TokioIo<Upgraded>>>),
    Detached,
}

/// A WebSocket connection.
///
/// [`WebSocket::recv`] is data-only: ping/pong frames are skipped, and a close
/// frame completes the close handshake and ends the stream.
///
/// A *detached* socket is handed to handlers called in-process:
/// it receives nothing and discards everything sent to it.
pub struct WebSocket {
    inner: Transport,
    protocol: Option<HeaderValue>,
}

impl std::fmt::Debug for WebSocket {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocket")
            .field("detached", &self.is_detached())
            .field("protocol", &self.protocol)
            .finish()
    }
}

impl WebSocket {
    /// Creates a new [`WebSocket`]
    #[inline]
    pub(super) fn new(
        inner: WebSocketStream<TokioIo<Upgraded>>,
        protocol: Option<HeaderValue>
    ) -> Self {
        Self { inner: Transport::Upgraded(Box::new(inner)), protocol }
    }

    /// Creates a socket that is not backed by a connection
    #[inline]
    pub(super) fn detached(protocol: Option<HeaderValue>) -> Self {
        Self { inner: Transport::Detached, protocol }
    }

    /// Receives the next text or binary message.
    ///
    /// Returns `None` once the peer closed the connection.
    ///
    /// # Errors
    /// Returns an error if the underlying socket fails.
    pub async fn recv(&mut self) -> Option<Result<Message, Error>> {
        let Transport::Upgraded(stream) = &mut self.inner else {
            return None;
        };

        loop {
            let msg = match stream.next().await? {
                Ok(msg) => msg,
                Err(err) => return Some(Err(err.into()))
            };

            match msg {
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Text(_) | Message::Binary(_) => return Some(Ok(msg)),
                Message::Frame(_) => {
                    debug_assert!(
                        false,
                        "tungstenite returned a raw Frame while reading messages"
                    );
                    continue;
                },
                Message::Close(frame) => {
                    if let Err(_close_err) = self.close(frame).await {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("WebSocket close failed: {_close_err}");
                    }
                    return None;
                }
            }
        }
    }

    /// Receives the next message as text; binary messages must be valid UTF-8
    pub async fn recv_text(&mut self) -> Option<Result<String, Error>> {
        let msg = match self.recv().await? {
            Ok(msg) => msg,
            Err(err) => return Some(Err(err)),
        };

        Some(msg
            .into_text()
            .map(|text| text.as_str().to_owned())
            .map_err(Error::client_error))
    }

    /// Sends a message to the peer
    ///
    /// # Errors
    /// Returns an error if the underlying sink fails to send.
    #[inline]
    pub async fn send(&mut self, msg: impl Into<Message>) -> Result<(), Error> {
        match &mut self.inner {
            Transport::Upgraded(stream) => stream
                .send(msg.into())
                .await
                .map_err(Error::from),
            Transport::Detached => Ok(()),
        }
    }

    /// Closes the WebSocket connection.
    ///
    /// Closing an already closed connection is not an error.
    #[inline]
    pub async fn close(&mut self, frame: Option<CloseFrame>) -> Result<(), Error> {
        let Transport::Upgraded(stream) = &mut self.inner else {
            return Ok(());
        };

        match WebSocketStream::close(&mut **stream, frame).await {
            Ok(()) => Ok(()),
            Err(e) if is_expected_close_error(&e) => Ok(()),
            Err(e) => Err(Error::from(e)),
        }
    }

    /// Returns the selected WebSocket sub-protocol, if there is any.
    #[inline]
    pub fn protocol(&self) -> Option<&HeaderValue> {
        self.protocol.as_ref()
    }

    /// Returns `true` if this socket is not backed by a connection
    #[inline]
    pub fn is_detached(&self) -> bool {
        matches!(self.inner, Transport::Detached)
    }
}

#[inline]
fn is_expected_close_error(e: &WsError) -> bool {
    match e {
        WsError::ConnectionClosed => true,
        WsError::AlreadyClosed => true,
        WsError::Protocol(p) => matches!(
            p,
            tungstenite::error::ProtocolError::SendAfterClosing
        ),
        WsError::Io(io) => matches!(
            io.kind(),
            std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::NotConnected
        ),
        _ => false,
    }
}
