//! WebSocket proxy recording scripted client sessions.
//!
//! The `websocket` verbs of the test clients connect to an endpoint and, when a
//! [`Mimic`] script is given, hand the script a [`MimicSocket`] that records every
//! payload it sends and receives. The resulting [`WebSocketProxy`] exposes both
//! logs, so tests can assert on the exact message order seen by the server.

use futures_util::{
    future::BoxFuture,
    stream::{SplitSink, SplitStream},
    SinkExt,
    StreamExt,
};
use std::{fmt, future::Future, sync::{Arc, Mutex as StdMutex}, time::Duration};
use tokio::{net::TcpStream, sync::Mutex};

use tokio_tungstenite::{
    MaybeTlsStream,
    WebSocketStream,
    tungstenite::{client::IntoClientRequest, Message},
};

use wicket::{
    headers::{HeaderValue, SEC_WEBSOCKET_PROTOCOL},
    http::StatusCode,
};

use crate::{error::TestClientError, lock, options::RequestOptions};

/// Upper bound of waiting for the peer to confirm a close
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ClientSink = SplitSink<ClientStream, Message>;
type ClientSource = SplitStream<ClientStream>;

type MimicFn = Arc<
    dyn Fn(MimicSocket) -> BoxFuture<'static, Result<(), TestClientError>>
    + Send
    + Sync
>;

/// A text or binary WebSocket payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Text frame
    Text(String),
    /// Binary frame
    Binary(Vec<u8>),
}

impl Payload {
    /// Returns the text, `None` for binary payloads
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Binary(_) => None,
        }
    }
}

impl From<&str> for Payload {
    #[inline]
    fn from(text: &str) -> Self {
        Payload::Text(text.to_owned())
    }
}

impl From<String> for Payload {
    #[inline]
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Vec<u8>> for Payload {
    #[inline]
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(bytes)
    }
}

impl From<Payload> for Message {
    #[inline]
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Text(text) => Message::text(text),
            Payload::Binary(bytes) => Message::binary(bytes),
        }
    }
}

impl PartialEq<&str> for Payload {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.as_text() == Some(*other)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => f.write_str(text),
            Payload::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

/// A scripted WebSocket client.
///
/// # Example
/// ```no_run
/// use wicket_testing::Mimic;
///
/// let mimic = Mimic::new(|ws| async move {
///     ws.send("foo").await?;
///     ws.recv().await?;
///     Ok(())
/// });
/// ```
#[derive(Clone)]
pub struct Mimic(MimicFn);

impl fmt::Debug for Mimic {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Mimic(..)")
    }
}

impl Mimic {
    /// Wraps a script
    pub fn new<F, Fut>(script: F) -> Self
    where
        F: Fn(MimicSocket) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestClientError>> + Send + 'static,
    {
        Self(Arc::new(move |socket| Box::pin(script(socket))))
    }

    #[inline]
    async fn run(&self, socket: MimicSocket) -> Result<(), TestClientError> {
        (self.0)(socket).await
    }
}

/// Payloads seen by a [`MimicSocket`], in order
#[derive(Default)]
struct MimicLog {
    sent: Vec<Payload>,
    received: Vec<Payload>,
}

/// A recording handle to a client WebSocket, given to [`Mimic`] scripts.
///
/// Cloning the handle shares the connection and the logs. Sending and
/// receiving go through separate halves of the connection, so one handle
/// may send while another waits for a message.
#[derive(Clone)]
pub struct MimicSocket {
    sink: Arc<Mutex<ClientSink>>,
    source: Arc<Mutex<ClientSource>>,
    log: Arc<StdMutex<MimicLog>>,
}

impl fmt::Debug for MimicSocket {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MimicSocket(..)")
    }
}

impl MimicSocket {
    fn new(stream: ClientStream) -> Self {
        let (sink, source) = stream.split();
        Self {
            sink: Arc::new(Mutex::new(sink)),
            source: Arc::new(Mutex::new(source)),
            log: Arc::default(),
        }
    }

    /// Records and sends a payload
    ///
    /// # Errors
    /// Fails with [`TestClientError::ConnectionClosed`] once the connection is closed.
    pub async fn send(&self, payload: impl Into<Payload>) -> Result<(), TestClientError> {
        let payload = payload.into();
        lock(&self.log).sent.push(payload.clone());
        self.sink
            .lock()
            .await
            .send(payload.into())
            .await
            .map_err(TestClientError::from)
    }

    /// Receives and records the next text or binary payload.
    ///
    /// Ping and pong frames are skipped.
    ///
    /// # Errors
    /// Fails with [`TestClientError::ConnectionClosed`] when the peer closes
    /// the connection; [`TestClientError::is_clean_close`] tells whether it
    /// was a normal closure.
    pub async fn recv(&self) -> Result<Payload, TestClientError> {
        let mut source = self.source.lock().await;
        loop {
            let msg = match source.next().await {
                Some(msg) => msg?,
                None => return Err(TestClientError::ConnectionClosed { code: None, reason: String::new() }),
            };

            let payload = match msg {
                Message::Text(text) => Payload::Text(text.as_str().to_owned()),
                Message::Binary(bytes) => Payload::Binary(bytes.to_vec()),
                Message::Close(frame) => {
                    let (code, reason) = frame
                        .map(|frame| (Some(u16::from(frame.code)), frame.reason.as_str().to_owned()))
                        .unwrap_or_default();
                    return Err(TestClientError::ConnectionClosed { code, reason });
                },
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };

            lock(&self.log).received.push(payload.clone());
            return Ok(payload);
        }
    }

    /// Receives the next payload as text
    pub async fn recv_text(&self) -> Result<String, TestClientError> {
        match self.recv().await? {
            Payload::Text(text) => Ok(text),
            Payload::Binary(bytes) => String::from_utf8(bytes)
                .map_err(|err| TestClientError::InvalidRequest(err.to_string())),
        }
    }

    /// Sends a close frame and waits for the peer to confirm
    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if let Err(err) = sink.send(Message::Close(None)).await {
            let err = TestClientError::from(err);
            if !err.is_clean_close() {
                tracing::debug!("WebSocket close failed: {err}");
            }
            return;
        }

        let drain = async {
            let mut source = self.source.lock().await;
            while let Some(Ok(_)) = source.next().await {}
        };
        if tokio::time::timeout(CLOSE_TIMEOUT, drain).await.is_err() {
            tracing::warn!("WebSocket peer did not confirm the close in {CLOSE_TIMEOUT:?}");
        }
        let _ = sink.close().await;
    }

    fn logs(&self) -> (Vec<Payload>, Vec<Payload>) {
        let mut log = lock(&self.log);
        (std::mem::take(&mut log.sent), std::mem::take(&mut log.received))
    }
}

/// Outcome of a WebSocket session driven by a test client
#[derive(Debug, Clone)]
pub struct WebSocketProxy {
    opened: bool,
    status: StatusCode,
    protocol: Option<String>,
    client_sent: Vec<Payload>,
    client_received: Vec<Payload>,
}

impl WebSocketProxy {
    /// Returns `true` if the handshake succeeded
    #[inline]
    pub fn opened(&self) -> bool {
        self.opened
    }

    /// Returns the handshake response status
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the subprotocol selected by the server
    #[inline]
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// Payloads sent by the client, in order
    #[inline]
    pub fn client_sent(&self) -> &[Payload] {
        &self.client_sent
    }

    /// Payloads received by the client, in order
    #[inline]
    pub fn client_received(&self) -> &[Payload] {
        &self.client_received
    }

    /// Payloads received by the server, same as [`client_sent`](Self::client_sent)
    #[inline]
    pub fn server_received(&self) -> &[Payload] {
        &self.client_sent
    }

    /// Payloads sent by the server, same as [`client_received`](Self::client_received)
    #[inline]
    pub fn server_sent(&self) -> &[Payload] {
        &self.client_received
    }
}

/// Connects to `url`, runs the [`Mimic`] script from `options` if any and
/// closes the connection.
///
/// A clean close by the server ends the script normally. After a script
/// that completed on its own, an empty text payload is sent as a terminator.
pub(crate) async fn websocket_proxy(url: &str, options: &RequestOptions) -> Result<WebSocketProxy, TestClientError> {
    let mut request = url.into_client_request()?;
    for (name, value) in options.resolved_headers()? {
        request.headers_mut().append(name, value);
    }
    if !options.subprotocols.is_empty() {
        let protocols = HeaderValue::from_str(&options.subprotocols.join(", "))
            .map_err(|err| TestClientError::InvalidRequest(err.to_string()))?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocols);
    }

    let connect = tokio_tungstenite::connect_async(request);
    let (stream, response) = match options.timeout {
        Some(timeout) => tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| TestClientError::InvalidRequest(format!("WebSocket handshake with {url} timed out")))??,
        None => connect.await?,
    };

    let protocol = response
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|p| p.to_str().ok())
        .map(str::to_owned);

    let socket = MimicSocket::new(stream);
    if let Some(mimic) = &options.mimic {
        match mimic.run(socket.clone()).await {
            Ok(()) => match socket.send("").await {
                Err(err) if !err.is_clean_close() => return Err(err),
                _ => (),
            },
            Err(err) if err.is_clean_close() => {
                tracing::debug!("WebSocket closed by the server during the mimic run: {err}");
            },
            Err(err) => return Err(err),
        }
    }

    socket.close().await;
    let (client_sent, client_received) = socket.logs();

    Ok(WebSocketProxy {
        opened: true,
        status: response.status(),
        protocol,
        client_sent,
        client_received,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    #[test]
    fn it_compares_text_payloads() {
        let log = vec![Payload::from("foo"), Payload::from(String::new())];

        assert_eq!(log, ["foo", ""]);
        assert_ne!(Payload::Binary(b"foo".to_vec()), "foo");
    }

    #[test]
    fn it_converts_payload_to_message() {
        assert_eq!(Message::from(Payload::from("foo")), Message::text("foo"));
        assert_eq!(Message::from(Payload::from(vec![1, 2])), Message::binary(vec![1, 2]));
    }

    #[test]
    fn it_mirrors_logs() {
        let proxy = WebSocketProxy {
            opened: true,
            status: StatusCode::SWITCHING_PROTOCOLS,
            protocol: None,
            client_sent: vec!["foo".into()],
            client_received: vec!["bar".into()],
        };

        assert_eq!(proxy.server_received(), ["foo"]);
        assert_eq!(proxy.server_sent(), ["bar"]);
    }

    #[test]
    fn it_treats_normal_close_code_as_clean() {
        let err = TestClientError::ConnectionClosed {
            code: Some(u16::from(CloseCode::Normal)),
            reason: String::new(),
        };

        assert!(err.is_clean_close());
    }
}
