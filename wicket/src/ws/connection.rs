//! WebSocket handshake validation and connection upgrade

use super::{WebSocket, WebSocketError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use hyper_util::rt::TokioIo;
use sha1::{Digest, Sha1};
use std::future::Future;

use tokio_tungstenite::{
    tungstenite::protocol::Role,
    WebSocketStream,
};

use crate::{
    HttpRequest,
    HttpResponse,
    HttpResult,
    error::Error,
    headers::{
        HeaderValue,
        CONNECTION,
        SEC_WEBSOCKET_ACCEPT,
        SEC_WEBSOCKET_KEY,
        SEC_WEBSOCKET_PROTOCOL,
        SEC_WEBSOCKET_VERSION,
        UPGRADE
    },
    http::{StatusCode, request::UpgradeSource},
    utils::str::split_header_list,
};

/// A validated WebSocket handshake
pub(crate) struct WebSocketConnection {
    sec_websocket_key: HeaderValue,
    sec_websocket_protocol: Option<HeaderValue>,
    protocol: Option<HeaderValue>,
}

impl std::fmt::Debug for WebSocketConnection {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WebSocketConnection(..)")
    }
}

impl WebSocketConnection {
    /// Picks the first of `known` protocols the client asked for
    pub(crate) fn with_protocols(mut self, known: &[&'static str]) -> Self {
        if let Some(requested) = self
            .sec_websocket_protocol
            .as_ref()
            .and_then(|p| p.to_str().ok())
        {
            self.protocol = known
                .iter()
                .find(|&&proto| split_header_list(requested).any(|req_proto| req_proto == proto))
                .map(|&protocol| HeaderValue::from_static(protocol));
        }
        self
    }

    /// Returns the negotiated protocol
    #[inline]
    pub(crate) fn protocol(&self) -> Option<&HeaderValue> {
        self.protocol.as_ref()
    }

    /// Completes the handshake and runs `func` with the socket.
    ///
    /// A connection upgrade runs `func` in a separate task once hyper hands
    /// over the connection. A detached socket runs it inline.
    pub(crate) async fn on<F, Fut>(self, req: HttpRequest, source: UpgradeSource, func: F) -> HttpResult
    where
        F: FnOnce(HttpRequest, WebSocket) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let response = self.switching_protocols()?;
        let WebSocketConnection { protocol, .. } = self;

        match source {
            UpgradeSource::Connection(on_upgrade) => {
                tokio::spawn(async move {
                    let upgraded = match on_upgrade.await {
                        Ok(upgraded) => TokioIo::new(upgraded),
                        Err(_err) => {
                            #[cfg(feature = "tracing")]
                            tracing::error!("WebSocket upgrade failed: {_err:#}");
                            return;
                        }
                    };

                    let stream = WebSocketStream::from_raw_socket(
                        upgraded,
                        Role::Server,
                        None)
                        .await;

                    func(req, WebSocket::new(stream, protocol)).await;
                });
            },
            UpgradeSource::Detached => func(req, WebSocket::detached(protocol)).await,
        }

        Ok(response)
    }

    fn switching_protocols(&self) -> HttpResult {
        let accept_key = Self::generate_websocket_accept_key(self.sec_websocket_key.as_bytes());

        let mut response = HttpResponse::new(StatusCode::SWITCHING_PROTOCOLS, Bytes::new());
        let headers = response.headers_mut();
        headers.insert(UPGRADE, HeaderValue::from_static(super::WEBSOCKET));
        headers.insert(CONNECTION, HeaderValue::from_static(super::UPGRADE));
        headers.insert(SEC_WEBSOCKET_ACCEPT, HeaderValue::try_from(accept_key).map_err(Error::server_error)?);
        if let Some(protocol) = self.protocol() {
            headers.insert(SEC_WEBSOCKET_PROTOCOL, protocol.clone());
        }
        Ok(response)
    }

    #[inline]
    fn generate_websocket_accept_key(key: &[u8]) -> String {
        let mut hasher = Sha1::new();
        hasher.update(key);
        hasher.update(super::WEBSOCKET_GUID.as_bytes());
        STANDARD.encode(hasher.finalize())
    }
}

impl TryFrom<&HttpRequest> for WebSocketConnection {
    type Error = Error;

    fn try_from(req: &HttpRequest) -> Result<Self, Self::Error> {
        let headers = req.headers();

        if !matches!(headers.get(&UPGRADE), Some(upgrade) if upgrade.as_bytes().eq_ignore_ascii_case(super::WEBSOCKET.as_bytes())) {
            return Err(WebSocketError::invalid_upgrade_header());
        }

        let is_upgrade = headers
            .get(&CONNECTION)
            .and_then(|conn| conn.to_str().ok())
            .is_some_and(|conn| split_header_list(conn).any(|token| token.eq_ignore_ascii_case(super::UPGRADE)));
        if !is_upgrade {
            return Err(WebSocketError::invalid_connection_header());
        }

        if !matches!(headers.get(&SEC_WEBSOCKET_VERSION), Some(version) if version == super::VERSION) {
            return Err(WebSocketError::invalid_version_header());
        }

        let sec_websocket_key = headers
            .get(&SEC_WEBSOCKET_KEY)
            .ok_or_else(WebSocketError::websocket_key_missing)?
            .clone();

        let sec_websocket_protocol = headers
            .get(&SEC_WEBSOCKET_PROTOCOL)
            .cloned();

        Ok(Self {
            sec_websocket_key,
            sec_websocket_protocol,
            protocol: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::WebSocketConnection;
    use crate::HttpRequest;

    fn connection(headers: &[(&str, &str)]) -> Result<WebSocketConnection, crate::error::Error> {
        let mut builder = HttpRequest::builder().uri("/ws");
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        WebSocketConnection::try_from(&builder.build().unwrap())
    }

    const VALID: [(&str, &str); 4] = [
        ("upgrade", "websocket"),
        ("connection", "keep-alive, Upgrade"),
        ("sec-websocket-version", "13"),
        ("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ=="),
    ];

    #[test]
    fn it_generates_accept_key() {
        let key = WebSocketConnection::generate_websocket_accept_key(b"dGhlIHNhbXBsZSBub25jZQ==");

        assert_eq!(key, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn it_accepts_valid_handshake() {
        assert!(connection(&VALID).is_ok());
    }

    #[test]
    fn it_rejects_invalid_upgrade_header() {
        let err = connection(&[VALID[1], VALID[2], VALID[3], ("upgrade", "h2c")]).unwrap_err();

        assert!(err.to_string().contains("Upgrade"));
    }

    #[test]
    fn it_rejects_invalid_connection_header() {
        let err = connection(&[VALID[0], VALID[2], VALID[3], ("connection", "close")]).unwrap_err();

        assert!(err.to_string().contains("Connection"));
    }

    #[test]
    fn it_rejects_invalid_version_header() {
        let err = connection(&[VALID[0], VALID[1], VALID[3], ("sec-websocket-version", "8")]).unwrap_err();

        assert!(err.to_string().contains("Sec-WebSocket-Version"));
    }

    #[test]
    fn it_picks_first_known_protocol() {
        let mut headers = VALID.to_vec();
        headers.push(("sec-websocket-protocol", "chat, json"));

        let connection = connection(&headers).unwrap().with_protocols(&["json", "chat"]);

        assert_eq!(connection.protocol().unwrap(), "json");
    }

    #[test]
    fn it_ignores_protocols_when_not_requested() {
        let connection = connection(&VALID).unwrap().with_protocols(&["json"]);

        assert!(connection.protocol().is_none());
    }
}
