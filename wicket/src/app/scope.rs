use bytes::Bytes;
use futures_util::future::BoxFuture;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use std::{convert::Infallible, net::SocketAddr, sync::Weak};

use hyper::{
    body::Incoming,
    service::Service,
    Request,
    Response,
};

use super::env::ServerEnv;
use crate::{
    error::{Error, default_error_response},
    http::StatusCode,
    HttpRequest,
    HttpResponse,
};

#[cfg(feature = "ws")]
use {
    crate::http::request::UpgradeSource,
    hyper::upgrade::OnUpgrade,
};

/// Represents the execution scope of the current connection
#[derive(Clone)]
pub(crate) struct Scope {
    env: Weak<ServerEnv>,
    peer_addr: SocketAddr,
}

impl Service<Request<Incoming>> for Scope {
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    #[inline]
    fn call(&self, request: Request<Incoming>) -> Self::Future {
        Box::pin(Self::handle_request(
            request,
            self.env.clone(),
            self.peer_addr
        ))
    }
}

impl Scope {
    pub(crate) fn new(env: Weak<ServerEnv>, peer_addr: SocketAddr) -> Self {
        Self { env, peer_addr }
    }

    async fn handle_request(
        request: Request<Incoming>,
        env: Weak<ServerEnv>,
        peer_addr: SocketAddr
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        let (app, body_limit, debug) = match env.upgrade() {
            Some(env) => (env.app.clone(), env.body_limit, env.debug),
            None => {
                #[cfg(feature = "tracing")]
                tracing::warn!("server environment could not be upgraded; aborting...");
                let response = HttpResponse::new(StatusCode::SERVICE_UNAVAILABLE, Bytes::new());
                return Ok(Self::into_hyper(response));
            }
        };

        #[cfg_attr(not(feature = "ws"), allow(unused_mut))]
        let (mut parts, body) = request.into_parts();

        #[cfg(feature = "ws")]
        let on_upgrade = parts.extensions.remove::<OnUpgrade>();

        let body = match Self::read_body(body, body_limit).await {
            Ok(body) => body,
            Err(err) => return Ok(Self::into_hyper(default_error_response(err, debug))),
        };

        #[cfg_attr(not(feature = "ws"), allow(unused_mut))]
        let mut request = HttpRequest::from_parts(parts, body, peer_addr);

        #[cfg(feature = "ws")]
        if let Some(on_upgrade) = on_upgrade {
            request.set_upgrade(UpgradeSource::Connection(on_upgrade));
        }

        let response = app.dispatch(request, debug).await;
        Ok(Self::into_hyper(response))
    }

    async fn read_body(body: Incoming, limit: Option<usize>) -> Result<Bytes, Error> {
        match limit {
            Some(limit) => Limited::new(body, limit)
                .collect()
                .await
                .map(|collected| collected.to_bytes())
                .map_err(|err| if err.is::<LengthLimitError>() {
                    Error::from_parts(StatusCode::PAYLOAD_TOO_LARGE, None, err)
                } else {
                    Error::client_error(err)
                }),
            None => body
                .collect()
                .await
                .map(|collected| collected.to_bytes())
                .map_err(Error::client_error),
        }
    }

    #[inline]
    fn into_hyper(response: HttpResponse) -> Response<Full<Bytes>> {
        response.into_inner().map(Full::new)
    }
}
