//! HTTP Server tools

use std::sync::Weak;
use std::net::SocketAddr;
use hyper::rt::{Read, Write};
use crate::app::{ServerEnv, scope::Scope};

mod http1;

pub(crate) struct Server<I: Read + Write + Unpin> {
    io: I,
    peer_addr: SocketAddr,
}

impl<I: Send + Read + Write + Unpin + 'static> Server<I> {
    #[inline]
    pub(crate) fn new(io: I, peer_addr: SocketAddr) -> Self {
        Self { io, peer_addr }
    }

    #[inline]
    pub(crate) async fn serve(self, env: Weak<ServerEnv>) {
        if let Some(instance) = env.upgrade() {
            let scope = Scope::new(env, self.peer_addr);
            self.serve_core(scope, instance).await;
        } else {
            #[cfg(feature = "tracing")]
            tracing::warn!("server environment could not be upgraded; aborting...");
        }
    }
}
