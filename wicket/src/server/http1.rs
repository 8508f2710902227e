use super::Server;
use crate::Limit;
use crate::app::{ServerEnv, scope::Scope};
use std::sync::Arc;
use hyper::rt::{Read, Write};
use hyper_util::{
    rt::TokioExecutor,
    server::conn::auto::Builder
};

/// HTTP/1 impl
impl<I: Send + Read + Write + Unpin + 'static> Server<I> {
    #[inline]
    pub(super) async fn serve_core(self, scope: Scope, env: Arc<ServerEnv>) {
        let mut connection_builder = Builder::new(TokioExecutor::new());
        if let Limit::Limited(max_header_count) = env.max_header_count {
            connection_builder.http1().max_headers(max_header_count);
        }

        let connection = connection_builder.serve_connection_with_upgrades(self.io, scope);
        let connection = env.graceful_shutdown.watch(connection);

        drop(env);

        if let Err(_err) = connection.await {
            #[cfg(feature = "tracing")]
            tracing::debug!("error serving connection: {_err:#}");
        }
    }
}
