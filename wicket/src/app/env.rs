//! Per-listener server environment

use hyper_util::server::graceful::GracefulShutdown;
use std::time::Duration;

use super::App;
use crate::{Limit, limits::DEFAULT_BODY_LIMIT};

pub(crate) const GRACEFUL_SHUTDOWN_TIMEOUT: u64 = 10;

/// Settings and shared resources of one running listener,
/// created when it starts and shared by all of its connections.
pub(crate) struct ServerEnv {
    /// Application handle used to dispatch requests
    pub(crate) app: App,

    /// Graceful shutdown utilities
    pub(crate) graceful_shutdown: GracefulShutdown,

    /// Maximum number of HTTP headers per request.
    pub(crate) max_header_count: Limit<usize>,

    /// Request body limit, `None` if disabled
    pub(crate) body_limit: Option<usize>,

    /// Whether server errors expose their message
    pub(crate) debug: bool,
}

impl ServerEnv {
    pub(crate) fn new(app: &App, debug: bool) -> Self {
        Self {
            app: app.clone(),
            graceful_shutdown: GracefulShutdown::new(),
            max_header_count: app.max_header_count,
            body_limit: app.body_limit.resolve(DEFAULT_BODY_LIMIT),
            debug,
        }
    }

    /// Waits for open connections to finish, bounded by a timeout
    #[inline]
    pub(crate) async fn shutdown(self) {
        tokio::select! {
            _ = self.graceful_shutdown.shutdown() => {
                #[cfg(feature = "tracing")]
                tracing::info!("shutting down the server...");
            },
            _ = tokio::time::sleep(Duration::from_secs(GRACEFUL_SHUTDOWN_TIMEOUT)) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("timed out wait for all connections to close");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_resolves_default_body_limit() {
        let env = ServerEnv::new(&App::new(), false);

        assert_eq!(env.body_limit, Some(5242880));
        assert_eq!(env.max_header_count, Limit::Default);
    }

    #[test]
    fn it_disables_body_limit() {
        let env = ServerEnv::new(&App::new().without_body_limit(), true);

        assert_eq!(env.body_limit, None);
        assert!(env.debug);
    }
}
