//! Common test utilities

#![allow(missing_docs)]
#![allow(unreachable_pub)]
#![allow(dead_code)]
#![allow(missing_debug_implementations)]

use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;
use wicket::{App, ServerHandle};

pub struct TestServer {
    pub app: App,
    handle: ServerHandle,
}

impl TestServer {
    /// Maps routes with `setup` and starts accepting connections on a free port
    pub async fn spawn<F>(setup: F) -> Self
    where
        F: FnOnce(&App),
    {
        Self::spawn_with(App::new().without_greeter(), setup).await
    }

    pub async fn spawn_with<F>(app: App, setup: F) -> Self
    where
        F: FnOnce(&App),
    {
        init_tracing();
        setup(&app);
        app.startup();

        let handle = app
            .start_server(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();

        Self { app, handle }
    }

    pub fn port(&self) -> u16 {
        self.handle.local_addr().port()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port(), path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://127.0.0.1:{}{}", self.port(), path)
    }

    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder().http1_only().build().unwrap()
    }

    pub async fn shutdown(self) {
        self.handle.close();
        self.handle.wait_closed().await;
    }
}

/// Routes framework logs to the test output, filtered by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
