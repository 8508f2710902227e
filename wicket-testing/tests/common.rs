//! Common test utilities

#![allow(missing_docs)]
#![allow(unreachable_pub)]
#![allow(dead_code)]
#![allow(missing_debug_implementations)]

use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;
use wicket::{App, HttpRequest, app::Phase, http::Method};

pub const PHASES: [Phase; 4] = [
    Phase::BeforeServerStart,
    Phase::AfterServerStart,
    Phase::BeforeServerStop,
    Phase::AfterServerStop,
];

/// Builds an app answering every verb on `/` with the method name,
/// echoing bodies on `/echo` and WebSocket messages on `/ws`
pub fn echo_app() -> App {
    init_tracing();
    let app = App::new().without_greeter();

    app.map_get("/", method_name);
    app.map_post("/", method_name);
    app.map_put("/", method_name);
    app.map_delete("/", method_name);
    app.map_patch("/", method_name);
    app.map_options("/", method_name);

    app.map_post("/echo", |req| async move {
        req.text().map(str::to_owned)
    });

    app.map_websocket("/ws", |_, mut ws| async move {
        while let Some(Ok(msg)) = ws.recv().await {
            if ws.send(msg).await.is_err() {
                break;
            }
        }
    });

    app
}

/// Routes harness logs to the test output, filtered by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn method_name(req: HttpRequest) -> String {
    req.method().to_string()
}

/// Records every lifecycle phase fired on `app`, in order
pub fn record_phases(app: &App) -> Arc<Mutex<Vec<Phase>>> {
    let fired = Arc::new(Mutex::new(Vec::new()));
    for phase in PHASES {
        let fired = fired.clone();
        app.listener(phase, move |_| {
            let fired = fired.clone();
            async move {
                fired.lock().unwrap().push(phase);
                Ok(())
            }
        });
    }
    fired
}

/// Returns the number of registered middleware and listeners
pub fn registrations(app: &App) -> (usize, Vec<usize>) {
    let listeners = PHASES
        .iter()
        .map(|&phase| app.listener_count(phase))
        .collect();
    (app.middleware_count(), listeners)
}

pub const VERBS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::OPTIONS,
];
