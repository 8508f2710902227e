#![allow(missing_docs)]

use common::{echo_app, record_phases, registrations, PHASES, VERBS};
use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
use wicket::{App, HttpResponse, app::Phase, error::Error, headers::HeaderValue, http::StatusCode};
use wicket_testing::{ClientState, InProcessClient, RequestOptions, TestClientError};

mod common;

#[tokio::test]
async fn it_sends_every_verb() {
    let client = InProcessClient::new(echo_app());

    for method in VERBS {
        let (request, response) = client
            .request(method.clone(), "/", RequestOptions::new())
            .await
            .unwrap();

        assert_eq!(request.unwrap().method(), method);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text(), method.as_str());
        assert_eq!(response.url(), "http://mockserver:1234/");
    }
}

#[tokio::test]
async fn it_uses_virtual_host() {
    let client = InProcessClient::new(echo_app());
    let options = RequestOptions::new()
        .query("q", "a b")
        .text("hello");

    let (request, response) = client.post("echo", options).await.unwrap();
    let request = request.unwrap();

    assert_eq!(request.header("host"), Some("mockserver:1234"));
    assert_eq!(request.query_string(), Some("q=a+b"));
    assert_eq!(request.peer_addr(), None);
    assert_eq!(response.text(), "hello");
    assert_eq!(response.url(), "http://mockserver:1234/echo?q=a+b");
}

#[tokio::test]
async fn it_fires_every_phase_once_per_call() {
    let app = echo_app();
    let fired = record_phases(&app);
    let client = InProcessClient::new(app);

    client.get("/", RequestOptions::new()).await.unwrap();

    assert_eq!(*fired.lock().unwrap(), PHASES);
}

#[tokio::test]
async fn it_leaves_no_registrations_behind() {
    let app = echo_app();
    let before = registrations(&app);
    let client = InProcessClient::new(app.clone());

    client.get("/", RequestOptions::new()).await.unwrap();
    client.websocket("/ws", RequestOptions::new()).await.unwrap();

    assert_eq!(registrations(&app), before);
}

#[tokio::test]
async fn it_returns_or_suppresses_listener_errors() {
    let app = echo_app();
    app.listener(Phase::BeforeServerStart, |_| async {
        Err(Error::server_error("listener failed"))
    });

    let err = InProcessClient::new(app.clone())
        .get("/", RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TestClientError::App(_)));

    let (_, response) = InProcessClient::new(app)
        .with_suppress_exceptions(true)
        .get("/", RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(response.text(), "GET");
}

#[tokio::test]
async fn it_runs_stop_phases_after_failed_start() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = App::new();
    let counter = calls.clone();
    app.map_get("/", move |_| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            "called"
        }
    });
    let fired = record_phases(&app);
    app.listener(Phase::AfterServerStart, |_| async {
        Err(Error::server_error("start failed"))
    });

    let err = InProcessClient::new(app)
        .get("/", RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TestClientError::App(_)));
    assert_eq!(*fired.lock().unwrap(), PHASES);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn it_exposes_server_errors_in_debug_mode() {
    let app = App::new();
    app.map_get("/fail", |_| async { Err::<String, _>(Error::server_error("boom")) });
    let client = InProcessClient::new(app);

    let (_, quiet) = client.get("/fail", RequestOptions::new()).await.unwrap();
    let (_, verbose) = client.get("/fail", RequestOptions::new().debug(true)).await.unwrap();

    assert_eq!(quiet.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(verbose.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!quiet.text().contains("boom"));
    assert!(verbose.text().contains("boom"));
}

#[tokio::test]
async fn it_replays_cookies() {
    let app = App::new();
    app.map_get("/login", |_| async {
        HttpResponse::new(StatusCode::OK, "ok")
            .with_header("set-cookie", HeaderValue::from_static("session=abc; Path=/"))
    });
    app.map_get("/whoami", |req| async move {
        req.header("cookie").unwrap_or_default().to_owned()
    });
    let client = InProcessClient::new(app);

    let (_, login) = client.get("/login", RequestOptions::new().raw_cookies(true)).await.unwrap();
    let (_, whoami) = client.get("/whoami", RequestOptions::new()).await.unwrap();

    assert_eq!(login.raw_cookies().unwrap()["session"].value(), "abc");
    assert_eq!(client.cookie("session").as_deref(), Some("abc"));
    assert_eq!(whoami.text(), "session=abc");

    client.clear_cookies();
    let (_, anonymous) = client.get("/whoami", RequestOptions::new()).await.unwrap();
    assert_eq!(anonymous.text(), "");
}

#[tokio::test]
async fn it_opens_websocket_handshake() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = App::new();
    let counter = calls.clone();
    app.map_websocket_with_protocols("/ws", ["foo", "bar"], move |_, ws| {
        let counter = counter.clone();
        async move {
            assert!(ws.is_detached());
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    let client = InProcessClient::new(app);

    let (request, handshake) = client
        .websocket("/ws", RequestOptions::new().subprotocols(["bar"]))
        .await
        .unwrap();
    let request = request.unwrap();

    assert!(handshake.opened());
    assert_eq!(handshake.status(), StatusCode::SWITCHING_PROTOCOLS);
    assert_eq!(handshake.protocol(), Some("bar"));
    assert_eq!(request.header("sec-websocket-key"), Some("testserver=="));
    assert_eq!(request.header("sec-websocket-version"), Some("13"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn it_restores_from_serialized_state() {
    let state = ClientState {
        host: "example.test".into(),
        port: 8080,
        suppress_exceptions: false,
    };
    let json = serde_json::to_string(&state).unwrap();

    let client = InProcessClient::from_state(echo_app(), serde_json::from_str(&json).unwrap());
    let (request, response) = client.get("/", RequestOptions::new()).await.unwrap();

    assert_eq!(client.base_url(), "http://example.test:8080");
    assert_eq!(request.unwrap().header("host"), Some("example.test:8080"));
    assert_eq!(response.text(), "GET");
}
