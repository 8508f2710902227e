#![allow(missing_docs)]

use common::{echo_app, record_phases, registrations, PHASES, VERBS};
use serde_json::json;
use std::{panic::{self, AssertUnwindSafe}, time::Duration};
use wicket::{App, http::{Method, StatusCode}};
use wicket_testing::{Mimic, RequestOptions, TestClient, TestClientError};

mod common;

#[test]
fn it_sends_every_verb() {
    let client = TestClient::new(echo_app());

    for method in VERBS {
        let (request, response) = client
            .request(method.clone(), "/", RequestOptions::new())
            .unwrap();
        let (request, response) = (request.unwrap(), response.unwrap());

        assert_eq!(request.method(), method);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text(), method.as_str());
        assert_eq!(response.content_type(), Some("text/plain; charset=utf-8"));
    }
}

#[test]
fn it_drops_body_of_head_response() {
    let client = TestClient::new(echo_app());

    let (request, response) = client.head("/", RequestOptions::new()).unwrap();

    assert_eq!(request.unwrap().method(), Method::HEAD);
    assert_eq!(response.status_code(), 200);
    assert!(response.body().is_empty());
}

#[test]
fn it_captures_request_with_query_and_body() {
    let client = TestClient::new(echo_app());
    let options = RequestOptions::new()
        .query("page", "2")
        .header("x-api-key", "secret")
        .json(&json!({ "name": "john" }));

    let (request, response) = client.post("/echo", options).unwrap();
    let request = request.unwrap();

    assert_eq!(request.query_string(), Some("page=2"));
    assert_eq!(request.header("x-api-key"), Some("secret"));
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(response.json().unwrap()["name"], "john");
}

#[test]
fn it_skips_capture_when_not_gathering() {
    let client = TestClient::new(echo_app());

    let (request, response) = client
        .get("/", RequestOptions::new().gather_request(false))
        .unwrap();

    assert!(request.is_none());
    assert_eq!(response.text(), "GET");
}

#[test]
fn it_fires_every_phase_once_per_call() {
    let app = echo_app();
    let fired = record_phases(&app);
    let client = TestClient::new(app);

    client.get("/", RequestOptions::new()).unwrap();
    client.get("/", RequestOptions::new()).unwrap();

    let fired = fired.lock().unwrap();
    assert_eq!(fired.len(), 8);
    assert_eq!(fired[..4], PHASES);
    assert_eq!(fired[4..], PHASES);
}

#[test]
fn it_leaves_no_registrations_behind() {
    let app = echo_app();
    let before = registrations(&app);
    let client = TestClient::new(app.clone());

    client.get("/", RequestOptions::new()).unwrap();
    let _ = client.get("/", RequestOptions::new().header("bad header", "x"));

    assert_eq!(registrations(&app), before);
}

#[test]
fn it_collects_request_errors() {
    let client = TestClient::new(echo_app());

    let err = client
        .get("/", RequestOptions::new().header("bad header", "x"))
        .unwrap_err();

    assert!(matches!(&err, TestClientError::Request(errors) if errors.len() == 1));
    assert!(err.to_string().starts_with("Exception during request: [Invalid request:"));
}

#[test]
fn it_handles_missing_response() {
    let app = App::new().without_greeter();
    app.map_get("/slow", |_| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        "late"
    });
    let client = TestClient::new(app);
    let options = RequestOptions::new().timeout(Duration::from_millis(50));

    let (request, response) = client
        .request(Method::GET, "/slow", options.clone().allow_none(true))
        .unwrap();
    assert!(request.is_none());
    assert!(response.is_none());

    let err = client.get("/slow", options).unwrap_err();
    assert!(matches!(err, TestClientError::NoResponse { request_captured: true }));
}

#[test]
fn it_returns_not_found_from_framework() {
    let client = TestClient::new(echo_app());

    let (request, response) = client.get("/missing", RequestOptions::new()).unwrap();

    assert_eq!(request.unwrap().path(), "/missing");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn it_binds_fixed_port() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .unwrap()
        .port();
    let client = TestClient::new(echo_app()).with_port(port);

    let (request, response) = client.get("/", RequestOptions::new()).unwrap();

    assert_eq!(response.url(), format!("http://127.0.0.1:{port}/"));
    assert!(request.unwrap().peer_addr().is_some());
}

#[test]
fn it_records_mimic_session() {
    let client = TestClient::new(echo_app());
    let mimic = Mimic::new(|ws| async move {
        ws.send("foo").await?;
        let reply = ws.recv_text().await?;
        assert_eq!(reply, "foo");
        Ok(())
    });

    let (request, proxy) = client
        .websocket("/ws", RequestOptions::new().mimic(mimic))
        .unwrap();

    assert_eq!(request.unwrap().path(), "/ws");
    assert!(proxy.opened());
    assert_eq!(proxy.status(), StatusCode::SWITCHING_PROTOCOLS);
    assert_eq!(proxy.server_received(), ["foo", ""]);
    assert_eq!(proxy.client_received(), ["foo"]);
}

#[test]
fn it_sends_while_another_handle_waits_to_receive() {
    let client = TestClient::new(echo_app());
    let mimic = Mimic::new(|ws| async move {
        let reader = ws.clone();
        let pending = tokio::spawn(async move { reader.recv_text().await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let sent = tokio::time::timeout(Duration::from_secs(2), ws.send("foo")).await;
        assert!(sent.is_ok(), "send waited for the pending recv");
        sent.unwrap()?;

        let reply = pending.await.unwrap()?;
        assert_eq!(reply, "foo");
        Ok(())
    });

    let (_, proxy) = client
        .websocket("/ws", RequestOptions::new().mimic(mimic))
        .unwrap();

    assert_eq!(proxy.server_received(), ["foo", ""]);
    assert_eq!(proxy.client_received(), ["foo"]);
}

#[test]
fn it_runs_stop_phases_before_resuming_panic() {
    let app = echo_app();
    let fired = record_phases(&app);
    let before = registrations(&app);
    let client = TestClient::new(app.clone());
    let mimic = Mimic::new(|ws| async move {
        ws.send("foo").await?;
        let reply = ws.recv_text().await?;
        assert_eq!(reply, "not-foo");
        Ok(())
    });

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        client.websocket("/ws", RequestOptions::new().mimic(mimic))
    }));

    assert!(result.is_err());
    assert_eq!(*fired.lock().unwrap(), PHASES);
    assert_eq!(registrations(&app), before);
}

#[test]
fn it_tolerates_close_by_server() {
    let app = App::new().without_greeter();
    app.map_websocket("/bye", |_, mut ws| async move {
        let _ = ws.send("bye").await;
        let _ = ws.close(None).await;
    });
    let client = TestClient::new(app);
    let mimic = Mimic::new(|ws| async move {
        loop {
            ws.recv().await?;
        }
    });

    let (_, proxy) = client
        .websocket("/bye", RequestOptions::new().mimic(mimic))
        .unwrap();

    assert_eq!(proxy.server_sent(), ["bye"]);
    assert!(proxy.server_received().is_empty());
}

#[test]
fn it_negotiates_subprotocol() {
    let app = App::new().without_greeter();
    app.map_websocket_with_protocols("/ws", ["foo", "bar"], |_, _| async {});
    let client = TestClient::new(app);

    let (_, proxy) = client
        .websocket("/ws", RequestOptions::new().subprotocols(["bar", "baz"]))
        .unwrap();

    assert!(proxy.opened());
    assert_eq!(proxy.protocol(), Some("bar"));
    assert!(proxy.client_sent().is_empty());
}
