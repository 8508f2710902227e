#![allow(missing_docs)]

use std::{net::SocketAddr, sync::{Arc, Mutex}};
use wicket::{App, ServeOptions, app::Phase};

#[tokio::test]
async fn it_serves_requests_between_start_and_stop() {
    let app = App::new().without_greeter();
    app.map_get("/", |_| async { "Pass!" });

    let body = Arc::new(Mutex::new(None));
    let slot = body.clone();
    app.listener(Phase::AfterServerStart, move |ctx| {
        let slot = slot.clone();
        async move {
            let addr = ctx.local_addr().expect("server is bound");
            let result = reqwest::get(format!("http://{addr}/")).await;
            if let Ok(response) = result {
                *slot.lock().unwrap() = response.text().await.ok();
            }
            ctx.stop();
            Ok(())
        }
    });

    let options = ServeOptions::new()
        .bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .with_test_mode(true);
    app.serve(options).await.unwrap();

    assert_eq!(body.lock().unwrap().as_deref(), Some("Pass!"));
}

#[tokio::test]
async fn it_serves_on_prebound_listener() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let app = App::new().without_greeter();
    let seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();
    app.after_server_start(move |ctx| {
        let slot = slot.clone();
        async move {
            *slot.lock().unwrap() = ctx.local_addr().map(|addr| addr.port());
            ctx.stop();
        }
    });

    app.serve(ServeOptions::new().bind(listener).with_test_mode(true)).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), Some(port));
}

#[tokio::test]
async fn it_stops_from_another_task() {
    let app = App::new().without_greeter();
    let runner = app.clone();
    let handle = tokio::spawn(async move {
        let options = ServeOptions::new()
            .bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .with_test_mode(true);
        runner.serve(options).await
    });

    while !app.is_running() {
        tokio::task::yield_now().await;
    }
    app.stop();

    handle.await.unwrap().unwrap();
    assert!(!app.is_running());
}

#[tokio::test]
async fn it_reports_bind_failure() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap();

    let app = App::new().without_greeter();
    let stopped = Arc::new(Mutex::new(false));
    let flag = stopped.clone();
    app.after_server_stop(move |_| {
        let flag = flag.clone();
        async move { *flag.lock().unwrap() = true; }
    });

    let result = app.serve(ServeOptions::new().bind(addr).with_test_mode(true)).await;

    assert!(result.is_err());
    assert!(!*stopped.lock().unwrap());
}
