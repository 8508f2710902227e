#![allow(missing_docs)]

use common::echo_app;
use wicket_testing::{AppTestExt, RequestOptions, TestManager};

mod common;

#[test]
fn it_answers_alike_through_both_clients() {
    let app = echo_app();
    let manager = TestManager::new(&app);

    let (_, real) = manager.test_client().get("/", RequestOptions::new()).unwrap();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (_, in_process) = runtime
        .block_on(manager.in_process().get("/", RequestOptions::new()))
        .unwrap();

    assert_eq!(real.status(), in_process.status());
    assert_eq!(real.text(), in_process.text());
    assert_eq!(real.content_type(), in_process.content_type());
}

#[test]
fn it_builds_clients_from_app() {
    let app = echo_app();

    let (_, response) = app
        .test_client()
        .with_timeout(std::time::Duration::from_secs(5))
        .delete("/", RequestOptions::new())
        .unwrap();

    assert_eq!(response.text(), "DELETE");
    assert_eq!(app.in_process_client().base_url(), "http://mockserver:1234");
}
