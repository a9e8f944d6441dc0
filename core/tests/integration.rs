//! Round trips against a live axum server.
//!
//! # Design
//! Starts a small server on a random port in a background thread, then makes
//! real calls through the default `ureq` transport. Checks that status codes
//! and bodies come back untouched and that failures become envelopes.

use axum::{
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use scaffold_core::{Method, Request};
use serde_json::json;

fn app() -> Router {
    Router::new()
        .route("/hello", get(|| async { "hello world" }))
        .route("/teapot", get(|| async { (StatusCode::IM_A_TEAPOT, "short and stout") }))
        .route("/echo", post(|body: String| async move { body }))
        .route(
            "/content-type",
            post(|headers: HeaderMap| async move {
                let values: Vec<String> = headers
                    .get_all("content-type")
                    .iter()
                    .map(|v| v.to_str().unwrap_or_default().to_string())
                    .collect();
                values.join(",")
            }),
        )
        .route(
            "/header",
            get(|headers: HeaderMap| async move {
                headers
                    .get("x-token")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            }),
        )
}

/// Start the test server on a random port and return its base URL.
fn spawn_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            axum::serve(listener, app()).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

#[test]
fn get_returns_body_and_status_verbatim() {
    let base = spawn_server();

    let res = Request::get(format!("{base}/hello")).make();
    assert_eq!(res.status, 200);
    assert_eq!(res.data.as_deref(), Some("hello world"));
    assert!(res.error.is_none());

    let res = Request::get(format!("{base}/teapot")).make();
    assert_eq!(res.status, 418);
    assert_eq!(res.data.as_deref(), Some("short and stout"));
}

#[test]
fn post_sends_json_body() {
    let base = spawn_server();

    let res = Request::post(format!("{base}/echo"))
        .json(json!({"title": "Buy milk", "done": false}))
        .make();

    assert_eq!(res.status, 200);
    let echoed: serde_json::Value = serde_json::from_str(res.data.as_deref().unwrap()).unwrap();
    assert_eq!(echoed, json!({"title": "Buy milk", "done": false}));
}

#[test]
fn content_type_is_always_json() {
    let base = spawn_server();

    let res = Request::new(Method::Post, format!("{base}/content-type"))
        .header("Content-Type", "text/plain")
        .make();

    assert_eq!(res.data.as_deref(), Some("application/json"));
}

#[test]
fn declared_headers_are_sent() {
    let base = spawn_server();

    let res = Request::get(format!("{base}/header"))
        .header("X-Token", "secret")
        .make();

    assert_eq!(res.data.as_deref(), Some("secret"));
}

#[test]
fn raw_variant_returns_bytes() {
    let base = spawn_server();

    let res = Request::get(format!("{base}/hello")).make_raw();
    assert_eq!(res.data.as_deref(), Some(&b"hello world"[..]));
}

#[test]
fn unreachable_endpoint_is_502() {
    // Bind then drop to get a port nobody listens on.
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();

    let res = Request::get(format!("http://{addr}/")).make();
    assert_eq!(res.status, 502);
    let error = res.error.unwrap();
    assert_eq!(error.message, "Bad Gateway");
    assert!(!error.details.is_empty());
    assert!(res.data.is_none());
}
