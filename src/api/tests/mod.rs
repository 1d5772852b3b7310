use super::*;
use crate::controller::test_helpers::{ScriptedExecutor, ScriptedFactory};
use crate::types::{RunOutcome, RunStatus};
use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;

mod runs;

/// Router over a controller wired to scripted doubles, with no pacing delay
fn test_app(executor: ScriptedExecutor) -> (Router, Arc<ScriptedFactory>) {
    test_app_with(executor, |_| {})
}

fn test_app_with(
    executor: ScriptedExecutor,
    configure: impl FnOnce(&mut Config),
) -> (Router, Arc<ScriptedFactory>) {
    let mut config = Config::default();
    config.run.pacing_delay = Duration::ZERO;
    configure(&mut config);

    let factory = Arc::new(ScriptedFactory::default());
    let (controller, confirmations) =
        BulkController::with_parts(config, factory.clone(), Arc::new(executor)).unwrap();
    let config = controller.get_config();

    (create_router(controller, confirmations, config), factory)
}

/// Send a request and decode the JSON body (`Value::Null` for empty bodies)
async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Poll GET /confirmations until something is pending; returns its JSON
async fn wait_for_confirmation(app: &Router) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let (status, body) = send(app, get("/confirmations")).await;
            assert_eq!(status, StatusCode::OK);
            if !body.is_null() {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("a confirmation should become pending")
}

/// Poll GET /status until the run slot is free; returns the last outcome
async fn wait_for_outcome(app: &Router) -> RunOutcome {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let (_, body) = send(app, get("/status")).await;
            let status: RunStatus = serde_json::from_value(body).unwrap();
            if !status.active
                && let Some(outcome) = status.last_outcome
            {
                return outcome;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("the run should finish")
}

#[tokio::test]
async fn test_api_server_spawns() {
    let mut config = Config::default();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap(); // Port 0 = OS assigns a free port
    let (controller, confirmations) = BulkController::new(config.clone()).unwrap();

    let api_handle = tokio::spawn(start_api_server(
        controller,
        confirmations,
        Arc::new(config),
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!api_handle.is_finished(), "server should still be serving");
    api_handle.abort();
}

#[tokio::test]
async fn test_cors_enabled() {
    let (app, _factory) = test_app_with(ScriptedExecutor::new(), |config| {
        config.api.cors_enabled = true;
        config.api.cors_origins = vec!["*".to_string()];
    });

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let (app, _factory) = test_app_with(ScriptedExecutor::new(), |config| {
        config.api.cors_enabled = false;
    });

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[test]
fn test_cors_layer_with_specific_origins_builds() {
    let _layer = build_cors_layer(&["http://localhost:3000".to_string()]);
}
