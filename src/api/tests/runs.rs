use super::*;
use serde_json::json;

#[tokio::test]
async fn test_status_starts_idle() {
    let (app, _factory) = test_app(ScriptedExecutor::new());

    let (status, body) = send(&app, get("/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["state"], "idle");
    assert_eq!(body["active"], false);
    assert!(body.get("last_outcome").is_none());
}

#[tokio::test]
async fn test_start_run_requires_an_address() {
    let (app, factory) = test_app(ScriptedExecutor::new());

    let (status, body) = send(
        &app,
        post_json("/runs", json!({ "count": 2, "payload": "label" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
    assert_eq!(factory.created(), 0);
}

#[tokio::test]
async fn test_start_run_uses_configured_address() {
    let (app, _factory) = test_app_with(ScriptedExecutor::new(), |config| {
        config.device.address = Some("printer.local".to_string());
    });

    let (status, body) = send(
        &app,
        post_json("/runs", json!({ "count": 1, "payload": "label" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["run_id"], 1);

    let (_, status_body) = send(&app, get("/status")).await;
    assert_eq!(status_body["address"], "printer.local");
}

#[tokio::test]
async fn test_zero_count_is_bad_request() {
    let (app, _factory) = test_app(ScriptedExecutor::new());

    let (status, body) = send(
        &app,
        post_json(
            "/runs",
            json!({ "count": 0, "payload": "label", "address": "printer.local" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
}

#[tokio::test]
async fn test_full_run_over_http() {
    let (app, factory) = test_app(ScriptedExecutor::new());

    let (status, _) = send(
        &app,
        post_json(
            "/runs",
            json!({ "count": 3, "payload": "label", "address": "printer.local" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let pending = wait_for_confirmation(&app).await;
    assert_eq!(pending["kind"]["kind"], "preflight");
    assert_eq!(pending["kind"]["count"], 3);

    let uri = format!("/confirmations/{}", pending["id"]);
    let (status, _) = send(&app, post_json(&uri, json!({ "approve": true }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert_eq!(wait_for_outcome(&app).await, RunOutcome::Completed { count: 3 });
    let (_, body) = send(&app, get("/status")).await;
    assert_eq!(body["progress"], 3);
    assert_eq!(factory.probe().close_count(), 1);
}

#[tokio::test]
async fn test_second_run_conflicts() {
    let (app, _factory) = test_app(ScriptedExecutor::new());
    let start = json!({ "count": 2, "payload": "label", "address": "printer.local" });

    let (status, _) = send(&app, post_json("/runs", start.clone())).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = send(&app, post_json("/runs", start)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "run_in_progress");
}

#[tokio::test]
async fn test_cancel_without_active_run_conflicts() {
    let (app, _factory) = test_app(ScriptedExecutor::new());

    let (status, body) = send(&app, post_empty("/runs/cancel")).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "no_active_run");
}

#[tokio::test]
async fn test_cancel_active_run() {
    let (app, factory) = test_app(ScriptedExecutor::new());

    send(
        &app,
        post_json(
            "/runs",
            json!({ "count": 2, "payload": "label", "address": "printer.local" }),
        ),
    )
    .await;
    wait_for_confirmation(&app).await;

    let (status, _) = send(&app, post_empty("/runs/cancel")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert_eq!(
        wait_for_outcome(&app).await,
        RunOutcome::CancelledByUser { at_step: 0 }
    );
    assert_eq!(factory.probe().close_count(), 1);

    let (_, pending) = send(&app, get("/confirmations")).await;
    assert!(pending.is_null(), "abandoned confirmation is no longer shown");
}

#[tokio::test]
async fn test_refused_connection_ends_run_without_outcome() {
    let (app, factory) = test_app(ScriptedExecutor::new());
    factory.probe().fail_connect();

    let (status, _) = send(
        &app,
        post_json(
            "/runs",
            json!({ "count": 2, "payload": "label", "address": "printer.local" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let (_, body) = send(&app, get("/status")).await;
            if body["active"] == false {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let (_, body) = send(&app, get("/status")).await;
    assert!(body.get("last_outcome").is_none());
    assert_eq!(body["state"]["state"], "failed");
    assert!(body["last_error"].as_str().unwrap().contains("refused"));
    assert_eq!(factory.probe().close_count(), 1);
}
