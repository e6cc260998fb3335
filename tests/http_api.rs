//! Endpoint tests over the full router, with worker containers replaced by
//! the scripted mock transport.

use alfworld_api::batcher::BatchCoordinator;
use alfworld_api::config::ServerConfig;
use alfworld_api::routes::{router, AppState};
use alfworld_api::session::SessionManager;
use alfworld_api::worker::mock::{MockReply, MockTransport};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

fn test_app(max_sessions: usize) -> (Router, MockTransport) {
    let transport = MockTransport::new();
    let config = Arc::new(ServerConfig {
        alfworld_config_path: PathBuf::from("base_config.yaml"),
        docker_image: "alfworld-text:latest".to_string(),
        data_volume: "/srv/alfworld:/data:ro".to_string(),
        max_sessions,
        batch_window_ms: 5,
        idle_timeout_s: 120,
        host: "127.0.0.1".to_string(),
        port: 0,
    });
    let game_files = Arc::new(vec![
        "/srv/alfworld/json/train/pick_and_place_simple-Apple/game.tw-pddl".to_string(),
        "/srv/alfworld/json/train/look_at_obj_in_light-Book/game.tw-pddl".to_string(),
    ]);
    let manager = Arc::new(SessionManager::new(
        Arc::new(transport.clone()),
        config,
        Arc::clone(&game_files),
    ));
    let batcher = BatchCoordinator::spawn(Arc::clone(&manager), Duration::from_millis(5));
    let app = router(AppState {
        manager,
        batcher,
        game_files,
    });
    (app, transport)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn health_reports_pool_usage() {
    let (app, _) = test_app(8);

    let response = app.oneshot(empty_request("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_sessions"], 0);
    assert_eq!(body["max_sessions"], 8);
    assert_eq!(body["available_games"], 2);
}

#[tokio::test]
async fn task_types_lists_all_six() {
    let (app, _) = test_app(8);

    let response = app
        .oneshot(empty_request("GET", "/task-types"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["task_types"]["1"], "pick_and_place_simple");
    assert_eq!(body["task_types"]["6"], "pick_two_obj_and_place");
    assert_eq!(body["task_types"].as_object().unwrap().len(), 6);
}

#[tokio::test]
async fn games_endpoint_lists_discovered_games() {
    let (app, _) = test_app(8);

    let response = app.oneshot(empty_request("GET", "/games")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["games"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn create_session_without_body_uses_defaults() {
    let (app, transport) = test_app(8);
    transport.push_reply(MockReply::ok("You are in the kitchen."));

    let response = app
        .oneshot(empty_request("POST", "/sessions"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "active");
    assert_eq!(body["observation"], "You are in the kitchen.");
    assert!(!body["session_id"].as_str().unwrap().is_empty());
    assert!(body["admissible_commands"].is_array());
}

#[tokio::test]
async fn create_session_with_task_type_filters_games() {
    let (app, _) = test_app(8);

    let response = app
        .oneshot(json_request(
            "POST",
            "/sessions",
            serde_json::json!({"task_type": 2}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body["game_file"]
        .as_str()
        .unwrap()
        .contains("look_at_obj_in_light"));
}

#[tokio::test]
async fn step_flow_runs_to_completion() {
    let (app, transport) = test_app(8);
    transport.push_replies([
        MockReply::ok("start"),
        MockReply::ok("You open the fridge."),
        MockReply::done("You win!", 1.0, true),
    ]);

    let response = app
        .clone()
        .oneshot(empty_request("POST", "/sessions"))
        .await
        .unwrap();
    let session_id = body_json(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/sessions/{}/step", session_id),
            serde_json::json!({"action": "open fridge 1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["observation"], "You open the fridge.");
    assert_eq!(body["done"], false);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/sessions/{}/step", session_id),
            serde_json::json!({"action": "finish"}),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["done"], true);
    assert_eq!(body["won"], true);
    assert_eq!(body["score"], 1.0);

    // the finished session rejects further steps
    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/sessions/{}/step", session_id),
            serde_json::json!({"action": "look"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "session_already_done");
}

#[tokio::test]
async fn unknown_session_returns_404_with_error_code() {
    let (app, _) = test_app(8);

    let response = app
        .oneshot(empty_request("GET", "/sessions/no-such-session"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["error_code"], "session_not_found");
    assert!(body["detail"].as_str().unwrap().contains("no-such-session"));
}

#[tokio::test]
async fn full_pool_returns_429() {
    let (app, _) = test_app(1);

    let response = app
        .clone()
        .oneshot(empty_request("POST", "/sessions"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(empty_request("POST", "/sessions"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "no_slots_available");
}

#[tokio::test]
async fn failed_init_surfaces_as_bad_gateway() {
    let (app, transport) = test_app(8);
    transport.push_reply(MockReply::error("no such game"));

    let response = app
        .oneshot(empty_request("POST", "/sessions"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "container_error");
}

#[tokio::test]
async fn delete_session_then_404() {
    let (app, _) = test_app(8);

    let response = app
        .clone()
        .oneshot(empty_request("POST", "/sessions"))
        .await
        .unwrap();
    let session_id = body_json(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", &format!("/sessions/{}", session_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["session_id"], session_id.as_str());

    let response = app
        .oneshot(empty_request("GET", &format!("/sessions/{}", session_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_all_sessions_reports_count() {
    let (app, _) = test_app(8);

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(empty_request("POST", "/sessions"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", "/sessions"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["count"], 3);
    assert_eq!(body["deleted"].as_array().unwrap().len(), 3);

    let response = app.oneshot(empty_request("GET", "/health")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["active_sessions"], 0);
}
