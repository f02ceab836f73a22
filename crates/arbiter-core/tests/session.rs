use arbiter_core::{Outcome, SessionConfig, TokenSession};
use chrono::{TimeDelta, Utc};
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::time::Duration;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn issued(token: &str, expires_in: TimeDelta) -> Value {
    json!({
        "token": token,
        "expires_at": (Utc::now() + expires_in).to_rfc3339(),
    })
}

fn config(server: &MockServer) -> SessionConfig {
    let mut cfg = SessionConfig::new(server.uri().parse().unwrap(), "ak_test");
    cfg.request_timeout = Duration::from_millis(500);
    cfg.heartbeat_interval = Duration::from_secs(3600);
    cfg.refresh_retry_backoff = Duration::from_millis(50);
    cfg
}

async fn mount_token(server: &MockServer, token: &str, expires_in: TimeDelta) {
    Mock::given(method("POST"))
        .and(path("/v1/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issued(token, expires_in)))
        .mount(server)
        .await;
}

async fn count(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == route)
        .count()
}

async fn current_token(session: &TokenSession) -> Option<String> {
    session.credential().await.map(|c| c.token().to_string())
}

async fn wait_for_token(session: &TokenSession, expected: &str) {
    for _ in 0..100 {
        if current_token(session).await.as_deref() == Some(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("credential never became {expected}");
}

#[tokio::test]
async fn test_connect_exchanges_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/token"))
        .and(body_json(json!({ "api_key": "ak_test" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(issued("tok-1", TimeDelta::minutes(15))))
        .expect(1)
        .mount(&server)
        .await;

    let session = TokenSession::new(config(&server)).unwrap();
    assert!(!session.is_connected().await);

    session.connect().await.unwrap();
    assert!(session.is_connected().await);
    assert_eq!(current_token(&session).await.as_deref(), Some("tok-1"));
}

#[tokio::test]
async fn test_connect_rejected_by_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let session = TokenSession::new(config(&server)).unwrap();
    let err = session.connect().await.unwrap_err();
    assert_eq!(err.code(), "AUTHENTICATION_FAILED");
    assert!(err.to_string().contains("bad key"));
    assert!(!session.is_connected().await);
}

#[tokio::test]
async fn test_connect_rejects_out_of_bounds_expiry() {
    for expires_in in [TimeDelta::seconds(-5), TimeDelta::hours(25)] {
        let server = MockServer::start().await;
        mount_token(&server, "tok", expires_in).await;

        let session = TokenSession::new(config(&server)).unwrap();
        let err = session.connect().await.unwrap_err();
        assert_eq!(err.code(), "INVALID_CREDENTIAL");
        assert!(!session.is_connected().await);
    }
}

#[tokio::test]
async fn test_request_attaches_bearer() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-abc", TimeDelta::minutes(15)).await;
    Mock::given(method("GET"))
        .and(path("/v1/status"))
        .and(header("authorization", "Bearer tok-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let session = TokenSession::new(config(&server)).unwrap();
    session.connect().await.unwrap();

    let value = session.request(Method::GET, "/v1/status", None).await.unwrap();
    assert_eq!(value, json!({ "ok": true }));
}

#[tokio::test]
async fn test_request_lifecycle_errors() {
    let server = MockServer::start().await;
    mount_token(&server, "tok", TimeDelta::minutes(15)).await;

    let session = TokenSession::new(config(&server)).unwrap();
    let err = session.request(Method::GET, "/v1/x", None).await.unwrap_err();
    assert_eq!(err.code(), "NOT_CONNECTED");

    session.connect().await.unwrap();
    session.destroy().await;
    session.destroy().await;

    let err = session.request(Method::GET, "/v1/x", None).await.unwrap_err();
    assert_eq!(err.code(), "SESSION_DESTROYED");
    assert!(session.credential().await.is_none());

    let err = session.connect().await.unwrap_err();
    assert_eq!(err.code(), "SESSION_DESTROYED");
}

#[tokio::test]
async fn test_destroy_before_connect_is_safe() {
    let server = MockServer::start().await;
    let session = TokenSession::new(config(&server)).unwrap();
    session.destroy().await;
    assert_eq!(
        session.request(Method::GET, "/v1/x", None).await.unwrap_err().code(),
        "SESSION_DESTROYED"
    );
}

#[tokio::test]
async fn test_api_error_and_timeout() {
    let server = MockServer::start().await;
    mount_token(&server, "tok", TimeDelta::minutes(15)).await;
    Mock::given(path("/v1/forbidden"))
        .respond_with(ResponseTemplate::new(403).set_body_string("nope"))
        .mount(&server)
        .await;
    Mock::given(path("/v1/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let session = TokenSession::new(config(&server)).unwrap();
    session.connect().await.unwrap();

    match session.request(Method::POST, "/v1/forbidden", None).await {
        Err(arbiter_core::SessionError::Api { status, message }) => {
            assert_eq!(status, 403);
            assert_eq!(message, "nope");
        }
        other => panic!("expected Api error, got {other:?}"),
    }

    let err = session.request(Method::GET, "/v1/slow", None).await.unwrap_err();
    assert_eq!(err.code(), "TIMEOUT");
}

#[tokio::test]
async fn test_reconnect_replaces_credential() {
    let server = MockServer::start().await;
    Mock::given(path("/v1/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issued("first", TimeDelta::minutes(15))))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_token(&server, "second", TimeDelta::minutes(15)).await;

    let session = TokenSession::new(config(&server)).unwrap();
    session.connect().await.unwrap();
    assert_eq!(current_token(&session).await.as_deref(), Some("first"));
    session.connect().await.unwrap();
    assert_eq!(current_token(&session).await.as_deref(), Some("second"));
}

#[tokio::test]
async fn test_refresh_fires_margin_before_expiry() {
    let server = MockServer::start().await;
    Mock::given(path("/v1/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issued("early", TimeDelta::seconds(30))))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_token(&server, "refreshed", TimeDelta::hours(1)).await;

    let mut cfg = config(&server);
    cfg.refresh_margin = Duration::from_millis(29_900);
    let session = TokenSession::new(cfg).unwrap();
    session.connect().await.unwrap();
    assert_eq!(current_token(&session).await.as_deref(), Some("early"));

    wait_for_token(&session, "refreshed").await;
    assert_eq!(count(&server, "/v1/auth/token").await, 2);
}

#[tokio::test]
async fn test_refresh_failures_are_retried() {
    let server = MockServer::start().await;
    Mock::given(path("/v1/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issued("initial", TimeDelta::seconds(30))))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(path("/v1/auth/token"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_token(&server, "recovered", TimeDelta::hours(1)).await;

    let mut cfg = config(&server);
    cfg.refresh_margin = Duration::from_secs(30);
    let session = TokenSession::new(cfg).unwrap();
    session.connect().await.unwrap();

    wait_for_token(&session, "recovered").await;
    // connect + two failed refreshes + the successful retry
    assert_eq!(count(&server, "/v1/auth/token").await, 4);
    assert!(session.is_connected().await);
}

#[tokio::test]
async fn test_heartbeat_failures_are_swallowed_and_stop_on_destroy() {
    let server = MockServer::start().await;
    mount_token(&server, "tok", TimeDelta::minutes(15)).await;
    Mock::given(method("POST"))
        .and(path("/v1/heartbeat"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut cfg = config(&server);
    cfg.heartbeat_interval = Duration::from_millis(40);
    let session = TokenSession::new(cfg).unwrap();
    session.connect().await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let beats = count(&server, "/v1/heartbeat").await;
    assert!(beats >= 2, "expected repeated heartbeats, got {beats}");
    assert!(session.is_connected().await);

    session.destroy().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after_destroy = count(&server, "/v1/heartbeat").await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(count(&server, "/v1/heartbeat").await, after_destroy);
}

#[tokio::test]
async fn test_dropping_session_stops_background_tasks() {
    let server = MockServer::start().await;
    mount_token(&server, "tok", TimeDelta::minutes(15)).await;
    Mock::given(path("/v1/heartbeat"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let mut cfg = config(&server);
    cfg.heartbeat_interval = Duration::from_millis(30);
    let session = TokenSession::new(cfg).unwrap();
    session.connect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    drop(session);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after_drop = count(&server, "/v1/heartbeat").await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(count(&server, "/v1/heartbeat").await, after_drop);
}

#[tokio::test]
async fn test_govern_and_confirm_wire_format() {
    let server = MockServer::start().await;
    mount_token(&server, "tok", TimeDelta::minutes(15)).await;
    Mock::given(method("POST"))
        .and(path("/v1/govern"))
        .and(body_partial_json(json!({
            "action": "send_email",
            "context": { "tenant": "acme" },
            "blocking": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "permitted": false,
            "reason": "outside business hours",
            "decision_id": "dec-7"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/confirm"))
        .and(body_json(json!({
            "event_id": "dec-7",
            "result": "success",
            "metadata": { "tool": "send_email" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
        .mount(&server)
        .await;

    let session = TokenSession::new(config(&server)).unwrap();
    session.connect().await.unwrap();

    let mut context = Map::new();
    context.insert("tenant".into(), json!("acme"));
    let decision = session.govern("send_email", &context).await.unwrap();
    assert!(!decision.permitted);
    assert_eq!(decision.decision_id, "dec-7");
    assert_eq!(decision.reason.as_deref(), Some("outside business hours"));

    let acked = session
        .confirm("dec-7", Outcome::Success, json!({ "tool": "send_email" }))
        .await
        .unwrap();
    assert!(acked);
}
