//! Integration tests for the webhook + client HTTP surface.
//!
//! Each test spins up the broker on a random port, backed by a stub
//! directory API (also Axum) that records every call, and drives both
//! through real HTTP.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};
use jsonwebtoken::{Algorithm, EncodingKey};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use call_broker::directory::{Directory, HttpDirectory};
use call_broker::identity::IdentityBroker;
use call_broker::roster::Roster;
use call_broker::routing::CallRouter;
use call_broker::server::{AppState, broker_routes};
use call_broker::session::SessionTerminator;
use call_broker::token::TokenIssuer;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const SERVICE_NUMBER: &str = "15550009999";

// ── Stub directory ───────────────────────────────────────────────────

#[derive(Default)]
struct StubDirectory {
    users: Mutex<HashMap<String, String>>,
    deleted_sessions: Mutex<Vec<String>>,
    deleted_users: Mutex<Vec<String>>,
    bearer_tokens: Mutex<Vec<String>>,
    lookups: AtomicUsize,
    creates: AtomicUsize,
}

impl StubDirectory {
    fn record_bearer(&self, headers: &HeaderMap) {
        if let Some(auth) = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
        {
            self.bearer_tokens.lock().unwrap().push(auth.to_string());
        }
    }
}

async fn stub_find_user(
    State(stub): State<Arc<StubDirectory>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    stub.lookups.fetch_add(1, Ordering::SeqCst);
    stub.record_bearer(&headers);
    let name = params.get("name").cloned().unwrap_or_default();
    match stub.users.lock().unwrap().get(&name) {
        Some(id) => (
            StatusCode::OK,
            Json(json!({"_embedded": {"users": [{"id": id, "name": name}]}})),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"title": "User not found"})),
        ),
    }
}

async fn stub_create_user(
    State(stub): State<Arc<StubDirectory>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    stub.creates.fetch_add(1, Ordering::SeqCst);
    stub.record_bearer(&headers);
    let name = body["name"].as_str().unwrap_or_default().to_string();
    assert_eq!(body["display_name"], name.as_str());
    let id = format!("USR-{name}");
    stub.users.lock().unwrap().insert(name, id.clone());
    (StatusCode::CREATED, Json(json!({"id": id})))
}

async fn stub_delete_session(
    State(stub): State<Arc<StubDirectory>>,
    Path(session): Path<String>,
) -> StatusCode {
    stub.deleted_sessions.lock().unwrap().push(session.clone());
    if session == "SES-missing" {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn stub_delete_user(
    State(stub): State<Arc<StubDirectory>>,
    Path(id): Path<String>,
) -> StatusCode {
    stub.deleted_users.lock().unwrap().push(id);
    StatusCode::NO_CONTENT
}

async fn start_stub_directory() -> (String, Arc<StubDirectory>) {
    let stub = Arc::new(StubDirectory::default());
    let app = Router::new()
        .route("/v0.3/users", get(stub_find_user).post(stub_create_user))
        .route("/v0.3/users/{id}", delete(stub_delete_user))
        .route("/v0.3/sessions/{id}", delete(stub_delete_session))
        .with_state(Arc::clone(&stub));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://127.0.0.1:{port}"), stub)
}

// ── Broker ───────────────────────────────────────────────────────────

fn test_tokens() -> TokenIssuer {
    TokenIssuer::with_key(
        "app-test",
        EncodingKey::from_secret(b"integration-secret"),
        Algorithm::HS256,
    )
}

/// Start the broker against `directory_url`, return its base URL.
async fn start_broker(directory_url: &str) -> String {
    let roster = Arc::new(Roster::parse("alice, bob").unwrap());
    let tokens = test_tokens();
    let directory: Arc<dyn Directory> = Arc::new(
        HttpDirectory::new(directory_url, tokens.clone(), Duration::from_secs(2)).unwrap(),
    );

    let state = AppState {
        router: CallRouter::new(Arc::clone(&roster), SERVICE_NUMBER),
        identity: Arc::new(IdentityBroker::new(
            Arc::clone(&roster),
            Arc::clone(&directory),
            tokens,
        )),
        sessions: Arc::new(SessionTerminator::new(directory)),
        dc: "us-3".into(),
        service_number: SERVICE_NUMBER.into(),
        public_host: None,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, broker_routes(state)).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{port}")
}

async fn start() -> (String, Arc<StubDirectory>) {
    let (directory_url, stub) = start_stub_directory().await;
    (start_broker(&directory_url).await, stub)
}

async fn get_json(url: &str) -> (StatusCode, Value) {
    let resp = reqwest::get(url).await.unwrap();
    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
    (status, resp.json().await.unwrap())
}

async fn post_json(url: &str, body: Value) -> (StatusCode, Value) {
    let resp = reqwest::Client::new()
        .post(url)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
    (status, resp.json().await.unwrap_or(Value::Null))
}

// ── Health & acknowledgements ────────────────────────────────────────

#[tokio::test]
async fn health_says_ok() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start().await;
        let resp = reqwest::get(format!("{base}/_/health")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        assert_eq!(resp.text().await.unwrap(), "Ok");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn call_events_are_acknowledged() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start().await;
        let client = reqwest::Client::new();
        for path in [
            "/voice/event",
            "/voice/inappevent",
            "/voice/rtc",
            "/in-app-call-started",
            "/in-app-call-terminated",
        ] {
            let resp = client
                .post(format!("{base}{path}"))
                .json(&json!({"status": "answered", "uuid": "abc"}))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status().as_u16(), 200, "{path}");
            assert_eq!(resp.text().await.unwrap(), "Ok");
        }
    })
    .await
    .expect("test timed out");
}

// ── Answer webhook ───────────────────────────────────────────────────

#[tokio::test]
async fn pstn_call_gets_ivr_menu() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start().await;
        let (status, plan) =
            get_json(&format!("{base}/voice/answer?from=14155550123&to={SERVICE_NUMBER}")).await;

        assert_eq!(status, StatusCode::OK);
        let actions = plan.as_array().unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0]["action"], "talk");
        assert_eq!(actions[0]["bargeIn"], true);
        assert_eq!(
            actions[0]["text"],
            "Welcome to our company. To speak to alice, press 1. To speak to bob, press 2. "
        );
        assert_eq!(actions[1]["action"], "input");
        assert_eq!(actions[1]["type"], json!(["dtmf"]));
        assert_eq!(actions[1]["dtmf"]["maxDigits"], 1);
        assert_eq!(actions[1]["timeout"], 7);
        assert_eq!(actions[1]["eventUrl"], json!(["https://127.0.0.1/voice/dtmf"]));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn app_call_to_number_dials_pstn() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start().await;
        let (status, plan) =
            get_json(&format!("{base}/voice/answer?from_user=alice&to=14155550100")).await;

        assert_eq!(status, StatusCode::OK);
        let connect = &plan[1];
        assert_eq!(plan[0]["text"], "Connecting your call, please wait");
        assert_eq!(connect["action"], "connect");
        assert_eq!(connect["from"], SERVICE_NUMBER);
        assert_eq!(
            connect["endpoint"],
            json!([{"type": "phone", "number": "14155550100"}])
        );
        assert_eq!(connect["timeout"], 45);
        assert!(connect.get("eventMethod").is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn app_call_to_user_connects_app() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start().await;
        let (_, plan) =
            get_json(&format!("{base}/voice/answer?from_user=alice&from=alice&to=zed")).await;

        let connect = &plan[1];
        assert_eq!(connect["from"], "alice");
        assert_eq!(connect["endpoint"], json!([{"type": "app", "user": "zed"}]));
        assert_eq!(connect["eventMethod"], "POST");
        assert_eq!(
            connect["eventUrl"],
            json!(["https://127.0.0.1/voice/inappevent"])
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn app_call_without_destination_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start().await;
        let (status, plan) = get_json(&format!("{base}/voice/answer?from_user=alice")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(plan.as_array().unwrap().len(), 1);
        assert_eq!(plan[0]["action"], "talk");
    })
    .await
    .expect("test timed out");
}

// ── DTMF webhook ─────────────────────────────────────────────────────

#[tokio::test]
async fn dtmf_digit_connects_roster_user() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start().await;
        let url = format!("{base}/voice/dtmf");

        for (digit, user) in [("1", "alice"), ("2", "bob")] {
            let (status, plan) = post_json(
                &url,
                json!({"dtmf": {"digits": digit, "timed_out": false}, "from": "14155550123"}),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            let connect = &plan[1];
            assert_eq!(connect["from"], "14155550123");
            assert_eq!(connect["endpoint"], json!([{"type": "app", "user": user}]));
            assert_eq!(
                connect["answerUrl"],
                json!(["https://127.0.0.1/voice/inappanswer"])
            );
            assert_eq!(connect["answerMethod"], "POST");
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn dtmf_invalid_digit_says_good_bye() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start().await;
        let url = format!("{base}/voice/dtmf");

        for digit in ["3", "0", "#"] {
            let (status, plan) = post_json(
                &url,
                json!({"dtmf": {"digits": digit, "timed_out": false}, "from": "14155550123"}),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(plan.as_array().unwrap().len(), 1);
            assert_eq!(plan[0]["text"], "You pressed an invalid option. Good bye");
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn dtmf_timeout_says_good_bye() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start().await;
        let (status, plan) = post_json(
            &format!("{base}/voice/dtmf"),
            json!({"dtmf": {"digits": "", "timed_out": true}, "from": "14155550123"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(plan.as_array().unwrap().len(), 1);
        assert_eq!(plan[0]["text"], "You did not press any key, good bye");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn malformed_dtmf_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start().await;
        let (status, plan) =
            post_json(&format!("{base}/voice/dtmf"), json!({"from": "14155550123"})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(plan.as_array().unwrap().len(), 1);
        assert_eq!(plan[0]["action"], "talk");
    })
    .await
    .expect("test timed out");
}

// ── Login / logout ───────────────────────────────────────────────────

#[tokio::test]
async fn login_unknown_user_is_unauthorized() {
    timeout(TEST_TIMEOUT, async {
        let (base, stub) = start().await;
        let (status, body) = post_json(&format!("{base}/login"), json!({"user": "mallory"})).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["name"], "mallory");
        assert!(body["message"].is_string());
        assert_eq!(stub.lookups.load(Ordering::SeqCst), 0);
        assert_eq!(stub.creates.load(Ordering::SeqCst), 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn login_creates_user_once_then_looks_up() {
    timeout(TEST_TIMEOUT, async {
        let (base, stub) = start().await;
        let url = format!("{base}/login");

        let (status, first) = post_json(&url, json!({"user": "alice"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["name"], "alice");
        assert_eq!(first["userId"], "USR-alice");
        assert_eq!(first["dc"], "us-3");
        assert_eq!(first["phone"], SERVICE_NUMBER);
        assert!(!first["token"].as_str().unwrap().is_empty());

        let (_, second) = post_json(&url, json!({"user": "alice"})).await;
        assert_eq!(second["userId"], "USR-alice");

        assert_eq!(stub.creates.load(Ordering::SeqCst), 1);
        assert_eq!(stub.lookups.load(Ordering::SeqCst), 2);

        // Every directory call carries its own bearer credential.
        let bearers = stub.bearer_tokens.lock().unwrap().clone();
        assert_eq!(bearers.len(), 3);
        assert!(bearers.iter().all(|b| b.starts_with("Bearer ")));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn login_with_directory_down_still_issues_token() {
    timeout(TEST_TIMEOUT, async {
        // Nothing listens on the discard port.
        let base = start_broker("http://127.0.0.1:9").await;
        let (status, body) = post_json(&format!("{base}/login"), json!({"user": "bob"})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "bob");
        assert!(body["userId"].is_null());
        assert!(body["token"].is_string());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn logout_always_succeeds() {
    timeout(TEST_TIMEOUT, async {
        let (base, stub) = start().await;
        let client = reqwest::Client::new();
        let url = format!("{base}/logout");

        for session in ["SES-1", "SES-missing"] {
            let resp = client
                .post(&url)
                .json(&json!({"user": "alice", "session": session}))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status().as_u16(), 200);
            assert!(resp.text().await.unwrap().is_empty());
        }

        let resp = client
            .post(&url)
            .json(&json!({"user": "alice"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);

        assert_eq!(
            *stub.deleted_sessions.lock().unwrap(),
            ["SES-1", "SES-missing"]
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn logout_cannot_reach_other_resources() {
    timeout(TEST_TIMEOUT, async {
        let (base, stub) = start().await;
        let resp = reqwest::Client::new()
            .post(format!("{base}/logout"))
            .json(&json!({"user": "alice", "session": "../users/USR-victim"}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status().as_u16(), 200);
        assert!(stub.deleted_users.lock().unwrap().is_empty());
        assert!(stub.deleted_sessions.lock().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn session_delete_encodes_id_as_one_segment() {
    timeout(TEST_TIMEOUT, async {
        let (directory_url, stub) = start_stub_directory().await;
        let directory =
            HttpDirectory::new(&directory_url, test_tokens(), Duration::from_secs(2)).unwrap();

        directory
            .delete_session("../users/USR-victim")
            .await
            .unwrap();

        assert!(stub.deleted_users.lock().unwrap().is_empty());
        assert_eq!(
            *stub.deleted_sessions.lock().unwrap(),
            ["../users/USR-victim"]
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn malformed_login_is_bad_request_json() {
    timeout(TEST_TIMEOUT, async {
        let (base, stub) = start().await;
        let client = reqwest::Client::new();
        let url = format!("{base}/login");

        let (status, body) = post_json(&url, json!({"name": "alice"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["name"].is_null());
        assert!(body["message"].is_string());

        let resp = client
            .post(&url)
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);
        let body: Value = resp.json().await.unwrap();
        assert!(body["name"].is_null());

        assert_eq!(stub.lookups.load(Ordering::SeqCst), 0);
    })
    .await
    .expect("test timed out");
}
