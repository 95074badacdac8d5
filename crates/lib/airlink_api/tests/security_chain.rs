//! Integration tests: build the real router over `MemoryStore` and drive
//! the security chain end to end.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use airlink_api::config::{ApiConfig, RateLimitConfig};
use airlink_api::{AppState, router};
use airlink_core::auth::jwt::issue_session_token;
use airlink_core::models::auth::{Session, User};
use airlink_core::models::security::{SecurityEventType, SecurityLogEntry};
use airlink_core::store::{MemoryStore, SessionStore, StoreKind, Stores};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use chrono::{Duration, Utc};
use tower::ServiceExt;

const SECRET: &str = "test-secret";
const CLIENT_IP: &str = "203.0.113.10";

struct Harness {
    store: Arc<MemoryStore>,
    state: AppState,
    app: Router,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(ApiConfig::new(SECRET))
    }

    fn with_config(config: ApiConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(Stores::shared(store.clone()), config);
        let app = router(state.clone());
        Self { store, state, app }
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.expect("request")
    }

    /// Flushed snapshot of the security log.
    async fn events(&self) -> Vec<SecurityLogEntry> {
        self.state.security_log.flush().await;
        self.store.security_events()
    }

    async fn event_types(&self) -> Vec<SecurityEventType> {
        self.events().await.iter().map(|e| e.event_type).collect()
    }

    /// Create a session for `user` and a token bound to it.
    async fn login_token(&self, user: &User, session_expires_in: Duration) -> String {
        let session = self
            .store
            .create_session(user.id, Utc::now() + session_expires_in)
            .await
            .expect("create session");
        issue_session_token(user, &session, SECRET.as_bytes(), Duration::hours(1))
            .expect("issue token")
    }
}

fn get(path: &str, ip: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("GET")
        .uri(path)
        .header("x-forwarded-for", ip)
        .header("user-agent", "chain-tests/1.0")
}

fn bearer(path: &str, token: &str) -> Request<Body> {
    get(path, CLIENT_IP)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn with_api_key(path: &str, key: &str) -> Request<Body> {
    get(path, CLIENT_IP)
        .header("x-api-key", key)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse JSON")
}

// ---------------------------------------------------------------------------
// Session authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_authorization_header_is_unauthorized_and_logged_once() {
    let h = Harness::new();
    let resp = h
        .send(get("/api/v1/users/me", CLIENT_IP).body(Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"], "missing_credential");

    let events = h.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, SecurityEventType::AuthHeaderMissing);
    assert_eq!(events[0].ip_address, CLIENT_IP);
    assert_eq!(events[0].path, "/api/v1/users/me");
    assert_eq!(events[0].user_id, None);
}

#[tokio::test]
async fn valid_token_establishes_identity_context() {
    let h = Harness::new();
    let user = h.store.insert_user("player@example.com", "password1", false);
    let s1 = h.store.insert_server(user.id);
    let s2 = h.store.insert_server(user.id);
    let token = h.login_token(&user, Duration::hours(1)).await;

    let resp = h.send(bearer("/api/v1/users/me", &token)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("ratelimit-remaining"));
    let json = body_json(resp).await;
    assert_eq!(json["id"], user.id);
    assert_eq!(json["email"], "player@example.com");
    assert_eq!(json["role"], "user");
    assert_eq!(json["servers"], serde_json::json!([s1, s2]));
    assert_eq!(json["securityContext"]["ipAddress"], CLIENT_IP);
    assert_eq!(json["securityContext"]["userAgent"], "chain-tests/1.0");
    assert_eq!(json["securityContext"]["requestPath"], "/api/v1/users/me");

    assert!(h.events().await.is_empty());

    // Last-activity is written off the response path.
    let mut touched = false;
    for _ in 0..50 {
        if h.store.user(user.id).and_then(|u| u.last_activity).is_some() {
            touched = true;
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    assert!(touched, "last activity was not updated");
}

#[tokio::test]
async fn token_signed_with_other_secret_is_invalid_token() {
    let h = Harness::new();
    let user = h.store.insert_user("player@example.com", "password1", false);
    let session = h
        .store
        .create_session(user.id, Utc::now() + Duration::hours(1))
        .await
        .unwrap();
    let forged = issue_session_token(&user, &session, b"not-the-secret", Duration::hours(1)).unwrap();

    let resp = h.send(bearer("/api/v1/users/me", &forged)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(h.event_types().await, vec![SecurityEventType::InvalidToken]);
}

#[tokio::test]
async fn expired_token_is_invalid_token() {
    let h = Harness::new();
    let user = h.store.insert_user("player@example.com", "password1", false);
    let session = h
        .store
        .create_session(user.id, Utc::now() + Duration::hours(1))
        .await
        .unwrap();
    let stale = issue_session_token(&user, &session, SECRET.as_bytes(), Duration::hours(-2)).unwrap();

    let resp = h.send(bearer("/api/v1/users/me", &stale)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"], "expired_credential");
    assert_eq!(h.event_types().await, vec![SecurityEventType::InvalidToken]);
}

#[tokio::test]
async fn non_bearer_authorization_is_invalid_token() {
    let h = Harness::new();
    let resp = h
        .send(
            get("/api/v1/users/me", CLIENT_IP)
                .header("authorization", "Basic dXNlcjpwYXNz")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(h.event_types().await, vec![SecurityEventType::InvalidToken]);
}

#[tokio::test]
async fn empty_authorization_header_counts_as_missing() {
    let h = Harness::new();
    for value in ["", "   "] {
        let resp = h
            .send(
                get("/api/v1/users/me", CLIENT_IP)
                    .header("authorization", value)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["error"], "missing_credential");
    }
    assert_eq!(
        h.event_types().await,
        vec![SecurityEventType::AuthHeaderMissing; 2]
    );
}

#[tokio::test]
async fn expired_session_is_rejected_despite_valid_token() {
    let h = Harness::new();
    let user = h.store.insert_user("player@example.com", "password1", false);
    // Session already closed; token itself is good for another hour.
    let token = h.login_token(&user, Duration::seconds(-1)).await;

    let resp = h.send(bearer("/api/v1/users/me", &token)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let events = h.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, SecurityEventType::InvalidSession);
    assert_eq!(events[0].user_id, Some(user.id));
}

#[tokio::test]
async fn unknown_session_is_invalid_session() {
    let h = Harness::new();
    let user = h.store.insert_user("player@example.com", "password1", false);
    let phantom = Session {
        id: "never-created".into(),
        user_id: user.id,
        expires_at: Utc::now() + Duration::hours(1),
    };
    let token = issue_session_token(&user, &phantom, SECRET.as_bytes(), Duration::hours(1)).unwrap();

    let resp = h.send(bearer("/api/v1/users/me", &token)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(h.event_types().await, vec![SecurityEventType::InvalidSession]);
}

#[tokio::test]
async fn session_of_another_user_is_invalid_session() {
    let h = Harness::new();
    let alice = h.store.insert_user("alice@example.com", "password1", false);
    let mallory = h.store.insert_user("mallory@example.com", "password2", false);
    let alice_session = h
        .store
        .create_session(alice.id, Utc::now() + Duration::hours(1))
        .await
        .unwrap();
    // Token claims mallory but points at alice's session.
    let token =
        issue_session_token(&mallory, &alice_session, SECRET.as_bytes(), Duration::hours(1))
            .unwrap();

    let resp = h.send(bearer("/api/v1/users/me", &token)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(h.event_types().await, vec![SecurityEventType::InvalidSession]);
}

#[tokio::test]
async fn deleted_user_is_user_not_found() {
    let h = Harness::new();
    let user = h.store.insert_user("gone@example.com", "password1", false);
    let token = h.login_token(&user, Duration::hours(1)).await;
    h.store.remove_user(user.id);

    let resp = h.send(bearer("/api/v1/users/me", &token)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let events = h.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, SecurityEventType::UserNotFound);
    assert_eq!(events[0].user_id, None);
}

#[tokio::test]
async fn suspended_user_is_forbidden_not_unauthorized() {
    let h = Harness::new();
    let user = h.store.insert_user("banned@example.com", "password1", false);
    let token = h.login_token(&user, Duration::hours(1)).await;
    h.store.set_suspended(user.id, true);

    let resp = h.send(bearer("/api/v1/users/me", &token)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(resp).await["error"], "account_suspended");

    let events = h.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, SecurityEventType::SuspendedUserAccess);
    assert_eq!(events[0].user_id, Some(user.id));
}

#[tokio::test]
async fn session_store_failure_fails_closed_without_audit_event() {
    let h = Harness::new();
    let user = h.store.insert_user("player@example.com", "password1", false);
    let token = h.login_token(&user, Duration::hours(1)).await;
    h.store.set_failing(StoreKind::Sessions, true);

    let resp = h.send(bearer("/api/v1/users/me", &token)).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(resp).await;
    assert_eq!(json["message"], "Internal server error");
    assert!(h.events().await.is_empty());
}

// ---------------------------------------------------------------------------
// Role authorization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_admin_on_admin_route_is_forbidden_with_user_id_logged() {
    let h = Harness::new();
    let user = h.store.insert_user("player@example.com", "password1", false);
    let token = h.login_token(&user, Duration::hours(1)).await;

    let resp = h.send(bearer("/api/v1/admin/security/stats", &token)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(resp).await["error"], "insufficient_role");

    let events = h.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].event_type,
        SecurityEventType::InsufficientPermissions
    );
    assert_eq!(events[0].user_id, Some(user.id));
    assert_eq!(events[0].ip_address, CLIENT_IP);
    assert_eq!(events[0].path, "/api/v1/admin/security/stats");
}

#[tokio::test]
async fn admin_sees_security_stats() {
    let h = Harness::new();
    let admin = h.store.insert_user("root@example.com", "password1", true);
    let token = h.login_token(&admin, Duration::hours(1)).await;
    h.store.block_ip("198.51.100.1", Some("scanner"));
    h.store.insert_api_key("ci", &["servers:read"], true, None);
    h.store.insert_api_key("old", &[], false, None);

    // One failed login and one missing API key.
    let resp = h
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/v1/users/login")
                .header("x-forwarded-for", CLIENT_IP)
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"email":"root@example.com","password":"wrong"}"#,
                ))
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = h
        .send(get("/api/v1/keys/verify", CLIENT_IP).body(Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    h.state.security_log.flush().await;

    let resp = h.send(bearer("/api/v1/admin/security/stats", &token)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["totalEvents"], 2);
    assert_eq!(json["failedLogins"], 1);
    assert_eq!(json["blockedIps"], 1);
    assert_eq!(json["apiKeyEvents"], 1);

    let resp = h.send(bearer("/api/v1/admin/api/stats", &token)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["activeKeys"], 1);
    assert_eq!(json["totalRequests24h"], 1);
}

// ---------------------------------------------------------------------------
// API keys
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_api_key_is_unauthorized() {
    let h = Harness::new();
    let resp = h
        .send(get("/api/v1/keys/verify", CLIENT_IP).body(Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(h.event_types().await, vec![SecurityEventType::ApiKeyMissing]);
}

#[tokio::test]
async fn unknown_inactive_and_expired_keys_are_invalid() {
    let h = Harness::new();
    let (inactive, _) = h.store.insert_api_key("off", &[], false, None);
    let (expired, _) =
        h.store
            .insert_api_key("old", &[], true, Some(Utc::now() - Duration::minutes(1)));

    for key in ["deadbeef", inactive.as_str(), expired.as_str()] {
        let resp = h.send(with_api_key("/api/v1/keys/verify", key)).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "key {key}");
    }
    assert_eq!(
        h.event_types().await,
        vec![SecurityEventType::InvalidApiKey; 3]
    );
}

#[tokio::test]
async fn valid_key_records_usage_and_exposes_no_identity() {
    let h = Harness::new();
    let (key, record) = h.store.insert_api_key(
        "deploy-bot",
        &["servers:read", "servers:write"],
        true,
        Some(Utc::now() + Duration::days(30)),
    );

    let resp = h.send(with_api_key("/api/v1/keys/verify", &key)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["name"], "deploy-bot");
    assert_eq!(
        json["permissions"],
        serde_json::json!(["servers:read", "servers:write"])
    );

    let after = h.store.api_key(record.id).unwrap();
    assert_eq!(after.usage_count, 1);
    assert!(after.last_used.is_some());

    // A key alone never reaches identity routes.
    let resp = h.send(with_api_key("/api/v1/users/me", &key)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        h.event_types().await,
        vec![SecurityEventType::AuthHeaderMissing]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_validations_never_lose_usage_increments() {
    let h = Harness::new();
    let (key, record) = h.store.insert_api_key("ci", &[], true, None);
    const N: usize = 64;

    let tasks = (0..N).map(|_| {
        let app = h.app.clone();
        let key = key.clone();
        tokio::spawn(async move {
            app.oneshot(with_api_key("/api/v1/keys/verify", &key))
                .await
                .expect("request")
                .status()
        })
    });
    for status in futures::future::join_all(tasks).await {
        assert_eq!(status.unwrap(), StatusCode::OK);
    }

    assert_eq!(h.store.api_key(record.id).unwrap().usage_count, N as i64);
}

#[tokio::test]
async fn api_key_store_failure_fails_closed() {
    let h = Harness::new();
    let (key, _) = h.store.insert_api_key("ci", &[], true, None);
    h.store.set_failing(StoreKind::ApiKeys, true);

    let resp = h.send(with_api_key("/api/v1/keys/verify", &key)).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "internal_error");
    assert_eq!(json["message"], "Internal server error");
    assert!(h.events().await.is_empty());
}

#[tokio::test]
async fn development_mode_exposes_internal_detail() {
    let mut config = ApiConfig::new(SECRET);
    config.development = true;
    let h = Harness::with_config(config);
    let (key, _) = h.store.insert_api_key("ci", &[], true, None);
    h.store.set_failing(StoreKind::ApiKeys, true);

    let resp = h.send(with_api_key("/api/v1/keys/verify", &key)).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let message = body_json(resp).await["message"].as_str().unwrap().to_string();
    assert!(message.contains("failing"), "unexpected message: {message}");
}

// ---------------------------------------------------------------------------
// IP blacklist
// ---------------------------------------------------------------------------

#[tokio::test]
async fn blacklisted_ip_is_rejected_before_any_credential_check() {
    let h = Harness::new();
    let admin = h.store.insert_user("root@example.com", "password1", true);
    let token = h.login_token(&admin, Duration::hours(1)).await;
    h.store.block_ip(CLIENT_IP, Some("abuse"));

    let resp = h.send(bearer("/api/v1/users/me", &token)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(resp).await["error"], "blacklisted");

    let resp = h
        .send(get("/api/v1/users/me", CLIENT_IP).body(Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    assert_eq!(
        h.event_types().await,
        vec![SecurityEventType::BlockedIpAccess; 2]
    );
}

#[tokio::test]
async fn blacklist_store_failure_fails_open() {
    let h = Harness::new();
    let user = h.store.insert_user("player@example.com", "password1", false);
    let token = h.login_token(&user, Duration::hours(1)).await;
    h.store.block_ip(CLIENT_IP, None);
    h.store.set_failing(StoreKind::Blacklist, true);

    let resp = h.send(bearer("/api/v1/users/me", &token)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(h.events().await.is_empty());
}

#[tokio::test]
async fn repeated_blocked_request_gets_same_rejection() {
    let h = Harness::new();
    h.store.block_ip(CLIENT_IP, None);
    for _ in 0..3 {
        let resp = h
            .send(get("/api/health", CLIENT_IP).body(Body::empty()).unwrap())
            .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hundred_and_first_request_in_window_is_rate_limited() {
    let h = Harness::new();
    for i in 0..100u32 {
        let resp = h
            .send(get("/api/health", CLIENT_IP).body(Body::empty()).unwrap())
            .await;
        assert_eq!(resp.status(), StatusCode::OK, "request {i}");
        assert_eq!(
            resp.headers()["ratelimit-remaining"],
            (99 - i).to_string().as_str()
        );
    }

    let resp = h
        .send(get("/api/health", CLIENT_IP).body(Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key("retry-after"));
    let json = body_json(resp).await;
    let retry_after = json["retryAfter"].as_u64().expect("retryAfter");
    assert!(retry_after <= 3600);

    let events = h.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, SecurityEventType::RateLimitExceeded);
    assert_eq!(events[0].ip_address, CLIENT_IP);
    assert_eq!(events[0].path, "/api/health");

    // Another client is unaffected.
    let resp = h
        .send(get("/api/health", "198.51.100.99").body(Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_precedes_blacklist_and_repeats() {
    let mut config = ApiConfig::new(SECRET);
    config.rate_limit = RateLimitConfig {
        window: StdDuration::from_secs(60),
        max_requests: 1,
    };
    let h = Harness::with_config(config);
    h.store.block_ip(CLIENT_IP, None);

    let statuses = [
        StatusCode::FORBIDDEN,
        StatusCode::TOO_MANY_REQUESTS,
        StatusCode::TOO_MANY_REQUESTS,
    ];
    for expected in statuses {
        let resp = h
            .send(get("/api/health", CLIENT_IP).body(Body::empty()).unwrap())
            .await;
        assert_eq!(resp.status(), expected);
    }
    assert_eq!(
        h.event_types().await,
        vec![
            SecurityEventType::BlockedIpAccess,
            SecurityEventType::RateLimitExceeded,
            SecurityEventType::RateLimitExceeded,
        ]
    );
}

// ---------------------------------------------------------------------------
// Login, logging resilience, misc
// ---------------------------------------------------------------------------

fn login_request(email: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/users/login")
        .header("x-forwarded-for", CLIENT_IP)
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({"email": email, "password": password}).to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn login_issues_session_bound_token() {
    let h = Harness::new();
    let admin = h.store.insert_user("root@example.com", "correct horse", true);

    let resp = h.send(login_request("root@example.com", "correct horse")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["tokenType"], "Bearer");
    assert_eq!(json["expiresIn"], 86400);
    assert_eq!(json["user"]["id"], admin.id);
    assert_eq!(json["user"]["isAdmin"], true);

    let token = json["token"].as_str().unwrap();
    let resp = h.send(bearer("/api/v1/users/me", token)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["role"], "admin");
}

#[tokio::test]
async fn failed_logins_are_audited() {
    let h = Harness::new();
    let user = h.store.insert_user("player@example.com", "password1", false);

    let resp = h.send(login_request("player@example.com", "nope")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = h.send(login_request("nobody@example.com", "nope")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let events = h.events().await;
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.event_type == SecurityEventType::AuthFailed));
    assert_eq!(events[0].user_id, Some(user.id));
    assert_eq!(events[1].user_id, None);
}

#[tokio::test]
async fn malformed_login_body_is_json_validation_error() {
    let h = Harness::new();
    for body in [r#"{"email":1}"#, "not json", r#"{"email":"a@example.com"}"#] {
        let resp = h
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/users/login")
                    .header("x-forwarded-for", CLIENT_IP)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body {body}");
        let json = body_json(resp).await;
        assert_eq!(json["error"], "validation_error");
        assert!(!json["message"].as_str().unwrap().contains("deserialize"));
    }
    assert!(h.events().await.is_empty());
}

#[tokio::test]
async fn suspended_user_cannot_log_in() {
    let h = Harness::new();
    let user = h.store.insert_user("banned@example.com", "password1", false);
    h.store.set_suspended(user.id, true);

    let resp = h.send(login_request("banned@example.com", "password1")).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        h.event_types().await,
        vec![SecurityEventType::SuspendedUserAccess]
    );
}

#[tokio::test]
async fn security_log_failure_never_changes_the_outcome() {
    let h = Harness::new();
    h.store.set_failing(StoreKind::SecurityLog, true);

    let resp = h
        .send(get("/api/v1/users/me", CLIENT_IP).body(Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = h
        .send(get("/api/health", CLIENT_IP).body(Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    h.state.security_log.flush().await;
    h.store.set_failing(StoreKind::SecurityLog, false);
    assert!(h.events().await.is_empty());
}

#[tokio::test]
async fn unknown_route_is_json_404_with_security_headers() {
    let h = Harness::new();
    let resp = h
        .send(get("/api/v2/nothing", CLIENT_IP).body(Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers()["x-content-type-options"], "nosniff");
    assert_eq!(resp.headers()["referrer-policy"], "same-origin");
    assert!(resp.headers().contains_key("content-security-policy"));
    assert_eq!(body_json(resp).await["error"], "not_found");
}
