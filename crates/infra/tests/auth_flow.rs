//! End-to-end authentication flow against a mock SSO service.

use std::sync::Arc;

use voltbridge_core::ports::{AccessTokenProvider, SessionManager, SessionStore};
use voltbridge_domain::{AuthConfig, Session};
use voltbridge_infra::auth::sso::SsoConfig;
use voltbridge_infra::{SqliteSessionStore, SsoClient, SsoSessionManager};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn token_body(access: &str, refresh: &str) -> serde_json::Value {
    serde_json::json!({
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "Bearer",
        "expires_in": 28800,
    })
}

fn temp_store() -> (tempfile::TempDir, Arc<SqliteSessionStore>) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sessions.db");
    let store = SqliteSessionStore::new(db_path.to_str().unwrap(), 2).unwrap();
    (dir, Arc::new(store))
}

fn manager(
    server_uri: &str,
    store: Arc<SqliteSessionStore>,
    refresh_token: Option<&str>,
    credentials: Option<(&str, &str)>,
) -> SsoSessionManager {
    let sso = SsoClient::new(SsoConfig {
        base_url: server_uri.to_string(),
        ..SsoConfig::default()
    })
    .unwrap();

    let auth = AuthConfig {
        email: credentials.map(|(e, _)| e.to_string()),
        password: credentials.map(|(_, p)| p.to_string()),
        refresh_token: refresh_token.map(str::to_string),
        sso_base_url: server_uri.to_string(),
        api_base_url: server_uri.to_string(),
    };

    SsoSessionManager::new(sso, store, auth)
}

#[tokio::test]
async fn refresh_grant_obtains_and_persists_a_session() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/v3/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=seed-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(
            "fresh-access",
            "rotated-refresh",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, store) = temp_store();
    let manager = manager(&server.uri(), store.clone(), Some("seed-refresh"), None);

    let session = manager.ensure_valid_session(false).await.unwrap();
    assert_eq!(session.access_token, "fresh-access");
    assert_eq!(session.refresh_token.as_deref(), Some("rotated-refresh"));

    // The fresh session is persisted and the bearer token is exposed.
    let stored = store.load().await.unwrap().unwrap();
    assert_eq!(stored.access_token, "fresh-access");
    assert_eq!(manager.access_token().await.as_deref(), Some("fresh-access"));
}

#[tokio::test]
async fn rejected_refresh_falls_back_to_credential_login() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/v3/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(401).set_body_string(
            r#"{"error":"invalid_grant"}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let login_form = r#"
        <form method="post">
          <input type="hidden" name="_csrf" value="csrf123" />
          <input type="hidden" name="transaction_id" value="tx9" />
          <input type="text" name="identity" value="" />
        </form>
    "#;
    Mock::given(method("GET"))
        .and(path("/oauth2/v3/authorize"))
        .respond_with(ResponseTemplate::new(200).set_body_string(login_form))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth2/v3/authorize"))
        .and(body_string_contains("_csrf=csrf123"))
        .and(body_string_contains("identity=user%40example.com"))
        .and(body_string_contains("credential=hunter2"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "location",
            "https://auth.tesla.com/void/callback?code=auth-code-7&state=s",
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth2/v3/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(
            "login-access",
            "login-refresh",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, store) = temp_store();
    let manager = manager(
        &server.uri(),
        store.clone(),
        Some("stale-refresh"),
        Some(("user@example.com", "hunter2")),
    );

    let session = manager.ensure_valid_session(false).await.unwrap();
    assert_eq!(session.access_token, "login-access");

    let stored = store.load().await.unwrap().unwrap();
    assert_eq!(stored.refresh_token.as_deref(), Some("login-refresh"));
}

#[tokio::test]
async fn valid_stored_session_makes_no_network_calls() {
    let server = MockServer::start().await;

    let (_dir, store) = temp_store();
    let session = Session::new(
        "stored-access".to_string(),
        Some("stored-refresh".to_string()),
        "Bearer".to_string(),
        28800,
        "ownerapi".to_string(),
    );
    store.save(&session).await.unwrap();

    let manager = manager(&server.uri(), store, None, None);
    manager.initialize().await.unwrap();

    let session = manager.ensure_valid_session(false).await.unwrap();
    assert_eq!(session.access_token, "stored-access");

    let requests = server.received_requests().await.unwrap();
    assert!(requests.is_empty(), "expected no SSO traffic, saw {}", requests.len());
}

#[tokio::test]
async fn forced_call_runs_a_full_login_without_refreshing() {
    let server = MockServer::start().await;

    let login_form = r#"
        <form method="post">
          <input type="hidden" name="_csrf" value="csrf456" />
          <input type="hidden" name="transaction_id" value="tx2" />
          <input type="text" name="identity" value="" />
        </form>
    "#;
    Mock::given(method("GET"))
        .and(path("/oauth2/v3/authorize"))
        .respond_with(ResponseTemplate::new(200).set_body_string(login_form))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth2/v3/authorize"))
        .and(body_string_contains("_csrf=csrf456"))
        .and(body_string_contains("credential=hunter2"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "location",
            "https://auth.tesla.com/void/callback?code=auth-code-9&state=s",
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth2/v3/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(
            "login-access",
            "login-refresh",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, store) = temp_store();
    let session = Session::new(
        "stored-access".to_string(),
        Some("stored-refresh".to_string()),
        "Bearer".to_string(),
        28800,
        "ownerapi".to_string(),
    );
    store.save(&session).await.unwrap();

    let manager = manager(
        &server.uri(),
        store,
        None,
        Some(("user@example.com", "hunter2")),
    );
    manager.initialize().await.unwrap();

    // force = true ignores the valid cached token and the stored refresh
    // token and performs the credential login from scratch.
    let session = manager.ensure_valid_session(true).await.unwrap();
    assert_eq!(session.access_token, "login-access");

    let requests = server.received_requests().await.unwrap();
    let refreshes = requests
        .iter()
        .filter(|r| String::from_utf8_lossy(&r.body).contains("grant_type=refresh_token"))
        .count();
    assert_eq!(refreshes, 0, "forced login must not attempt a refresh exchange");
}
