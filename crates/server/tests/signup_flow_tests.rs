//! Signup and signin flows end to end through the HTTP surface.

mod common;

use common::*;
use mesh_auth::api::session::CodeResponse;
use mesh_auth::error::ErrorBody;
use mesh_auth::model::Role;
use sea_orm::{ConnectionTrait, DbBackend, Statement};

async fn token_family_count(app: &TestApp) -> i64 {
    let row = app
        .db
        .query_one(Statement::from_string(
            DbBackend::Sqlite,
            "SELECT COUNT(*) AS n FROM oauth2_token",
        ))
        .await
        .expect("count query")
        .expect("count row");
    row.try_get("", "n").expect("count column")
}

#[tokio::test]
async fn test_signup_stages_ticket_and_exchange_consumes_it() {
    let app = test_app().await;
    let pkce = pkce();

    let code = app
        .start_user_flow("/v1/signup", "a@b.com", "pw", &pkce)
        .await;
    assert_eq!(code.len(), 48);
    assert!(app.services.claims.contains("a@b.com"));
    // The correlation entry is consumed while the code is issued
    assert_eq!(app.services.correlations.count(), 0);

    let response = app.exchange(&code, "a@b.com", "user", &pkce).await;
    response.assert_status_ok();
    let access_jwt = response.json::<String>();
    assert!(!access_jwt.is_empty());
    assert!(!app.services.claims.contains("a@b.com"));

    let user = app.services.store.find_user("a@b.com").await.expect("user");
    assert!(!user.refresh_token.is_empty());
    assert!(!user.refresh_jwt.is_empty());
    assert_eq!(user.role, Role::User.as_str());
    assert_eq!(user.name, "Robert");
    assert_eq!(user.is_email_validated, 0);
    assert!((0..1_000_000).contains(&user.email_validation_code));
    assert_eq!(app.services.store.count_users().await.expect("count"), 1);
}

#[tokio::test]
async fn test_signup_with_missing_fields_is_forbidden() {
    let app = test_app().await;

    for (email, password) in [("", "pw"), ("a@b.com", ""), ("", "")] {
        let response = app
            .server
            .post("/v1/signup")
            .form(&[("email", email), ("password", password)])
            .await;
        response.assert_status_forbidden();
    }

    assert_eq!(app.services.claims.count(), 0);
    assert_eq!(app.services.correlations.count(), 0);
    assert_eq!(app.services.store.count_users().await.expect("count"), 0);
}

#[tokio::test]
async fn test_signup_with_existing_email_is_bad_request() {
    let app = test_app().await;
    app.signup_user("a@b.com", "pw").await;

    let response = app
        .server
        .post("/v1/signup")
        .form(&[("email", "a@b.com"), ("password", "other")])
        .await;
    response.assert_status_bad_request();
    let body = response.json::<ErrorBody>();
    assert_eq!(body.code, 400);
    assert_eq!(body.comment, "email already exist");

    assert_eq!(app.services.store.count_users().await.expect("count"), 1);
    assert!(!app.services.claims.contains("a@b.com"));
}

#[tokio::test]
async fn test_signin_rotates_user_tokens() {
    let app = test_app().await;
    app.signup_user("a@b.com", "pw").await;
    let before = app.services.store.find_user("a@b.com").await.expect("user");

    let access_jwt = app.signin_user("a@b.com", "pw").await;
    assert!(!access_jwt.is_empty());

    let after = app.services.store.find_user("a@b.com").await.expect("user");
    assert_ne!(before.refresh_token, after.refresh_token);
    assert_ne!(before.refresh_jwt, after.refresh_jwt);
    assert_eq!(app.services.claims.count(), 0);
}

#[tokio::test]
async fn test_signin_with_wrong_password_fails_closed() {
    let app = test_app().await;
    app.signup_user("a@b.com", "pw").await;
    let before = app.services.store.find_user("a@b.com").await.expect("user");

    let pkce = pkce();
    let code = app
        .start_user_flow("/v1/signin", "a@b.com", "wrong", &pkce)
        .await;
    let response = app.exchange(&code, "a@b.com", "user", &pkce).await;
    response.assert_status_internal_server_error();

    let after = app.services.store.find_user("a@b.com").await.expect("user");
    assert_eq!(before.refresh_token, after.refresh_token);
    assert_eq!(token_family_count(&app).await, 1);
}

#[tokio::test]
async fn test_signin_for_unknown_user_issues_no_tokens() {
    let app = test_app().await;
    let pkce = pkce();
    let code = app
        .start_user_flow("/v1/signin", "ghost@b.com", "pw", &pkce)
        .await;

    let response = app.exchange(&code, "ghost@b.com", "user", &pkce).await;
    response.assert_status_internal_server_error();
    assert_eq!(token_family_count(&app).await, 0);
}

#[tokio::test]
async fn test_authorization_code_is_single_use() {
    let app = test_app().await;
    let pkce = pkce();
    let code = app
        .start_user_flow("/v1/signup", "a@b.com", "pw", &pkce)
        .await;

    app.exchange(&code, "a@b.com", "user", &pkce)
        .await
        .assert_status_ok();
    app.exchange(&code, "a@b.com", "user", &pkce)
        .await
        .assert_status_internal_server_error();
    assert_eq!(token_family_count(&app).await, 1);
}

#[tokio::test]
async fn test_pkce_mismatch_is_rejected() {
    let app = test_app().await;
    let issued_for = pkce();
    let code = app
        .start_user_flow("/v1/signup", "a@b.com", "pw", &issued_for)
        .await;

    let other = pkce();
    app.exchange(&code, "a@b.com", "user", &other)
        .await
        .assert_status_internal_server_error();
    assert_eq!(app.services.store.count_users().await.expect("count"), 0);
}

#[tokio::test]
async fn test_exchange_with_wrong_client_secret_fails() {
    let app = test_app().await;
    let pkce = pkce();
    let code = app
        .start_user_flow("/v1/signup", "a@b.com", "pw", &pkce)
        .await;

    app.server
        .post("/v1/oauth/token")
        .add_header(
            axum::http::header::AUTHORIZATION,
            basic_auth(FRONTEND_ID, "not-the-secret"),
        )
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("sub", "a@b.com"),
            ("code_verifier", pkce.verifier.as_str()),
            ("role", "user"),
        ])
        .await
        .assert_status_internal_server_error();
    // The code survives a failed client authentication
    app.exchange(&code, "a@b.com", "user", &pkce)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_finalize_failure_leaves_no_token_family() {
    let app = test_app().await;
    let pkce = pkce();
    let code = app
        .start_user_flow("/v1/signup", "race@b.com", "pw", &pkce)
        .await;

    // Someone else registers the same email between intake and exchange
    app.raw_query(
        "INSERT INTO user_account (email, password, role, refresh_token, refresh_jwt, \
         email_validation_code, is_email_validated, name, age, city, created_at, updated_at) \
         VALUES ('race@b.com', 'x', 'user', 'rt', 'rj', 1, 0, 'n', 'a', 'c', \
         '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
    )
    .await;

    app.exchange(&code, "race@b.com", "user", &pkce)
        .await
        .assert_status_internal_server_error();
    assert_eq!(token_family_count(&app).await, 0);
    assert_eq!(app.services.store.count_users().await.expect("count"), 1);
}

#[tokio::test]
async fn test_signup_for_unknown_client_is_forbidden() {
    let app = test_app().await;
    let response = app
        .server
        .post("/v1/signup")
        .add_query_param("client_id", "unknown-client")
        .form(&[("email", "a@b.com"), ("password", "pw")])
        .await;
    response.assert_status_forbidden();
    assert_eq!(app.services.claims.count(), 0);
    assert_eq!(app.services.correlations.count(), 0);
}

#[tokio::test]
async fn test_signup_response_shape() {
    let app = test_app().await;
    let response = app
        .server
        .post("/v1/signup")
        .form(&[("email", "shape@b.com"), ("password", "pw")])
        .await;
    response.assert_status_ok();
    let body = response.json::<CodeResponse>();
    assert!(
        body.code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    );
}

#[tokio::test]
async fn test_lifetime_past_date_range_fails_exchange_cleanly() {
    let mut config = test_config();
    config.lifetimes.user_refresh = 1_000_000_000_000;
    assert!(config.validate().is_err());

    // Built without validation, the exchange reports an error instead of panicking
    let app = test_app_with(config).await;
    let pkce = pkce();
    let code = app
        .start_user_flow("/v1/signup", "far@b.com", "pw", &pkce)
        .await;
    app.exchange(&code, "far@b.com", "user", &pkce)
        .await
        .assert_status_internal_server_error();
    assert_eq!(token_family_count(&app).await, 0);
    assert_eq!(app.services.store.count_users().await.expect("count"), 0);
}
