//! Shared fixtures: in-memory database, test configuration and flow helpers.
#![allow(dead_code)]

use axum::http::{HeaderName, HeaderValue, header};
use axum_test::TestServer;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use jsonwebtoken::Algorithm;
use mesh_auth::api::app;
use mesh_auth::api::session::CodeResponse;
use mesh_auth::config::{
    AppConfig, ClientConfig, JwtConfig, LifetimeConfig, SigningKeyConfig, TicketConfig,
};
use mesh_auth::engine::jwt::{Claims, ROLE_CLAIM, SCOPE_CLAIM, SigningKey};
use mesh_auth::engine::pkce::{generate_verifier, s256_challenge};
use mesh_auth::services::AuthServices;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use serde_json::{Map, Value};
use std::sync::Arc;
use time::OffsetDateTime;

pub const FRONTEND_ID: &str = "222222";
pub const FRONTEND_SECRET: &str = "22222222";
pub const FRONTEND_DOMAIN: &str = "http://localhost:80";
pub const BROKER_ID: &str = "brokerSvc";
pub const BROKER_SECRET: &str = "brokerSvcSecret";
pub const USER_KID: &str = "user-key";
pub const USER_SECRET: &str = "user-signing-secret-0123456789";
pub const SERVICE_KID: &str = "service-key";
pub const SERVICE_SECRET: &str = "service-signing-secret-0123456789";
pub const SCOPE: &str = "read, openid";

const SCHEMA: [&str; 4] = [
    r#"CREATE TABLE user_account (
        email TEXT PRIMARY KEY,
        password TEXT NOT NULL,
        role TEXT NOT NULL,
        refresh_token TEXT NOT NULL,
        refresh_jwt TEXT NOT NULL,
        email_validation_code INTEGER NOT NULL,
        is_email_validated INTEGER NOT NULL DEFAULT 0,
        name TEXT NOT NULL,
        age TEXT NOT NULL,
        city TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE api_server (
        service_id TEXT PRIMARY KEY,
        role TEXT NOT NULL,
        refresh_token TEXT NOT NULL,
        refresh_jwt TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE oauth2_authorization (
        code TEXT PRIMARY KEY,
        client_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        redirect_uri TEXT NOT NULL,
        scope TEXT NOT NULL,
        state TEXT NULL,
        code_challenge TEXT NULL,
        code_challenge_method TEXT NULL,
        expires_at TEXT NOT NULL,
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE oauth2_token (
        id TEXT PRIMARY KEY,
        access_token TEXT NOT NULL UNIQUE,
        refresh_token TEXT NOT NULL UNIQUE,
        client_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        role TEXT NOT NULL,
        scope TEXT NOT NULL,
        access_token_expires_at TEXT NOT NULL,
        refresh_token_expires_at TEXT NOT NULL,
        created_at TEXT NOT NULL,
        revoked_at TEXT NULL
    );"#,
];

pub async fn create_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.expect("connect");
    for statement in SCHEMA {
        db.execute(Statement::from_string(DbBackend::Sqlite, statement))
            .await
            .expect("create table");
    }
    db
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        listen_addr: "127.0.0.1:0".into(),
        store_timeout_secs: 5,
        jwt: JwtConfig {
            algorithm: "HS256".into(),
            user: SigningKeyConfig {
                key_id: USER_KID.into(),
                secret: USER_SECRET.into(),
            },
            service: SigningKeyConfig {
                key_id: SERVICE_KID.into(),
                secret: SERVICE_SECRET.into(),
            },
        },
        frontend_client_id: FRONTEND_ID.into(),
        allowed_services: vec![BROKER_ID.into(), "order".into()],
        clients: vec![
            ClientConfig {
                id: FRONTEND_ID.into(),
                secret: FRONTEND_SECRET.into(),
                domain: FRONTEND_DOMAIN.into(),
                scopes: Vec::new(),
            },
            ClientConfig {
                id: BROKER_ID.into(),
                secret: BROKER_SECRET.into(),
                domain: "http://localhost:8080".into(),
                scopes: Vec::new(),
            },
            ClientConfig {
                id: "order".into(),
                secret: "orderSecret".into(),
                domain: "http://localhost:8081".into(),
                scopes: vec!["read".into(), "write".into()],
            },
        ],
        lifetimes: LifetimeConfig::default(),
        tickets: TicketConfig::default(),
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub services: AuthServices,
    pub db: Arc<DatabaseConnection>,
}

pub async fn test_app() -> TestApp {
    test_app_with(test_config()).await
}

pub async fn test_app_with(config: AppConfig) -> TestApp {
    let db = Arc::new(create_test_db().await);
    let services = AuthServices::new(db.clone(), &config).expect("build services");
    let server = TestServer::new(app(services.clone())).expect("create test server");
    TestApp {
        server,
        services,
        db,
    }
}

pub fn basic_auth(id: &str, secret: &str) -> HeaderValue {
    let encoded = STANDARD.encode(format!("{id}:{secret}"));
    HeaderValue::from_str(&format!("Basic {encoded}")).expect("header value")
}

pub fn jwt_cookie(token: &str) -> (HeaderName, HeaderValue) {
    (
        header::COOKIE,
        HeaderValue::from_str(&format!("jwt_token={token}")).expect("header value"),
    )
}

pub fn bearer(token: &str) -> (HeaderName, HeaderValue) {
    (
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).expect("header value"),
    )
}

pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

pub fn pkce() -> Pkce {
    let verifier = generate_verifier().expect("verifier");
    let challenge = s256_challenge(&verifier);
    Pkce {
        verifier,
        challenge,
    }
}

impl TestApp {
    /// POST signup or signin and return the issued code.
    pub async fn start_user_flow(&self, path: &str, email: &str, password: &str, pkce: &Pkce) -> String {
        let response = self
            .server
            .post(path)
            .add_query_param("response_type", "code")
            .add_query_param("client_id", FRONTEND_ID)
            .add_query_param("redirect_uri", FRONTEND_DOMAIN)
            .add_query_param("scope", SCOPE)
            .add_query_param("code_challenge", &pkce.challenge)
            .add_query_param("code_challenge_method", "S256")
            .form(&[("email", email), ("password", password)])
            .await;
        response.assert_status_ok();
        response.json::<CodeResponse>().code
    }

    pub async fn exchange(&self, code: &str, sub: &str, role: &str, pkce: &Pkce) -> axum_test::TestResponse {
        let (id, secret) = if role == "APIServer" {
            (sub, client_secret(sub))
        } else {
            (FRONTEND_ID, FRONTEND_SECRET)
        };
        self.server
            .post("/v1/oauth/token")
            .add_header(header::AUTHORIZATION, basic_auth(id, secret))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("sub", sub),
                ("code_verifier", pkce.verifier.as_str()),
                ("role", role),
            ])
            .await
    }

    /// Signup and exchange; returns the access JWT.
    pub async fn signup_user(&self, email: &str, password: &str) -> String {
        let pkce = pkce();
        let code = self
            .start_user_flow("/v1/signup", email, password, &pkce)
            .await;
        let response = self.exchange(&code, email, "user", &pkce).await;
        response.assert_status_ok();
        response.json::<String>()
    }

    /// Signin and exchange; returns the access JWT.
    pub async fn signin_user(&self, email: &str, password: &str) -> String {
        let pkce = pkce();
        let code = self
            .start_user_flow("/v1/signin", email, password, &pkce)
            .await;
        let response = self.exchange(&code, email, "user", &pkce).await;
        response.assert_status_ok();
        response.json::<String>()
    }

    pub async fn service_code(&self, service_id: &str, pkce: &Pkce) -> axum_test::TestResponse {
        self.server
            .post("/v1/apiauth")
            .add_query_param("response_type", "code")
            .add_query_param("scope", "read, write")
            .add_query_param("code_challenge", &pkce.challenge)
            .add_query_param("code_challenge_method", "S256")
            .form(&[("client_id", service_id)])
            .await
    }

    pub async fn raw_query(&self, sql: &str) {
        self.db
            .execute(Statement::from_string(DbBackend::Sqlite, sql))
            .await
            .expect("raw query");
    }
}

fn client_secret(id: &str) -> &'static str {
    match id {
        BROKER_ID => BROKER_SECRET,
        "order" => "orderSecret",
        _ => "unknown",
    }
}

pub fn user_key() -> SigningKey {
    SigningKey::new(USER_KID, USER_SECRET.as_bytes(), Algorithm::HS256)
}

/// A user token signed with `key`, expiring `exp_offset` seconds from now.
pub fn user_claims(email: &str, exp_offset: i64) -> Claims {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let mut info = Map::new();
    info.insert(SCOPE_CLAIM.into(), Value::from(SCOPE));
    info.insert(ROLE_CLAIM.into(), Value::from("user"));
    Claims {
        aud: FRONTEND_ID.into(),
        sub: email.into(),
        iat: now - 10,
        exp: now + exp_offset,
        jti: uuid::Uuid::new_v4().to_string(),
        openid_info: info,
    }
}
