//! Service bootstrap client against a mocked authorization server.

use mesh_auth::bootstrap::{BootstrapError, RetryPolicy, ServiceAuthenticator, ServiceCredentials};
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn credentials() -> ServiceCredentials {
    ServiceCredentials {
        service_id: "brokerSvc".into(),
        secret: "brokerSvcSecret".into(),
        redirect_uri: "http://localhost:8080".into(),
        scope: "read, write".into(),
    }
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        delay: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn test_authenticate_runs_apiauth_flow_and_caches_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/apiauth"))
        .and(query_param("code_challenge_method", "S256"))
        .and(body_string_contains("client_id=brokerSvc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"code": "abc"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/oauth/token"))
        .and(header_exists("authorization"))
        .and(body_string_contains("role=APIServer"))
        .and(body_string_contains("code=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json("service-jwt"))
        .expect(1)
        .mount(&server)
        .await;

    let auth = ServiceAuthenticator::new(server.uri(), credentials()).with_retry(fast_retry(3));
    assert!(matches!(
        auth.access_token().await,
        Err(BootstrapError::NotAuthenticated)
    ));

    let token = auth.authenticate().await.expect("authenticate");
    assert_eq!(token, "service-jwt");
    assert_eq!(auth.access_token().await.expect("cached"), "service-jwt");
}

#[tokio::test]
async fn test_authenticate_retries_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/apiauth"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/apiauth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"code": "abc"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json("service-jwt"))
        .mount(&server)
        .await;

    let auth = ServiceAuthenticator::new(server.uri(), credentials()).with_retry(fast_retry(3));
    assert_eq!(auth.authenticate().await.expect("authenticate"), "service-jwt");
}

#[tokio::test]
async fn test_authenticate_gives_up_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/apiauth"))
        .respond_with(ResponseTemplate::new(403).set_body_string("service is not allowed"))
        .expect(3)
        .mount(&server)
        .await;

    let auth = ServiceAuthenticator::new(server.uri(), credentials()).with_retry(fast_retry(3));
    match auth.authenticate().await {
        Err(BootstrapError::Rejected { status, body }) => {
            assert_eq!(status.as_u16(), 403);
            assert!(body.contains("not allowed"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(auth.access_token().await.is_err());
}
