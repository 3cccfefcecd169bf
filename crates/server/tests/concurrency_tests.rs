//! Many principals running full session cycles at once.

mod common;

use common::*;
use futures::future::join_all;

const PRINCIPALS: usize = 16;

async fn session_cycle(app: &TestApp, i: usize) {
    let email = format!("user{i}@mesh.test");
    let password = format!("pw-{i}");

    let first = app.signup_user(&email, &password).await;
    let (name, value) = jwt_cookie(&first);
    app.server
        .post("/v1/signout")
        .add_header(name, value)
        .await
        .assert_status_ok();

    let second = app.signin_user(&email, &password).await;
    let (name, value) = jwt_cookie(&second);
    let response = app
        .server
        .post("/v1/refreshopenid")
        .add_header(name, value)
        .await;
    response.assert_status_ok();

    let claims = app
        .services
        .tokens
        .introspect(&response.json::<String>())
        .expect("claims");
    assert_eq!(claims["sub"], email.as_str());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_session_cycles_leave_no_tickets_behind() {
    let app = test_app().await;

    join_all((0..PRINCIPALS).map(|i| session_cycle(&app, i))).await;

    assert_eq!(
        app.services.store.count_users().await.expect("count"),
        PRINCIPALS as u64
    );
    assert_eq!(app.services.claims.count(), 0);
    assert_eq!(app.services.correlations.count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_exchanges_of_one_code_have_one_winner() {
    let app = test_app().await;
    let pkce = pkce();
    let code = app
        .start_user_flow("/v1/signup", "once@mesh.test", "pw", &pkce)
        .await;

    let responses = join_all(
        (0..8).map(|_| app.exchange(&code, "once@mesh.test", "user", &pkce)),
    )
    .await;

    let winners = responses
        .iter()
        .filter(|response| response.status_code().is_success())
        .count();
    assert_eq!(winners, 1);
    assert_eq!(app.services.store.count_users().await.expect("count"), 1);
}
