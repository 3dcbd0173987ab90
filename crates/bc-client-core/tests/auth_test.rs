//! End-to-end sign-in dance against a mock HTTP server, exercising the full
//! GET -> extract token -> POST -> harvest cookies flow in `auth.rs`,
//! including the 302-on-success contract (spec.md §4.1/§6) that only holds
//! if the client the dance runs on does not auto-follow redirects.

mod common;

use bc_client_core::auth::authenticate;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SIGN_IN_HTML: &str = r#"
<html><body>
<form>
<input type="hidden" name="__RequestVerificationToken" value="csrf-form-token-xyz" />
</form>
</body></html>
"#;

#[tokio::test]
async fn authenticate_succeeds_on_302_and_harvests_cookies() {
    common::init_tracing();

    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/SignIn"))
        .and(query_param("tenant", "contoso"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", ".AspNetCore.Session=session-cookie-value; Path=/; HttpOnly")
                .set_body_string(SIGN_IN_HTML),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/SignIn"))
        .and(query_param("tenant", "contoso"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "set-cookie",
            ".AspNetCore.Antiforgery.post=post-cookie-value; Path=/; HttpOnly",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let result = authenticate(&server.uri(), "contoso", "alice", "hunter2").await;

    let session = result.expect("authentication should succeed on a 302 response");
    assert_eq!(session.csrf_token, "post-cookie-value");
    assert!(session.cookie_header.contains(".AspNetCore.Antiforgery.post=post-cookie-value"));
}

#[tokio::test]
async fn authenticate_rejects_a_200_login_response() {
    common::init_tracing();

    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/SignIn"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SIGN_IN_HTML))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/SignIn"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>invalid credentials</html>"))
        .mount(&server)
        .await;

    let result = authenticate(&server.uri(), "contoso", "alice", "wrong-password").await;

    assert!(matches!(
        result,
        Err(bc_client_core::AuthError::LoginRejected { status: 200 })
    ));
}
