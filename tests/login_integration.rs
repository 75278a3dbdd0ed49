//! Integration tests for password login and the transport against a fake judge.

use std::sync::Arc;

use cf_session::site::BROWSER_USER_AGENT;
use cf_session::{
    Cookie, CookieJar, HttpTransport, JudgeSite, LoginCoordinator, LoginError, Session,
    TransportOptions,
};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

const LOGIN_PAGE: &str = r#"<html><script>var csrf='tok123';</script><form id="enterForm"></form></html>"#;
const LOGGED_IN_PAGE: &str = r#"<html><script>var handle = "tourist";</script></html>"#;
const LOGGED_OUT_PAGE: &str = "<html><div class=\"error\">Invalid handle/email or password</div></html>";

fn site_for(server: &MockServer) -> JudgeSite {
    JudgeSite::new(Url::parse(&server.uri()).unwrap())
}

async fn mount_login_page(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/enter"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "JSESSIONID=abc; Path=/")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

fn coordinator_with_credentials(dir: &TempDir, site: JudgeSite) -> LoginCoordinator {
    let mut coordinator =
        LoginCoordinator::open(dir.path().join("session.json"), site, None).unwrap();
    coordinator.store_credentials("tourist", "hunter2").unwrap();
    coordinator
}

// ---- password login ----

#[tokio::test]
async fn test_password_login_submits_form_and_persists_session() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_login_page(&server, LOGIN_PAGE).await;
    Mock::given(method("POST"))
        .and(path("/enter"))
        .and(header("cookie", "JSESSIONID=abc"))
        .and(body_string_contains("csrf_token=tok123"))
        .and(body_string_contains("action=enter"))
        .and(body_string_contains("bfaa=f1b3f18c715565b589b7823cda7448ce"))
        .and(body_string_contains("handleOrEmail=tourist"))
        .and(body_string_contains("password=hunter2"))
        .and(body_string_contains("_tta=176"))
        .and(body_string_contains("remember=on"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "39ce7=CFx; Path=/")
                .set_body_string(LOGGED_IN_PAGE),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut coordinator = coordinator_with_credentials(&dir, site_for(&server));

    let session = coordinator.login_with_password().await.unwrap();
    assert_eq!(session.handle, "tourist");
    assert_eq!(session.ftaa.len(), 18);
    assert_eq!(session.bfaa, "f1b3f18c715565b589b7823cda7448ce");

    let saved = Session::try_load(coordinator.session_path()).unwrap();
    assert_eq!(saved.handle, "tourist");
    assert_eq!(saved.handle_or_email, "tourist");
    let names: Vec<String> = saved
        .cookies
        .snapshot()
        .into_iter()
        .map(|cookie| cookie.name)
        .collect();
    assert!(names.contains(&"JSESSIONID".to_string()));
    assert!(names.contains(&"39ce7".to_string()));
    assert!(Arc::ptr_eq(
        &coordinator.transport().cookie_jar(),
        &coordinator.session().cookies
    ));
}

#[tokio::test]
async fn test_password_login_rejected_keeps_previous_session() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_login_page(&server, LOGIN_PAGE).await;
    Mock::given(method("POST"))
        .and(path("/enter"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGGED_OUT_PAGE))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut coordinator = coordinator_with_credentials(&dir, site_for(&server));
    let before = std::fs::read(coordinator.session_path()).unwrap();

    let error = coordinator.login_with_password().await.unwrap_err();
    assert!(matches!(error, LoginError::NotLoggedIn));

    assert_eq!(std::fs::read(coordinator.session_path()).unwrap(), before);
    assert!(coordinator.current_handle().is_none());
    assert!(Arc::ptr_eq(
        &coordinator.transport().cookie_jar(),
        &coordinator.session().cookies
    ));
    assert!(coordinator.session().cookies.is_empty());
}

#[tokio::test]
async fn test_password_login_without_csrf_token() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_login_page(&server, "<html>maintenance</html>").await;
    Mock::given(method("POST"))
        .and(path("/enter"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGGED_IN_PAGE))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut coordinator = coordinator_with_credentials(&dir, site_for(&server));

    let error = coordinator.login_with_password().await.unwrap_err();
    assert!(matches!(error, LoginError::CsrfNotFound));
}

#[tokio::test]
async fn test_password_login_credentials_keyed_by_handle_or_email() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");

    let mut coordinator = LoginCoordinator::open(&path, site_for(&server), None).unwrap();
    coordinator.store_credentials("tourist", "hunter2").unwrap();

    // Editing the handle on record invalidates the stored password.
    let mut edited = Session::try_load(&path).unwrap();
    edited.handle_or_email = "someone-else".to_string();
    edited.save(&path).unwrap();

    let mut coordinator = LoginCoordinator::open(&path, site_for(&server), None).unwrap();
    let error = coordinator.login_with_password().await.unwrap_err();
    assert!(matches!(error, LoginError::Decryption(_)));
}

// ---- transport ----

#[tokio::test]
async fn test_transport_presents_browser_identity_and_session_cookies() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    // The user agent contains commas, which the `header` matcher would split
    // into several values, so the raw request headers are checked instead.
    Mock::given(method("GET"))
        .and(path("/problemset"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).unwrap();
    let jar = Arc::new(CookieJar::with_cookies(
        &base,
        [Cookie::new("JSESSIONID", "abc", "", "/")],
    ));
    let transport = HttpTransport::new(jar, &TransportOptions::default()).unwrap();

    let body = transport.get(&base.join("/problemset").unwrap()).await.unwrap();
    assert_eq!(body, "ok");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let headers = &requests[0].headers;
    assert_eq!(
        headers.get("user-agent").unwrap().to_str().unwrap(),
        BROWSER_USER_AGENT
    );
    assert_eq!(
        headers.get("cookie").unwrap().to_str().unwrap(),
        "JSESSIONID=abc"
    );
}

#[tokio::test]
async fn test_transport_swapped_jar_applies_to_next_request() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/data"))
        .and(header("cookie", "sid=new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("new"))
        .expect(1)
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).unwrap();
    let transport = HttpTransport::new(
        Arc::new(CookieJar::with_cookies(&base, [Cookie::new("sid", "old", "", "/")])),
        &TransportOptions::default(),
    )
    .unwrap();
    transport.set_cookie_jar(Arc::new(CookieJar::with_cookies(
        &base,
        [Cookie::new("sid", "new", "", "/")],
    )));

    let body = transport.get(&base.join("/data").unwrap()).await.unwrap();
    assert_eq!(body, "new");
}

#[tokio::test]
async fn test_transport_honors_session_user_agent_override() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("user-agent", "custom-agent/2.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let session = Session {
        user_agent: "custom-agent/2.0".to_string(),
        ..Session::default()
    };
    let coordinator = LoginCoordinator::with_session(
        session,
        dir.path().join("session.json"),
        site_for(&server),
        None,
    )
    .unwrap();

    let base = Url::parse(&server.uri()).unwrap();
    let body = coordinator.transport().get(&base).await.unwrap();
    assert_eq!(body, "ok");
}
