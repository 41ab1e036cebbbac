mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::*;
use recipehub_core::api::client::{TOKEN_PATH, TOKEN_REFRESH_PATH, USER_LIST_PATH};
use recipehub_core::auth::USER_ID_KEY;
use recipehub_core::storage::{KeyValueStore, MemoryStore};
use recipehub_core::{
    ApiClient, ApiError, CredentialStore, LoginRequest, RefreshOutcome, SessionManager, SignupRequest,
    TokenPair,
};

/// Past one refresh interval
const ONE_TICK: Duration = Duration::from_secs(31);

fn refresh_count(h: &Harness) -> usize {
    h.transport.requests_to(TOKEN_REFRESH_PATH).len()
}

// ============================================================================
// Login / signup / logout
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_login_stores_pair_and_starts_refresh() {
    let access = jwt_for(42);
    let issued = access.clone();
    let transport = FakeTransport::new(move |req| match path_of(req) {
        TOKEN_PATH => ok_json(json!({"access": issued, "refresh": "r1"})),
        _ => status(404, ""),
    });
    let h = Harness::new(transport);

    let info = h
        .session
        .login(&LoginRequest::new("a@b.com", "x"))
        .await
        .unwrap();

    assert_eq!(info.user_id.as_deref(), Some("42"));
    assert_eq!(info.username.as_deref(), Some("user42"));
    assert_eq!(h.stored(), Some(TokenPair::new(access, "r1")));
    assert_eq!(h.session.current_user_id().as_deref(), Some("42"));
    assert_eq!(h.storage.get(USER_ID_KEY).unwrap().as_deref(), Some("42"));
    assert!(h.session.is_refreshing());

    let sent = h.transport.requests_to(TOKEN_PATH);
    assert_eq!(sent.len(), 1);
    assert_eq!(body_of(&sent[0]), json!({"email": "a@b.com", "password": "x"}));
    assert_eq!(sent[0].header("authorization"), None);
    assert_eq!(sent[0].header("content-type"), Some("application/json"));
}

#[tokio::test]
async fn test_login_with_blank_field_never_reaches_network() {
    let h = Harness::new(FakeTransport::new(|_| offline()));

    let err = h
        .session
        .login(&LoginRequest::new("a@b.com", ""))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Validation(_)));
    assert!(h.transport.requests().is_empty());
}

#[tokio::test]
async fn test_login_rejected_credentials() {
    let h = Harness::new(FakeTransport::new(|_| {
        status(401, r#"{"detail":"No active account found with the given credentials"}"#)
    }));

    let err = h
        .session
        .login(&LoginRequest::new("a@b.com", "wrong"))
        .await
        .unwrap_err();

    match err {
        ApiError::InvalidCredentials(msg) => assert!(msg.contains("No active account")),
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!h.session.is_authenticated());
    assert!(!h.session.is_refreshing());
}

#[tokio::test]
async fn test_login_response_missing_refresh_token() {
    let h = Harness::new(FakeTransport::new(|_| ok_json(json!({"access": jwt_for(1)}))));

    let err = h
        .session
        .login(&LoginRequest::new("a@b.com", "x"))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::InvalidResponse(_)));
    assert_eq!(h.stored(), None);
    assert!(!h.session.is_refreshing());
}

#[tokio::test]
async fn test_login_offline_is_network_error() {
    let h = Harness::new(FakeTransport::new(|_| offline()));

    let err = h
        .session
        .login(&LoginRequest::new("a@b.com", "x"))
        .await
        .unwrap_err();

    assert!(err.is_offline());
    assert!(!err.is_auth_failure());
}

#[tokio::test]
async fn test_register_posts_signup_form() {
    let h = Harness::new(FakeTransport::new(|req| match path_of(req) {
        USER_LIST_PATH => Ok(recipehub_core::api::HttpResponse::new(
            reqwest::StatusCode::CREATED,
            json!({"id": 9, "username": "cook"}).to_string(),
        )),
        _ => status(404, ""),
    }));

    let user = h
        .session
        .register(&SignupRequest::new("cook", "c@d.com", "pw"))
        .await
        .unwrap();

    assert_eq!(user["id"], 9);
    let sent = h.transport.requests_to(USER_LIST_PATH);
    assert_eq!(
        body_of(&sent[0]),
        json!({"username": "cook", "email": "c@d.com", "password": "pw"})
    );
    // Signing up does not sign in
    assert!(!h.session.is_authenticated());
}

#[tokio::test]
async fn test_register_surfaces_server_message() {
    let h = Harness::new(FakeTransport::new(|_| {
        status(400, r#"{"message":"Email already registered"}"#)
    }));

    let err = h
        .session
        .register(&SignupRequest::new("cook", "c@d.com", "pw"))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Email already registered"));
}

#[tokio::test(start_paused = true)]
async fn test_logout_clears_and_stops() {
    let h = Harness::logged_in(
        FakeTransport::new(|_| ok_json(json!({"access": jwt_for(1), "refresh": "r2"}))),
        TokenPair::new(jwt_for(1), "r1"),
    );
    assert!(h.session.start_refresh());

    h.session.logout();
    h.session.logout();

    assert_eq!(h.stored(), None);
    assert!(h.storage.is_empty());
    assert!(!h.session.is_refreshing());

    tokio::time::sleep(ONE_TICK * 3).await;
    assert_eq!(refresh_count(&h), 0);
}

#[tokio::test(start_paused = true)]
async fn test_resume_restarts_loop_for_stored_session() {
    let h = Harness::logged_in(
        FakeTransport::new(|_| ok_json(json!({"access": jwt_for(5), "refresh": "r2"}))),
        TokenPair::new(jwt_for(5), "r1"),
    );

    let info = h.session.resume().unwrap();
    assert_eq!(info.user_id.as_deref(), Some("5"));
    assert!(h.session.is_refreshing());
}

#[tokio::test]
async fn test_resume_without_session() {
    let h = Harness::new(FakeTransport::new(|_| offline()));
    assert_eq!(h.session.resume(), None);
    assert!(!h.session.is_refreshing());
}

// ============================================================================
// Refresh loop
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_second_start_schedules_nothing() {
    let h = Harness::logged_in(
        FakeTransport::new(|_| ok_json(json!({"access": jwt_for(1), "refresh": "r2"}))),
        TokenPair::new(jwt_for(1), "r1"),
    );

    assert!(h.session.start_refresh());
    assert!(!h.session.start_refresh());

    tokio::time::sleep(ONE_TICK).await;
    assert_eq!(refresh_count(&h), 1);
}

#[tokio::test]
async fn test_start_without_session_is_noop() {
    let h = Harness::new(FakeTransport::new(|_| offline()));
    assert!(!h.session.start_refresh());
    assert!(!h.session.is_refreshing());
    h.session.stop_refresh();
}

#[tokio::test(start_paused = true)]
async fn test_first_tick_waits_one_interval() {
    let h = Harness::logged_in(
        FakeTransport::new(|_| ok_json(json!({"access": jwt_for(1), "refresh": "r2"}))),
        TokenPair::new(jwt_for(1), "r1"),
    );
    h.session.start_refresh();

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(refresh_count(&h), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(refresh_count(&h), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_overwrites_pair_and_rederives_user() {
    let h = Harness::logged_in(
        FakeTransport::new(|req| match path_of(req) {
            TOKEN_REFRESH_PATH => ok_json(json!({"access": jwt_for(77), "refresh": "r2"})),
            _ => status(404, ""),
        }),
        TokenPair::new(jwt_for(42), "r1"),
    );
    h.session.start_refresh();

    tokio::time::sleep(ONE_TICK).await;

    let sent = h.transport.requests_to(TOKEN_REFRESH_PATH);
    assert_eq!(body_of(&sent[0]), json!({"refresh": "r1"}));
    assert_eq!(h.stored(), Some(TokenPair::new(jwt_for(77), "r2")));
    assert_eq!(h.session.current_user_id().as_deref(), Some("77"));
    assert_eq!(h.storage.get(USER_ID_KEY).unwrap().as_deref(), Some("77"));
    assert!(h.session.is_refreshing());

    // The next tick uses the rotated refresh token
    tokio::time::sleep(ONE_TICK).await;
    let sent = h.transport.requests_to(TOKEN_REFRESH_PATH);
    assert_eq!(sent.len(), 2);
    assert_eq!(body_of(&sent[1]), json!({"refresh": "r2"}));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_401_is_terminal() {
    let h = Harness::logged_in(
        FakeTransport::new(|_| status(401, r#"{"detail":"Token is invalid or expired"}"#)),
        TokenPair::new(jwt_for(1), "r1"),
    );
    h.session.start_refresh();

    tokio::time::sleep(ONE_TICK).await;

    assert_eq!(h.stored(), None);
    assert!(h.storage.is_empty());
    assert!(!h.session.is_refreshing());

    tokio::time::sleep(ONE_TICK * 4).await;
    assert_eq!(refresh_count(&h), 1);
}

#[tokio::test(start_paused = true)]
async fn test_network_failure_keeps_session_and_timer() {
    let original = TokenPair::new(jwt_for(1), "r1");
    let h = Harness::logged_in(FakeTransport::new(|_| offline()), original.clone());
    h.session.start_refresh();

    tokio::time::sleep(ONE_TICK).await;

    assert_eq!(refresh_count(&h), 1);
    assert_eq!(h.stored(), Some(original));
    assert!(h.session.is_refreshing());

    // Recovers on the next tick
    h.transport
        .respond_with(|_| ok_json(json!({"access": jwt_for(1), "refresh": "r2"})));
    tokio::time::sleep(ONE_TICK).await;
    assert_eq!(refresh_count(&h), 2);
    assert_eq!(h.stored().map(|t| t.refresh).as_deref(), Some("r2"));
}

#[tokio::test]
async fn test_non_401_errors_are_transient() {
    let original = TokenPair::new(jwt_for(1), "r1");
    let responses = Arc::new(AtomicUsize::new(0));
    let counter = responses.clone();
    let h = Harness::logged_in(
        FakeTransport::new(move |_| match counter.fetch_add(1, Ordering::SeqCst) {
            0 => status(500, "<html>Server Error</html>"),
            1 => status(400, r#"{"refresh":["This field is required."]}"#),
            2 => status(503, ""),
            _ => ok_json(json!({"access": "only-access"})),
        }),
        original.clone(),
    );

    for _ in 0..4 {
        assert_eq!(h.session.refresh_now().await, RefreshOutcome::Transient);
        assert_eq!(h.stored(), Some(original.clone()));
    }
    assert_eq!(responses.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_refresh_now_without_session() {
    let h = Harness::new(FakeTransport::new(|_| offline()));
    assert_eq!(h.session.refresh_now().await, RefreshOutcome::NoSession);
    assert!(h.transport.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_loop_stops_when_session_disappears() {
    let h = Harness::logged_in(
        FakeTransport::new(|_| ok_json(json!({"access": jwt_for(1), "refresh": "r2"}))),
        TokenPair::new(jwt_for(1), "r1"),
    );
    h.session.start_refresh();

    // Another process cleared the shared storage
    h.session.credentials().clear();
    tokio::time::sleep(ONE_TICK).await;

    assert_eq!(refresh_count(&h), 0);
    assert!(!h.session.is_refreshing());
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_stop() {
    let h = Harness::logged_in(
        FakeTransport::new(|_| ok_json(json!({"access": jwt_for(1), "refresh": "r2"}))),
        TokenPair::new(jwt_for(1), "r1"),
    );

    assert!(h.session.start_refresh());
    h.session.stop_refresh();
    assert!(!h.session.is_refreshing());
    assert!(h.session.start_refresh());

    tokio::time::sleep(ONE_TICK).await;
    assert_eq!(refresh_count(&h), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_falls_back_to_default() {
    let transport = FakeTransport::new(|_| ok_json(json!({"access": jwt_for(1), "refresh": "r2"})));
    let api = ApiClient::new(transport.clone(), BASE_URL);
    let credentials = CredentialStore::new(Arc::new(MemoryStore::new()));
    credentials.save(&TokenPair::new(jwt_for(1), "r1"));
    let session = SessionManager::new(api, credentials, Duration::ZERO);

    assert_eq!(session.refresh_interval(), REFRESH_INTERVAL);
    assert!(session.start_refresh());

    tokio::time::sleep(ONE_TICK).await;
    assert!(session.is_refreshing());
    assert_eq!(transport.requests_to(TOKEN_REFRESH_PATH).len(), 1);
}

#[test]
fn test_start_outside_runtime_is_noop() {
    let h = Harness::logged_in(
        FakeTransport::new(|_| offline()),
        TokenPair::new(jwt_for(1), "r1"),
    );
    assert!(!h.session.start_refresh());
    assert!(!h.session.is_refreshing());
}
