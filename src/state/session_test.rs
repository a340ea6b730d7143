use super::*;
use crate::net::types::{LoginCredentials, RegistrationDetails};
use crate::util::persistence::MemoryPersistence;
use serde_json::{Value, json};
use std::collections::VecDeque;
use tokio::sync::{Notify, oneshot};

// =========================================================================
// Mocks
// =========================================================================

/// Replays canned responses in order and records every call.
#[derive(Default)]
struct MockApi {
    responses: Mutex<VecDeque<Result<Value, AuthError>>>,
    calls: Mutex<Vec<(String, Option<Value>)>>,
}

impl MockApi {
    fn new(responses: Vec<Result<Value, AuthError>>) -> Self {
        Self { responses: Mutex::new(responses.into()), calls: Mutex::new(Vec::new()) }
    }

    fn next(&self) -> Result<Value, AuthError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::Transport("no canned response".into())))
    }

    fn calls(&self) -> Vec<(String, Option<Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AuthApi for MockApi {
    async fn post_data(&self, endpoint: &str, payload: &Value) -> Result<Value, AuthError> {
        self.calls.lock().unwrap().push((endpoint.to_owned(), Some(payload.clone())));
        self.next()
    }

    async fn get_data(&self, endpoint: &str) -> Result<Value, AuthError> {
        self.calls.lock().unwrap().push((endpoint.to_owned(), None));
        self.next()
    }
}

/// Holds a single request open until the test releases it.
struct PendingApi {
    seen: Notify,
    release: Mutex<Option<oneshot::Receiver<Result<Value, AuthError>>>>,
}

impl PendingApi {
    fn new(release: oneshot::Receiver<Result<Value, AuthError>>) -> Self {
        Self { seen: Notify::new(), release: Mutex::new(Some(release)) }
    }

    async fn wait(&self) -> Result<Value, AuthError> {
        let release = self.release.lock().unwrap().take().expect("only one pending request per test");
        self.seen.notify_one();
        release
            .await
            .unwrap_or_else(|_| Err(AuthError::Transport("released without response".into())))
    }
}

#[async_trait::async_trait]
impl AuthApi for PendingApi {
    async fn post_data(&self, _endpoint: &str, _payload: &Value) -> Result<Value, AuthError> {
        self.wait().await
    }

    async fn get_data(&self, _endpoint: &str) -> Result<Value, AuthError> {
        self.wait().await
    }
}

#[derive(Default)]
struct RecordingNavigator {
    paths: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate_to(&self, path: &str) {
        self.paths.lock().unwrap().push(path.to_owned());
    }
}

// =========================================================================
// Helpers
// =========================================================================

struct Harness {
    store: Arc<SessionStore>,
    persistence: Arc<MemoryPersistence>,
    navigator: Arc<RecordingNavigator>,
}

fn harness_with(api: Arc<dyn AuthApi>, persistence: MemoryPersistence) -> Harness {
    let persistence = Arc::new(persistence);
    let navigator = Arc::new(RecordingNavigator::default());
    let store = Arc::new(SessionStore::new(persistence.clone(), api, navigator.clone()));
    Harness { store, persistence, navigator }
}

fn harness(api: Arc<dyn AuthApi>) -> Harness {
    harness_with(api, MemoryPersistence::new())
}

fn user(value: Value) -> User {
    serde_json::from_value(value).unwrap()
}

fn raw_user(value: Value) -> RawUser {
    serde_json::from_value(value).unwrap()
}

fn credentials() -> LoginCredentials {
    LoginCredentials { email: "a@example.com".to_owned(), password: "secret1".to_owned() }
}

fn logged_in_harness(api: Arc<dyn AuthApi>) -> Harness {
    harness_with(api, MemoryPersistence::with_session(Some("old".into()), Some(user(json!({"id": 9, "name": "Old"})))))
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// =========================================================================
// is_logged_in
// =========================================================================

#[test]
fn is_logged_in_requires_token_and_user() {
    let u = user(json!({"id": 1}));
    let cases = [
        (None, None, false),
        (Some("abc".to_owned()), None, false),
        (None, Some(u.clone()), false),
        (Some("abc".to_owned()), Some(u), true),
    ];
    for (token, user, expected) in cases {
        let session = Session { token, user };
        assert_eq!(session.is_logged_in(), expected, "{session:?}");
    }
}

#[test]
fn is_logged_in_treats_empty_values_as_absent() {
    let empty_token = Session { token: Some(String::new()), user: Some(user(json!({"id": 1}))) };
    assert!(!empty_token.is_logged_in());
    let empty_user = Session { token: Some("abc".into()), user: Some(User::default()) };
    assert!(!empty_user.is_logged_in());
}

#[test]
fn is_logged_in_tracks_each_mutation() {
    let h = harness(Arc::new(MockApi::default()));
    assert!(!h.store.is_logged_in());
    h.store.set_token(Some("abc".into()));
    assert!(!h.store.is_logged_in());
    h.store.set_user(Some(user(json!({"id": 1}))));
    assert!(h.store.is_logged_in());
    h.store.set_token(None);
    assert!(!h.store.is_logged_in());
}

// =========================================================================
// Startup and primitives
// =========================================================================

#[test]
fn new_restores_session_from_persistence() {
    let h = logged_in_harness(Arc::new(MockApi::default()));
    assert_eq!(h.store.token().as_deref(), Some("old"));
    assert_eq!(h.store.user(), Some(user(json!({"id": 9, "name": "Old"}))));
    assert!(h.store.is_logged_in());
}

#[test]
fn new_restores_partial_session() {
    let h = harness_with(Arc::new(MockApi::default()), MemoryPersistence::with_session(Some("t".into()), None));
    assert_eq!(h.store.token().as_deref(), Some("t"));
    assert!(h.store.user().is_none());
    assert!(!h.store.is_logged_in());
}

#[test]
fn set_token_and_set_user_write_through() {
    let h = harness(Arc::new(MockApi::default()));
    h.store.set_token(Some("abc".into()));
    h.store.set_user(Some(user(json!({"id": 1}))));
    assert_eq!(h.persistence.read_token().as_deref(), Some("abc"));
    assert_eq!(h.persistence.read_user(), Some(user(json!({"id": 1}))));

    h.store.set_user(None);
    assert!(h.persistence.read_user().is_none());
}

#[test]
fn clear_auth_empties_memory_and_storage() {
    let h = logged_in_harness(Arc::new(MockApi::default()));
    h.store.clear_auth();
    assert_eq!(h.store.snapshot(), Session::default());
    assert!(h.persistence.read_token().is_none());
    assert!(h.persistence.read_user().is_none());
}

#[test]
fn clear_auth_on_empty_session_is_quiet() {
    let h = harness(Arc::new(MockApi::default()));
    let mut rx = h.store.subscribe();
    h.store.clear_auth();
    h.store.clear_auth();
    assert_eq!(h.store.snapshot(), Session::default());
    assert!(drain(&mut rx).is_empty());
}

// =========================================================================
// apply_auth_payload
// =========================================================================

#[test]
fn apply_auth_payload_strips_roles_without_touching_source() {
    let h = harness(Arc::new(MockApi::default()));
    let payload = AuthPayload {
        token: Some("abc".into()),
        user: Some(raw_user(json!({"id": 1, "name": "A", "roles": ["admin"]}))),
    };
    let before = payload.clone();

    h.store.apply_auth_payload(&payload);

    assert_eq!(payload, before);
    assert_eq!(h.store.user(), Some(user(json!({"id": 1, "name": "A"}))));
    assert!(h.store.user().unwrap().get("roles").is_none());
}

#[test]
fn apply_auth_payload_writes_token_before_user() {
    let h = harness(Arc::new(MockApi::default()));
    let mut rx = h.store.subscribe();
    let payload = AuthPayload { token: Some("abc".into()), user: Some(raw_user(json!({"id": 1}))) };

    h.store.apply_auth_payload(&payload);

    assert_eq!(drain(&mut rx), vec![SessionEvent::TokenChanged, SessionEvent::UserChanged]);
}

#[test]
fn apply_auth_payload_with_missing_fields_clears_them() {
    let h = logged_in_harness(Arc::new(MockApi::default()));
    h.store.apply_auth_payload(&AuthPayload::default());
    assert!(h.store.token().is_none());
    assert!(h.store.user().is_none());
    assert!(h.persistence.read_token().is_none());
}

// =========================================================================
// login / register
// =========================================================================

#[tokio::test]
async fn login_commits_stripped_session() {
    let api = Arc::new(MockApi::new(vec![Ok(json!({
        "token": "abc",
        "user": {"id": 1, "name": "A", "roles": ["admin"]}
    }))]));
    let h = harness(api.clone());

    let session = h.store.login(&credentials()).await.unwrap();

    let expected = user(json!({"id": 1, "name": "A"}));
    assert_eq!(session, Session { token: Some("abc".into()), user: Some(expected.clone()) });
    assert_eq!(h.store.token().as_deref(), Some("abc"));
    assert_eq!(h.store.user(), Some(expected.clone()));
    assert!(h.store.is_logged_in());
    assert_eq!(h.persistence.read_token().as_deref(), Some("abc"));
    assert_eq!(h.persistence.read_user(), Some(expected));
    assert_eq!(serde_json::to_value(h.persistence.read_user()).unwrap(), json!({"id": 1, "name": "A"}));

    let calls = api.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "auth/login");
    assert_eq!(calls[0].1, Some(json!({"email": "a@example.com", "password": "secret1"})));
}

#[tokio::test]
async fn login_without_roles_keeps_user_intact() {
    let server_user = json!({"id": 2, "name": "B", "email": "b@example.com", "phone": "01234567890"});
    let api = Arc::new(MockApi::new(vec![Ok(json!({"token": "t2", "user": server_user.clone()}))]));
    let h = harness(api);

    h.store.login(&credentials()).await.unwrap();

    assert_eq!(serde_json::to_value(h.store.user().unwrap()).unwrap(), server_user);
}

#[tokio::test]
async fn login_accepts_any_serializable_payload() {
    let api = Arc::new(MockApi::new(vec![Ok(json!({"token": "abc", "user": {"id": 1}}))]));
    let h = harness(api.clone());

    h.store.login(&json!({"username": "a", "otp": "123456"})).await.unwrap();

    assert_eq!(api.calls()[0].1, Some(json!({"username": "a", "otp": "123456"})));
}

#[tokio::test]
async fn login_transport_failure_leaves_session_untouched() {
    let api = Arc::new(MockApi::new(vec![Err(AuthError::Transport("connection reset".into()))]));
    let h = logged_in_harness(api);
    let before = h.store.snapshot();
    let mut rx = h.store.subscribe();

    let err = h.store.login(&credentials()).await.unwrap_err();

    assert_eq!(err, AuthError::Transport("connection reset".into()));
    assert_eq!(h.store.snapshot(), before);
    assert_eq!(h.persistence.read_token().as_deref(), Some("old"));
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn login_rejection_is_returned_unmodified() {
    let rejection = AuthError::Rejected { status: 401, message: "Invalid credentials".into() };
    let api = Arc::new(MockApi::new(vec![Err(rejection.clone())]));
    let h = harness(api);

    assert_eq!(h.store.login(&credentials()).await.unwrap_err(), rejection);
    assert_eq!(h.store.snapshot(), Session::default());
}

#[tokio::test]
async fn login_malformed_response_leaves_session_untouched() {
    let api = Arc::new(MockApi::new(vec![Ok(json!({"user": {"id": 1}}))]));
    let h = logged_in_harness(api);
    let before = h.store.snapshot();

    let err = h.store.login(&credentials()).await.unwrap_err();

    assert!(matches!(err, AuthError::Malformed(_)));
    assert_eq!(h.store.snapshot(), before);
}

#[tokio::test]
async fn register_uses_signup_endpoint() {
    let api = Arc::new(MockApi::new(vec![Ok(json!({
        "token": "new",
        "user": {"id": 3, "name": "C", "roles": ["user"]}
    }))]));
    let h = harness(api.clone());
    let details = RegistrationDetails {
        name: "C".to_owned(),
        email: "c@example.com".to_owned(),
        phone: "01234567890".to_owned(),
        address: "1 Main St".to_owned(),
        password: "secret1".to_owned(),
        confirm_password: "secret1".to_owned(),
        terms: "agree".to_owned(),
    };

    h.store.register(&details).await.unwrap();

    assert_eq!(api.calls()[0].0, "auth/signup");
    assert_eq!(h.store.token().as_deref(), Some("new"));
    assert_eq!(h.store.user(), Some(user(json!({"id": 3, "name": "C"}))));
}

#[tokio::test]
async fn register_failure_leaves_session_untouched() {
    let api = Arc::new(MockApi::new(vec![Err(AuthError::Rejected { status: 422, message: "Email taken".into() })]));
    let h = harness(api);

    let err = h.store.register(&json!({"email": "c@example.com"})).await.unwrap_err();

    assert_eq!(err.error_code(), "E_REJECTED");
    assert_eq!(h.store.snapshot(), Session::default());
}

// =========================================================================
// refresh_profile
// =========================================================================

#[tokio::test]
async fn refresh_profile_persists_stripped_user_and_keeps_token() {
    let api = Arc::new(MockApi::new(vec![Ok(json!({"id": 9, "name": "New", "roles": ["admin"]}))]));
    let h = logged_in_harness(api.clone());
    let mut rx = h.store.subscribe();

    let refreshed = h.store.refresh_profile().await.unwrap();

    let expected = user(json!({"id": 9, "name": "New"}));
    assert_eq!(refreshed, expected);
    assert_eq!(h.store.user(), Some(expected.clone()));
    assert_eq!(h.persistence.read_user(), Some(expected));
    assert_eq!(h.store.token().as_deref(), Some("old"));
    assert_eq!(api.calls(), vec![("auth/profile".to_owned(), None)]);
    assert_eq!(drain(&mut rx), vec![SessionEvent::UserChanged]);
}

#[tokio::test]
async fn refresh_profile_failure_keeps_previous_user() {
    let api = Arc::new(MockApi::new(vec![Err(AuthError::Rejected { status: 401, message: "expired".into() })]));
    let h = logged_in_harness(api);
    let before = h.store.snapshot();

    assert!(h.store.refresh_profile().await.is_err());
    assert_eq!(h.store.snapshot(), before);
}

#[tokio::test]
async fn refresh_profile_non_object_is_malformed() {
    let api = Arc::new(MockApi::new(vec![Ok(json!(null))]));
    let h = logged_in_harness(api);

    let err = h.store.refresh_profile().await.unwrap_err();

    assert!(matches!(err, AuthError::Malformed(_)));
    assert!(h.store.is_logged_in());
}

// =========================================================================
// logout
// =========================================================================

#[test]
fn logout_clears_and_routes_to_login() {
    let h = logged_in_harness(Arc::new(MockApi::default()));
    h.store.logout();
    assert_eq!(h.store.snapshot(), Session::default());
    assert!(h.persistence.read_token().is_none());
    assert!(h.persistence.read_user().is_none());
    assert_eq!(h.navigator.paths(), vec!["/login".to_owned()]);
}

#[test]
fn logout_on_empty_session_still_navigates_once() {
    let h = harness(Arc::new(MockApi::default()));
    h.store.logout();
    assert_eq!(h.store.snapshot(), Session::default());
    assert_eq!(h.navigator.paths(), vec!["/login".to_owned()]);
}

#[test]
fn logout_makes_no_server_call() {
    let api = Arc::new(MockApi::default());
    let h = logged_in_harness(api.clone());
    h.store.logout();
    assert!(api.calls().is_empty());
}

// =========================================================================
// Stale completions
// =========================================================================

#[tokio::test]
async fn logout_during_pending_login_discards_stale_response() {
    let (release, pending) = oneshot::channel();
    let api = Arc::new(PendingApi::new(pending));
    let h = harness(api.clone());

    let task = tokio::spawn({
        let store = h.store.clone();
        async move { store.login(&credentials()).await }
    });
    api.seen.notified().await;

    h.store.logout();
    release.send(Ok(json!({"token": "abc", "user": {"id": 1}}))).unwrap();
    let result = task.await.unwrap();

    assert_eq!(result.unwrap_err(), AuthError::Superseded);
    assert_eq!(h.store.snapshot(), Session::default());
    assert!(!h.store.is_logged_in());
    assert!(h.persistence.read_token().is_none());
    assert!(h.persistence.read_user().is_none());
    assert_eq!(h.navigator.paths(), vec!["/login".to_owned()]);
}

#[tokio::test]
async fn logout_during_pending_refresh_discards_stale_profile() {
    let (release, pending) = oneshot::channel();
    let api = Arc::new(PendingApi::new(pending));
    let h = logged_in_harness(api.clone());

    let task = tokio::spawn({
        let store = h.store.clone();
        async move { store.refresh_profile().await }
    });
    api.seen.notified().await;

    h.store.logout();
    release.send(Ok(json!({"id": 9, "name": "Resurrected"}))).unwrap();

    assert_eq!(task.await.unwrap().unwrap_err(), AuthError::Superseded);
    assert!(h.store.user().is_none());
    assert!(h.persistence.read_user().is_none());
}

#[tokio::test]
async fn pending_login_commits_when_nothing_intervenes() {
    let (release, pending) = oneshot::channel();
    let api = Arc::new(PendingApi::new(pending));
    let h = harness(api.clone());

    let task = tokio::spawn({
        let store = h.store.clone();
        async move { store.login(&credentials()).await }
    });
    api.seen.notified().await;
    assert!(!h.store.is_logged_in());

    release.send(Ok(json!({"token": "abc", "user": {"id": 1}}))).unwrap();
    task.await.unwrap().unwrap();

    assert!(h.store.is_logged_in());
}
