use std::sync::Arc;

use paporeto_client::backend::{Backend, MemoryBackend, TABLE_USERS};
use paporeto_client::config::BackendConfig;
use paporeto_client::error::ClientError;
use paporeto_client::mode::{BackendResolver, Mode};
use paporeto_client::platform::{Headless, Platform};
use paporeto_client::PapoReto;
use paporeto_shared::constants::{DEFAULT_ACCENT, DEMO_USER_ID, LOGIN_PAGE};
use paporeto_shared::models::NewMessage;
use paporeto_shared::types::{ChatKind, SubscriptionKey};
use paporeto_store::Database;
use serde_json::json;

const ENDPOINT: &str = "https://abcd1234.supabase.co";

fn demo_app() -> (PapoReto, Arc<Headless>) {
    let (platform, host) = Platform::headless();
    let store = Arc::new(Database::open_in_memory().unwrap());
    let resolver = BackendResolver::with_rest(BackendConfig::default());
    (PapoReto::new(store, resolver, platform), host)
}

fn connected_app() -> (PapoReto, MemoryBackend, Arc<Headless>) {
    let backend = MemoryBackend::new();
    let client: Arc<dyn Backend> = Arc::new(backend.clone());
    let (platform, host) = Platform::headless();
    let store = Arc::new(Database::open_in_memory().unwrap());
    let resolver = BackendResolver::with_backend(BackendConfig::new(ENDPOINT, "anon"), client);
    (PapoReto::new(store, resolver, platform), backend, host)
}

#[tokio::test]
async fn demo_mode_serves_fixtures_and_local_groups() {
    let (app, _host) = demo_app();
    assert_eq!(app.mode(), Mode::Demo);

    let session = app.start_demo_session().unwrap();
    assert_eq!(session.id, DEMO_USER_ID);
    assert!(session.demo);

    let data = app.data();
    assert_eq!(data.get_users(&session.id).await.unwrap().len(), 6);
    assert_eq!(data.get_groups(&session.id).await.unwrap().len(), 3);
    assert!(app.realtime().subscribe_presence("u1", |_| {}).unwrap().is_none());
    assert_eq!(app.call_history().len(), 5);
}

#[test]
fn require_session_redirects_when_signed_out() {
    let (app, host) = demo_app();

    let err = app.require_session(None).unwrap_err();
    assert!(matches!(err, ClientError::NotAuthenticated { ref redirect } if redirect == LOGIN_PAGE));
    app.require_session(Some("index.html")).unwrap_err();
    assert_eq!(host.redirects(), [LOGIN_PAGE, "index.html"]);

    app.start_demo_session().unwrap();
    assert_eq!(app.require_session(None).unwrap().id, DEMO_USER_ID);
    assert_eq!(host.redirects().len(), 2);
}

#[test]
fn accent_colour_follows_preferences() {
    let (app, host) = demo_app();
    assert_eq!(host.style("--green").as_deref(), Some(DEFAULT_ACCENT));

    let mut patch = serde_json::Map::new();
    patch.insert("accent_color".into(), json!("#FF4757"));
    let prefs = app.update_preferences(patch).unwrap();
    assert_eq!(prefs.accent_color, "#FF4757");

    app.apply_accent_color(None).unwrap();
    assert_eq!(host.style("--green").as_deref(), Some("#FF4757"));
    assert_eq!(host.style("--green-glow").as_deref(), Some("rgba(255,71,87,0.2)"));

    assert!(matches!(
        app.apply_accent_color(Some("verde")),
        Err(ClientError::InvalidInput(_))
    ));
    assert_eq!(host.style("--green").as_deref(), Some("#FF4757"));
}

#[tokio::test]
async fn login_persists_session_with_profile() {
    let (app, backend, _host) = connected_app();
    assert_eq!(app.mode(), Mode::Connected);

    let id = backend.add_account("ana@paporeto.com", "segredo1");
    backend.seed(TABLE_USERS, vec![json!({ "id": id, "name": "Ana Cossa", "bio": "Olá" })]);

    let session = app.login("ana@paporeto.com", "segredo1").await.unwrap();
    assert_eq!(session.id, id);
    assert_eq!(session.name, "Ana Cossa");
    assert!(session.access_token.is_some());
    assert_eq!(app.session().unwrap(), Some(session));
}

#[tokio::test]
async fn failed_login_leaves_no_session() {
    let (app, backend, _host) = connected_app();
    backend.add_account("ana@paporeto.com", "segredo1");

    app.login("ana@paporeto.com", "errada").await.unwrap_err();
    assert!(app.session().unwrap().is_none());
}

#[tokio::test]
async fn logout_closes_channels_and_redirects() {
    let (app, backend, host) = connected_app();
    backend.add_account("ana@paporeto.com", "segredo1");
    let session = app.login("ana@paporeto.com", "segredo1").await.unwrap();

    app.realtime()
        .subscribe_messages(ChatKind::User, "u2", &session.id, |_| {})
        .unwrap();
    app.realtime().subscribe_typing("g1", &session.id, |_| {}).unwrap();
    assert!(app.realtime().is_subscribed(&SubscriptionKey::typing("g1")));
    assert_eq!(backend.active_channels(), 2);

    app.logout().await;

    assert_eq!(backend.active_channels(), 0);
    assert!(backend.signed_in_user().is_none());
    assert!(app.session().unwrap().is_none());
    assert_eq!(host.redirects(), [LOGIN_PAGE]);
}

#[tokio::test]
async fn connected_messages_round_trip() {
    let (app, _backend, _host) = connected_app();
    let data = app.data();

    let sent = data
        .send_message(NewMessage::direct("me", "u2", "Bom dia"))
        .await
        .unwrap();
    assert!(!sent.read);

    let thread = data.get_messages(ChatKind::User, "u2", "me").await.unwrap();
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].id, sent.id);

    // the other side sees the same thread
    let mirrored = data.get_messages(ChatKind::User, "me", "u2").await.unwrap();
    assert_eq!(mirrored.len(), 1);
}

#[test]
fn saved_credentials_do_not_switch_a_running_facade() {
    let (app, _host) = demo_app();
    app.configure_backend(ENDPOINT, "anon").unwrap();
    assert_eq!(app.mode(), Mode::Demo);

    let reloaded = BackendConfig::load(app.store()).unwrap();
    assert!(reloaded.is_configured());
    assert_ne!(app.storage_size().unwrap(), "0 B");
}
