//! # paporeto-client
//!
//! Service layer of the PapoReto messenger.
//!
//! [`PapoReto`] wires the pieces together: the local store, the backend mode
//! resolver, authentication, entity data access (connected or demo), the
//! realtime subscription registry, notifications and the host platform
//! seams.  The mode is decided once, when the facade is built, from the
//! configured endpoint.

pub mod auth;
pub mod backend;
pub mod config;
pub mod data;
pub mod error;
pub mod mode;
pub mod notify;
pub mod platform;
pub mod realtime;

use std::path::Path;
use std::sync::{Arc, OnceLock};

use paporeto_shared::constants::{DEMO_EMAIL, DEMO_USER_ID, DEMO_USER_NAME, LOGIN_PAGE};
use paporeto_shared::models::{CallRecord, Session};
use paporeto_shared::theme::accent_variables;
use paporeto_store::{Database, Preferences};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::auth::AuthFacade;
use crate::backend::{Backend, RestBackend};
use crate::config::BackendConfig;
use crate::data::{ConnectedData, DataAccess, DemoData};
use crate::error::{ClientError, Result};
use crate::mode::{BackendResolver, Mode};
use crate::notify::NotificationBridge;
use crate::platform::Platform;
use crate::realtime::SubscriptionRegistry;

pub use crate::error::BackendError;

pub struct PapoReto {
    store: Arc<Database>,
    resolver: Arc<BackendResolver>,
    platform: Platform,
    auth: AuthFacade,
    realtime: SubscriptionRegistry,
    notifications: NotificationBridge,
    demo: Arc<DemoData>,
    connected: OnceLock<Arc<ConnectedData>>,
}

impl PapoReto {
    /// Build the facade and apply the stored accent colour.
    pub fn new(store: Arc<Database>, resolver: BackendResolver, platform: Platform) -> Self {
        let resolver = Arc::new(resolver);
        let app = Self {
            auth: AuthFacade::new(Arc::clone(&resolver)),
            realtime: SubscriptionRegistry::new(Arc::clone(&resolver)),
            notifications: NotificationBridge::new(Arc::clone(&store), platform.clone()),
            demo: Arc::new(DemoData::new(Arc::clone(&store))),
            connected: OnceLock::new(),
            store,
            resolver,
            platform,
        };
        if let Err(e) = app.apply_accent_color(None) {
            warn!(error = %e, "stored accent colour not applied");
        }
        app
    }

    /// Open the store at `path` and talk HTTP to the configured backend,
    /// resuming the stored session's token.
    pub fn open_at(path: &Path, platform: Platform) -> Result<Self> {
        Self::open(Arc::new(Database::open_at(path)?), platform)
    }

    /// Open the store in the platform data directory.
    pub fn open_default(platform: Platform) -> Result<Self> {
        Self::open(Arc::new(Database::new()?), platform)
    }

    fn open(store: Arc<Database>, platform: Platform) -> Result<Self> {
        let config = BackendConfig::load(&store)?;
        info!(?config, "configuration loaded");
        let token = store.session()?.and_then(|s| s.access_token);
        let resolver = BackendResolver::new(config, move |config| {
            let client = RestBackend::new(config)?.with_access_token(token.clone());
            Ok(Arc::new(client) as Arc<dyn Backend>)
        });
        Ok(Self::new(store, resolver, platform))
    }

    pub fn mode(&self) -> Mode {
        self.resolver.mode()
    }

    pub fn store(&self) -> &Arc<Database> {
        &self.store
    }

    /// Entity operations for the current call: connected when the backend
    /// client is available, demo otherwise.
    pub fn data(&self) -> Arc<dyn DataAccess> {
        match self.resolver.resolve() {
            Some(backend) => {
                let connected = self
                    .connected
                    .get_or_init(|| Arc::new(ConnectedData::new(backend)));
                Arc::clone(connected) as Arc<dyn DataAccess>
            }
            None => Arc::clone(&self.demo) as Arc<dyn DataAccess>,
        }
    }

    pub fn auth(&self) -> &AuthFacade {
        &self.auth
    }

    pub fn realtime(&self) -> &SubscriptionRegistry {
        &self.realtime
    }

    pub fn notifications(&self) -> &NotificationBridge {
        &self.notifications
    }

    // -- session ------------------------------------------------------------

    pub fn session(&self) -> Result<Option<Session>> {
        Ok(self.store.session()?)
    }

    pub fn set_session(&self, session: &Session) -> Result<()> {
        Ok(self.store.set_session(session)?)
    }

    pub fn clear_session(&self) -> Result<()> {
        Ok(self.store.clear_session()?)
    }

    /// The current session, or a redirect to `redirect` (the login page by
    /// default) and [`ClientError::NotAuthenticated`].
    pub fn require_session(&self, redirect: Option<&str>) -> Result<Session> {
        match self.store.session()? {
            Some(session) if !session.id.is_empty() => Ok(session),
            _ => {
                let target = redirect.unwrap_or(LOGIN_PAGE);
                self.platform.navigator.redirect(target);
                Err(ClientError::NotAuthenticated {
                    redirect: target.to_string(),
                })
            }
        }
    }

    /// Sign in and persist the resulting session.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let outcome = self.auth.login(email, password).await?;
        let token = Some(outcome.session.access_token.clone());
        let session = match outcome.profile {
            Some(ref profile) => Session::from_profile(profile, token),
            None => Session {
                id: outcome.session.user.id.clone(),
                email: outcome.session.user.email.clone(),
                access_token: token,
                ..Session::default()
            },
        };
        self.store.set_session(&session)?;
        Ok(session)
    }

    /// Close every channel, sign out remotely when possible, clear the local
    /// session and send the user to the login page.  Never fails.
    pub async fn logout(&self) {
        self.realtime.unsubscribe_all();
        self.auth.logout().await;
        if let Err(e) = self.store.clear_session() {
            warn!(error = %e, "session not cleared");
        }
        self.platform.navigator.redirect(LOGIN_PAGE);
    }

    /// Store and return the local demo identity.
    pub fn start_demo_session(&self) -> Result<Session> {
        let session = Session {
            id: DEMO_USER_ID.to_string(),
            name: DEMO_USER_NAME.to_string(),
            email: Some(DEMO_EMAIL.to_string()),
            demo: true,
            ..Session::default()
        };
        self.store.set_session(&session)?;
        info!("demo session started");
        Ok(session)
    }

    // -- preferences and configuration ----------------------------------------

    pub fn preferences(&self) -> Result<Preferences> {
        Ok(self.store.preferences()?)
    }

    /// Merge `patch` over the stored preferences.
    pub fn update_preferences(&self, patch: Map<String, Value>) -> Result<Preferences> {
        Ok(self.store.update_preferences(patch)?)
    }

    pub fn preference(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.store.preference(key)?)
    }

    pub fn set_preference(&self, key: &str, value: Value) -> Result<()> {
        Ok(self.store.set_preference(key, value)?)
    }

    /// Save backend credentials.  They take effect on the next start; the
    /// mode of a running facade never changes.
    pub fn configure_backend(&self, url: &str, anon_key: &str) -> Result<()> {
        self.store.set_credentials(url, anon_key)?;
        info!(url, "backend credentials saved");
        Ok(())
    }

    // -- misc -------------------------------------------------------------------

    pub fn call_history(&self) -> Vec<CallRecord> {
        data::fixtures::call_history()
    }

    /// Space used by the application's local keys, e.g. `1.2 KB`.
    pub fn storage_size(&self) -> Result<String> {
        Ok(self.store.storage_size()?)
    }

    /// Push the accent colour and its derived shades to the style sink.
    /// `None` uses the stored preference.
    pub fn apply_accent_color(&self, color: Option<&str>) -> Result<()> {
        let color = match color {
            Some(c) => c.to_string(),
            None => self.store.preferences()?.accent_color,
        };
        let variables = accent_variables(&color)
            .map_err(|e| ClientError::InvalidInput(e.to_string()))?;
        for (name, value) in variables {
            self.platform.style.set_property(name, &value);
        }
        Ok(())
    }
}
