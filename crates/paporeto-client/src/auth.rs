//! Sign-up, sign-in, sign-out and password reset.  Every operation except
//! sign-out needs a live backend.

use std::sync::Arc;

use chrono::Utc;
use paporeto_shared::models::Profile;
use serde_json::json;
use tracing::{info, warn};

use crate::backend::{decode_first, AuthSession, Backend, Query, SignUpOutcome, TABLE_USERS};
use crate::error::{ClientError, Result};
use crate::mode::BackendResolver;

/// A successful sign-in with the user's profile row attached, when it could
/// be read.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub session: AuthSession,
    pub profile: Option<Profile>,
}

pub struct AuthFacade {
    resolver: Arc<BackendResolver>,
}

impl AuthFacade {
    pub fn new(resolver: Arc<BackendResolver>) -> Self {
        Self { resolver }
    }

    fn backend(&self) -> Result<Arc<dyn Backend>> {
        self.resolver.resolve().ok_or_else(|| {
            ClientError::Configuration("authentication requires a configured backend".into())
        })
    }

    /// Create an account, then upsert its profile row.  A failed upsert is
    /// returned as an error; the account is not rolled back.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
        phone: Option<&str>,
    ) -> Result<SignUpOutcome> {
        let backend = self.backend()?;
        let outcome = backend
            .sign_up(email, password, json!({ "name": name, "phone": phone }))
            .await?;

        if let Some(ref user) = outcome.user {
            let profile = json!({
                "id": user.id,
                "name": name,
                "email": email,
                "phone": phone,
                "created_at": Utc::now(),
            });
            backend.upsert(TABLE_USERS, vec![profile], &["id"]).await?;
            info!(user = %user.id, "account registered");
        }
        Ok(outcome)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        let backend = self.backend()?;
        let session = backend.sign_in_with_password(email, password).await?;

        let query = Query::table(TABLE_USERS)
            .eq("id", session.user.id.as_str())
            .limit(1);
        let profile = match backend.select(&query).await {
            Ok(rows) => decode_first::<Profile>(rows).unwrap_or_else(|e| {
                warn!(user = %session.user.id, error = %e, "profile row unreadable");
                None
            }),
            Err(e) => {
                warn!(user = %session.user.id, error = %e, "profile fetch failed");
                None
            }
        };

        info!(user = %session.user.id, "signed in");
        Ok(LoginOutcome { session, profile })
    }

    /// Remote sign-out.  Skipped without a backend; failures are logged.
    pub async fn logout(&self) {
        let Some(backend) = self.resolver.resolve() else {
            return;
        };
        match backend.sign_out().await {
            Ok(()) => info!("signed out"),
            Err(e) => warn!(error = %e, "remote sign-out failed"),
        }
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let backend = self.backend()?;
        backend.reset_password_for_email(email).await?;
        info!("password reset requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::BackendConfig;
    use crate::error::BackendError;

    fn facade(backend: &MemoryBackend) -> AuthFacade {
        let client: Arc<dyn Backend> = Arc::new(backend.clone());
        AuthFacade::new(Arc::new(BackendResolver::with_backend(
            BackendConfig::new("https://abcd1234.supabase.co", "anon"),
            client,
        )))
    }

    fn demo_facade() -> AuthFacade {
        AuthFacade::new(Arc::new(BackendResolver::with_rest(BackendConfig::default())))
    }

    #[tokio::test]
    async fn demo_mode_rejects_auth() {
        let auth = demo_facade();
        assert!(matches!(
            auth.register("a@b.c", "123456", "Ana", None).await,
            Err(ClientError::Configuration(_))
        ));
        assert!(matches!(auth.login("a@b.c", "123456").await, Err(ClientError::Configuration(_))));
        assert!(matches!(
            auth.request_password_reset("a@b.c").await,
            Err(ClientError::Configuration(_))
        ));
        auth.logout().await;
    }

    #[tokio::test]
    async fn register_upserts_profile_and_login_attaches_it() {
        let backend = MemoryBackend::new();
        let auth = facade(&backend);

        let outcome = auth
            .register("ana@paporeto.com", "segredo1", "Ana Cossa", Some("+258840000000"))
            .await
            .unwrap();
        let id = outcome.user.unwrap().id;
        let rows = backend.rows(TABLE_USERS);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], id.as_str());
        assert_eq!(rows[0]["name"], "Ana Cossa");

        let login = auth.login("ana@paporeto.com", "segredo1").await.unwrap();
        assert_eq!(login.session.user.id, id);
        assert_eq!(login.profile.unwrap().phone.as_deref(), Some("+258840000000"));
    }

    #[tokio::test]
    async fn failed_profile_upsert_surfaces_after_signup() {
        let backend = MemoryBackend::new();
        backend.reject_writes_to(TABLE_USERS);
        let auth = facade(&backend);

        let err = auth
            .register("ana@paporeto.com", "segredo1", "Ana", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Backend(BackendError::Api { status: 403, .. })));
        // the account exists without a profile
        assert!(auth.login("ana@paporeto.com", "segredo1").await.unwrap().profile.is_none());
    }

    #[tokio::test]
    async fn backend_rejections_pass_through() {
        let backend = MemoryBackend::new();
        let auth = facade(&backend);
        let err = auth.login("nobody@paporeto.com", "x").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Backend error: Invalid login credentials (status 400)"
        );

        auth.request_password_reset("ana@paporeto.com").await.unwrap();
        assert_eq!(backend.password_resets(), ["ana@paporeto.com"]);
    }
}
