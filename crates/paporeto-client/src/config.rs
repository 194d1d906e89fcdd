//! Backend credentials.
//!
//! Loaded in increasing precedence from the shipped placeholders, the
//! credentials saved in local storage (`pr_url` / `pr_key`) and the
//! environment (`PAPORETO_URL` / `PAPORETO_ANON_KEY`).

use paporeto_shared::constants::{
    MIN_ENDPOINT_LEN, PLACEHOLDER_ANON_KEY, PLACEHOLDER_MARKER, PLACEHOLDER_URL,
};
use paporeto_store::Database;

use crate::error::Result;

pub const ENV_URL: &str = "PAPORETO_URL";
pub const ENV_ANON_KEY: &str = "PAPORETO_ANON_KEY";

#[derive(Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Project endpoint, e.g. `https://abcd1234.supabase.co`.
    pub url: String,
    /// Public (anon) API key sent with every request.
    pub anon_key: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: PLACEHOLDER_URL.to_string(),
            anon_key: PLACEHOLDER_ANON_KEY.to_string(),
        }
    }
}

// The key is a credential; keep it out of logs.
impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("anon_key", &"<redacted>")
            .finish()
    }
}

impl BackendConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
        }
    }

    /// Stored credentials over the placeholders, then environment overrides.
    pub fn load(store: &Database) -> Result<Self> {
        let stored = store.credentials()?;
        let mut config = Self::default();
        if let Some(url) = stored.url {
            config.url = url;
        }
        if let Some(key) = stored.anon_key {
            config.anon_key = key;
        }
        Ok(config.with_env_overrides())
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(ENV_URL) {
            if !url.trim().is_empty() {
                self.url = url.trim().to_string();
            }
        }
        if let Ok(key) = std::env::var(ENV_ANON_KEY) {
            if !key.trim().is_empty() {
                self.anon_key = key.trim().to_string();
            }
        }
        self
    }

    /// Whether the endpoint looks like a real project.  Empty, placeholder
    /// and implausibly short endpoints mean demo mode.
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty()
            && !self.url.contains(PLACEHOLDER_MARKER)
            && self.url.len() >= MIN_ENDPOINT_LEN
    }

    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_endpoint_is_not_configured() {
        assert!(!BackendConfig::default().is_configured());
        assert!(!BackendConfig::new("https://SEU_PROJETO.supabase.co", "k").is_configured());
        assert!(!BackendConfig::new("", "k").is_configured());
        assert!(!BackendConfig::new("http://x.co", "k").is_configured());
    }

    #[test]
    fn real_endpoint_is_configured() {
        let config = BackendConfig::new("https://abcd1234.supabase.co/", "anon");
        assert!(config.is_configured());
        assert_eq!(config.base_url(), "https://abcd1234.supabase.co");
    }

    #[test]
    fn stored_credentials_replace_placeholders() {
        let db = Database::open_in_memory().unwrap();
        let config = BackendConfig::load(&db).unwrap();
        if std::env::var(ENV_URL).is_err() {
            assert_eq!(config.url, PLACEHOLDER_URL);
        }

        db.set_credentials("https://abcd1234.supabase.co", "anon").unwrap();
        let config = BackendConfig::load(&db).unwrap();
        if std::env::var(ENV_URL).is_err() {
            assert_eq!(config.url, "https://abcd1234.supabase.co");
            assert!(config.is_configured());
        }
    }

    #[test]
    fn debug_output_redacts_key() {
        let config = BackendConfig::new("https://abcd1234.supabase.co", "secret-key");
        assert!(!format!("{config:?}").contains("secret-key"));
    }
}
