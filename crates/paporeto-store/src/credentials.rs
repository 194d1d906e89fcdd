//! Backend endpoint and access key saved from the settings screen.

use paporeto_shared::constants::{KEY_ANON_KEY, KEY_URL};

use crate::database::Database;
use crate::error::Result;

/// Stored backend credentials.  Either value may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredCredentials {
    pub url: Option<String>,
    pub anon_key: Option<String>,
}

impl Database {
    pub fn credentials(&self) -> Result<StoredCredentials> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Ok(StoredCredentials {
            url: non_empty(self.get_item(KEY_URL)?),
            anon_key: non_empty(self.get_item(KEY_ANON_KEY)?),
        })
    }

    pub fn set_credentials(&self, url: &str, anon_key: &str) -> Result<()> {
        self.set_item(KEY_URL, url.trim())?;
        self.set_item(KEY_ANON_KEY, anon_key.trim())?;
        tracing::info!(url = %url.trim(), "backend credentials saved");
        Ok(())
    }

    pub fn clear_credentials(&self) -> Result<()> {
        self.remove_item(KEY_URL)?;
        self.remove_item(KEY_ANON_KEY)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_absent() {
        let db = Database::open_in_memory().unwrap();
        db.set_item(KEY_URL, "  ").unwrap();
        assert_eq!(db.credentials().unwrap(), StoredCredentials::default());

        db.set_credentials(" https://abcd1234.supabase.co ", "key").unwrap();
        let creds = db.credentials().unwrap();
        assert_eq!(creds.url.as_deref(), Some("https://abcd1234.supabase.co"));
        assert_eq!(creds.anon_key.as_deref(), Some("key"));

        db.clear_credentials().unwrap();
        assert_eq!(db.credentials().unwrap(), StoredCredentials::default());
    }
}
