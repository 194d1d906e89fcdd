//! The persisted session blob.

use paporeto_shared::constants::KEY_SESSION;
use paporeto_shared::models::Session;

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// The current session, if one is stored and readable.
    pub fn session(&self) -> Result<Option<Session>> {
        self.read_json(KEY_SESSION)
    }

    pub fn set_session(&self, session: &Session) -> Result<()> {
        self.write_json(KEY_SESSION, session)
    }

    pub fn clear_session(&self) -> Result<()> {
        self.remove_item(KEY_SESSION)?;
        Ok(())
    }
}
