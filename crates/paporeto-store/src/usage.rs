//! Local storage usage accounting.

use paporeto_shared::constants::STORAGE_PREFIX;
use paporeto_shared::format::bytes_human;

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Bytes held by application values, counted as two bytes per UTF-16
    /// code unit the way browser storage quotas count them.
    pub fn storage_usage_bytes(&self) -> Result<u64> {
        Ok(self
            .items_with_prefix(STORAGE_PREFIX)?
            .iter()
            .map(|(_, value)| value.encode_utf16().count() as u64 * 2)
            .sum())
    }

    /// [`Self::storage_usage_bytes`] rendered for display.
    pub fn storage_size(&self) -> Result<String> {
        Ok(bytes_human(self.storage_usage_bytes()?))
    }
}
