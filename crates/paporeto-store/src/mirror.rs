//! Demo-mode mirrors of the entities that must survive a reload: groups,
//! statuses and the blocklist.  Each family is a JSON list under its own key,
//! updated by read-modify-write.

use chrono::{DateTime, Utc};
use paporeto_shared::constants::{KEY_BLOCKED, KEY_GROUPS, KEY_STATUSES};
use paporeto_shared::models::{BlockedUser, Group, Status};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::database::Database;
use crate::error::Result;

impl Database {
    fn read_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        Ok(self.read_json(key)?.unwrap_or_default())
    }

    fn modify_list<T, R>(&self, key: &str, f: impl FnOnce(&mut Vec<T>) -> R) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut list = self.read_list(key)?;
        let out = f(&mut list);
        self.write_json(key, &list)?;
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    pub fn demo_groups(&self) -> Result<Vec<Group>> {
        self.read_list(KEY_GROUPS)
    }

    pub fn push_demo_group(&self, group: &Group) -> Result<()> {
        self.modify_list(KEY_GROUPS, |groups: &mut Vec<Group>| groups.push(group.clone()))?;
        tracing::debug!(group = %group.id, "demo group stored");
        Ok(())
    }

    /// Returns `true` if a group was removed.
    pub fn remove_demo_group(&self, id: &str) -> Result<bool> {
        self.modify_list(KEY_GROUPS, |groups: &mut Vec<Group>| {
            let before = groups.len();
            groups.retain(|g| g.id != id);
            groups.len() != before
        })
    }

    // ------------------------------------------------------------------
    // Statuses
    // ------------------------------------------------------------------

    /// Stored statuses, newest first.
    pub fn demo_statuses(&self) -> Result<Vec<Status>> {
        self.read_list(KEY_STATUSES)
    }

    pub fn prepend_demo_status(&self, status: &Status) -> Result<()> {
        self.modify_list(KEY_STATUSES, |statuses: &mut Vec<Status>| {
            statuses.insert(0, status.clone())
        })
    }

    // ------------------------------------------------------------------
    // Blocklist
    // ------------------------------------------------------------------

    pub fn blocked_users(&self) -> Result<Vec<BlockedUser>> {
        self.read_list(KEY_BLOCKED)
    }

    /// Add `blocked_id` unless already present.  Returns `true` if added.
    pub fn add_blocked_user(&self, blocked_id: &str, at: DateTime<Utc>) -> Result<bool> {
        self.modify_list(KEY_BLOCKED, |list: &mut Vec<BlockedUser>| {
            if list.iter().any(|b| b.id == blocked_id) {
                false
            } else {
                list.push(BlockedUser {
                    id: blocked_id.to_string(),
                    blocked_at: at,
                });
                true
            }
        })
    }

    /// Returns `true` if an entry was removed.
    pub fn remove_blocked_user(&self, blocked_id: &str) -> Result<bool> {
        self.modify_list(KEY_BLOCKED, |list: &mut Vec<BlockedUser>| {
            let before = list.len();
            list.retain(|b| b.id != blocked_id);
            list.len() != before
        })
    }
}
