//! Entity operations over users, messages, groups, statuses, reactions, the
//! blocklist and media.
//!
//! [`DataAccess`] has one implementation per mode: [`ConnectedData`] talks
//! to the backend and propagates its errors unchanged, [`DemoData`] serves
//! the fixtures and the local mirrors.  Best-effort signals (presence, read
//! marks, message edits) are silent no-ops in demo mode.

pub mod connected;
pub mod demo;
pub mod fixtures;

use async_trait::async_trait;
use bytes::Bytes;
use paporeto_shared::format::{initials, str_color};
use paporeto_shared::models::{
    BlockedUser, Group, Message, MessageUpdate, NewGroup, NewMessage, NewStatus, Profile,
    ProfileUpdate, Status,
};
use paporeto_shared::types::ChatKind;

use crate::error::Result;

pub use connected::ConnectedData;
pub use demo::DemoData;

#[async_trait]
pub trait DataAccess: Send + Sync {
    // -- users --------------------------------------------------------------

    /// Every user except `exclude_id`, with avatar initials and colour.
    async fn get_users(&self, exclude_id: &str) -> Result<Vec<Profile>>;

    async fn get_user(&self, id: &str) -> Result<Option<Profile>>;

    async fn update_user(&self, id: &str, update: &ProfileUpdate) -> Result<Profile>;

    async fn update_presence(&self, id: &str, online: bool) -> Result<()>;

    // -- messages -----------------------------------------------------------

    /// A conversation in creation order, reactions included.
    async fn get_messages(&self, kind: ChatKind, chat_id: &str, self_id: &str) -> Result<Vec<Message>>;

    async fn send_message(&self, message: NewMessage) -> Result<Message>;

    async fn update_message(&self, id: &str, update: &MessageUpdate) -> Result<Option<Message>>;

    async fn delete_message(&self, id: &str) -> Result<()>;

    /// Direct chats flip the shared `read` flag on the peer's unread
    /// messages; group chats write one receipt per message for `self_id`.
    async fn mark_read(&self, kind: ChatKind, chat_id: &str, self_id: &str) -> Result<()>;

    // -- groups -------------------------------------------------------------

    async fn get_groups(&self, user_id: &str) -> Result<Vec<Group>>;

    /// Create a group; the creator is always a member, with the admin role.
    async fn create_group(&self, group: NewGroup, creator_id: &str, member_ids: &[String]) -> Result<Group>;

    async fn delete_group(&self, id: &str) -> Result<()>;

    // -- statuses -----------------------------------------------------------

    async fn get_statuses(&self) -> Result<Vec<Status>>;

    async fn create_status(&self, status: NewStatus) -> Result<Status>;

    async fn mark_status_seen(&self, status_id: &str, viewer_id: &str) -> Result<()>;

    // -- reactions ----------------------------------------------------------

    /// Add the reaction if absent, remove it otherwise.  `true` means added.
    async fn toggle_reaction(&self, message_id: &str, user_id: &str, emoji: &str) -> Result<bool>;

    // -- blocklist ----------------------------------------------------------

    async fn block_user(&self, user_id: &str, blocked_id: &str) -> Result<()>;

    async fn unblock_user(&self, user_id: &str, blocked_id: &str) -> Result<()>;

    async fn get_blocked(&self, user_id: &str) -> Result<Vec<BlockedUser>>;

    // -- media --------------------------------------------------------------

    /// Store a file and return the URL it can be fetched from.
    async fn upload_media(
        &self,
        session_id: &str,
        file_name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String>;
}

/// Fill in the presentation fields of a listed profile.
pub(crate) fn decorate(mut profile: Profile) -> Profile {
    profile.initials = Some(initials(&profile.name));
    profile.color = Some(str_color(&profile.id).to_string());
    profile
}

/// Text after the last `.`, or the whole name when there is none.
pub(crate) fn file_extension(file_name: &str) -> &str {
    file_name.rsplit('.').next().unwrap_or(file_name)
}

/// Storage path for an upload: `<session>/<millis>.<ext>`.
pub(crate) fn media_path(session_id: &str, file_name: &str, millis: i64) -> String {
    format!("{session_id}/{millis}.{}", file_extension(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_paths_keep_the_extension() {
        assert_eq!(media_path("u1", "foto.final.jpg", 1700000000000), "u1/1700000000000.jpg");
        assert_eq!(media_path("u1", "README", 5), "u1/5.README");
        assert_eq!(file_extension("voice.ogg"), "ogg");
    }

    #[test]
    fn decorate_sets_initials_and_colour() {
        let profile = decorate(Profile {
            id: "u9".into(),
            name: "Lina Matsinhe".into(),
            ..Profile::default()
        });
        assert_eq!(profile.initials.as_deref(), Some("LM"));
        assert_eq!(profile.color.as_deref(), Some(str_color("u9")));
    }
}
