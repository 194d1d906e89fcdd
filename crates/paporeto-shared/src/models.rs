//! Records exchanged with the backend and mirrored in demo mode.
//!
//! Every struct derives `Serialize` and `Deserialize` with the backend's
//! column names, so rows decode directly from the table API and the same
//! structs are written into local storage in demo mode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::ChatKind;

/// Decode an explicit `null` column as the type's default value.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// A user profile row (`users` table).
///
/// `initials` and `color` are presentation fields filled in when listing
/// contacts; they are never written back to the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Profile {
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initials: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Partial profile update. Unset fields are left untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
}

/// The locally persisted authenticated identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Session {
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default)]
    pub demo: bool,
}

impl Session {
    pub fn from_profile(profile: &Profile, access_token: Option<String>) -> Self {
        Self {
            id: profile.id.clone(),
            name: profile.name.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            bio: profile.bio.clone(),
            profile_url: profile.profile_url.clone(),
            access_token,
            demo: false,
        }
    }

    /// Merge a partial profile update into the session.
    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(ref name) = update.name {
            self.name = name.clone();
        }
        if update.phone.is_some() {
            self.phone = update.phone.clone();
        }
        if update.bio.is_some() {
            self.bio = update.bio.clone();
        }
        if update.profile_url.is_some() {
            self.profile_url = update.profile_url.clone();
        }
    }

    pub fn to_profile(&self) -> Profile {
        Profile {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            online: true,
            bio: self.bio.clone(),
            profile_url: self.profile_url.clone(),
            ..Profile::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Audio,
    Video,
    Document,
    #[serde(other)]
    Other,
}

/// A chat message. Exactly one of `receiver_id` / `group_id` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub content: String,
    #[serde(rename = "type", default, deserialize_with = "nullable")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "nullable")]
    pub read: bool,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<Reaction>,
}

impl Message {
    /// Whether the message belongs to the given conversation as seen by `self_id`.
    pub fn belongs_to(&self, kind: ChatKind, chat_id: &str, self_id: &str) -> bool {
        match kind {
            ChatKind::Group => self.group_id.as_deref() == Some(chat_id),
            ChatKind::User => {
                let receiver = self.receiver_id.as_deref();
                (self.sender_id == self_id && receiver == Some(chat_id))
                    || (self.sender_id == chat_id && receiver == Some(self_id))
            }
        }
    }
}

/// Payload of a message about to be sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

impl NewMessage {
    pub fn direct(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            receiver_id: Some(receiver_id.into()),
            group_id: None,
            content: content.into(),
            kind: MessageKind::Text,
            media_url: None,
        }
    }

    pub fn group(
        sender_id: impl Into<String>,
        group_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            receiver_id: None,
            group_id: Some(group_id.into()),
            content: content.into(),
            kind: MessageKind::Text,
            media_url: None,
        }
    }

    /// Build a message for `kind`/`chat_id` from `sender_id`.
    pub fn to_chat(
        kind: ChatKind,
        chat_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        match kind {
            ChatKind::User => Self::direct(sender_id, chat_id, content),
            ChatKind::Group => Self::group(sender_id, chat_id, content),
        }
    }

    pub fn with_media(mut self, kind: MessageKind, url: impl Into<String>) -> Self {
        self.kind = kind;
        self.media_url = Some(url.into());
        self
    }

    pub fn into_message(self, id: String, created_at: DateTime<Utc>) -> Message {
        Message {
            id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            group_id: self.group_id,
            content: self.content,
            kind: self.kind,
            media_url: self.media_url,
            created_at,
            read: false,
            reactions: Vec::new(),
        }
    }
}

/// Partial message update (edit, read flag).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MessageUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
}

/// An emoji reaction, unique per (message, user, emoji).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Per-viewer read acknowledgment used in group chats (`message_reads`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadReceipt {
    pub message_id: String,
    pub user_id: String,
    pub read_at: DateTime<Utc>,
}

/// Typing indicator row (`typing_status`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingState {
    pub chat_id: String,
    pub user_id: String,
    pub typing: bool,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Admin,
    Member,
}

/// A group chat. `member_ids` is only populated in demo mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub description: String,
    #[serde(default, deserialize_with = "nullable")]
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub member_ids: Vec<String>,
}

impl Group {
    /// Role of `user_id` in the group. The creator is always an admin.
    pub fn role_of(&self, user_id: &str) -> Option<GroupRole> {
        if self.created_by.as_deref() == Some(user_id) {
            Some(GroupRole::Admin)
        } else if self.member_ids.iter().any(|m| m == user_id) {
            Some(GroupRole::Member)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewGroup {
    pub name: String,
    pub description: String,
    pub icon: String,
}

/// Membership row (`group_members`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupMember {
    pub group_id: String,
    pub user_id: String,
    pub role: GroupRole,
}

/// Creator first with the admin role, then every other distinct member.
pub fn group_membership(creator_id: &str, member_ids: &[String]) -> Vec<(String, GroupRole)> {
    let mut members = vec![(creator_id.to_string(), GroupRole::Admin)];
    for id in member_ids {
        if !members.iter().any(|(m, _)| m == id) {
            members.push((id.clone(), GroupRole::Member));
        }
    }
    members
}

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    #[default]
    Text,
    Image,
    Video,
    #[serde(other)]
    Other,
}

/// Author fields embedded with a status in connected mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusAuthor {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
}

/// An ephemeral status post, visible for 24 hours.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Status {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type", default, deserialize_with = "nullable")]
    pub kind: StatusKind,
    #[serde(default, deserialize_with = "nullable")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bg_color: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "nullable")]
    pub seen: bool,
    #[serde(rename = "users", default, skip_serializing_if = "Option::is_none")]
    pub author: Option<StatusAuthor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewStatus {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: StatusKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bg_color: Option<String>,
}

impl NewStatus {
    pub fn text(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            kind: StatusKind::Text,
            content: content.into(),
            bg_color: None,
        }
    }

    pub fn into_status(self, id: String, created_at: DateTime<Utc>) -> Status {
        Status {
            id,
            user_id: self.user_id,
            kind: self.kind,
            content: self.content,
            bg_color: self.bg_color,
            created_at,
            seen: false,
            author: None,
        }
    }
}

/// Per-viewer "seen" mark on a status (`status_views`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusView {
    pub status_id: String,
    pub viewer_id: String,
    pub viewed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Blocklist
// ---------------------------------------------------------------------------

/// A blocked user as listed to its owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockedUser {
    /// Id of the blocked user.
    pub id: String,
    pub blocked_at: DateTime<Utc>,
}

/// Blocklist row (`blocked_users`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockEntry {
    pub user_id: String,
    pub blocked_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Calls (demo only)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Voice,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallRecord {
    pub id: String,
    pub contact: String,
    #[serde(rename = "type")]
    pub kind: CallKind,
    /// `M:SS` label, empty for missed calls.
    pub duration: String,
    pub time: DateTime<Utc>,
    pub missed: bool,
    pub color: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_decodes_backend_row_with_nulls_and_extra_columns() {
        let row = serde_json::json!({
            "id": "m1",
            "sender_id": "a",
            "receiver_id": "b",
            "group_id": null,
            "content": null,
            "type": "sticker",
            "created_at": "2025-01-10T12:00:00Z",
            "read": null,
            "reactions": [{ "id": "r1", "message_id": "m1", "user_id": "b", "emoji": "🔥" }],
            "edited": true
        });
        let msg: Message = serde_json::from_value(row).unwrap();
        assert_eq!(msg.kind, MessageKind::Other);
        assert_eq!(msg.content, "");
        assert!(!msg.read);
        assert_eq!(msg.reactions.len(), 1);
        assert!(msg.belongs_to(ChatKind::User, "b", "a"));
        assert!(msg.belongs_to(ChatKind::User, "a", "b"));
        assert!(!msg.belongs_to(ChatKind::User, "c", "a"));
    }

    #[test]
    fn new_message_targets_exactly_one_conversation() {
        let direct = NewMessage::to_chat(ChatKind::User, "u2", "me", "oi");
        assert_eq!(direct.receiver_id.as_deref(), Some("u2"));
        assert!(direct.group_id.is_none());

        let group = NewMessage::to_chat(ChatKind::Group, "g1", "me", "oi");
        assert!(group.receiver_id.is_none());
        let json = serde_json::to_value(&group).unwrap();
        assert!(json.get("receiver_id").is_none());
        assert_eq!(json["type"], "text");
    }

    #[test]
    fn membership_puts_creator_first_as_admin_once() {
        let members = group_membership("me", &["a".into(), "me".into(), "b".into(), "a".into()]);
        assert_eq!(
            members,
            vec![
                ("me".to_string(), GroupRole::Admin),
                ("a".to_string(), GroupRole::Member),
                ("b".to_string(), GroupRole::Member),
            ]
        );
    }

    #[test]
    fn session_applies_partial_updates() {
        let mut session = Session {
            id: "me".into(),
            name: "Ana".into(),
            phone: Some("+258".into()),
            ..Session::default()
        };
        session.apply(&ProfileUpdate {
            bio: Some("olá".into()),
            ..ProfileUpdate::default()
        });
        assert_eq!(session.name, "Ana");
        assert_eq!(session.phone.as_deref(), Some("+258"));
        assert_eq!(session.bio.as_deref(), Some("olá"));
    }
}
