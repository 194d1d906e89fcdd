use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of conversation: a direct chat with one user or a group chat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    User,
    Group,
}

impl ChatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatKind::User => "user",
            ChatKind::Group => "group",
        }
    }

    /// Key of the demo thread for a conversation, e.g. `user_u1`.
    pub fn thread_key(&self, chat_id: &str) -> String {
        format!("{}_{}", self.as_str(), chat_id)
    }
}

impl fmt::Display for ChatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ChatKind::User),
            "group" => Ok(ChatKind::Group),
            other => Err(format!("unknown chat kind: {other}")),
        }
    }
}

/// Key of a live realtime subscription.
///
/// At most one channel is registered per key; the rendered form doubles as
/// the realtime channel name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionKey {
    Messages { kind: ChatKind, chat_id: String },
    Typing { chat_id: String },
    Presence { user_id: String },
}

impl SubscriptionKey {
    pub fn messages(kind: ChatKind, chat_id: impl Into<String>) -> Self {
        Self::Messages {
            kind,
            chat_id: chat_id.into(),
        }
    }

    pub fn typing(chat_id: impl Into<String>) -> Self {
        Self::Typing {
            chat_id: chat_id.into(),
        }
    }

    pub fn presence(user_id: impl Into<String>) -> Self {
        Self::Presence {
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionKey::Messages { kind, chat_id } => write!(f, "msgs_{kind}_{chat_id}"),
            SubscriptionKey::Typing { chat_id } => write!(f, "typing_{chat_id}"),
            SubscriptionKey::Presence { user_id } => write!(f, "presence_{user_id}"),
        }
    }
}

/// Kind of row change delivered by a realtime feed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    /// Tag handed to message listeners. Inserts are unlabeled.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            ChangeKind::Insert => None,
            ChangeKind::Update => Some("update"),
            ChangeKind::Delete => Some("delete"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_keys_render_like_channel_names() {
        assert_eq!(
            SubscriptionKey::messages(ChatKind::User, "u1").to_string(),
            "msgs_user_u1"
        );
        assert_eq!(
            SubscriptionKey::messages(ChatKind::Group, "g1").to_string(),
            "msgs_group_g1"
        );
        assert_eq!(SubscriptionKey::typing("g1").to_string(), "typing_g1");
        assert_eq!(SubscriptionKey::presence("u4").to_string(), "presence_u4");
    }

    #[test]
    fn chat_kind_parses_and_builds_thread_keys() {
        assert_eq!("group".parse::<ChatKind>().unwrap(), ChatKind::Group);
        assert!("channel".parse::<ChatKind>().is_err());
        assert_eq!(ChatKind::User.thread_key("u2"), "user_u2");
    }

    #[test]
    fn insert_is_unlabeled() {
        assert_eq!(ChangeKind::Insert.label(), None);
        assert_eq!(ChangeKind::Delete.label(), Some("delete"));
    }
}
