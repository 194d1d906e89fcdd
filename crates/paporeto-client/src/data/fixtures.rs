//! Demo dataset: contacts, groups, statuses, conversation threads and call
//! history.  Timestamps are relative to the moment they are read.

use paporeto_shared::constants::DEMO_SELF_PLACEHOLDER;
use paporeto_shared::format::{ago, initials};
use paporeto_shared::models::{
    CallKind, CallRecord, Group, Message, MessageKind, Profile, Status, StatusAuthor, StatusKind,
};
use paporeto_shared::types::ChatKind;

// (id, name, phone, online, colour)
const CONTACTS: &[(&str, &str, &str, bool, &str)] = &[
    ("u1", "Amina Chissano", "+258841234567", true, "#00C16A"),
    ("u2", "Carlos Mondlane", "+258851234567", false, "#58A6FF"),
    ("u3", "Fatima Nhavene", "+27831234567", false, "#BC8CFF"),
    ("u4", "João Machava", "+351912345678", true, "#FF8C42"),
    ("u5", "Sofia Zita", "+238971234567", false, "#FF4757"),
    ("u6", "Miguel Munhequete", "+258861234567", true, "#00D4AA"),
];

// (id, name, icon, description, members)
const GROUPS: &[(&str, &str, &str, &str, &[&str])] = &[
    ("g1", "Família Maputo 🏠", "🏠", "Grupo da família", &["u1", "u2", "u3"]),
    ("g2", "Trabalho Dev 💻", "💻", "Equipa de desenvolvimento", &["u1", "u4", "u5", "u6"]),
    ("g3", "Amigos do Bairro 🎉", "🎉", "Galera do bairro", &["u2", "u3", "u4"]),
];

// (id, author, content, background, seconds ago, seen)
const STATUSES: &[(&str, &str, &str, &str, i64, bool)] = &[
    ("s1", "u1", "🌅 Bom dia Maputo!", "#0D2B1A", 1800, false),
    ("s2", "u2", "💻 Coding toda noite...", "#0A1020", 7200, true),
    ("s3", "u4", "🔥 Novo projeto lançado!", "#1A0D0D", 3600, false),
    ("s4", "u6", "📱 Usando o PapoReto!", "#001A12", 900, false),
];

type ThreadRow = (&'static str, &'static str, &'static str, i64, bool);

// thread key -> (id, sender, content, seconds ago, read)
const THREADS: &[(&str, &[ThreadRow])] = &[
    (
        "user_u1",
        &[
            ("m1", "u1", "Olá! Tudo bem? 😊", 7200, true),
            ("m2", DEMO_SELF_PLACEHOLDER, "Tudo ótimo! E você?", 7100, true),
            ("m3", "u1", "Tudo bem! Vai na festa amanhã? 🎉", 3600, true),
            ("m4", DEMO_SELF_PLACEHOLDER, "Com certeza! 🔥", 1800, true),
            ("m5", "u1", "Ótimo, vejo você lá 😄", 900, false),
        ],
    ),
    (
        "user_u2",
        &[
            ("m6", "u2", "Precisamos conversar sobre o projeto.", 86400, false),
            ("m7", "u2", "Podes me ligar quando tiveres tempo?", 82000, false),
        ],
    ),
    (
        "user_u4",
        &[
            ("m8", DEMO_SELF_PLACEHOLDER, "Ei, viste o novo framework? 🚀", 43200, true),
            ("m9", "u4", "Sim! Muito bom mesmo 💻", 40000, true),
        ],
    ),
    (
        "group_g1",
        &[
            ("m10", "u1", "Bom dia a todos! 🌅", 10800, true),
            ("m11", "u2", "Bom dia! ☀️", 9000, true),
            ("m12", DEMO_SELF_PLACEHOLDER, "Bom dia família! 🏠", 8000, true),
        ],
    ),
    (
        "group_g2",
        &[
            ("m13", "u4", "Deploy feito com sucesso! 🚀", 14400, true),
            ("m14", DEMO_SELF_PLACEHOLDER, "🎉🎉🎉", 13000, true),
        ],
    ),
];

// (id, contact, kind, duration, seconds ago, missed, colour)
const CALLS: &[(&str, &str, CallKind, &str, i64, bool, &str)] = &[
    ("c1", "Amina Chissano", CallKind::Voice, "3:42", 3600, false, "#00C16A"),
    ("c2", "Carlos Mondlane", CallKind::Video, "12:07", 7200, false, "#58A6FF"),
    ("c3", "Fatima Nhavene", CallKind::Voice, "", 86400, true, "#BC8CFF"),
    ("c4", "João Machava", CallKind::Voice, "0:55", 172800, false, "#FF8C42"),
    ("c5", "Sofia Zita", CallKind::Video, "", 259200, true, "#FF4757"),
];

pub fn contacts() -> Vec<Profile> {
    CONTACTS
        .iter()
        .map(|&(id, name, phone, online, color)| Profile {
            id: id.into(),
            name: name.into(),
            phone: Some(phone.into()),
            online,
            initials: Some(initials(name)),
            color: Some(color.into()),
            ..Profile::default()
        })
        .collect()
}

pub fn contact(id: &str) -> Option<Profile> {
    contacts().into_iter().find(|c| c.id == id)
}

pub fn groups() -> Vec<Group> {
    GROUPS
        .iter()
        .map(|&(id, name, icon, description, members)| Group {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            icon: icon.into(),
            created_by: None,
            created_at: None,
            member_ids: members.iter().map(|m| m.to_string()).collect(),
        })
        .collect()
}

pub fn statuses() -> Vec<Status> {
    STATUSES
        .iter()
        .map(|&(id, user_id, content, bg, seconds, seen)| Status {
            id: id.into(),
            user_id: user_id.into(),
            kind: StatusKind::Text,
            content: content.into(),
            bg_color: Some(bg.into()),
            created_at: ago(seconds),
            seen,
            author: contact(user_id).map(|c| StatusAuthor {
                name: c.name,
                profile_url: None,
            }),
        })
        .collect()
}

/// Messages of a demo conversation as seen by `self_id`.  Unknown threads
/// are empty.
pub fn thread(kind: ChatKind, chat_id: &str, self_id: &str) -> Vec<Message> {
    let key = kind.thread_key(chat_id);
    let Some((_, rows)) = THREADS.iter().find(|(k, _)| *k == key) else {
        return Vec::new();
    };
    rows.iter()
        .map(|&(id, sender, content, seconds, read)| {
            let sender_id = if sender == DEMO_SELF_PLACEHOLDER {
                self_id.to_string()
            } else {
                sender.to_string()
            };
            let (receiver_id, group_id) = match kind {
                ChatKind::Group => (None, Some(chat_id.to_string())),
                ChatKind::User if sender_id == self_id => (Some(chat_id.to_string()), None),
                ChatKind::User => (Some(self_id.to_string()), None),
            };
            Message {
                id: id.into(),
                sender_id,
                receiver_id,
                group_id,
                content: content.into(),
                kind: MessageKind::Text,
                media_url: None,
                created_at: ago(seconds),
                read,
                reactions: Vec::new(),
            }
        })
        .collect()
}

pub fn call_history() -> Vec<CallRecord> {
    CALLS
        .iter()
        .map(|&(id, contact, kind, duration, seconds, missed, color)| CallRecord {
            id: id.into(),
            contact: contact.into(),
            kind,
            duration: duration.into(),
            time: ago(seconds),
            missed,
            color: color.into(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_placeholder_is_replaced() {
        let messages = thread(ChatKind::User, "u1", "me");
        assert_eq!(messages.len(), 5);
        assert!(messages.iter().all(|m| m.sender_id != DEMO_SELF_PLACEHOLDER));
        assert_eq!(messages[1].sender_id, "me");
        assert_eq!(messages[1].receiver_id.as_deref(), Some("u1"));
        assert_eq!(messages[0].receiver_id.as_deref(), Some("me"));
        assert!(messages.iter().all(|m| m.belongs_to(ChatKind::User, "u1", "me")));
    }

    #[test]
    fn threads_are_chronological() {
        for (kind, id) in [(ChatKind::User, "u1"), (ChatKind::User, "u2"), (ChatKind::Group, "g1")] {
            let messages = thread(kind, id, "me");
            assert!(messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        }
    }

    #[test]
    fn unknown_thread_is_empty() {
        assert!(thread(ChatKind::User, "u6", "me").is_empty());
        assert!(thread(ChatKind::Group, "g3", "me").is_empty());
    }

    #[test]
    fn fixture_sizes() {
        assert_eq!(contacts().len(), 6);
        assert_eq!(groups().len(), 3);
        assert_eq!(statuses().len(), 4);
        assert_eq!(call_history().len(), 5);
        assert_eq!(contact("u4").unwrap().initials.as_deref(), Some("JM"));
        assert!(contact("nobody").is_none());
    }
}
