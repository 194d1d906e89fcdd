use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use paporeto_shared::models::{
    group_membership, BlockedUser, Group, Message, MessageUpdate, NewGroup, NewMessage, NewStatus,
    Profile, ProfileUpdate, Status,
};
use paporeto_shared::types::ChatKind;
use paporeto_store::Database;
use tracing::{debug, info};
use uuid::Uuid;

use super::{fixtures, DataAccess};
use crate::error::Result;

const BLOB_PREFIX: &str = "blob:paporeto/";

/// Data access without a backend: fixtures plus the local mirrors.
///
/// Groups, statuses and the blocklist persist in the store.  Sent messages,
/// reactions and uploaded media live only as long as this value.
pub struct DemoData {
    store: Arc<Database>,
    last_millis: AtomicI64,
    reactions: Mutex<HashSet<(String, String, String)>>,
    blobs: Mutex<HashMap<String, Bytes>>,
}

impl DemoData {
    pub fn new(store: Arc<Database>) -> Self {
        Self {
            store,
            last_millis: AtomicI64::new(0),
            reactions: Mutex::new(HashSet::new()),
            blobs: Mutex::new(HashMap::new()),
        }
    }

    /// Millisecond timestamp, strictly increasing across calls.
    fn next_millis(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last_millis.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self
                .last_millis
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }

    fn next_id(&self, prefix: &str) -> (String, i64) {
        let millis = self.next_millis();
        (format!("{prefix}{millis}"), millis)
    }

    /// Bytes behind a URL returned by `upload_media`.
    pub fn blob(&self, url: &str) -> Option<Bytes> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }
}

#[async_trait]
impl DataAccess for DemoData {
    async fn get_users(&self, _exclude_id: &str) -> Result<Vec<Profile>> {
        Ok(fixtures::contacts())
    }

    async fn get_user(&self, id: &str) -> Result<Option<Profile>> {
        Ok(fixtures::contact(id))
    }

    async fn update_user(&self, id: &str, update: &ProfileUpdate) -> Result<Profile> {
        let mut session = self.store.session()?.unwrap_or_default();
        if session.id.is_empty() {
            session.id = id.to_string();
        }
        session.apply(update);
        self.store.set_session(&session)?;
        debug!(user = %session.id, "demo profile updated");
        Ok(session.to_profile())
    }

    async fn update_presence(&self, _id: &str, _online: bool) -> Result<()> {
        Ok(())
    }

    async fn get_messages(&self, kind: ChatKind, chat_id: &str, self_id: &str) -> Result<Vec<Message>> {
        Ok(fixtures::thread(kind, chat_id, self_id))
    }

    async fn send_message(&self, message: NewMessage) -> Result<Message> {
        let (id, millis) = self.next_id("msg_");
        let created_at = Utc.timestamp_millis_opt(millis).single().unwrap_or_else(Utc::now);
        Ok(message.into_message(id, created_at))
    }

    async fn update_message(&self, _id: &str, _update: &MessageUpdate) -> Result<Option<Message>> {
        Ok(None)
    }

    async fn delete_message(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn mark_read(&self, _kind: ChatKind, _chat_id: &str, _self_id: &str) -> Result<()> {
        Ok(())
    }

    async fn get_groups(&self, _user_id: &str) -> Result<Vec<Group>> {
        let mut groups = fixtures::groups();
        groups.extend(self.store.demo_groups()?);
        Ok(groups)
    }

    async fn create_group(&self, group: NewGroup, creator_id: &str, member_ids: &[String]) -> Result<Group> {
        let (id, _) = self.next_id("g_");
        let created = Group {
            id,
            name: group.name,
            description: group.description,
            icon: group.icon,
            created_by: Some(creator_id.to_string()),
            created_at: Some(Utc::now()),
            member_ids: group_membership(creator_id, member_ids)
                .into_iter()
                .map(|(member, _)| member)
                .collect(),
        };
        self.store.push_demo_group(&created)?;
        info!(group = %created.id, members = created.member_ids.len(), "demo group created");
        Ok(created)
    }

    async fn delete_group(&self, id: &str) -> Result<()> {
        if self.store.remove_demo_group(id)? {
            info!(group = %id, "demo group deleted");
        }
        Ok(())
    }

    async fn get_statuses(&self) -> Result<Vec<Status>> {
        let mut statuses = self.store.demo_statuses()?;
        statuses.extend(fixtures::statuses());
        Ok(statuses)
    }

    async fn create_status(&self, status: NewStatus) -> Result<Status> {
        let (id, _) = self.next_id("s_");
        let created = status.into_status(id, Utc::now());
        self.store.prepend_demo_status(&created)?;
        info!(status = %created.id, "demo status posted");
        Ok(created)
    }

    async fn mark_status_seen(&self, _status_id: &str, _viewer_id: &str) -> Result<()> {
        Ok(())
    }

    async fn toggle_reaction(&self, message_id: &str, user_id: &str, emoji: &str) -> Result<bool> {
        let key = (message_id.to_string(), user_id.to_string(), emoji.to_string());
        let mut reactions = self.reactions.lock().unwrap_or_else(PoisonError::into_inner);
        if reactions.remove(&key) {
            Ok(false)
        } else {
            reactions.insert(key);
            Ok(true)
        }
    }

    async fn block_user(&self, _user_id: &str, blocked_id: &str) -> Result<()> {
        if self.store.add_blocked_user(blocked_id, Utc::now())? {
            info!(blocked = %blocked_id, "demo user blocked");
        }
        Ok(())
    }

    async fn unblock_user(&self, _user_id: &str, blocked_id: &str) -> Result<()> {
        if self.store.remove_blocked_user(blocked_id)? {
            info!(blocked = %blocked_id, "demo user unblocked");
        }
        Ok(())
    }

    async fn get_blocked(&self, _user_id: &str) -> Result<Vec<BlockedUser>> {
        Ok(self.store.blocked_users()?)
    }

    async fn upload_media(
        &self,
        _session_id: &str,
        file_name: &str,
        data: Bytes,
        _content_type: &str,
    ) -> Result<String> {
        let url = format!("{BLOB_PREFIX}{}", Uuid::new_v4());
        debug!(file = %file_name, %url, size = data.len(), "demo media kept in memory");
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.clone(), data);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paporeto_shared::models::Session;
    use tempfile::TempDir;

    fn demo() -> DemoData {
        DemoData::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    fn new_group(name: &str) -> NewGroup {
        NewGroup {
            name: name.into(),
            description: "".into(),
            icon: "🎉".into(),
        }
    }

    #[tokio::test]
    async fn created_groups_survive_reload_but_messages_do_not() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("paporeto.db");

        let sent_id = {
            let data = DemoData::new(Arc::new(Database::open_at(&path).unwrap()));
            let group = data
                .create_group(new_group("Festa"), "me", &["u1".into(), "u2".into()])
                .await
                .unwrap();
            assert_eq!(group.member_ids, ["me", "u1", "u2"]);
            assert_eq!(group.role_of("me"), Some(paporeto_shared::models::GroupRole::Admin));

            let sent = data
                .send_message(NewMessage::direct("me", "u1", "até já"))
                .await
                .unwrap();
            assert!(sent.id.starts_with("msg_"));
            sent.id
        };

        let reloaded = DemoData::new(Arc::new(Database::open_at(&path).unwrap()));
        let groups = reloaded.get_groups("me").await.unwrap();
        assert_eq!(groups.len(), 4);
        assert_eq!(groups[3].name, "Festa");

        let thread = reloaded.get_messages(ChatKind::User, "u1", "me").await.unwrap();
        assert!(thread.iter().all(|m| m.id != sent_id));
    }

    #[tokio::test]
    async fn ids_are_unique_within_a_millisecond() {
        let data = demo();
        let a = data.create_group(new_group("A"), "me", &[]).await.unwrap();
        let b = data.create_group(new_group("B"), "me", &[]).await.unwrap();
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("g_"));

        data.delete_group(&a.id).await.unwrap();
        let ids: Vec<_> = data.get_groups("me").await.unwrap().into_iter().map(|g| g.id).collect();
        assert!(!ids.contains(&a.id));
        assert!(ids.contains(&b.id));
    }

    #[tokio::test]
    async fn new_statuses_come_first() {
        let data = demo();
        let posted = data.create_status(NewStatus::text("me", "Olá")).await.unwrap();
        assert!(posted.id.starts_with("s_"));
        let statuses = data.get_statuses().await.unwrap();
        assert_eq!(statuses.len(), 5);
        assert_eq!(statuses[0].id, posted.id);
    }

    #[tokio::test]
    async fn reaction_toggle_is_an_involution() {
        let data = demo();
        assert!(data.toggle_reaction("m1", "me", "❤️").await.unwrap());
        assert!(!data.toggle_reaction("m1", "me", "❤️").await.unwrap());
        assert!(data.toggle_reaction("m1", "me", "❤️").await.unwrap());
    }

    #[tokio::test]
    async fn blocklist_has_no_duplicates() {
        let data = demo();
        data.block_user("me", "u3").await.unwrap();
        data.block_user("me", "u3").await.unwrap();
        assert_eq!(data.get_blocked("me").await.unwrap().len(), 1);
        data.unblock_user("me", "u3").await.unwrap();
        data.unblock_user("me", "u3").await.unwrap();
        assert!(data.get_blocked("me").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn profile_updates_merge_into_session() {
        let data = demo();
        data.store
            .set_session(&Session {
                id: "demo".into(),
                name: "Você".into(),
                demo: true,
                ..Session::default()
            })
            .unwrap();
        let profile = data
            .update_user(
                "demo",
                &ProfileUpdate {
                    bio: Some("Disponível".into()),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(profile.name, "Você");
        assert_eq!(profile.bio.as_deref(), Some("Disponível"));
        assert_eq!(data.store.session().unwrap().unwrap().bio.as_deref(), Some("Disponível"));
    }

    #[tokio::test]
    async fn uploads_are_transient_blobs() {
        let data = demo();
        let url = data
            .upload_media("me", "nota.ogg", Bytes::from_static(b"ogg"), "audio/ogg")
            .await
            .unwrap();
        assert!(url.starts_with(BLOB_PREFIX));
        assert_eq!(data.blob(&url).unwrap(), Bytes::from_static(b"ogg"));
        assert!(demo().blob(&url).is_none());
    }

    #[tokio::test]
    async fn best_effort_writes_are_silent() {
        let data = demo();
        data.update_presence("me", true).await.unwrap();
        data.mark_read(ChatKind::Group, "g1", "me").await.unwrap();
        data.mark_status_seen("s1", "me").await.unwrap();
        assert!(data.update_message("m1", &MessageUpdate::default()).await.unwrap().is_none());
        data.delete_message("m1").await.unwrap();
        assert_eq!(data.get_messages(ChatKind::Group, "g1", "me").await.unwrap().len(), 3);
    }
}
