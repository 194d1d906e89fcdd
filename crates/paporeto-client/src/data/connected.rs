use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use paporeto_shared::constants::{MEDIA_BUCKET, STATUS_TTL_HOURS};
use paporeto_shared::models::{
    group_membership, BlockEntry, BlockedUser, Group, GroupMember, Message, MessageUpdate,
    NewGroup, NewMessage, NewStatus, Profile, ProfileUpdate, ReadReceipt, Status, StatusView,
};
use paporeto_shared::types::ChatKind;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{decorate, media_path, DataAccess};
use crate::backend::{
    decode_first, decode_rows, Backend, Filter, Query, TABLE_BLOCKED, TABLE_GROUPS,
    TABLE_GROUP_MEMBERS, TABLE_MESSAGES, TABLE_MESSAGE_READS, TABLE_REACTIONS, TABLE_STATUSES,
    TABLE_STATUS_VIEWS, TABLE_USERS,
};
use crate::error::{BackendError, Result};

/// Data access against the hosted backend.
pub struct ConnectedData {
    backend: Arc<dyn Backend>,
}

/// The one row a single-row request must produce.
fn single_row<T: DeserializeOwned>(rows: Vec<Value>) -> std::result::Result<T, BackendError> {
    decode_first(rows)?.ok_or_else(|| BackendError::Api {
        status: 406,
        message: "JSON object requested, multiple (or no) rows returned".into(),
        code: Some("PGRST116".into()),
        details: None,
    })
}

fn row<T: Serialize>(value: &T) -> std::result::Result<Value, BackendError> {
    Ok(serde_json::to_value(value)?)
}

impl ConnectedData {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }
}

#[async_trait]
impl DataAccess for ConnectedData {
    async fn get_users(&self, exclude_id: &str) -> Result<Vec<Profile>> {
        let rows = self
            .backend
            .select(&Query::table(TABLE_USERS).neq("id", exclude_id))
            .await?;
        let users: Vec<Profile> = decode_rows(rows)?;
        Ok(users.into_iter().map(decorate).collect())
    }

    async fn get_user(&self, id: &str) -> Result<Option<Profile>> {
        let rows = self
            .backend
            .select(&Query::table(TABLE_USERS).eq("id", id).limit(1))
            .await?;
        Ok(decode_first(rows)?)
    }

    async fn update_user(&self, id: &str, update: &ProfileUpdate) -> Result<Profile> {
        let mut patch = row(update)?;
        patch["updated_at"] = json!(Utc::now());
        let rows = self
            .backend
            .update(TABLE_USERS, patch, &[Filter::eq("id", id)])
            .await?;
        info!(user = %id, "profile updated");
        Ok(single_row(rows)?)
    }

    async fn update_presence(&self, id: &str, online: bool) -> Result<()> {
        self.backend
            .update(
                TABLE_USERS,
                json!({ "online": online, "last_seen": Utc::now() }),
                &[Filter::eq("id", id)],
            )
            .await?;
        debug!(user = %id, online, "presence updated");
        Ok(())
    }

    async fn get_messages(&self, kind: ChatKind, chat_id: &str, self_id: &str) -> Result<Vec<Message>> {
        let query = Query::table(TABLE_MESSAGES).select("*, reactions:message_reactions(*)");
        let query = match kind {
            ChatKind::User => query.or(vec![
                Filter::and(vec![Filter::eq("sender_id", self_id), Filter::eq("receiver_id", chat_id)]),
                Filter::and(vec![Filter::eq("sender_id", chat_id), Filter::eq("receiver_id", self_id)]),
            ]),
            ChatKind::Group => query.eq("group_id", chat_id),
        };
        let rows = self.backend.select(&query.order("created_at", true)).await?;
        Ok(decode_rows(rows)?)
    }

    async fn send_message(&self, message: NewMessage) -> Result<Message> {
        let rows = self.backend.insert(TABLE_MESSAGES, vec![row(&message)?]).await?;
        let sent: Message = single_row(rows)?;
        debug!(message = %sent.id, "message sent");
        Ok(sent)
    }

    async fn update_message(&self, id: &str, update: &MessageUpdate) -> Result<Option<Message>> {
        let rows = self
            .backend
            .update(TABLE_MESSAGES, row(update)?, &[Filter::eq("id", id)])
            .await?;
        Ok(decode_first(rows)?)
    }

    async fn delete_message(&self, id: &str) -> Result<()> {
        self.backend
            .delete(TABLE_MESSAGES, &[Filter::eq("id", id)])
            .await?;
        Ok(())
    }

    async fn mark_read(&self, kind: ChatKind, chat_id: &str, self_id: &str) -> Result<()> {
        match kind {
            ChatKind::User => {
                let updated = self
                    .backend
                    .update(
                        TABLE_MESSAGES,
                        json!({ "read": true }),
                        &[
                            Filter::eq("sender_id", chat_id),
                            Filter::eq("receiver_id", self_id),
                            Filter::eq("read", false),
                        ],
                    )
                    .await?;
                debug!(chat = %chat_id, messages = updated.len(), "direct chat marked read");
            }
            ChatKind::Group => {
                let rows = self
                    .backend
                    .select(&Query::table(TABLE_MESSAGES).select("id").eq("group_id", chat_id))
                    .await?;
                let read_at = Utc::now();
                let receipts = rows
                    .iter()
                    .filter_map(|r| r.get("id").and_then(Value::as_str))
                    .map(|message_id| {
                        row(&ReadReceipt {
                            message_id: message_id.to_string(),
                            user_id: self_id.to_string(),
                            read_at,
                        })
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                if receipts.is_empty() {
                    return Ok(());
                }
                let count = receipts.len();
                self.backend
                    .upsert(TABLE_MESSAGE_READS, receipts, &["message_id", "user_id"])
                    .await?;
                debug!(group = %chat_id, receipts = count, "group chat marked read");
            }
        }
        Ok(())
    }

    async fn get_groups(&self, user_id: &str) -> Result<Vec<Group>> {
        let rows = self
            .backend
            .select(
                &Query::table(TABLE_GROUP_MEMBERS)
                    .select("group_id, groups(*)")
                    .eq("user_id", user_id),
            )
            .await?;
        let groups = rows
            .into_iter()
            .filter_map(|mut membership| membership.get_mut("groups").map(Value::take))
            .filter(|group| !group.is_null())
            .collect();
        Ok(decode_rows(groups)?)
    }

    async fn create_group(&self, group: NewGroup, creator_id: &str, member_ids: &[String]) -> Result<Group> {
        let record = json!({
            "name": group.name,
            "description": group.description,
            "icon": group.icon,
            "created_by": creator_id,
            "created_at": Utc::now(),
        });
        let rows = self.backend.insert(TABLE_GROUPS, vec![record]).await?;
        let created: Group = single_row(rows)?;

        let members = group_membership(creator_id, member_ids)
            .into_iter()
            .map(|(user_id, role)| {
                row(&GroupMember {
                    group_id: created.id.clone(),
                    user_id,
                    role,
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let count = members.len();
        self.backend.insert(TABLE_GROUP_MEMBERS, members).await?;

        info!(group = %created.id, members = count, "group created");
        Ok(created)
    }

    async fn delete_group(&self, id: &str) -> Result<()> {
        self.backend.delete(TABLE_GROUPS, &[Filter::eq("id", id)]).await?;
        info!(group = %id, "group deleted");
        Ok(())
    }

    async fn get_statuses(&self) -> Result<Vec<Status>> {
        let cutoff = Utc::now() - Duration::hours(STATUS_TTL_HOURS);
        let rows = self
            .backend
            .select(
                &Query::table(TABLE_STATUSES)
                    .select("*, users(name, profile_url)")
                    .gte("created_at", cutoff.to_rfc3339())
                    .order("created_at", false),
            )
            .await?;
        Ok(decode_rows(rows)?)
    }

    async fn create_status(&self, status: NewStatus) -> Result<Status> {
        let rows = self.backend.insert(TABLE_STATUSES, vec![row(&status)?]).await?;
        let created: Status = single_row(rows)?;
        info!(status = %created.id, "status posted");
        Ok(created)
    }

    async fn mark_status_seen(&self, status_id: &str, viewer_id: &str) -> Result<()> {
        let view = StatusView {
            status_id: status_id.to_string(),
            viewer_id: viewer_id.to_string(),
            viewed_at: Utc::now(),
        };
        self.backend
            .upsert(TABLE_STATUS_VIEWS, vec![row(&view)?], &["status_id", "viewer_id"])
            .await?;
        Ok(())
    }

    async fn toggle_reaction(&self, message_id: &str, user_id: &str, emoji: &str) -> Result<bool> {
        let existing = self
            .backend
            .select(
                &Query::table(TABLE_REACTIONS)
                    .select("id")
                    .eq("message_id", message_id)
                    .eq("user_id", user_id)
                    .eq("emoji", emoji)
                    .limit(1),
            )
            .await?;

        match existing.first().and_then(|r| r.get("id")).cloned() {
            Some(id) => {
                self.backend
                    .delete(TABLE_REACTIONS, &[Filter::Eq("id".into(), id)])
                    .await?;
                debug!(message = %message_id, emoji, "reaction removed");
                Ok(false)
            }
            None => {
                self.backend
                    .insert(
                        TABLE_REACTIONS,
                        vec![json!({ "message_id": message_id, "user_id": user_id, "emoji": emoji })],
                    )
                    .await?;
                debug!(message = %message_id, emoji, "reaction added");
                Ok(true)
            }
        }
    }

    async fn block_user(&self, user_id: &str, blocked_id: &str) -> Result<()> {
        let entry = BlockEntry {
            user_id: user_id.to_string(),
            blocked_id: blocked_id.to_string(),
            blocked_at: Some(Utc::now()),
        };
        self.backend
            .upsert(TABLE_BLOCKED, vec![row(&entry)?], &["user_id", "blocked_id"])
            .await?;
        info!(blocked = %blocked_id, "user blocked");
        Ok(())
    }

    async fn unblock_user(&self, user_id: &str, blocked_id: &str) -> Result<()> {
        self.backend
            .delete(
                TABLE_BLOCKED,
                &[Filter::eq("user_id", user_id), Filter::eq("blocked_id", blocked_id)],
            )
            .await?;
        info!(blocked = %blocked_id, "user unblocked");
        Ok(())
    }

    async fn get_blocked(&self, user_id: &str) -> Result<Vec<BlockedUser>> {
        let rows = self
            .backend
            .select(&Query::table(TABLE_BLOCKED).eq("user_id", user_id))
            .await?;
        let entries: Vec<BlockEntry> = decode_rows(rows)?;
        Ok(entries
            .into_iter()
            .map(|e| BlockedUser {
                id: e.blocked_id,
                blocked_at: e.blocked_at.unwrap_or_default(),
            })
            .collect())
    }

    async fn upload_media(
        &self,
        session_id: &str,
        file_name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String> {
        let path = media_path(session_id, file_name, Utc::now().timestamp_millis());
        self.backend
            .upload(MEDIA_BUCKET, &path, data, content_type)
            .await?;
        info!(%path, "media uploaded");
        Ok(self.backend.public_url(MEDIA_BUCKET, &path))
    }
}
