//! Keyed registry of live change feeds.
//!
//! At most one channel is open per [`SubscriptionKey`].  Subscribing again
//! under a key closes the previous channel before the new one is opened,
//! both under the registry lock, so the two never coexist.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use paporeto_shared::models::{Message, Profile, TypingState};
use paporeto_shared::types::{ChangeKind, ChatKind, SubscriptionKey};
use serde_json::Value;
use tracing::{debug, info};

use crate::backend::{
    ChangeBinding, ChangeEvent, ChangeSink, ChannelHandle, ChannelSpec, RowChange, TABLE_MESSAGES,
    TABLE_TYPING, TABLE_USERS,
};
use crate::error::{BackendError, Result};
use crate::mode::BackendResolver;

/// A message row change.  Deletes carry the old row.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageChange {
    pub kind: ChangeKind,
    pub record: Value,
}

impl MessageChange {
    /// `None` for inserts, `"update"` or `"delete"` otherwise.
    pub fn label(&self) -> Option<&'static str> {
        self.kind.label()
    }

    /// The record as a message, when it carries a full row.
    pub fn message(&self) -> Option<Message> {
        serde_json::from_value(self.record.clone()).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingEvent {
    pub typing: bool,
    pub user_id: String,
}

pub struct SubscriptionRegistry {
    resolver: Arc<BackendResolver>,
    channels: Mutex<HashMap<SubscriptionKey, Box<dyn ChannelHandle>>>,
}

impl SubscriptionRegistry {
    pub fn new(resolver: Arc<BackendResolver>) -> Self {
        Self {
            resolver,
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<SubscriptionKey, Box<dyn ChannelHandle>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open `spec` under `key`, replacing any channel already there.
    /// `None` without a backend.
    fn register(
        &self,
        key: SubscriptionKey,
        spec: ChannelSpec,
        sink: ChangeSink,
    ) -> Result<Option<SubscriptionKey>> {
        let Some(backend) = self.resolver.resolve() else {
            return Ok(None);
        };

        let mut channels = self.channels();
        if let Some(previous) = channels.remove(&key) {
            previous.unsubscribe();
            debug!(channel = %key, "previous channel closed");
        }
        let handle = backend.open_channel(spec, sink)?;
        channels.insert(key.clone(), handle);
        info!(channel = %key, "subscribed");
        Ok(Some(key))
    }

    /// Inserts addressed to this chat plus every update and delete on
    /// messages.
    pub fn subscribe_messages<F>(
        &self,
        kind: ChatKind,
        chat_id: &str,
        self_id: &str,
        on_event: F,
    ) -> Result<Option<SubscriptionKey>>
    where
        F: Fn(MessageChange) + Send + Sync + 'static,
    {
        let key = SubscriptionKey::messages(kind, chat_id);
        let (column, value) = match kind {
            ChatKind::User => ("receiver_id", self_id),
            ChatKind::Group => ("group_id", chat_id),
        };
        let spec = ChannelSpec::new(key.to_string())
            .on(ChangeBinding::new(ChangeEvent::Insert, TABLE_MESSAGES).filter_eq(column, value))
            .on(ChangeBinding::new(ChangeEvent::Update, TABLE_MESSAGES))
            .on(ChangeBinding::new(ChangeEvent::Delete, TABLE_MESSAGES));

        let sink: ChangeSink = Arc::new(move |change: RowChange| {
            if let Some(record) = change.record().cloned() {
                on_event(MessageChange {
                    kind: change.kind,
                    record,
                });
            }
        });
        self.register(key, spec, sink)
    }

    /// Typing indicators in a chat, excluding the caller's own.
    pub fn subscribe_typing<F>(&self, chat_id: &str, self_id: &str, on_typing: F) -> Result<Option<SubscriptionKey>>
    where
        F: Fn(TypingEvent) + Send + Sync + 'static,
    {
        let key = SubscriptionKey::typing(chat_id);
        let spec = ChannelSpec::new(key.to_string())
            .on(ChangeBinding::new(ChangeEvent::All, TABLE_TYPING).filter_eq("chat_id", chat_id));

        let self_id = self_id.to_string();
        let sink: ChangeSink = Arc::new(move |change: RowChange| {
            let Some(row) = change.new else {
                return;
            };
            let Some(user_id) = row.get("user_id").and_then(Value::as_str) else {
                return;
            };
            if user_id == self_id {
                return;
            }
            on_typing(TypingEvent {
                typing: row.get("typing").and_then(Value::as_bool).unwrap_or(false),
                user_id: user_id.to_string(),
            });
        });
        self.register(key, spec, sink)
    }

    /// Updates to one user's profile row (online flag, last seen).
    pub fn subscribe_presence<F>(&self, user_id: &str, on_presence: F) -> Result<Option<SubscriptionKey>>
    where
        F: Fn(Profile) + Send + Sync + 'static,
    {
        let key = SubscriptionKey::presence(user_id);
        let spec = ChannelSpec::new(key.to_string())
            .on(ChangeBinding::new(ChangeEvent::Update, TABLE_USERS).filter_eq("id", user_id));

        let sink: ChangeSink = Arc::new(move |change: RowChange| {
            let Some(row) = change.new else {
                return;
            };
            match serde_json::from_value::<Profile>(row) {
                Ok(profile) => on_presence(profile),
                Err(e) => debug!(error = %e, "presence row skipped"),
            }
        });
        self.register(key, spec, sink)
    }

    /// Publish the caller's typing state.  No-op without a backend.
    pub async fn update_typing(&self, chat_id: &str, user_id: &str, typing: bool) -> Result<()> {
        let Some(backend) = self.resolver.resolve() else {
            return Ok(());
        };
        let state = TypingState {
            chat_id: chat_id.to_string(),
            user_id: user_id.to_string(),
            typing,
            updated_at: Utc::now(),
        };
        let row = serde_json::to_value(&state).map_err(BackendError::from)?;
        backend
            .upsert(TABLE_TYPING, vec![row], &["chat_id", "user_id"])
            .await?;
        Ok(())
    }

    /// Close the channel under `key`.  Returns whether one was open.
    pub fn unsubscribe(&self, key: &SubscriptionKey) -> bool {
        let Some(handle) = self.channels().remove(key) else {
            return false;
        };
        handle.unsubscribe();
        info!(channel = %key, "unsubscribed");
        true
    }

    pub fn unsubscribe_all(&self) {
        let drained: Vec<_> = self.channels().drain().collect();
        let count = drained.len();
        for (_, handle) in drained {
            handle.unsubscribe();
        }
        if count > 0 {
            info!(channels = count, "all channels closed");
        }
    }

    pub fn is_subscribed(&self, key: &SubscriptionKey) -> bool {
        self.channels().contains_key(key)
    }

    pub fn keys(&self) -> Vec<SubscriptionKey> {
        self.channels().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, MemoryBackend};
    use crate::config::BackendConfig;
    use serde_json::json;

    fn registry() -> (SubscriptionRegistry, MemoryBackend) {
        let backend = MemoryBackend::new();
        let client: Arc<dyn Backend> = Arc::new(backend.clone());
        let resolver = BackendResolver::with_backend(
            BackendConfig::new("https://abcd1234.supabase.co", "anon"),
            client,
        );
        (SubscriptionRegistry::new(Arc::new(resolver)), backend)
    }

    #[test]
    fn demo_mode_subscribes_nothing() {
        let resolver = BackendResolver::with_rest(BackendConfig::default());
        let registry = SubscriptionRegistry::new(Arc::new(resolver));
        assert!(registry.subscribe_typing("g1", "me", |_| {}).unwrap().is_none());
        assert!(registry.keys().is_empty());
        assert!(!registry.unsubscribe(&SubscriptionKey::typing("g1")));
    }

    #[test]
    fn resubscribing_replaces_the_channel() {
        let (registry, backend) = registry();
        registry.subscribe_messages(ChatKind::Group, "g1", "me", |_| {}).unwrap();
        registry.subscribe_messages(ChatKind::Group, "g1", "me", |_| {}).unwrap();
        assert_eq!(backend.channel_names(), ["msgs_group_g1"]);
        assert_eq!(registry.keys().len(), 1);

        registry.subscribe_presence("u2", |_| {}).unwrap();
        assert_eq!(backend.active_channels(), 2);
        registry.unsubscribe_all();
        assert_eq!(backend.active_channels(), 0);
        assert!(registry.keys().is_empty());
    }

    #[tokio::test]
    async fn typing_from_self_is_ignored() {
        let (registry, backend) = registry();
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&events);
        registry
            .subscribe_typing("g1", "me", move |e| seen.lock().unwrap().push(e))
            .unwrap();

        registry.update_typing("g1", "me", true).await.unwrap();
        registry.update_typing("g1", "u4", true).await.unwrap();
        registry.update_typing("g2", "u5", true).await.unwrap();
        registry.update_typing("g1", "u4", false).await.unwrap();

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            [
                TypingEvent { typing: true, user_id: "u4".into() },
                TypingEvent { typing: false, user_id: "u4".into() },
            ]
        );
        assert_eq!(backend.rows(TABLE_TYPING).len(), 3);
    }

    #[tokio::test]
    async fn message_changes_carry_labels() {
        let (registry, backend) = registry();
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&events);
        registry
            .subscribe_messages(ChatKind::User, "u2", "me", move |c| seen.lock().unwrap().push(c))
            .unwrap();

        let rows = backend
            .insert(TABLE_MESSAGES, vec![json!({ "sender_id": "u2", "receiver_id": "me", "content": "oi", "type": "text" })])
            .await
            .unwrap();
        // not addressed to me
        backend
            .insert(TABLE_MESSAGES, vec![json!({ "sender_id": "me", "receiver_id": "u2", "content": "olá", "type": "text" })])
            .await
            .unwrap();
        let id = rows[0]["id"].as_str().unwrap().to_string();
        backend
            .update(TABLE_MESSAGES, json!({ "read": true }), &[crate::backend::Filter::eq("id", id.as_str())])
            .await
            .unwrap();
        backend
            .delete(TABLE_MESSAGES, &[crate::backend::Filter::eq("id", id.as_str())])
            .await
            .unwrap();

        let events = events.lock().unwrap();
        let labels: Vec<_> = events.iter().map(|e| e.label()).collect();
        assert_eq!(labels, [None, Some("update"), Some("delete")]);
        assert_eq!(events[0].message().unwrap().content, "oi");
        assert!(events[1].message().unwrap().read);
        assert_eq!(events[2].record["id"], id.as_str());
    }

    #[tokio::test]
    async fn presence_delivers_profiles() {
        let (registry, backend) = registry();
        backend.seed(TABLE_USERS, vec![json!({ "id": "u2", "name": "Carlos", "online": false })]);
        let online = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&online);
        registry
            .subscribe_presence("u2", move |p| seen.lock().unwrap().push(p.online))
            .unwrap();

        backend
            .update(TABLE_USERS, json!({ "online": true }), &[crate::backend::Filter::eq("id", "u2")])
            .await
            .unwrap();
        assert_eq!(*online.lock().unwrap(), [true]);
    }
}
