//! The hosted backend as consumed by the client: authentication, tabular
//! queries and commands, object storage and realtime change feeds.
//!
//! [`Backend`] is the only seam through which the client talks to the
//! service.  [`RestBackend`] speaks the hosted HTTP and websocket APIs;
//! `MemoryBackend` is an in-process stand-in with the same semantics, used
//! by tests and offline development.

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod realtime;
pub mod rest;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use paporeto_shared::types::ChangeKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BackendError;

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryBackend;
pub use rest::RestBackend;

pub const TABLE_USERS: &str = "users";
pub const TABLE_MESSAGES: &str = "messages";
pub const TABLE_MESSAGE_READS: &str = "message_reads";
pub const TABLE_REACTIONS: &str = "message_reactions";
pub const TABLE_GROUPS: &str = "groups";
pub const TABLE_GROUP_MEMBERS: &str = "group_members";
pub const TABLE_STATUSES: &str = "statuses";
pub const TABLE_STATUS_VIEWS: &str = "status_views";
pub const TABLE_BLOCKED: &str = "blocked_users";
pub const TABLE_TYPING: &str = "typing_status";

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// A row predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    Gte(String, Value),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// A `SELECT` against one table.
///
/// `columns` uses the embedding syntax of the hosted API, e.g.
/// `*, reactions:message_reactions(*)` pulls each message's reactions.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }

    pub fn neq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Neq(column.to_string(), value.into()));
        self
    }

    pub fn gte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte(column.to_string(), value.into()));
        self
    }

    /// Match rows satisfying any of `alternatives`.
    pub fn or(mut self, alternatives: Vec<Filter>) -> Self {
        self.filters.push(Filter::Or(alternatives));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
}

/// Render a filter value the way it appears in a query string.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: AuthUser,
}

/// Result of a sign-up.  `session` is absent when e-mail confirmation is
/// required before the first sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpOutcome {
    pub user: Option<AuthUser>,
    pub session: Option<AuthSession>,
}

// ---------------------------------------------------------------------------
// Realtime
// ---------------------------------------------------------------------------

/// Which row changes a binding listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    Insert,
    Update,
    Delete,
    All,
}

impl ChangeEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeEvent::Insert => "INSERT",
            ChangeEvent::Update => "UPDATE",
            ChangeEvent::Delete => "DELETE",
            ChangeEvent::All => "*",
        }
    }

    pub fn matches(&self, kind: ChangeKind) -> bool {
        matches!(
            (self, kind),
            (ChangeEvent::All, _)
                | (ChangeEvent::Insert, ChangeKind::Insert)
                | (ChangeEvent::Update, ChangeKind::Update)
                | (ChangeEvent::Delete, ChangeKind::Delete)
        )
    }
}

/// One `(event, table, filter)` registration inside a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeBinding {
    pub event: ChangeEvent,
    pub table: String,
    /// `column = value` equality scope.
    pub filter: Option<(String, String)>,
}

impl ChangeBinding {
    pub fn new(event: ChangeEvent, table: &str) -> Self {
        Self {
            event,
            table: table.to_string(),
            filter: None,
        }
    }

    pub fn filter_eq(mut self, column: &str, value: &str) -> Self {
        self.filter = Some((column.to_string(), value.to_string()));
        self
    }

    /// Filter in the realtime wire syntax, e.g. `group_id=eq.g1`.
    pub fn filter_expr(&self) -> Option<String> {
        self.filter
            .as_ref()
            .map(|(column, value)| format!("{column}=eq.{value}"))
    }

    pub fn matches(&self, change: &RowChange) -> bool {
        if change.table != self.table || !self.event.matches(change.kind) {
            return false;
        }
        let Some((column, value)) = &self.filter else {
            return true;
        };
        change
            .record()
            .and_then(|row| row.get(column))
            .map(|v| value_text(v) == *value)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
    pub bindings: Vec<ChangeBinding>,
}

impl ChannelSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: Vec::new(),
        }
    }

    pub fn on(mut self, binding: ChangeBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn matches(&self, change: &RowChange) -> bool {
        self.bindings.iter().any(|b| b.matches(change))
    }
}

/// A row change delivered by a realtime feed.
#[derive(Debug, Clone, PartialEq)]
pub struct RowChange {
    pub table: String,
    pub kind: ChangeKind,
    pub new: Option<Value>,
    pub old: Option<Value>,
}

impl RowChange {
    /// The row the change is about: the new image, or the old one for deletes.
    pub fn record(&self) -> Option<&Value> {
        match self.kind {
            ChangeKind::Delete => self.old.as_ref(),
            _ => self.new.as_ref(),
        }
    }
}

pub type ChangeSink = Arc<dyn Fn(RowChange) + Send + Sync>;

/// An open realtime channel.  Dropping the handle releases the channel;
/// [`ChannelHandle::unsubscribe`] also leaves it cleanly.
pub trait ChannelHandle: Send {
    fn name(&self) -> &str;
    fn unsubscribe(self: Box<Self>);
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Backend: Send + Sync {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<SignUpOutcome, BackendError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    async fn reset_password_for_email(&self, email: &str) -> Result<(), BackendError>;

    async fn select(&self, query: &Query) -> Result<Vec<Value>, BackendError>;

    /// Insert rows and return them as stored.
    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, BackendError>;

    /// Patch every row matching `filters` and return the updated rows.
    async fn update(
        &self,
        table: &str,
        patch: Value,
        filters: &[Filter],
    ) -> Result<Vec<Value>, BackendError>;

    /// Insert rows, merging into existing rows that share `on_conflict`.
    async fn upsert(
        &self,
        table: &str,
        rows: Vec<Value>,
        on_conflict: &[&str],
    ) -> Result<Vec<Value>, BackendError>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), BackendError>;

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), BackendError>;

    fn public_url(&self, bucket: &str, path: &str) -> String;

    /// Open a change feed.  Events matching any binding are passed to `sink`
    /// until the returned handle is unsubscribed or dropped.
    fn open_channel(
        &self,
        spec: ChannelSpec,
        sink: ChangeSink,
    ) -> Result<Box<dyn ChannelHandle>, BackendError>;
}

pub(crate) fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, BackendError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(BackendError::from))
        .collect()
}

pub(crate) fn decode_first<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Option<T>, BackendError> {
    match rows.into_iter().next() {
        Some(row) => Ok(Some(serde_json::from_value(row)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn binding_scopes_by_event_table_and_filter() {
        let binding = ChangeBinding::new(ChangeEvent::Insert, "messages").filter_eq("group_id", "g1");
        let change = RowChange {
            table: "messages".into(),
            kind: ChangeKind::Insert,
            new: Some(json!({ "id": "m1", "group_id": "g1" })),
            old: None,
        };
        assert!(binding.matches(&change));
        assert_eq!(binding.filter_expr().as_deref(), Some("group_id=eq.g1"));

        let other_group = RowChange {
            new: Some(json!({ "id": "m2", "group_id": "g2" })),
            ..change.clone()
        };
        assert!(!binding.matches(&other_group));

        let update = RowChange {
            kind: ChangeKind::Update,
            ..change
        };
        assert!(!binding.matches(&update));
    }

    #[test]
    fn delete_changes_match_on_old_row() {
        let binding = ChangeBinding::new(ChangeEvent::All, "users").filter_eq("id", "u1");
        let change = RowChange {
            table: "users".into(),
            kind: ChangeKind::Delete,
            new: None,
            old: Some(json!({ "id": "u1" })),
        };
        assert!(binding.matches(&change));
    }

    #[test]
    fn filter_values_render_without_quotes() {
        assert_eq!(value_text(&json!("abc")), "abc");
        assert_eq!(value_text(&json!(false)), "false");
        assert_eq!(value_text(&json!(3)), "3");
    }
}
