//! In-process [`Backend`].
//!
//! Tables are vectors of JSON rows.  Filters, ordering, limits, upsert
//! conflict targets and the embedded-select syntax behave like the hosted
//! table API closely enough for the data layer to run unchanged against
//! it.  Every write is fanned out to the open channels whose bindings match,
//! after the state lock is released.
//!
//! Embeds are resolved by naming convention: `groups(*)` on a row carrying
//! `group_id` is a to-one lookup; otherwise the child rows pointing back
//! with `<singular of base table>_id` are returned as an array.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use paporeto_shared::types::ChangeKind;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use super::{
    value_text, AuthSession, AuthUser, Backend, ChangeSink, ChannelHandle, ChannelSpec, Filter,
    Query, RowChange, SignUpOutcome, TABLE_BLOCKED, TABLE_GROUP_MEMBERS, TABLE_MESSAGES,
    TABLE_MESSAGE_READS, TABLE_REACTIONS, TABLE_STATUS_VIEWS, TABLE_TYPING,
};
use crate::error::BackendError;

const BASE_URL: &str = "memory://paporeto";
const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    id: String,
    password: String,
}

struct Subscriber {
    id: u64,
    spec: ChannelSpec,
    sink: ChangeSink,
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Vec<Value>>,
    accounts: HashMap<String, Account>,
    signed_in: Option<String>,
    objects: HashMap<String, Bytes>,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
    rejected: HashSet<String>,
    password_resets: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    /// Put rows in a table as-is, without notifying channels.
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        self.state()
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.state().tables.get(table).cloned().unwrap_or_default()
    }

    /// Register a confirmed account and return its id.
    pub fn add_account(&self, email: &str, password: &str) -> String {
        let id = Uuid::new_v4().to_string();
        self.state().accounts.insert(
            email.to_lowercase(),
            Account {
                id: id.clone(),
                password: password.to_string(),
            },
        );
        id
    }

    /// Make every subsequent write to `target` (a table or bucket) fail.
    pub fn reject_writes_to(&self, target: &str) {
        self.state().rejected.insert(target.to_string());
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<Bytes> {
        self.state().objects.get(&format!("{bucket}/{path}")).cloned()
    }

    pub fn signed_in_user(&self) -> Option<String> {
        self.state().signed_in.clone()
    }

    pub fn password_resets(&self) -> Vec<String> {
        self.state().password_resets.clone()
    }

    /// Names of the open channels, in opening order.
    pub fn channel_names(&self) -> Vec<String> {
        self.state()
            .subscribers
            .iter()
            .map(|s| s.spec.name.clone())
            .collect()
    }

    pub fn active_channels(&self) -> usize {
        self.state().subscribers.len()
    }

    fn check_writable(state: &State, target: &str) -> Result<(), BackendError> {
        if state.rejected.contains(target) {
            return Err(BackendError::Api {
                status: 403,
                message: format!("permission denied for {target}"),
                code: Some("42501".into()),
                details: None,
            });
        }
        Ok(())
    }

    fn publish(&self, changes: Vec<RowChange>) {
        if changes.is_empty() {
            return;
        }
        let deliveries: Vec<(ChangeSink, RowChange)> = {
            let state = self.state();
            changes
                .iter()
                .flat_map(|change| {
                    state
                        .subscribers
                        .iter()
                        .filter(|s| s.spec.matches(change))
                        .map(|s| (s.sink.clone(), change.clone()))
                        .collect::<Vec<_>>()
                })
                .collect()
        };
        for (sink, change) in deliveries {
            sink(change);
        }
    }

    fn sign_in_as(state: &mut State, id: &str, email: &str) -> AuthSession {
        state.signed_in = Some(id.to_string());
        AuthSession {
            access_token: format!("mem-{}", Uuid::new_v4()),
            refresh_token: None,
            expires_in: Some(3600),
            user: AuthUser {
                id: id.to_string(),
                email: Some(email.to_string()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Row evaluation
// ---------------------------------------------------------------------------

fn as_instant(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

/// Timestamps compare as instants, numbers numerically, anything else as text.
fn compare(a: &Value, b: &Value) -> Ordering {
    if let (Some(x), Some(y)) = (as_instant(a), as_instant(b)) {
        return x.cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    value_text(a).cmp(&value_text(b))
}

fn row_matches(row: &Value, filter: &Filter) -> bool {
    match filter {
        Filter::Eq(column, v) => match row.get(column) {
            Some(x) => compare(x, v) == Ordering::Equal,
            None => v.is_null(),
        },
        Filter::Neq(column, v) => !row_matches(row, &Filter::Eq(column.clone(), v.clone())),
        Filter::Gte(column, v) => row
            .get(column)
            .map(|x| !x.is_null() && compare(x, v) != Ordering::Less)
            .unwrap_or(false),
        Filter::And(filters) => filters.iter().all(|f| row_matches(row, f)),
        Filter::Or(filters) => filters.iter().any(|f| row_matches(row, f)),
    }
}

fn matches_all(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|f| row_matches(row, f))
}

/// Natural uniqueness of the link tables, besides `id`.
fn unique_keys(table: &str) -> &'static [&'static str] {
    match table {
        TABLE_REACTIONS => &["message_id", "user_id", "emoji"],
        TABLE_MESSAGE_READS => &["message_id", "user_id"],
        TABLE_STATUS_VIEWS => &["status_id", "viewer_id"],
        TABLE_BLOCKED => &["user_id", "blocked_id"],
        TABLE_TYPING => &["chat_id", "user_id"],
        TABLE_GROUP_MEMBERS => &["group_id", "user_id"],
        _ => &[],
    }
}

fn same_key(a: &Map<String, Value>, b: &Value, keys: &[&str]) -> bool {
    !keys.is_empty()
        && keys
            .iter()
            .all(|k| a.get(*k).is_some() && a.get(*k) == b.get(*k))
}

fn prepare_row(table: &str, row: Value) -> Result<Map<String, Value>, BackendError> {
    let Value::Object(mut obj) = row else {
        return Err(BackendError::api(400, format!("rows for {table} must be objects")));
    };
    obj.entry("id")
        .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
    obj.entry("created_at")
        .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
    if table == TABLE_MESSAGES {
        obj.entry("read").or_insert(Value::Bool(false));
    }
    Ok(obj)
}

fn merge(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (k, v) in patch {
            target.insert(k.clone(), v.clone());
        }
    }
}

fn change(table: &str, kind: ChangeKind, new: Option<Value>, old: Option<Value>) -> RowChange {
    RowChange {
        table: table.to_string(),
        kind,
        new,
        old,
    }
}

// ---------------------------------------------------------------------------
// Column selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Column {
    All,
    Plain(String),
    Embed {
        alias: String,
        table: String,
        columns: Vec<Column>,
    },
}

/// Split on commas that are not inside parentheses.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn parse_columns(s: &str) -> Vec<Column> {
    split_top_level(s)
        .into_iter()
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            if item == "*" {
                return Column::All;
            }
            let Some(open) = item.find('(') else {
                return Column::Plain(item.to_string());
            };
            let head = &item[..open];
            let inner = item[open + 1..].strip_suffix(')').unwrap_or(&item[open + 1..]);
            let (alias, table) = match head.split_once(':') {
                Some((alias, table)) => (alias.trim(), table.trim()),
                None => (head.trim(), head.trim()),
            };
            Column::Embed {
                alias: alias.to_string(),
                table: table.to_string(),
                columns: parse_columns(inner),
            }
        })
        .collect()
}

fn singular(table: &str) -> &str {
    table.strip_suffix('s').unwrap_or(table)
}

fn project(
    tables: &HashMap<String, Vec<Value>>,
    table: &str,
    row: &Value,
    columns: &[Column],
) -> Value {
    let mut out = Map::new();
    for column in columns {
        match column {
            Column::All => {
                if let Some(obj) = row.as_object() {
                    out.extend(obj.clone());
                }
            }
            Column::Plain(name) => {
                out.insert(name.clone(), row.get(name).cloned().unwrap_or(Value::Null));
            }
            Column::Embed {
                alias,
                table: child,
                columns,
            } => {
                out.insert(alias.clone(), embed(tables, table, row, child, columns));
            }
        }
    }
    Value::Object(out)
}

fn embed(
    tables: &HashMap<String, Vec<Value>>,
    base: &str,
    row: &Value,
    child: &str,
    columns: &[Column],
) -> Value {
    let children: &[Value] = tables.get(child).map(Vec::as_slice).unwrap_or(&[]);

    let foreign_key = format!("{}_id", singular(child));
    if let Some(key) = row.get(&foreign_key) {
        return children
            .iter()
            .find(|c| c.get("id") == Some(key))
            .map(|c| project(tables, child, c, columns))
            .unwrap_or(Value::Null);
    }

    let back_reference = format!("{}_id", singular(base));
    let Some(id) = row.get("id") else {
        return Value::Array(Vec::new());
    };
    Value::Array(
        children
            .iter()
            .filter(|c| c.get(&back_reference) == Some(id))
            .map(|c| project(tables, child, c, columns))
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

struct MemoryChannel {
    id: u64,
    name: String,
    state: Arc<Mutex<State>>,
}

impl ChannelHandle for MemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn unsubscribe(self: Box<Self>) {
        debug!(channel = %self.name, "memory channel unsubscribed");
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        lock(&self.state).subscribers.retain(|s| s.id != self.id);
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[async_trait]
impl Backend for MemoryBackend {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        _metadata: Value,
    ) -> Result<SignUpOutcome, BackendError> {
        if !email.contains('@') {
            return Err(BackendError::api(400, "Unable to validate email address: invalid format"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(BackendError::api(422, "Password should be at least 6 characters"));
        }
        let mut state = self.state();
        let key = email.to_lowercase();
        if state.accounts.contains_key(&key) {
            return Err(BackendError::api(422, "User already registered"));
        }
        let id = Uuid::new_v4().to_string();
        state.accounts.insert(
            key,
            Account {
                id: id.clone(),
                password: password.to_string(),
            },
        );
        let session = Self::sign_in_as(&mut state, &id, email);
        Ok(SignUpOutcome {
            user: Some(session.user.clone()),
            session: Some(session),
        })
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        let mut state = self.state();
        let id = match state.accounts.get(&email.to_lowercase()) {
            Some(account) if account.password == password => account.id.clone(),
            _ => return Err(BackendError::api(400, "Invalid login credentials")),
        };
        Ok(Self::sign_in_as(&mut state, &id, email))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.state().signed_in = None;
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str) -> Result<(), BackendError> {
        self.state().password_resets.push(email.to_string());
        Ok(())
    }

    async fn select(&self, query: &Query) -> Result<Vec<Value>, BackendError> {
        let state = self.state();
        let mut rows: Vec<Value> = state
            .tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_all(row, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(ref order) = query.order {
            rows.sort_by(|a, b| {
                let ordering = match (a.get(&order.column), b.get(&order.column)) {
                    (Some(x), Some(y)) => compare(x, y),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                };
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        let columns = parse_columns(&query.columns);
        Ok(rows
            .iter()
            .map(|row| project(&state.tables, &query.table, row, &columns))
            .collect())
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, BackendError> {
        let inserted = {
            let mut state = self.state();
            Self::check_writable(&state, table)?;
            let keys = unique_keys(table);
            let existing = state.tables.entry(table.to_string()).or_default();

            let mut prepared = Vec::with_capacity(rows.len());
            for row in rows {
                let obj = prepare_row(table, row)?;
                let duplicate = existing
                    .iter()
                    .chain(prepared.iter())
                    .any(|other| same_key(&obj, other, &["id"]) || same_key(&obj, other, keys));
                if duplicate {
                    return Err(BackendError::Api {
                        status: 409,
                        message: format!("duplicate key value violates unique constraint on {table}"),
                        code: Some("23505".into()),
                        details: None,
                    });
                }
                prepared.push(Value::Object(obj));
            }
            existing.extend(prepared.iter().cloned());
            prepared
        };

        debug!(table, rows = inserted.len(), "memory insert");
        self.publish(
            inserted
                .iter()
                .map(|row| change(table, ChangeKind::Insert, Some(row.clone()), None))
                .collect(),
        );
        Ok(inserted)
    }

    async fn update(
        &self,
        table: &str,
        patch: Value,
        filters: &[Filter],
    ) -> Result<Vec<Value>, BackendError> {
        let mut changes = Vec::new();
        {
            let mut state = self.state();
            Self::check_writable(&state, table)?;
            if let Some(rows) = state.tables.get_mut(table) {
                for row in rows.iter_mut().filter(|row| matches_all(row, filters)) {
                    let old = row.clone();
                    merge(row, &patch);
                    changes.push(change(table, ChangeKind::Update, Some(row.clone()), Some(old)));
                }
            }
        }
        let updated = changes.iter().filter_map(|c| c.new.clone()).collect();
        self.publish(changes);
        Ok(updated)
    }

    async fn upsert(
        &self,
        table: &str,
        rows: Vec<Value>,
        on_conflict: &[&str],
    ) -> Result<Vec<Value>, BackendError> {
        let mut changes = Vec::new();
        {
            let mut state = self.state();
            Self::check_writable(&state, table)?;
            let keys: Vec<&str> = if on_conflict.is_empty() {
                vec!["id"]
            } else {
                on_conflict.to_vec()
            };
            let existing = state.tables.entry(table.to_string()).or_default();
            for row in rows {
                let Some(incoming) = row.as_object() else {
                    return Err(BackendError::api(400, format!("rows for {table} must be objects")));
                };
                match existing.iter_mut().find(|other| same_key(incoming, other, &keys)) {
                    Some(current) => {
                        let old = current.clone();
                        merge(current, &row);
                        changes.push(change(table, ChangeKind::Update, Some(current.clone()), Some(old)));
                    }
                    None => {
                        let stored = Value::Object(prepare_row(table, row)?);
                        existing.push(stored.clone());
                        changes.push(change(table, ChangeKind::Insert, Some(stored), None));
                    }
                }
            }
        }
        let stored = changes.iter().filter_map(|c| c.new.clone()).collect();
        self.publish(changes);
        Ok(stored)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), BackendError> {
        let removed: Vec<Value> = {
            let mut state = self.state();
            Self::check_writable(&state, table)?;
            match state.tables.get_mut(table) {
                Some(rows) => {
                    let (gone, kept) = rows.drain(..).partition(|row| matches_all(row, filters));
                    *rows = kept;
                    gone
                }
                None => Vec::new(),
            }
        };
        debug!(table, rows = removed.len(), "memory delete");
        self.publish(
            removed
                .into_iter()
                .map(|row| change(table, ChangeKind::Delete, None, Some(row)))
                .collect(),
        );
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        _content_type: &str,
    ) -> Result<(), BackendError> {
        let mut state = self.state();
        Self::check_writable(&state, bucket)?;
        let key = format!("{bucket}/{path}");
        if state.objects.contains_key(&key) {
            return Err(BackendError::api(409, "The resource already exists"));
        }
        state.objects.insert(key, data);
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{BASE_URL}/storage/v1/object/public/{bucket}/{path}")
    }

    fn open_channel(
        &self,
        spec: ChannelSpec,
        sink: ChangeSink,
    ) -> Result<Box<dyn ChannelHandle>, BackendError> {
        let mut state = self.state();
        state.next_subscriber += 1;
        let id = state.next_subscriber;
        let name = spec.name.clone();
        state.subscribers.push(Subscriber { id, spec, sink });
        debug!(channel = %name, "memory channel opened");
        Ok(Box::new(MemoryChannel {
            id,
            name,
            state: Arc::clone(&self.state),
        }))
    }
}
