//! [`Backend`] over the hosted service's HTTP APIs: `/auth/v1` for
//! authentication, `/rest/v1` for tables, `/storage/v1` for objects.  Change
//! feeds go through the websocket client in [`super::realtime`].

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use paporeto_shared::constants::{APP_NAME, APP_VERSION};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use super::realtime::{self, RealtimeEndpoint};
use super::{
    value_text, AuthSession, AuthUser, Backend, ChangeSink, ChannelHandle, ChannelSpec, Filter,
    Query, SignUpOutcome,
};
use crate::config::BackendConfig;
use crate::error::BackendError;

const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct RestBackend {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    /// Bearer token of the signed-in user; the anon key is used until then.
    access_token: RwLock<Option<String>>,
}

impl RestBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        Url::parse(config.base_url())
            .map_err(|e| BackendError::Transport(format!("invalid endpoint {}: {e}", config.url)))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(format!("{APP_NAME}/{APP_VERSION}"))
            .build()?;

        info!(url = %config.base_url(), "backend client created");

        Ok(Self {
            http,
            base_url: config.base_url().to_string(),
            anon_key: config.anon_key.clone(),
            access_token: RwLock::new(None),
        })
    }

    /// Resume a session persisted by an earlier run.
    pub fn with_access_token(self, token: Option<String>) -> Self {
        self.set_token(token);
        self
    }

    fn token(&self) -> Option<String> {
        self.access_token.read().ok().and_then(|t| t.clone())
    }

    fn set_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.access_token.write() {
            *guard = token;
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let bearer = self.token().unwrap_or_else(|| self.anon_key.clone());
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, BackendError> {
        let response = builder.send().await?;
        check_status(response).await
    }

    async fn send_rows(&self, builder: RequestBuilder) -> Result<Vec<Value>, BackendError> {
        let response = self.send(builder).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str(&text)? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            row => Ok(vec![row]),
        }
    }

    fn realtime_endpoint(&self) -> Result<RealtimeEndpoint, BackendError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| BackendError::Realtime(format!("invalid endpoint: {e}")))?;
        let scheme = if url.scheme() == "http" { "ws" } else { "wss" };
        url.set_scheme(scheme)
            .map_err(|_| BackendError::Realtime("cannot derive websocket scheme".into()))?;
        url.set_path("/realtime/v1/websocket");
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", &self.anon_key)
            .append_pair("vsn", "1.0.0");
        Ok(RealtimeEndpoint {
            url: url.to_string(),
            access_token: self.token().unwrap_or_else(|| self.anon_key.clone()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
    code: Option<Value>,
    details: Option<Value>,
    hint: Option<String>,
}

async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(parse_error(status.as_u16(), &text))
}

fn parse_error(status: u16, text: &str) -> BackendError {
    let Ok(body) = serde_json::from_str::<ErrorBody>(text) else {
        let message = if text.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            text.trim().to_string()
        };
        return BackendError::api(status, message);
    };
    let message = body
        .message
        .or(body.msg)
        .or(body.error_description)
        .or(body.error)
        .unwrap_or_else(|| format!("HTTP {status}"));
    let details = match (body.details, body.hint) {
        (Some(d), Some(h)) => Some(format!("{}; hint: {h}", value_text(&d))),
        (Some(d), None) => Some(value_text(&d)),
        (None, Some(h)) => Some(format!("hint: {h}")),
        (None, None) => None,
    };
    BackendError::Api {
        status,
        message,
        code: body.code.as_ref().map(value_text),
        details,
    }
}

/// Encode filters as table API query parameters.
pub(crate) fn filter_params(filters: &[Filter], out: &mut Vec<(String, String)>) {
    for filter in filters {
        match filter {
            Filter::Eq(column, v) => out.push((column.clone(), format!("eq.{}", value_text(v)))),
            Filter::Neq(column, v) => out.push((column.clone(), format!("neq.{}", value_text(v)))),
            Filter::Gte(column, v) => out.push((column.clone(), format!("gte.{}", value_text(v)))),
            Filter::And(inner) => filter_params(inner, out),
            Filter::Or(alternatives) => out.push(("or".to_string(), format!("({})", logic_terms(alternatives)))),
        }
    }
}

fn logic_terms(filters: &[Filter]) -> String {
    filters.iter().map(logic_term).collect::<Vec<_>>().join(",")
}

fn logic_term(filter: &Filter) -> String {
    match filter {
        Filter::Eq(column, v) => format!("{column}.eq.{}", quote_term(v)),
        Filter::Neq(column, v) => format!("{column}.neq.{}", quote_term(v)),
        Filter::Gte(column, v) => format!("{column}.gte.{}", quote_term(v)),
        Filter::And(inner) => format!("and({})", logic_terms(inner)),
        Filter::Or(inner) => format!("or({})", logic_terms(inner)),
    }
}

/// Values inside `or(...)` / `and(...)` must be quoted when they contain
/// the list delimiters.
fn quote_term(value: &Value) -> String {
    let text = value_text(value);
    if text.contains([',', '.', ':', '(', ')', '"', ' ']) {
        format!("\"{}\"", text.replace('"', "\\\""))
    } else {
        text
    }
}

pub(crate) fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), query.columns.replace(' ', ""))];
    filter_params(&query.filters, &mut params);
    if let Some(ref order) = query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{direction}", order.column)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

fn parse_sign_up(body: Value) -> Result<SignUpOutcome, BackendError> {
    if body.get("access_token").is_some() {
        let session: AuthSession = serde_json::from_value(body)?;
        return Ok(SignUpOutcome {
            user: Some(session.user.clone()),
            session: Some(session),
        });
    }
    let user_value = body.get("user").cloned().unwrap_or(body);
    let user = if user_value.get("id").is_some() {
        Some(serde_json::from_value::<AuthUser>(user_value)?)
    } else {
        None
    };
    Ok(SignUpOutcome {
        user,
        session: None,
    })
}

const RETURN_ROWS: &str = "return=representation";
const MERGE_ROWS: &str = "resolution=merge-duplicates,return=representation";

#[async_trait]
impl Backend for RestBackend {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<SignUpOutcome, BackendError> {
        let builder = self
            .request(Method::POST, "/auth/v1/signup")
            .json(&json!({ "email": email, "password": password, "data": metadata }));
        let body: Value = self.send(builder).await?.json().await?;
        let outcome = parse_sign_up(body)?;
        if let Some(ref session) = outcome.session {
            self.set_token(Some(session.access_token.clone()));
        }
        Ok(outcome)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        let builder = self
            .request(Method::POST, "/auth/v1/token")
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));
        let session: AuthSession = self.send(builder).await?.json().await?;
        self.set_token(Some(session.access_token.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if self.token().is_none() {
            return Ok(());
        }
        let result = self.send(self.request(Method::POST, "/auth/v1/logout")).await;
        self.set_token(None);
        result.map(|_| ())
    }

    async fn reset_password_for_email(&self, email: &str) -> Result<(), BackendError> {
        let builder = self
            .request(Method::POST, "/auth/v1/recover")
            .json(&json!({ "email": email }));
        self.send(builder).await?;
        Ok(())
    }

    async fn select(&self, query: &Query) -> Result<Vec<Value>, BackendError> {
        debug!(table = %query.table, "select");
        let builder = self
            .request(Method::GET, &format!("/rest/v1/{}", query.table))
            .query(&query_params(query));
        self.send_rows(builder).await
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, BackendError> {
        let builder = self
            .request(Method::POST, &format!("/rest/v1/{table}"))
            .header("Prefer", RETURN_ROWS)
            .json(&rows);
        self.send_rows(builder).await
    }

    async fn update(
        &self,
        table: &str,
        patch: Value,
        filters: &[Filter],
    ) -> Result<Vec<Value>, BackendError> {
        let mut params = Vec::new();
        filter_params(filters, &mut params);
        let builder = self
            .request(Method::PATCH, &format!("/rest/v1/{table}"))
            .query(&params)
            .header("Prefer", RETURN_ROWS)
            .json(&patch);
        self.send_rows(builder).await
    }

    async fn upsert(
        &self,
        table: &str,
        rows: Vec<Value>,
        on_conflict: &[&str],
    ) -> Result<Vec<Value>, BackendError> {
        let mut builder = self
            .request(Method::POST, &format!("/rest/v1/{table}"))
            .header("Prefer", MERGE_ROWS)
            .json(&rows);
        if !on_conflict.is_empty() {
            builder = builder.query(&[("on_conflict", on_conflict.join(","))]);
        }
        self.send_rows(builder).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), BackendError> {
        let mut params = Vec::new();
        filter_params(filters, &mut params);
        let builder = self
            .request(Method::DELETE, &format!("/rest/v1/{table}"))
            .query(&params);
        self.send(builder).await?;
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), BackendError> {
        let content_type = HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
        let size = data.len();
        let builder = self
            .request(Method::POST, &format!("/storage/v1/object/{bucket}/{path}"))
            .header(CONTENT_TYPE, content_type)
            .body(data);
        self.send(builder).await?;
        debug!(bucket, path, size, "object uploaded");
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{path}", self.base_url)
    }

    fn open_channel(
        &self,
        spec: ChannelSpec,
        sink: ChangeSink,
    ) -> Result<Box<dyn ChannelHandle>, BackendError> {
        let endpoint = self.realtime_endpoint()?;
        let channel = realtime::spawn_channel(endpoint, spec, sink)?;
        Ok(Box::new(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn direct_conversation_filter_is_one_or_predicate() {
        let query = Query::table("messages")
            .select("*, reactions:message_reactions(*)")
            .or(vec![
                Filter::and(vec![Filter::eq("sender_id", "me"), Filter::eq("receiver_id", "u2")]),
                Filter::and(vec![Filter::eq("sender_id", "u2"), Filter::eq("receiver_id", "me")]),
            ])
            .order("created_at", true);

        let params = query_params(&query);
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "*,reactions:message_reactions(*)".to_string()),
                (
                    "or".to_string(),
                    "(and(sender_id.eq.me,receiver_id.eq.u2),and(sender_id.eq.u2,receiver_id.eq.me))"
                        .to_string()
                ),
                ("order".to_string(), "created_at.asc".to_string()),
            ]
        );
    }

    #[test]
    fn plain_filters_and_limits() {
        let query = Query::table("users").neq("id", "me").eq("online", true).limit(1);
        let params = query_params(&query);
        assert!(params.contains(&("id".to_string(), "neq.me".to_string())));
        assert!(params.contains(&("online".to_string(), "eq.true".to_string())));
        assert!(params.contains(&("limit".to_string(), "1".to_string())));
    }

    #[test]
    fn or_terms_quote_reserved_characters() {
        assert_eq!(quote_term(&json!("a.b")), "\"a.b\"");
        assert_eq!(quote_term(&json!("plain-id")), "plain-id");
    }

    #[test]
    fn error_payloads_keep_backend_detail() {
        let err = parse_error(
            409,
            r#"{"code":"23505","message":"duplicate key","details":"Key (id) exists","hint":null}"#,
        );
        assert_eq!(
            err,
            BackendError::Api {
                status: 409,
                message: "duplicate key".into(),
                code: Some("23505".into()),
                details: Some("Key (id) exists".into()),
            }
        );

        let auth = parse_error(400, r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#);
        assert!(auth.to_string().contains("Invalid login credentials"));

        assert_eq!(parse_error(502, ""), BackendError::api(502, "HTTP 502"));
    }

    #[test]
    fn sign_up_accepts_user_or_session_bodies() {
        let unconfirmed = parse_sign_up(json!({ "id": "u-1", "email": "a@b.c" })).unwrap();
        assert_eq!(unconfirmed.user.unwrap().id, "u-1");
        assert!(unconfirmed.session.is_none());

        let confirmed = parse_sign_up(json!({
            "access_token": "tok",
            "user": { "id": "u-2", "email": "a@b.c" }
        }))
        .unwrap();
        assert_eq!(confirmed.user.unwrap().id, "u-2");
        assert_eq!(confirmed.session.unwrap().access_token, "tok");
    }

    #[test]
    fn realtime_endpoint_uses_websocket_scheme() {
        let backend = RestBackend::new(&BackendConfig::new("https://abcd1234.supabase.co", "anon")).unwrap();
        let endpoint = backend.realtime_endpoint().unwrap();
        assert_eq!(
            endpoint.url,
            "wss://abcd1234.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
        assert_eq!(
            backend.public_url("media", "u1/1.png"),
            "https://abcd1234.supabase.co/storage/v1/object/public/media/u1/1.png"
        );
        assert_eq!(endpoint.access_token, "anon");

        let resumed = backend.with_access_token(Some("jwt".into()));
        assert_eq!(resumed.realtime_endpoint().unwrap().access_token, "jwt");
    }
}
