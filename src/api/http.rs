use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::{AuthApi, EntityApi, ListQuery, RoleApi};
use crate::config::ClientConfig;
use crate::errors::{AppError, AppResult};
use crate::events::TimelineEntry;
use crate::models::rbac::{Role, RolePayload};
use crate::models::user::{AssignRoleRequest, AuthResponse, LoginRequest};
use crate::sync::SyncEntity;

/// reqwest adapter for the dashboard backend
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WithTimeline<'a, T: Serialize> {
    #[serde(flatten)]
    body: &'a T,
    timeline_entry: &'a TimelineEntry,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> AppResult<Self> {
        Self::with_base_url(&config.api_base_url, config.timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::configuration(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    /// Bearer token attached to every subsequent request.
    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    async fn send(&self, mut builder: RequestBuilder) -> AppResult<Value> {
        let token = self.token.read().await.clone();
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = backend_message(&text);
            tracing::debug!(status = status.as_u16(), message = %message, "backend rejected request");
            return Err(match status {
                StatusCode::UNAUTHORIZED => AppError::unauthorized(message),
                StatusCode::NOT_FOUND => AppError::not_found(message),
                _ => AppError::remote(status.as_u16(), message),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|err| AppError::decode(err.to_string()))
    }
}

/// Strip the `{ data: { data: ... } }` envelope (up to two levels).
fn unwrap_data(mut value: Value) -> Value {
    for _ in 0..2 {
        let inner = match &mut value {
            Value::Object(map) => map.remove("data"),
            _ => None,
        };
        match inner {
            Some(inner) => value = inner,
            None => break,
        }
    }
    value
}

/// Fold a legacy `_id` into the canonical `id` string.
fn normalize_id(value: &mut Value) {
    let Value::Object(map) = value else { return };

    let legacy = map.remove("_id").and_then(id_string);
    let current = map.remove("id").and_then(id_string);
    if let Some(id) = current.or(legacy) {
        map.insert("id".to_string(), Value::String(id));
    }
}

fn id_string(raw: Value) -> Option<String> {
    let id = match raw {
        Value::String(id) => id,
        Value::Number(id) => id.to_string(),
        Value::Object(mut map) => match map.remove("$oid") {
            Some(Value::String(id)) => id,
            _ => return None,
        },
        _ => return None,
    };
    (!id.trim().is_empty()).then_some(id)
}

fn decode<T: DeserializeOwned>(value: Value) -> AppResult<T> {
    serde_path_to_error::deserialize(value)
        .map_err(|err| AppError::decode(format!("{} at `{}`", err.inner(), err.path())))
}

fn decode_record<T: DeserializeOwned>(value: Value) -> AppResult<T> {
    let mut record = unwrap_data(value);
    normalize_id(&mut record);
    decode(record)
}

/// Decode a list response; records that fail to decode are skipped.
fn decode_list<T: DeserializeOwned>(value: Value) -> AppResult<Vec<T>> {
    let Value::Array(items) = unwrap_data(value) else {
        return Err(AppError::decode("expected a list in `data.data`"));
    };

    let mut records = Vec::with_capacity(items.len());
    for mut item in items {
        normalize_id(&mut item);
        match decode::<T>(item) {
            Ok(record) => records.push(record),
            Err(err) => tracing::warn!(error = %err, "skipping malformed record"),
        }
    }
    Ok(records)
}

fn backend_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };

    let found = value
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| value.get("error").and_then(Value::as_str))
        .or_else(|| value.pointer("/error/message").and_then(Value::as_str))
        .or_else(|| value.pointer("/data/message").and_then(Value::as_str));
    found.unwrap_or_default().to_string()
}

#[async_trait]
impl AuthApi for HttpBackend {
    async fn login(&self, request: &LoginRequest) -> AppResult<AuthResponse> {
        let value = self
            .send(self.request(Method::POST, "auth/login").json(request))
            .await?;

        let mut body = unwrap_data(value);
        if let Some(user) = body.get_mut("user") {
            normalize_id(user);
        }
        let response: AuthResponse = decode(body)?;
        self.set_token(Some(response.token.clone())).await;
        Ok(response)
    }

    async fn logout(&self) -> AppResult<()> {
        let result = self.send(self.request(Method::POST, "auth/logout")).await;
        self.set_token(None).await;
        result.map(|_| ())
    }
}

#[async_trait]
impl RoleApi for HttpBackend {
    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        let value = self.send(self.request(Method::GET, "roles")).await?;
        decode_list(value)
    }

    async fn create_role(&self, payload: &RolePayload) -> AppResult<()> {
        self.send(self.request(Method::POST, "roles").json(payload)).await?;
        Ok(())
    }

    async fn update_role(&self, role_id: &str, payload: &RolePayload) -> AppResult<()> {
        self.send(self.request(Method::PUT, &format!("roles/{role_id}")).json(payload))
            .await?;
        Ok(())
    }

    async fn delete_role(&self, role_id: &str) -> AppResult<()> {
        self.send(self.request(Method::DELETE, &format!("roles/{role_id}")))
            .await?;
        Ok(())
    }

    async fn assign_role(&self, user_id: &str, role_id: &str) -> AppResult<()> {
        let body = AssignRoleRequest {
            role_id: role_id.to_string(),
        };
        self.send(self.request(Method::POST, &format!("users/{user_id}/roles")).json(&body))
            .await?;
        Ok(())
    }

    async fn unassign_role(&self, user_id: &str, role_id: &str) -> AppResult<()> {
        self.send(self.request(Method::DELETE, &format!("users/{user_id}/roles/{role_id}")))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<E: SyncEntity> EntityApi<E> for HttpBackend {
    async fn list(&self, query: &ListQuery) -> AppResult<Vec<E>> {
        let value = self
            .send(self.request(Method::GET, E::collection()).query(query))
            .await?;
        decode_list(value)
    }

    async fn get(&self, id: &str) -> AppResult<E> {
        let path = format!("{}/{id}", E::collection());
        let value = self.send(self.request(Method::GET, &path)).await?;
        decode_record(value)
    }

    async fn create(&self, draft: &E::Draft, entry: &TimelineEntry) -> AppResult<E> {
        let body = WithTimeline {
            body: draft,
            timeline_entry: entry,
        };
        let value = self
            .send(self.request(Method::POST, E::collection()).json(&body))
            .await?;
        decode_record(value)
    }

    async fn update(&self, id: &str, patch: &E::Patch, entry: &TimelineEntry) -> AppResult<E> {
        let path = format!("{}/{id}", E::collection());
        let body = WithTimeline {
            body: patch,
            timeline_entry: entry,
        };
        let value = self.send(self.request(Method::PUT, &path).json(&body)).await?;
        decode_record(value)
    }

    async fn change_status(&self, id: &str, status: &E::Status, entry: &TimelineEntry) -> AppResult<E> {
        let path = format!("{}/{id}/status", E::collection());
        let body = json!({ "status": status, "timelineEntry": entry });
        let value = self.send(self.request(Method::PATCH, &path).json(&body)).await?;
        decode_record(value)
    }

    async fn delete(&self, id: &str, entry: &TimelineEntry) -> AppResult<()> {
        let path = format!("{}/{id}", E::collection());
        let body = json!({ "timelineEntry": entry });
        self.send(self.request(Method::DELETE, &path).json(&body)).await?;
        Ok(())
    }
}
