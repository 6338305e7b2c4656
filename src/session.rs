//! Authenticated session: the stored identity and its permission tree.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::api::AuthApi;
use crate::authz::{default_permissions, roles, Identity, PermissionTree};
use crate::errors::{AppError, AppResult};
use crate::events::{AppEvent, DomainEvent, RoleChange};
use crate::models::user::{LoginRequest, StoredSession};
use crate::roles::RolePermissionMap;

/// Durable storage for the serialized session; survives restarts.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> AppResult<Option<String>>;

    async fn save(&self, value: &str) -> AppResult<()>;

    async fn clear(&self) -> AppResult<()>;
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    value: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(value.into())),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> AppResult<Option<String>> {
        Ok(self.value.lock().await.clone())
    }

    async fn save(&self, value: &str) -> AppResult<()> {
        *self.value.lock().await = Some(value.to_string());
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        *self.value.lock().await = None;
        Ok(())
    }
}

pub struct SessionManager<S: SessionStore> {
    store: S,
    system: RolePermissionMap,
    current: Option<StoredSession>,
}

impl<S: SessionStore> SessionManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            system: RolePermissionMap::builtin(),
            current: None,
        }
    }

    pub fn with_system_roles(mut self, system: RolePermissionMap) -> Self {
        self.system = system;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.current.as_ref().map(|session| &session.user)
    }

    pub fn token(&self) -> Option<&str> {
        self.current.as_ref().map(|session| session.token.as_str())
    }

    /// Load the persisted session. Malformed content is cleared and treated as no session.
    pub async fn restore(&mut self) -> AppResult<Option<&Identity>> {
        let Some(raw) = self.store.load().await? else {
            self.current = None;
            return Ok(None);
        };

        match serde_json::from_str::<StoredSession>(&raw) {
            Ok(session) if !session.token.trim().is_empty() => {
                tracing::debug!(user = %session.user.id, "session restored");
                self.current = Some(session);
            }
            Ok(_) => {
                tracing::warn!("stored session has no token, discarding");
                self.discard().await?;
            }
            Err(err) => {
                tracing::warn!(error = %err, "stored session is malformed, discarding");
                self.discard().await?;
            }
        }
        Ok(self.identity())
    }

    pub async fn login(&mut self, api: &dyn AuthApi, email: &str, password: &str) -> AppResult<&Identity> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AppError::validation("Email and password are required"));
        }

        let response = api
            .login(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await?;

        let mut user = response.user;
        let granted = if user.permissions.is_empty() {
            self.system.tree_for(&user.role).unwrap_or_default()
        } else {
            user.permissions
        };
        user.permissions = granted.merged_over(&default_permissions());

        tracing::info!(user = %user.id, role = %user.role, "logged in");
        self.persist(StoredSession {
            token: response.token,
            user,
        })
        .await?;
        self.identity()
            .ok_or_else(|| AppError::internal("session missing right after login"))
    }

    /// Remote logout is best effort; the local session is always cleared.
    pub async fn logout(&mut self, api: &dyn AuthApi) -> AppResult<()> {
        if let Err(err) = api.logout().await {
            tracing::warn!(error = %err, "remote logout failed, clearing local session anyway");
        }
        self.discard().await?;
        tracing::info!("logged out");
        Ok(())
    }

    /// Replace the current identity's permissions, filling gaps from the defaults.
    pub async fn update_user_permissions(&mut self, permissions: &PermissionTree) -> AppResult<()> {
        let mut session = self.require_session()?;
        session.user.permissions = permissions.merged_over(&default_permissions());
        self.persist(session).await
    }

    /// React to a broadcast; returns whether the session changed.
    ///
    /// Permission changes apply when they target the current role (by its new
    /// or previous name); assignment changes apply when they target the
    /// current user.
    pub async fn handle_event(&mut self, event: &DomainEvent<AppEvent>) -> AppResult<bool> {
        let Some(identity) = self.identity() else {
            return Ok(false);
        };

        match &event.payload {
            AppEvent::PermissionsUpdated(updated) => {
                let current_role = identity.role.as_str();
                let matches = current_role.eq_ignore_ascii_case(&updated.role_name)
                    || updated
                        .previous_name
                        .as_deref()
                        .is_some_and(|old| current_role.eq_ignore_ascii_case(old));
                if !matches {
                    return Ok(false);
                }

                tracing::info!(role = %updated.role_name, "permissions of the current role changed");
                self.adopt_role(&updated.role_name, &updated.permissions).await?;
                Ok(true)
            }
            AppEvent::RolesUpdated(updated) if updated.user_id.as_deref() == Some(identity.id.as_str()) => {
                match (updated.change, &updated.permissions) {
                    (RoleChange::Assigned, Some(tree)) => {
                        tracing::info!(role = %updated.role_name, "role assigned to the current user");
                        self.adopt_role(&updated.role_name, tree).await?;
                        Ok(true)
                    }
                    (RoleChange::Unassigned, _) if identity.role.eq_ignore_ascii_case(&updated.role_name) => {
                        tracing::info!(role = %updated.role_name, "role removed from the current user");
                        let fallback = self.system.tree_for(roles::EMPLOYEE).unwrap_or_default();
                        self.adopt_role(roles::EMPLOYEE, &fallback).await?;
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            }
            _ => Ok(false),
        }
    }

    async fn adopt_role(&mut self, name: &str, permissions: &PermissionTree) -> AppResult<()> {
        let mut session = self.require_session()?;
        session.user.role = name.to_string();
        session.user.permissions = permissions.merged_over(&default_permissions());
        self.persist(session).await
    }

    fn require_session(&self) -> AppResult<StoredSession> {
        self.current
            .clone()
            .ok_or_else(|| AppError::unauthorized("Not logged in"))
    }

    async fn persist(&mut self, session: StoredSession) -> AppResult<()> {
        let raw = serde_json::to_string(&session).map_err(|err| AppError::internal(err.to_string()))?;
        self.store.save(&raw).await?;
        self.current = Some(session);
        Ok(())
    }

    async fn discard(&mut self) -> AppResult<()> {
        self.current = None;
        self.store.clear().await
    }
}
