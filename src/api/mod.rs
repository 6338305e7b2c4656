//! Backend ports.
//!
//! Every remote collaborator sits behind a trait so the services can run
//! against the HTTP adapter or the in-process backend.

mod http;
mod memory;

pub use http::HttpBackend;
pub use memory::{MemoryCollection, MemoryDirectory};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::AppResult;
use crate::events::TimelineEntry;
use crate::models::rbac::{Role, RolePayload};
use crate::models::user::{AuthResponse, LoginRequest};
use crate::sync::SyncEntity;

/// Server-side list parameters; the active value is reused for every re-fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    pub page: u32,
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 50,
            status: None,
            search: None,
            department: None,
        }
    }
}

impl ListQuery {
    pub fn with_page(mut self, page: u32, limit: u32) -> Self {
        self.page = page.max(1);
        self.limit = limit.max(1);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> AppResult<AuthResponse>;

    async fn logout(&self) -> AppResult<()>;
}

#[async_trait]
pub trait RoleApi: Send + Sync {
    async fn list_roles(&self) -> AppResult<Vec<Role>>;

    async fn create_role(&self, payload: &RolePayload) -> AppResult<()>;

    async fn update_role(&self, role_id: &str, payload: &RolePayload) -> AppResult<()>;

    async fn delete_role(&self, role_id: &str) -> AppResult<()>;

    async fn assign_role(&self, user_id: &str, role_id: &str) -> AppResult<()>;

    async fn unassign_role(&self, user_id: &str, role_id: &str) -> AppResult<()>;
}

/// CRUD + status transitions for one entity collection.
///
/// Mutations carry their timeline entry so the record and its audit trail
/// change in one request.
#[async_trait]
pub trait EntityApi<E: SyncEntity>: Send + Sync {
    async fn list(&self, query: &ListQuery) -> AppResult<Vec<E>>;

    async fn get(&self, id: &str) -> AppResult<E>;

    async fn create(&self, draft: &E::Draft, entry: &TimelineEntry) -> AppResult<E>;

    async fn update(&self, id: &str, patch: &E::Patch, entry: &TimelineEntry) -> AppResult<E>;

    async fn change_status(&self, id: &str, status: &E::Status, entry: &TimelineEntry) -> AppResult<E>;

    async fn delete(&self, id: &str, entry: &TimelineEntry) -> AppResult<()>;
}
