use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{AuthApi, EntityApi, ListQuery, RoleApi};
use crate::authz::{flags_from_tree, Identity};
use crate::errors::{AppError, AppResult};
use crate::events::TimelineEntry;
use crate::models::rbac::{Role, RolePayload};
use crate::models::user::{AuthResponse, LoginRequest};
use crate::sync::SyncEntity;

/// Call accounting and one-shot failure injection shared by the in-process backends.
#[derive(Default)]
struct Counters {
    calls: AtomicUsize,
    mutations: AtomicUsize,
    failure: Mutex<Option<(u16, String)>>,
}

impl Counters {
    async fn enter(&self, mutation: bool) -> AppResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if mutation {
            self.mutations.fetch_add(1, Ordering::SeqCst);
        }
        match self.failure.lock().await.take() {
            Some((status, message)) => Err(AppError::remote(status, message)),
            None => Ok(()),
        }
    }
}

/// In-process collection behaving like the remote list/CRUD endpoints.
pub struct MemoryCollection<E: SyncEntity> {
    records: Mutex<Vec<E>>,
    last_query: Mutex<Option<ListQuery>>,
    next_id: AtomicUsize,
    counters: Counters,
}

impl<E: SyncEntity> Default for MemoryCollection<E> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<E: SyncEntity> MemoryCollection<E> {
    pub fn new(records: Vec<E>) -> Self {
        Self {
            next_id: AtomicUsize::new(records.len() + 1),
            records: Mutex::new(records),
            last_query: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    /// Every call, reads included.
    pub fn calls(&self) -> usize {
        self.counters.calls.load(Ordering::SeqCst)
    }

    pub fn mutations(&self) -> usize {
        self.counters.mutations.load(Ordering::SeqCst)
    }

    pub async fn last_query(&self) -> Option<ListQuery> {
        self.last_query.lock().await.clone()
    }

    /// Make the next call fail with a backend error.
    pub async fn fail_next(&self, status: u16, message: impl Into<String>) {
        *self.counters.failure.lock().await = Some((status, message.into()));
    }

    pub async fn snapshot(&self) -> Vec<E> {
        self.records.lock().await.clone()
    }

    /// Change a record behind the client's back.
    pub async fn mutate(&self, id: &str, change: impl FnOnce(&mut E)) -> bool {
        let mut records = self.records.lock().await;
        match records.iter_mut().find(|record| record.id() == id) {
            Some(record) => {
                change(record);
                true
            }
            None => false,
        }
    }

    fn not_found(id: &str) -> AppError {
        AppError::not_found(format!("{} {} not found", E::label(), id))
    }
}

#[async_trait]
impl<E: SyncEntity> EntityApi<E> for MemoryCollection<E> {
    async fn list(&self, query: &ListQuery) -> AppResult<Vec<E>> {
        self.counters.enter(false).await?;
        *self.last_query.lock().await = Some(query.clone());

        let records = self.records.lock().await;
        let matching: Vec<E> = records
            .iter()
            .filter(|record| {
                query
                    .status
                    .as_deref()
                    .map_or(true, |status| record.status().to_string().eq_ignore_ascii_case(status))
            })
            .filter(|record| {
                query.department.as_deref().map_or(true, |department| {
                    record
                        .department()
                        .is_some_and(|own| own.eq_ignore_ascii_case(department))
                })
            })
            .filter(|record| {
                query
                    .search
                    .as_deref()
                    .map_or(true, |search| record.matches_search(&search.trim().to_lowercase()))
            })
            .cloned()
            .collect();

        let limit = query.limit.max(1) as usize;
        let skip = (query.page.max(1) as usize - 1) * limit;
        Ok(matching.into_iter().skip(skip).take(limit).collect())
    }

    async fn get(&self, id: &str) -> AppResult<E> {
        self.counters.enter(false).await?;
        self.records
            .lock()
            .await
            .iter()
            .find(|record| record.id() == id)
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }

    async fn create(&self, draft: &E::Draft, entry: &TimelineEntry) -> AppResult<E> {
        self.counters.enter(true).await?;
        let id = format!("{}-{}", E::entity_type(), self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut record = E::from_draft(id, draft, Utc::now());
        record.record(entry.clone());
        self.records.lock().await.push(record.clone());
        Ok(record)
    }

    async fn update(&self, id: &str, patch: &E::Patch, entry: &TimelineEntry) -> AppResult<E> {
        self.counters.enter(true).await?;
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|record| record.id() == id)
            .ok_or_else(|| Self::not_found(id))?;
        record.apply_patch(patch);
        record.record(entry.clone());
        Ok(record.clone())
    }

    async fn change_status(&self, id: &str, status: &E::Status, entry: &TimelineEntry) -> AppResult<E> {
        self.counters.enter(true).await?;
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|record| record.id() == id)
            .ok_or_else(|| Self::not_found(id))?;
        record.set_status(status.clone());
        record.record(entry.clone());
        Ok(record.clone())
    }

    async fn delete(&self, id: &str, _entry: &TimelineEntry) -> AppResult<()> {
        self.counters.enter(true).await?;
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|record| record.id() != id);
        if records.len() == before {
            return Err(Self::not_found(id));
        }
        Ok(())
    }
}

struct Account {
    password: String,
    user: Identity,
}

/// In-process auth + role directory.
#[derive(Default)]
pub struct MemoryDirectory {
    roles: Mutex<Vec<Role>>,
    accounts: Mutex<BTreeMap<String, Account>>,
    assignments: Mutex<BTreeMap<String, BTreeSet<String>>>,
    next_id: AtomicUsize,
    counters: Counters,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roles(mut self, roles: Vec<Role>) -> Self {
        *self.roles.get_mut() = roles;
        self
    }

    pub async fn add_account(&self, password: impl Into<String>, user: Identity) {
        self.accounts.lock().await.insert(
            user.email.to_lowercase(),
            Account {
                password: password.into(),
                user,
            },
        );
    }

    pub fn calls(&self) -> usize {
        self.counters.calls.load(Ordering::SeqCst)
    }

    pub fn mutations(&self) -> usize {
        self.counters.mutations.load(Ordering::SeqCst)
    }

    pub async fn fail_next(&self, status: u16, message: impl Into<String>) {
        *self.counters.failure.lock().await = Some((status, message.into()));
    }

    pub async fn roles_snapshot(&self) -> Vec<Role> {
        self.roles.lock().await.clone()
    }

    pub async fn assigned_roles(&self, user_id: &str) -> BTreeSet<String> {
        self.assignments
            .lock()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuthApi for MemoryDirectory {
    async fn login(&self, request: &LoginRequest) -> AppResult<AuthResponse> {
        self.counters.enter(false).await?;
        let accounts = self.accounts.lock().await;
        match accounts.get(&request.email.to_lowercase()) {
            Some(account) if account.password == request.password => Ok(AuthResponse {
                token: format!("token-{}", account.user.id),
                user: account.user.clone(),
            }),
            _ => Err(AppError::unauthorized("Invalid email or password")),
        }
    }

    async fn logout(&self) -> AppResult<()> {
        self.counters.enter(false).await
    }
}

#[async_trait]
impl RoleApi for MemoryDirectory {
    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        self.counters.enter(false).await?;
        Ok(self.roles.lock().await.clone())
    }

    async fn create_role(&self, payload: &RolePayload) -> AppResult<()> {
        self.counters.enter(true).await?;
        let name = payload.name.clone().unwrap_or_default();
        let mut roles = self.roles.lock().await;
        if roles.iter().any(|role| role.name == name) {
            return Err(AppError::remote(409, format!("Role {name} already exists")));
        }

        let id = format!("role-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        roles.push(Role {
            id,
            name,
            description: payload.description.clone(),
            permissions: payload.permissions.as_ref().map(flags_from_tree).unwrap_or_default(),
        });
        Ok(())
    }

    async fn update_role(&self, role_id: &str, payload: &RolePayload) -> AppResult<()> {
        self.counters.enter(true).await?;
        let mut roles = self.roles.lock().await;
        let role = roles
            .iter_mut()
            .find(|role| role.id == role_id)
            .ok_or_else(|| AppError::not_found(format!("Role {role_id} not found")))?;

        if let Some(name) = &payload.name {
            role.name = name.clone();
        }
        if let Some(description) = &payload.description {
            role.description = Some(description.clone());
        }
        if let Some(permissions) = &payload.permissions {
            role.permissions = flags_from_tree(permissions);
        }
        Ok(())
    }

    async fn delete_role(&self, role_id: &str) -> AppResult<()> {
        self.counters.enter(true).await?;
        let mut roles = self.roles.lock().await;
        let before = roles.len();
        roles.retain(|role| role.id != role_id);
        if roles.len() == before {
            return Err(AppError::not_found(format!("Role {role_id} not found")));
        }
        Ok(())
    }

    async fn assign_role(&self, user_id: &str, role_id: &str) -> AppResult<()> {
        self.counters.enter(true).await?;
        self.assignments
            .lock()
            .await
            .entry(user_id.to_string())
            .or_default()
            .insert(role_id.to_string());
        Ok(())
    }

    async fn unassign_role(&self, user_id: &str, role_id: &str) -> AppResult<()> {
        self.counters.enter(true).await?;
        if let Some(assigned) = self.assignments.lock().await.get_mut(user_id) {
            assigned.remove(role_id);
        }
        Ok(())
    }
}
