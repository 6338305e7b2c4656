//! Role administration.
//!
//! Every mutation follows the same sequence: local precondition checks, the
//! remote call, a full re-fetch of the role list, a broadcast on the event
//! bus and an operator notification. Failures are notified and returned.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::api::RoleApi;
use crate::authz::{format_permissions_for_api, permissions, roles, PermissionTree};
use crate::errors::{AppError, AppResult};
use crate::events::{self, AppEvent, EventBus, PermissionsUpdated, RoleChange, RolesUpdated};
use crate::models::rbac::{require_role_id, Role, RoleDraft, RolePayload, RoleUpdate};
use crate::notify::{Confirm, Notifier};

/// Flag sets of the built-in system roles, keyed by upper-cased role name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolePermissionMap {
    roles: BTreeMap<String, BTreeSet<String>>,
}

impl RolePermissionMap {
    /// `ADMIN` holds every catalogue flag, `EMPLOYEE` a read-mostly subset.
    pub fn builtin() -> Self {
        Self::default()
            .with_role(roles::ADMIN, permissions::ALL)
            .with_role(roles::EMPLOYEE, permissions::EMPLOYEE_DEFAULTS)
    }

    pub fn with_role<S: AsRef<str>>(mut self, name: &str, flags: &[S]) -> Self {
        self.roles.insert(
            name.trim().to_ascii_uppercase(),
            flags.iter().map(|flag| flag.as_ref().to_string()).collect(),
        );
        self
    }

    pub fn get(&self, role: &str) -> Option<&BTreeSet<String>> {
        self.roles.get(&role.trim().to_ascii_uppercase())
    }

    pub fn tree_for(&self, role: &str) -> Option<PermissionTree> {
        self.get(role).map(|flags| {
            let flags: Vec<&str> = flags.iter().map(String::as_str).collect();
            format_permissions_for_api(&flags)
        })
    }
}

pub struct RoleService {
    api: Arc<dyn RoleApi>,
    bus: EventBus,
    notifier: Notifier,
    confirm: Arc<dyn Confirm>,
    actor_id: Option<String>,
    system: RolePermissionMap,
    roles: Vec<Role>,
}

impl RoleService {
    pub fn new(api: Arc<dyn RoleApi>, bus: EventBus, notifier: Notifier, confirm: Arc<dyn Confirm>) -> Self {
        Self {
            api,
            bus,
            notifier,
            confirm,
            actor_id: None,
            system: RolePermissionMap::builtin(),
            roles: Vec::new(),
        }
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_system_roles(mut self, system: RolePermissionMap) -> Self {
        self.system = system;
        self
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn system_roles(&self) -> &RolePermissionMap {
        &self.system
    }

    /// Look a role up by id, or by name ignoring case.
    pub fn find(&self, key: &str) -> Option<&Role> {
        let key = key.trim();
        self.roles
            .iter()
            .find(|role| role.id == key)
            .or_else(|| self.roles.iter().find(|role| role.name.eq_ignore_ascii_case(key)))
    }

    /// Flags granted by `role_name`: the fetched role first, the system map otherwise.
    pub fn permissions_for(&self, role_name: &str) -> Option<BTreeSet<String>> {
        self.roles
            .iter()
            .find(|role| role.name.eq_ignore_ascii_case(role_name.trim()))
            .map(|role| role.permissions.clone())
            .or_else(|| self.system.get(role_name).cloned())
    }

    pub async fn try_refresh(&mut self) -> AppResult<()> {
        let fetched = self.api.list_roles().await?;
        let total = fetched.len();
        let roles: Vec<Role> = fetched
            .into_iter()
            .filter(|role| match role.require_id() {
                Ok(_) => true,
                Err(_) => {
                    tracing::warn!(role = %role.name, "ignoring role without an id");
                    false
                }
            })
            .collect();

        tracing::debug!(count = roles.len(), skipped = total - roles.len(), "roles refreshed");
        self.roles = roles;
        Ok(())
    }

    /// Failures are logged and the last known list is kept.
    pub async fn refresh(&mut self) {
        if let Err(err) = self.try_refresh().await {
            tracing::warn!(error = %err, "failed to fetch roles, keeping last known list");
        }
    }

    pub async fn create_role(&mut self, draft: RoleDraft) -> AppResult<()> {
        let name = draft.name.trim().to_string();
        if name.is_empty() {
            return Err(self.reject("Role name is required"));
        }
        if self.roles.iter().any(|role| role.name.eq_ignore_ascii_case(&name)) {
            return Err(self.reject(format!("A role named {name} already exists")));
        }

        self.api
            .create_role(&RolePayload::from(&draft))
            .await
            .map_err(|err| self.fail("create", &name, err))?;

        self.refresh().await;
        let role_id = self.find(&name).map(|role| role.id.clone()).unwrap_or_default();
        self.announce(
            AppEvent::RolesUpdated(RolesUpdated {
                change: RoleChange::Created,
                role_id,
                role_name: name.clone(),
                user_id: None,
                permissions: None,
            }),
            format!("Role {name} created"),
        );
        Ok(())
    }

    pub async fn update_role(&mut self, role_id: &str, update: RoleUpdate) -> AppResult<()> {
        let role_id = self.checked_id(role_id)?.to_string();
        if self.find(&role_id).is_none() {
            self.refresh().await;
        }
        let known_name = self.find(&role_id).map(|role| role.name.clone());
        let current_name = known_name.clone().unwrap_or_else(|| role_id.clone());

        if let Some(name) = update.name.as_deref().map(str::trim) {
            if name.is_empty() {
                return Err(self.reject("Role name is required"));
            }
            if self
                .roles
                .iter()
                .any(|role| role.id != role_id && role.name.eq_ignore_ascii_case(name))
            {
                return Err(self.reject(format!("A role named {name} already exists")));
            }
        }

        let payload = RolePayload::from(&update);
        self.api
            .update_role(&role_id, &payload)
            .await
            .map_err(|err| self.fail("update", &current_name, err))?;

        self.refresh().await;
        let role_name = payload.name.clone().unwrap_or_else(|| current_name.clone());
        let previous_name = known_name.filter(|old| old != &role_name);

        // a rename alone still has to reach sessions holding the old name
        let tree = payload.permissions.clone().or_else(|| {
            previous_name
                .as_ref()
                .and_then(|_| self.find(&role_id).map(Role::permission_tree))
        });
        if let Some(tree) = tree {
            events::publish(
                &self.bus,
                self.actor_id.as_deref(),
                AppEvent::PermissionsUpdated(PermissionsUpdated {
                    role_id: role_id.clone(),
                    role_name: role_name.clone(),
                    previous_name,
                    permissions: tree,
                }),
            );
        }
        self.announce(
            AppEvent::RolesUpdated(RolesUpdated {
                change: RoleChange::Updated,
                role_id,
                role_name: role_name.clone(),
                user_id: None,
                permissions: None,
            }),
            format!("Role {role_name} updated"),
        );
        Ok(())
    }

    /// Delete a role by id or name.
    ///
    /// Protected system roles are refused without a remote call, and a
    /// declined confirmation also yields `Ok(false)`. A key that does not
    /// resolve to a known role, even after a re-fetch, is never sent.
    pub async fn delete_role(&mut self, key: &str) -> AppResult<bool> {
        let key = self.checked_id(key)?.to_string();
        if roles::is_protected(&key) {
            self.refuse_protected(&key);
            return Ok(false);
        }

        if self.find(&key).is_none() {
            if let Err(err) = self.try_refresh().await {
                return Err(self.fail("delete", &key, err));
            }
        }
        let Some(role) = self.find(&key).cloned() else {
            return Err(self.missing(&key));
        };
        if role.is_protected() {
            self.refuse_protected(&role.name);
            return Ok(false);
        }
        let role_id = self.checked_id(&role.id)?.to_string();
        let name = role.name;

        if !self.confirm.confirm(&format!("Delete role {name}?")).await {
            tracing::info!(role = %name, "role deletion declined");
            return Ok(false);
        }

        self.api
            .delete_role(&role_id)
            .await
            .map_err(|err| self.fail("delete", &name, err))?;

        self.refresh().await;
        self.announce(
            AppEvent::RolesUpdated(RolesUpdated {
                change: RoleChange::Deleted,
                role_id,
                role_name: name.clone(),
                user_id: None,
                permissions: None,
            }),
            format!("Role {name} deleted"),
        );
        Ok(true)
    }

    pub async fn assign_role_to_user(&mut self, user_id: &str, role_id: &str) -> AppResult<()> {
        self.change_assignment(user_id, role_id, RoleChange::Assigned).await
    }

    pub async fn unassign_role_from_user(&mut self, user_id: &str, role_id: &str) -> AppResult<()> {
        self.change_assignment(user_id, role_id, RoleChange::Unassigned).await
    }

    async fn change_assignment(&mut self, user_id: &str, role_id: &str, change: RoleChange) -> AppResult<()> {
        let role_id = self.checked_id(role_id)?.to_string();
        let user_id = user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(self.reject("User id is required"));
        }
        if self.find(&role_id).is_none() {
            self.refresh().await;
        }
        let name = self
            .find(&role_id)
            .map(|role| role.name.clone())
            .unwrap_or_else(|| role_id.clone());

        let (result, action, message) = match change {
            RoleChange::Unassigned => (
                self.api.unassign_role(&user_id, &role_id).await,
                "unassign",
                format!("Role {name} removed from user {user_id}"),
            ),
            _ => (
                self.api.assign_role(&user_id, &role_id).await,
                "assign",
                format!("Role {name} assigned to user {user_id}"),
            ),
        };
        result.map_err(|err| self.fail(action, &name, err))?;

        self.refresh().await;
        let permissions = match change {
            RoleChange::Assigned => self.find(&role_id).map(Role::permission_tree),
            _ => None,
        };
        self.announce(
            AppEvent::RolesUpdated(RolesUpdated {
                change,
                role_id,
                role_name: name,
                user_id: Some(user_id),
                permissions,
            }),
            message,
        );
        Ok(())
    }

    fn refuse_protected(&self, name: &str) {
        tracing::warn!(role = %name, "refusing to delete protected role");
        self.notifier
            .error(format!("The {} role is protected and cannot be deleted", name.to_ascii_uppercase()));
    }

    fn missing(&self, key: &str) -> AppError {
        tracing::warn!(role = %key, "role not found");
        let err = AppError::not_found(format!("Role {key} was not found"));
        self.notifier.error(err.user_message());
        err
    }

    fn checked_id<'a>(&self, role_id: &'a str) -> AppResult<&'a str> {
        require_role_id(role_id).map_err(|err| {
            tracing::warn!("role operation without a role id");
            self.notifier.error(err.user_message());
            err
        })
    }

    fn announce(&self, event: AppEvent, message: String) {
        tracing::info!(event = %event.name(), "role change applied");
        events::publish(&self.bus, self.actor_id.as_deref(), event);
        self.notifier.success(message);
    }

    fn reject(&self, reason: impl Into<String>) -> AppError {
        let reason = reason.into();
        tracing::warn!(reason = %reason, "role change refused");
        self.notifier.error(reason.clone());
        AppError::validation(reason)
    }

    fn fail(&self, action: &str, name: &str, err: AppError) -> AppError {
        tracing::error!(role = %name, error = %err, "failed to {action} role");
        self.notifier.error(format!("Failed to {action} role {name}: {}", err.user_message()));
        err
    }
}
