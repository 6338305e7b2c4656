use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::authz::{flags_from_tree, format_permissions_for_api, PermissionCatalogue, PermissionTree};
use crate::errors::{AppError, AppResult};

// =============================================================================
// ROLE
// =============================================================================

/// A named bundle of permission flags.
///
/// `id` is the canonical identifier; backends answering with `_id` are
/// normalized before this type is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "permissions_from_wire")]
    pub permissions: BTreeSet<String>,
}

impl Role {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            permissions: BTreeSet::new(),
        }
    }

    pub fn with_permissions<S: AsRef<str>>(mut self, flags: &[S]) -> Self {
        self.permissions = flags.iter().map(|flag| flag.as_ref().to_string()).collect();
        self
    }

    /// The role id, or `RoleIdMissing` when the backend sent none.
    pub fn require_id(&self) -> AppResult<&str> {
        require_role_id(&self.id)
    }

    pub fn permission_tree(&self) -> PermissionTree {
        let flags: Vec<&str> = self.permissions.iter().map(String::as_str).collect();
        format_permissions_for_api(&flags)
    }

    pub fn is_protected(&self) -> bool {
        crate::authz::roles::is_protected(&self.name)
    }
}

pub fn require_role_id(id: &str) -> AppResult<&str> {
    let id = id.trim();
    if id.is_empty() {
        Err(AppError::RoleIdMissing)
    } else {
        Ok(id)
    }
}

/// Accepts either a flag array or a nested boolean object.
fn permissions_from_wire<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeSet<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(reduce_permissions(&value))
}

pub fn reduce_permissions(value: &Value) -> BTreeSet<String> {
    match value {
        Value::Array(items) => {
            let catalogue = PermissionCatalogue::global();
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|flag| catalogue.contains(flag))
                .map(str::to_string)
                .collect()
        }
        Value::Object(_) => flags_from_tree(&PermissionTree::from_value(value)),
        _ => BTreeSet::new(),
    }
}

// =============================================================================
// REQUESTS
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct RoleDraft {
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<Vec<String>>,
}

/// Body sent to the backend: permissions travel as the nested tree.
#[derive(Debug, Clone, Serialize)]
pub struct RolePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<PermissionTree>,
}

impl From<&RoleDraft> for RolePayload {
    fn from(draft: &RoleDraft) -> Self {
        Self {
            name: Some(draft.name.trim().to_string()),
            description: draft.description.clone(),
            permissions: Some(format_permissions_for_api(&draft.permissions)),
        }
    }
}

impl From<&RoleUpdate> for RolePayload {
    fn from(update: &RoleUpdate) -> Self {
        Self {
            name: update.name.as_ref().map(|name| name.trim().to_string()),
            description: update.description.clone(),
            permissions: update
                .permissions
                .as_deref()
                .map(|flags| format_permissions_for_api(flags)),
        }
    }
}
