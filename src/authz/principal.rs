use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

type Actions = BTreeMap<String, bool>;
type SubModules = BTreeMap<String, Actions>;

/// Nested `module -> sub_module -> action -> bool` permission object.
///
/// Deserialization is tolerant: non-object branches and non-boolean leaves are
/// dropped instead of failing the whole identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PermissionTree(BTreeMap<String, SubModules>);

impl PermissionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: &Value) -> Self {
        let mut tree = Self::new();
        let Some(modules) = value.as_object() else {
            return tree;
        };

        for (module, subs) in modules {
            let Some(subs) = subs.as_object() else { continue };
            for (sub, actions) in subs {
                let Some(actions) = actions.as_object() else { continue };
                for (action, granted) in actions {
                    if let Some(granted) = granted.as_bool() {
                        tree.set(module, sub, action, granted);
                    }
                }
            }
        }

        tree
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Read a single leaf; any missing segment reads as `false`.
    pub fn get(&self, module: &str, sub_module: &str, action: &str) -> bool {
        self.0
            .get(module)
            .and_then(|subs| subs.get(sub_module))
            .and_then(|actions| actions.get(action))
            .copied()
            .unwrap_or(false)
    }

    pub fn set(&mut self, module: &str, sub_module: &str, action: &str, granted: bool) {
        self.0
            .entry(module.to_string())
            .or_default()
            .entry(sub_module.to_string())
            .or_default()
            .insert(action.to_string(), granted);
    }

    pub fn sub_modules(&self, module: &str) -> Option<&SubModules> {
        self.0.get(module)
    }

    /// Iterate every leaf as `(module, sub_module, action, granted)`.
    pub fn leaves(&self) -> impl Iterator<Item = (&str, &str, &str, bool)> {
        self.0.iter().flat_map(|(module, subs)| {
            subs.iter().flat_map(move |(sub, actions)| {
                actions
                    .iter()
                    .map(move |(action, granted)| (module.as_str(), sub.as_str(), action.as_str(), *granted))
            })
        })
    }

    /// Deep-merge `self` over `base`: leaves present here win, the rest come from `base`.
    pub fn merged_over(&self, base: &PermissionTree) -> PermissionTree {
        let mut merged = base.clone();
        for (module, sub, action, granted) in self.leaves() {
            merged.set(module, sub, action, granted);
        }
        merged
    }
}

impl<'de> Deserialize<'de> for PermissionTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(|value| Self::from_value(&value))
    }
}

/// The authenticated identity with its fine-grained permissions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    /// Coarse role; admin/administrator bypasses the permission tree.
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub permissions: PermissionTree,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            first_name: String::new(),
            last_name: String::new(),
            role: String::new(),
            permissions: PermissionTree::new(),
        }
    }

    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = first.into();
        self.last_name = last.into();
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_permissions(mut self, permissions: PermissionTree) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn is_admin(&self) -> bool {
        super::roles::is_admin(&self.role)
    }

    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.email.clone()
        } else {
            full.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tolerant_deserialization_keeps_boolean_leaves() {
        let raw = json!({
            "hiring": {
                "candidate": {"view": true, "create": "yes", "edit": false},
                "job": 7
            },
            "broken": []
        });

        let tree: PermissionTree = serde_json::from_value(raw).unwrap();
        assert!(tree.get("hiring", "candidate", "view"));
        assert!(!tree.get("hiring", "candidate", "create"));
        assert_eq!(tree.leaves().count(), 2);
        assert!(tree.sub_modules("broken").is_none());
    }

    #[test]
    fn merge_prefers_own_leaves() {
        let mut base = PermissionTree::new();
        base.set("hiring", "candidate", "view", false);
        base.set("hiring", "candidate", "edit", false);

        let mut own = PermissionTree::new();
        own.set("hiring", "candidate", "view", true);

        let merged = own.merged_over(&base);
        assert!(merged.get("hiring", "candidate", "view"));
        assert!(!merged.get("hiring", "candidate", "edit"));
        assert_eq!(merged.leaves().count(), 2);
    }

    #[test]
    fn identity_round_trips_through_json() {
        let mut tree = PermissionTree::new();
        tree.set("hr", "employee", "view", true);
        let identity = Identity::new("u1", "ada@example.com")
            .with_name("Ada", "Lovelace")
            .with_role("EMPLOYEE")
            .with_permissions(tree);

        let text = serde_json::to_string(&identity).unwrap();
        assert!(text.contains("firstName"));
        let back: Identity = serde_json::from_str(&text).unwrap();
        assert_eq!(back, identity);
        assert_eq!(back.display_name(), "Ada Lovelace");
    }
}
