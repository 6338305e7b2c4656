use super::catalogue::{Action, PermissionCatalogue};
use super::principal::Identity;

/// Policy evaluator trait for pluggable authorization logic
///
/// Checks never fail: an absent identity or an unknown path is a denial.
pub trait PolicyEvaluator: Send + Sync {
    /// Check a single flag such as `CANDIDATE_VIEW`
    fn can(&self, identity: Option<&Identity>, flag: &str) -> bool;

    /// Check whether any sub-module of `module` grants `action`
    fn can_in_module(&self, identity: Option<&Identity>, module: &str, action: &str) -> bool;
}

/// Default evaluator over the global catalogue
///
/// Evaluation order:
/// 1. no identity -> deny
/// 2. admin/administrator role (any case) -> allow
/// 3. permission tree leaf -> allow if `true`
/// 4. deny
#[derive(Debug, Clone, Default)]
pub struct DefaultPolicyEvaluator;

impl DefaultPolicyEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Split `CANDIDATE_VIEW` into `("hiring", "candidate", "view")`.
    ///
    /// A module part containing `_` is read as `MAIN_SUB`; otherwise the main
    /// module is looked up from the sub-module name.
    fn resolve(flag: &str) -> Option<(String, String, &'static str)> {
        let (module, action) = flag.rsplit_once('_')?;
        let action = Action::parse(action)?;
        let module = module.to_ascii_lowercase();

        let (main, sub) = match module.split_once('_') {
            Some((main, sub)) => (main.to_string(), sub.to_string()),
            None => {
                let main = PermissionCatalogue::global().main_module_of(&module)?;
                (main.to_string(), module)
            }
        };

        Some((main, sub, action.as_str()))
    }
}

impl PolicyEvaluator for DefaultPolicyEvaluator {
    fn can(&self, identity: Option<&Identity>, flag: &str) -> bool {
        let Some(identity) = identity else {
            return false;
        };

        if identity.is_admin() {
            tracing::debug!(user_id = %identity.id, flag = %flag, "admin bypass");
            return true;
        }

        let granted = Self::resolve(flag)
            .map(|(main, sub, action)| identity.permissions.get(&main, &sub, action))
            .unwrap_or(false);

        tracing::debug!(user_id = %identity.id, flag = %flag, granted, "permission check");
        granted
    }

    fn can_in_module(&self, identity: Option<&Identity>, module: &str, action: &str) -> bool {
        let Some(identity) = identity else {
            return false;
        };

        if identity.is_admin() {
            tracing::debug!(user_id = %identity.id, module = %module, "admin bypass");
            return true;
        }

        let Some(action) = Action::parse(action) else {
            return false;
        };
        let module = module.to_ascii_lowercase();

        let granted = PermissionCatalogue::global()
            .sub_modules(&module)
            .iter()
            .any(|sub| identity.permissions.get(&module, sub.name, action.as_str()));

        tracing::debug!(
            user_id = %identity.id,
            module = %module,
            action = %action,
            granted,
            "module permission check"
        );
        granted
    }
}

/// `hasPermission` over the default evaluator.
pub fn has_permission(identity: Option<&Identity>, flag: &str) -> bool {
    DefaultPolicyEvaluator.can(identity, flag)
}

/// `hasModulePermission` over the default evaluator.
pub fn has_module_permission(identity: Option<&Identity>, module: &str, action: &str) -> bool {
    DefaultPolicyEvaluator.can_in_module(identity, module, action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::{format_permissions_for_api, permissions, PermissionTree};

    fn employee(tree: PermissionTree) -> Identity {
        Identity::new("u-1", "emp@example.com")
            .with_role("EMPLOYEE")
            .with_permissions(tree)
    }

    #[test]
    fn admin_bypasses_everything() {
        for role in ["admin", "ADMIN", "Administrator", "aDmInIsTrAtOr"] {
            let identity = Identity::new("u-1", "root@example.com").with_role(role);
            assert!(has_permission(Some(&identity), permissions::CANDIDATE_DELETE));
            assert!(has_permission(Some(&identity), "NOT_IN_CATALOGUE"));
            assert!(has_permission(Some(&identity), ""));
            assert!(has_module_permission(Some(&identity), "hiring", "delete"));
            assert!(has_module_permission(Some(&identity), "unknown", "fly"));
        }
    }

    #[test]
    fn near_admin_roles_get_no_bypass() {
        for role in ["admins", "super_admin", " admin", "administrators"] {
            let identity = Identity::new("u-1", "x@example.com").with_role(role);
            assert!(!has_permission(Some(&identity), permissions::CANDIDATE_VIEW));
        }
    }

    #[test]
    fn absent_identity_is_denied() {
        assert!(!has_permission(None, permissions::CANDIDATE_VIEW));
        assert!(!has_module_permission(None, "hiring", "view"));
    }

    #[test]
    fn empty_tree_denies_every_known_flag() {
        let identity = employee(PermissionTree::new());
        for flag in permissions::ALL {
            assert!(!has_permission(Some(&identity), flag), "{flag} should be denied");
        }
    }

    #[test]
    fn exact_flag_lookup() {
        let mut tree = PermissionTree::new();
        tree.set("hiring", "candidate", "view", true);
        tree.set("hiring", "candidate", "create", false);
        let identity = employee(tree);

        assert!(has_permission(Some(&identity), "CANDIDATE_VIEW"));
        assert!(!has_permission(Some(&identity), "CANDIDATE_CREATE"));
        assert!(!has_permission(Some(&identity), "CANDIDATE_EDIT"));
        assert!(!has_permission(Some(&identity), "JOB_VIEW"));
    }

    #[test]
    fn qualified_flag_names_resolve_directly() {
        let mut tree = PermissionTree::new();
        tree.set("hiring", "candidate", "view", true);
        let identity = employee(tree);

        assert!(has_permission(Some(&identity), "HIRING_CANDIDATE_VIEW"));
        assert!(!has_permission(Some(&identity), "HR_CANDIDATE_VIEW"));
    }

    #[test]
    fn malformed_flags_are_denied() {
        let identity = employee(format_permissions_for_api(permissions::ALL));
        for flag in ["", "CANDIDATE", "CANDIDATE_", "_VIEW", "CANDIDATE_FLY", "GHOST_VIEW"] {
            assert!(!has_permission(Some(&identity), flag), "{flag:?} should be denied");
        }
    }

    #[test]
    fn module_check_uses_any_sub_module() {
        let mut tree = PermissionTree::new();
        tree.set("hiring", "candidate", "view", false);
        tree.set("hiring", "interview", "view", false);
        tree.set("hiring", "onboarding", "view", true);
        let identity = employee(tree);

        assert!(has_module_permission(Some(&identity), "hiring", "view"));
        assert!(has_module_permission(Some(&identity), "HIRING", "VIEW"));
        assert!(!has_module_permission(Some(&identity), "hiring", "create"));
        assert!(!has_module_permission(Some(&identity), "hr", "view"));
        assert!(!has_permission(Some(&identity), permissions::CANDIDATE_VIEW));
    }
}
