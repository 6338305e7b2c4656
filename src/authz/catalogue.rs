use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use super::principal::PermissionTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::View, Action::Create, Action::Edit, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
        }
    }

    /// Case-insensitive parse of `view`/`create`/`edit`/`delete`.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(raw))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SubModuleDef {
    pub name: &'static str,
    pub actions: &'static [Action],
}

#[derive(Debug, Clone, Copy)]
pub struct ModuleDef {
    pub name: &'static str,
    pub sub_modules: &'static [SubModuleDef],
}

const FULL: &[Action] = &[Action::View, Action::Create, Action::Edit, Action::Delete];

const MODULES: &[ModuleDef] = &[
    ModuleDef {
        name: "dashboard",
        sub_modules: &[SubModuleDef { name: "overview", actions: &[Action::View] }],
    },
    ModuleDef {
        name: "hr",
        sub_modules: &[
            SubModuleDef { name: "employee", actions: FULL },
            SubModuleDef { name: "department", actions: FULL },
            SubModuleDef {
                name: "attendance",
                actions: &[Action::View, Action::Create, Action::Edit],
            },
            SubModuleDef { name: "performance", actions: FULL },
        ],
    },
    ModuleDef {
        name: "hiring",
        sub_modules: &[
            SubModuleDef { name: "candidate", actions: FULL },
            SubModuleDef { name: "interview", actions: FULL },
            SubModuleDef { name: "job", actions: FULL },
            SubModuleDef { name: "onboarding", actions: FULL },
        ],
    },
    ModuleDef {
        name: "company",
        sub_modules: &[SubModuleDef { name: "profile", actions: &[Action::View, Action::Edit] }],
    },
    ModuleDef {
        name: "settings",
        sub_modules: &[
            SubModuleDef { name: "role", actions: FULL },
            SubModuleDef { name: "user", actions: &[Action::View, Action::Edit] },
        ],
    },
];

/// Location of a flag inside the permission tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionPath {
    pub module: &'static str,
    pub sub_module: &'static str,
    pub action: Action,
}

/// Immutable catalogue built once from the module table.
///
/// The flat flag set and the nested lookup are derived from the same table,
/// so every flag reachable from the tree is in the set and vice versa.
#[derive(Debug)]
pub struct PermissionCatalogue {
    modules: &'static [ModuleDef],
    flags: BTreeSet<String>,
    paths: HashMap<String, PermissionPath>,
    parents: HashMap<&'static str, &'static str>,
}

impl PermissionCatalogue {
    pub fn global() -> &'static PermissionCatalogue {
        static CATALOGUE: OnceLock<PermissionCatalogue> = OnceLock::new();
        CATALOGUE.get_or_init(|| Self::build(MODULES))
    }

    fn build(modules: &'static [ModuleDef]) -> Self {
        let mut flags = BTreeSet::new();
        let mut paths = HashMap::new();
        let mut parents = HashMap::new();

        for module in modules {
            for sub in module.sub_modules {
                parents.insert(sub.name, module.name);
                for action in sub.actions {
                    let flag = flag_name(sub.name, *action);
                    paths.insert(
                        flag.clone(),
                        PermissionPath {
                            module: module.name,
                            sub_module: sub.name,
                            action: *action,
                        },
                    );
                    flags.insert(flag);
                }
            }
        }

        Self {
            modules,
            flags,
            paths,
            parents,
        }
    }

    pub fn modules(&self) -> &'static [ModuleDef] {
        self.modules
    }

    pub fn flags(&self) -> &BTreeSet<String> {
        &self.flags
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    pub fn path_of(&self, flag: &str) -> Option<PermissionPath> {
        self.paths.get(flag).copied()
    }

    /// Main module owning a sub-module, e.g. `candidate` -> `hiring`.
    pub fn main_module_of(&self, sub_module: &str) -> Option<&'static str> {
        self.parents.get(sub_module).copied()
    }

    pub fn sub_modules(&self, module: &str) -> &'static [SubModuleDef] {
        self.modules
            .iter()
            .find(|def| def.name == module)
            .map(|def| def.sub_modules)
            .unwrap_or(&[])
    }

    /// Flag for a tree leaf, if the catalogue knows that leaf.
    pub fn flag_for(&self, module: &str, sub_module: &str, action: &str) -> Option<String> {
        let action = Action::parse(action)?;
        let known = self
            .sub_modules(module)
            .iter()
            .any(|sub| sub.name == sub_module && sub.actions.contains(&action));
        known.then(|| flag_name(sub_module, action))
    }
}

fn flag_name(sub_module: &str, action: Action) -> String {
    format!("{}_{}", sub_module.to_ascii_uppercase(), action.as_str().to_ascii_uppercase())
}

/// Full tree with every catalogue leaf set to `false`.
pub fn default_permissions() -> PermissionTree {
    let mut tree = PermissionTree::new();
    for module in PermissionCatalogue::global().modules() {
        for sub in module.sub_modules {
            for action in sub.actions {
                tree.set(module.name, sub.name, action.as_str(), false);
            }
        }
    }
    tree
}

/// Convert a flag list into the nested tree the backend expects.
///
/// Unknown flags are dropped; every catalogue leaf is emitted.
pub fn format_permissions_for_api<S: AsRef<str>>(flags: &[S]) -> PermissionTree {
    let catalogue = PermissionCatalogue::global();
    let mut tree = default_permissions();
    for flag in flags {
        match catalogue.path_of(flag.as_ref()) {
            Some(path) => tree.set(path.module, path.sub_module, path.action.as_str(), true),
            None => tracing::debug!(flag = %flag.as_ref(), "dropping unknown permission flag"),
        }
    }
    tree
}

/// Reduce a permission tree to the set of granted catalogue flags.
pub fn flags_from_tree(tree: &PermissionTree) -> BTreeSet<String> {
    let catalogue = PermissionCatalogue::global();
    tree.leaves()
        .filter(|(_, _, _, granted)| *granted)
        .filter_map(|(module, sub, action, _)| catalogue.flag_for(module, sub, action))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::permissions;

    #[test]
    fn flat_set_matches_tree() {
        let catalogue = PermissionCatalogue::global();
        let flat: BTreeSet<String> = permissions::ALL.iter().map(|flag| flag.to_string()).collect();
        assert_eq!(&flat, catalogue.flags());
        assert_eq!(flat.len(), permissions::ALL.len(), "duplicate flag constant");

        for flag in permissions::ALL {
            let path = catalogue.path_of(flag).unwrap();
            assert_eq!(
                catalogue.flag_for(path.module, path.sub_module, path.action.as_str()).as_deref(),
                Some(*flag)
            );
        }
    }

    #[test]
    fn sub_module_names_are_unique() {
        let catalogue = PermissionCatalogue::global();
        let total: usize = catalogue.modules().iter().map(|m| m.sub_modules.len()).sum();
        assert_eq!(catalogue.parents.len(), total);
        assert_eq!(catalogue.main_module_of("candidate"), Some("hiring"));
        assert_eq!(catalogue.main_module_of("nope"), None);
    }

    #[test]
    fn round_trip_preserves_subsets() {
        let subsets: Vec<Vec<&str>> = vec![
            vec![],
            vec![permissions::CANDIDATE_VIEW],
            vec![permissions::CANDIDATE_VIEW, permissions::JOB_DELETE, permissions::USER_EDIT],
            permissions::EMPLOYEE_DEFAULTS.to_vec(),
            permissions::ALL.to_vec(),
        ];

        for subset in subsets {
            let tree = format_permissions_for_api(&subset);
            let back = flags_from_tree(&tree);
            let expected: BTreeSet<String> = subset.iter().map(|s| s.to_string()).collect();
            assert_eq!(back, expected);
        }
    }

    #[test]
    fn unknown_flags_are_dropped() {
        let tree = format_permissions_for_api(&["CANDIDATE_VIEW", "SPACESHIP_LAUNCH", "garbage"]);
        assert_eq!(tree.leaves().count(), PermissionCatalogue::global().flags().len());
        let flags = flags_from_tree(&tree);
        assert_eq!(flags.len(), 1);
        assert!(flags.contains("CANDIDATE_VIEW"));
    }

    #[test]
    fn unknown_leaves_and_false_leaves_are_omitted() {
        let mut tree = PermissionTree::new();
        tree.set("hiring", "candidate", "view", true);
        tree.set("hiring", "candidate", "edit", false);
        tree.set("hiring", "spaceship", "view", true);
        tree.set("company", "profile", "delete", true);

        let flags = flags_from_tree(&tree);
        assert_eq!(flags.into_iter().collect::<Vec<_>>(), vec!["CANDIDATE_VIEW".to_string()]);
    }

    #[test]
    fn defaults_are_all_false() {
        let defaults = default_permissions();
        assert!(defaults.leaves().all(|(_, _, _, granted)| !granted));
        assert!(flags_from_tree(&defaults).is_empty());
    }
}
