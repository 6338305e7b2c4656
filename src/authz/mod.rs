//! Authorization module - permission catalogue and evaluator
//!
//! This module implements the dashboard permission model:
//! - A static catalogue of flags grouped as module -> sub-module -> action
//! - Identities carrying a nested boolean permission tree
//! - Admin bypass on the coarse role string
//! - Flag-list <-> permission-tree conversions for the backend

mod catalogue;
mod evaluator;
mod principal;

pub use catalogue::{
    default_permissions, flags_from_tree, format_permissions_for_api, Action, ModuleDef,
    PermissionCatalogue, PermissionPath, SubModuleDef,
};
pub use evaluator::{has_module_permission, has_permission, DefaultPolicyEvaluator, PolicyEvaluator};
pub use principal::{Identity, PermissionTree};

/// Well-known role names
pub mod roles {
    pub const ADMIN: &str = "ADMIN";
    pub const ADMINISTRATOR: &str = "ADMINISTRATOR";
    pub const EMPLOYEE: &str = "EMPLOYEE";

    /// Roles that can never be deleted.
    pub const PROTECTED: &[&str] = &[ADMIN];

    pub fn is_admin(role: &str) -> bool {
        role.eq_ignore_ascii_case(ADMIN) || role.eq_ignore_ascii_case(ADMINISTRATOR)
    }

    pub fn is_protected(role: &str) -> bool {
        PROTECTED.iter().any(|name| name.eq_ignore_ascii_case(role))
    }
}

/// Well-known permission flags
pub mod permissions {
    // Dashboard
    pub const OVERVIEW_VIEW: &str = "OVERVIEW_VIEW";

    // HR
    pub const EMPLOYEE_VIEW: &str = "EMPLOYEE_VIEW";
    pub const EMPLOYEE_CREATE: &str = "EMPLOYEE_CREATE";
    pub const EMPLOYEE_EDIT: &str = "EMPLOYEE_EDIT";
    pub const EMPLOYEE_DELETE: &str = "EMPLOYEE_DELETE";
    pub const DEPARTMENT_VIEW: &str = "DEPARTMENT_VIEW";
    pub const DEPARTMENT_CREATE: &str = "DEPARTMENT_CREATE";
    pub const DEPARTMENT_EDIT: &str = "DEPARTMENT_EDIT";
    pub const DEPARTMENT_DELETE: &str = "DEPARTMENT_DELETE";
    pub const ATTENDANCE_VIEW: &str = "ATTENDANCE_VIEW";
    pub const ATTENDANCE_CREATE: &str = "ATTENDANCE_CREATE";
    pub const ATTENDANCE_EDIT: &str = "ATTENDANCE_EDIT";
    pub const PERFORMANCE_VIEW: &str = "PERFORMANCE_VIEW";
    pub const PERFORMANCE_CREATE: &str = "PERFORMANCE_CREATE";
    pub const PERFORMANCE_EDIT: &str = "PERFORMANCE_EDIT";
    pub const PERFORMANCE_DELETE: &str = "PERFORMANCE_DELETE";

    // Hiring
    pub const CANDIDATE_VIEW: &str = "CANDIDATE_VIEW";
    pub const CANDIDATE_CREATE: &str = "CANDIDATE_CREATE";
    pub const CANDIDATE_EDIT: &str = "CANDIDATE_EDIT";
    pub const CANDIDATE_DELETE: &str = "CANDIDATE_DELETE";
    pub const INTERVIEW_VIEW: &str = "INTERVIEW_VIEW";
    pub const INTERVIEW_CREATE: &str = "INTERVIEW_CREATE";
    pub const INTERVIEW_EDIT: &str = "INTERVIEW_EDIT";
    pub const INTERVIEW_DELETE: &str = "INTERVIEW_DELETE";
    pub const JOB_VIEW: &str = "JOB_VIEW";
    pub const JOB_CREATE: &str = "JOB_CREATE";
    pub const JOB_EDIT: &str = "JOB_EDIT";
    pub const JOB_DELETE: &str = "JOB_DELETE";
    pub const ONBOARDING_VIEW: &str = "ONBOARDING_VIEW";
    pub const ONBOARDING_CREATE: &str = "ONBOARDING_CREATE";
    pub const ONBOARDING_EDIT: &str = "ONBOARDING_EDIT";
    pub const ONBOARDING_DELETE: &str = "ONBOARDING_DELETE";

    // Company
    pub const PROFILE_VIEW: &str = "PROFILE_VIEW";
    pub const PROFILE_EDIT: &str = "PROFILE_EDIT";

    // Settings
    pub const ROLE_VIEW: &str = "ROLE_VIEW";
    pub const ROLE_CREATE: &str = "ROLE_CREATE";
    pub const ROLE_EDIT: &str = "ROLE_EDIT";
    pub const ROLE_DELETE: &str = "ROLE_DELETE";
    pub const USER_VIEW: &str = "USER_VIEW";
    pub const USER_EDIT: &str = "USER_EDIT";

    /// Flat set of every flag, kept in step with the catalogue tree.
    pub const ALL: &[&str] = &[
        OVERVIEW_VIEW,
        EMPLOYEE_VIEW,
        EMPLOYEE_CREATE,
        EMPLOYEE_EDIT,
        EMPLOYEE_DELETE,
        DEPARTMENT_VIEW,
        DEPARTMENT_CREATE,
        DEPARTMENT_EDIT,
        DEPARTMENT_DELETE,
        ATTENDANCE_VIEW,
        ATTENDANCE_CREATE,
        ATTENDANCE_EDIT,
        PERFORMANCE_VIEW,
        PERFORMANCE_CREATE,
        PERFORMANCE_EDIT,
        PERFORMANCE_DELETE,
        CANDIDATE_VIEW,
        CANDIDATE_CREATE,
        CANDIDATE_EDIT,
        CANDIDATE_DELETE,
        INTERVIEW_VIEW,
        INTERVIEW_CREATE,
        INTERVIEW_EDIT,
        INTERVIEW_DELETE,
        JOB_VIEW,
        JOB_CREATE,
        JOB_EDIT,
        JOB_DELETE,
        ONBOARDING_VIEW,
        ONBOARDING_CREATE,
        ONBOARDING_EDIT,
        ONBOARDING_DELETE,
        PROFILE_VIEW,
        PROFILE_EDIT,
        ROLE_VIEW,
        ROLE_CREATE,
        ROLE_EDIT,
        ROLE_DELETE,
        USER_VIEW,
        USER_EDIT,
    ];

    /// Fixed grant set of the built-in EMPLOYEE role.
    pub const EMPLOYEE_DEFAULTS: &[&str] = &[
        OVERVIEW_VIEW,
        EMPLOYEE_VIEW,
        DEPARTMENT_VIEW,
        ATTENDANCE_VIEW,
        ATTENDANCE_CREATE,
        PERFORMANCE_VIEW,
        PROFILE_VIEW,
    ];
}
