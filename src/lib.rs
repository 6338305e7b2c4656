pub mod api;
pub mod authz;
pub mod config;
pub mod db;
pub mod errors;
pub mod events;
pub mod models;
pub mod notify;
pub mod roles;
pub mod session;
pub mod sync;

// Re-export commonly used items for the binary and tests
pub use api::{HttpBackend, ListQuery, MemoryCollection, MemoryDirectory};
pub use authz::{has_module_permission, has_permission, Identity, PermissionTree};
pub use config::ClientConfig;
pub use errors::{AppError, AppResult};
pub use roles::{RolePermissionMap, RoleService};
pub use session::{MemorySessionStore, SessionManager, SessionStore};
pub use sync::EntityStore;
