use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::authz::PermissionTree;

pub mod timeline;
pub use timeline::{latest_status, Actor, Audited, Severity, TimelineEntry, TimelineKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<String>,
    pub subject_id: Option<String>,
    pub payload: T,
}

impl<T> DomainEvent<T> {
    pub fn new(
        name: impl Into<String>,
        actor_id: Option<String>,
        subject_id: Option<String>,
        payload: T,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            occurred_at: Utc::now(),
            actor_id,
            subject_id,
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleChange {
    Created,
    Updated,
    Deleted,
    Assigned,
    Unassigned,
}

/// A role was created, changed, removed or (un)assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolesUpdated {
    pub change: RoleChange,
    pub role_id: String,
    pub role_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Permissions of the role, carried on assignment so the user's session can adopt them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<PermissionTree>,
}

/// A role's permission set changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionsUpdated {
    pub role_id: String,
    pub role_name: String,
    /// Set when the same update renamed the role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_name: Option<String>,
    pub permissions: PermissionTree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityChange {
    Created,
    Updated,
    StatusChanged,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityChanged {
    pub entity_type: String,
    pub entity_id: String,
    pub change: EntityChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppEvent {
    RolesUpdated(RolesUpdated),
    PermissionsUpdated(PermissionsUpdated),
    EntityChanged(EntityChanged),
}

impl AppEvent {
    pub fn name(&self) -> String {
        match self {
            AppEvent::RolesUpdated(_) => "rolesUpdated".to_string(),
            AppEvent::PermissionsUpdated(_) => "permissionsUpdated".to_string(),
            AppEvent::EntityChanged(changed) => {
                let change = match changed.change {
                    EntityChange::Created => "created",
                    EntityChange::Updated => "updated",
                    EntityChange::StatusChanged => "status_changed",
                    EntityChange::Deleted => "deleted",
                };
                format!("{}.{}", changed.entity_type, change)
            }
        }
    }

    fn subject_id(&self) -> String {
        match self {
            AppEvent::RolesUpdated(updated) => updated.role_id.clone(),
            AppEvent::PermissionsUpdated(updated) => updated.role_id.clone(),
            AppEvent::EntityChanged(changed) => changed.entity_id.clone(),
        }
    }
}

/// Process-wide channel; each subscriber sees events in send order, late
/// subscribers get no replay.
pub type EventBus = broadcast::Sender<DomainEvent<AppEvent>>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<DomainEvent<AppEvent>>) {
    broadcast::channel(1024)
}

/// Publish an event to every current subscriber.
pub fn publish(bus: &EventBus, actor_id: Option<&str>, event: AppEvent) {
    let name = event.name();
    let subject_id = event.subject_id();
    let delivered = bus
        .send(DomainEvent::new(
            name.clone(),
            actor_id.map(str::to_string),
            Some(subject_id),
            event,
        ))
        .unwrap_or(0);

    // Fire and forget - nobody listening is not an error
    tracing::debug!(event = %name, delivered, "event published");
}
