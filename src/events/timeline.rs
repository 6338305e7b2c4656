use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Severity of an audit entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Irreversible changes: terminal transitions, deletions
    Critical,
    /// Regular changes (default)
    #[default]
    Important,
    /// Cosmetic edits
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineKind {
    Created,
    Updated,
    StatusChange,
    Deleted,
}

/// Who performed a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn system() -> Self {
        Self::new("system", "System")
    }
}

/// One append-only audit record on an entity timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TimelineKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Actor>,
    #[serde(default)]
    pub severity: Severity,
}

impl TimelineEntry {
    fn new(kind: TimelineKind, title: String, actor: &Actor) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title,
            description: None,
            timestamp: Utc::now(),
            metadata: None,
            created_by: Some(actor.clone()),
            severity: Severity::Important,
        }
    }

    pub fn created<T: Audited>(subject: &str, actor: &Actor) -> Self {
        Self::new(TimelineKind::Created, format!("{} created", T::label()), actor)
            .with_description(format!("{} was added by {}", subject, actor.name))
    }

    pub fn updated<T: Audited>(subject: &str, actor: &Actor) -> Self {
        Self::new(TimelineKind::Updated, format!("{} updated", T::label()), actor)
            .with_description(format!("{} was edited by {}", subject, actor.name))
    }

    pub fn deleted<T: Audited>(subject: &str, actor: &Actor) -> Self {
        let mut entry = Self::new(TimelineKind::Deleted, format!("{} deleted", T::label()), actor)
            .with_description(format!("{} was removed by {}", subject, actor.name));
        entry.severity = Severity::Critical;
        entry
    }

    pub fn status_change(old_status: &str, new_status: &str, actor: &Actor) -> Self {
        Self::new(
            TimelineKind::StatusChange,
            format!("Status changed to {new_status}"),
            actor,
        )
        .with_description(format!("Status changed from {old_status} to {new_status}"))
        .with_metadata(json!({ "oldStatus": old_status, "newStatus": new_status }))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// `newStatus` carried by a status-change entry.
    pub fn new_status(&self) -> Option<&str> {
        if self.kind != TimelineKind::StatusChange {
            return None;
        }
        self.metadata.as_ref()?.get("newStatus")?.as_str()
    }
}

/// Status recorded by the most recent status-change entry.
pub fn latest_status(timeline: &[TimelineEntry]) -> Option<&str> {
    timeline.iter().rev().find_map(TimelineEntry::new_status)
}

/// Entities whose changes are recorded as timeline entries.
pub trait Audited {
    /// The entity type name (e.g. "candidate"), used in event names
    fn entity_type() -> &'static str;

    /// Human label (e.g. "Candidate"), used in notifications and titles
    fn label() -> &'static str;

    /// Severity for a change of the given kind (deletions are always critical)
    fn severity_for(&self, kind: TimelineKind) -> Severity {
        match kind {
            TimelineKind::Deleted => Severity::Critical,
            _ => Severity::Important,
        }
    }
}
