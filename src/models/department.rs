use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::Audited;
use crate::sync::{EntityStatus, SyncEntity};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DepartmentStatus {
    #[default]
    Active,
    Inactive,
    Other(String),
}

impl DepartmentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            DepartmentStatus::Active => "active",
            DepartmentStatus::Inactive => "inactive",
            DepartmentStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for DepartmentStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "active" => DepartmentStatus::Active,
            "inactive" => DepartmentStatus::Inactive,
            _ => DepartmentStatus::Other(raw.trim().to_string()),
        }
    }
}

impl From<DepartmentStatus> for String {
    fn from(status: DepartmentStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for DepartmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EntityStatus for DepartmentStatus {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
    #[serde(default)]
    pub employee_count: u32,
    #[serde(default)]
    pub status: DepartmentStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentDraft {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
}

impl Audited for Department {
    fn entity_type() -> &'static str {
        "department"
    }

    fn label() -> &'static str {
        "Department"
    }
}

impl SyncEntity for Department {
    type Status = DepartmentStatus;
    type Draft = DepartmentDraft;
    type Patch = DepartmentPatch;

    fn collection() -> &'static str {
        "departments"
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> String {
        self.name.trim().to_string()
    }

    fn status(&self) -> &DepartmentStatus {
        &self.status
    }

    fn is_valid(&self) -> bool {
        !self.id.trim().is_empty() && !self.name.trim().is_empty()
    }

    fn matches_search(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self
                .description
                .iter()
                .chain(self.manager.iter())
                .any(|field| field.to_lowercase().contains(needle))
    }

    /// A department filters as itself.
    fn department(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn draft_name(draft: &DepartmentDraft) -> String {
        draft.name.trim().to_string()
    }

    fn validate_draft(draft: &DepartmentDraft) -> Result<(), String> {
        if draft.name.trim().is_empty() {
            return Err("Department name is required".to_string());
        }
        Ok(())
    }

    fn from_draft(id: String, draft: &DepartmentDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name.trim().to_string(),
            description: draft.description.clone(),
            manager: draft.manager.clone(),
            employee_count: 0,
            status: DepartmentStatus::Active,
            created_at: Some(created_at),
        }
    }

    fn apply_patch(&mut self, patch: &DepartmentPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(manager) = &patch.manager {
            self.manager = Some(manager.clone());
        }
    }

    fn set_status(&mut self, status: DepartmentStatus) {
        self.status = status;
    }
}
