use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::events::Audited;
use crate::sync::{EntityStatus, SyncEntity};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EmployeeStatus {
    #[default]
    Active,
    OnLeave,
    Inactive,
    Other(String),
}

impl EmployeeStatus {
    pub fn as_str(&self) -> &str {
        match self {
            EmployeeStatus::Active => "active",
            EmployeeStatus::OnLeave => "on_leave",
            EmployeeStatus::Inactive => "inactive",
            EmployeeStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for EmployeeStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "" | "active" => EmployeeStatus::Active,
            "on_leave" | "onleave" => EmployeeStatus::OnLeave,
            "inactive" => EmployeeStatus::Inactive,
            _ => EmployeeStatus::Other(raw.trim().to_string()),
        }
    }
}

impl From<&str> for EmployeeStatus {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<EmployeeStatus> for String {
    fn from(status: EmployeeStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for EmployeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EntityStatus for EmployeeStatus {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub job_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hire_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: EmployeeStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeDraft {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub job_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hire_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

impl Audited for Employee {
    fn entity_type() -> &'static str {
        "employee"
    }

    fn label() -> &'static str {
        "Employee"
    }
}

impl SyncEntity for Employee {
    type Status = EmployeeStatus;
    type Draft = EmployeeDraft;
    type Patch = EmployeePatch;

    fn collection() -> &'static str {
        "employees"
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }

    fn status(&self) -> &EmployeeStatus {
        &self.status
    }

    fn is_valid(&self) -> bool {
        [&self.id, &self.first_name, &self.last_name, &self.email]
            .iter()
            .all(|field| !field.trim().is_empty())
    }

    fn matches_search(&self, needle: &str) -> bool {
        [&self.first_name, &self.last_name, &self.email, &self.job_title]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
            || self.display_name().to_lowercase().contains(needle)
    }

    fn department(&self) -> Option<&str> {
        self.department.as_deref()
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn draft_name(draft: &EmployeeDraft) -> String {
        format!("{} {}", draft.first_name.trim(), draft.last_name.trim())
    }

    fn validate_draft(draft: &EmployeeDraft) -> Result<(), String> {
        if draft.first_name.trim().is_empty() || draft.last_name.trim().is_empty() {
            return Err("Employee first and last name are required".to_string());
        }
        if !draft.email.contains('@') {
            return Err(format!("'{}' is not a valid email address", draft.email));
        }
        Ok(())
    }

    fn from_draft(id: String, draft: &EmployeeDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            first_name: draft.first_name.trim().to_string(),
            last_name: draft.last_name.trim().to_string(),
            email: draft.email.trim().to_string(),
            job_title: draft.job_title.clone(),
            department: draft.department.clone(),
            hire_date: draft.hire_date,
            status: EmployeeStatus::Active,
            created_at: Some(created_at),
        }
    }

    fn apply_patch(&mut self, patch: &EmployeePatch) {
        if let Some(first_name) = &patch.first_name {
            self.first_name = first_name.clone();
        }
        if let Some(last_name) = &patch.last_name {
            self.last_name = last_name.clone();
        }
        if let Some(email) = &patch.email {
            self.email = email.clone();
        }
        if let Some(job_title) = &patch.job_title {
            self.job_title = job_title.clone();
        }
        if let Some(department) = &patch.department {
            self.department = Some(department.clone());
        }
    }

    fn set_status(&mut self, status: EmployeeStatus) {
        self.status = status;
    }
}
