use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{Audited, Severity, TimelineEntry, TimelineKind};
use crate::sync::{EntityStatus, SyncEntity};

/// Hiring pipeline status. `rejected` is terminal; unknown backend
/// statuses are carried through as `Other`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CandidateStatus {
    #[default]
    New,
    Interview,
    Rejected,
    Other(String),
}

impl CandidateStatus {
    pub fn as_str(&self) -> &str {
        match self {
            CandidateStatus::New => "new",
            CandidateStatus::Interview => "interview",
            CandidateStatus::Rejected => "rejected",
            CandidateStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for CandidateStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "new" => CandidateStatus::New,
            "interview" => CandidateStatus::Interview,
            "rejected" => CandidateStatus::Rejected,
            _ => CandidateStatus::Other(raw.trim().to_string()),
        }
    }
}

impl From<&str> for CandidateStatus {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<CandidateStatus> for String {
    fn from(status: CandidateStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EntityStatus for CandidateStatus {
    fn is_terminal(&self) -> bool {
        matches!(self, CandidateStatus::Rejected)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default)]
    pub status: CandidateStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
}

impl Candidate {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDraft {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub position: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

impl Audited for Candidate {
    fn entity_type() -> &'static str {
        "candidate"
    }

    fn label() -> &'static str {
        "Candidate"
    }

    fn severity_for(&self, kind: TimelineKind) -> Severity {
        match kind {
            TimelineKind::Deleted => Severity::Critical,
            TimelineKind::Updated => Severity::Noise,
            _ => Severity::Important,
        }
    }
}

impl SyncEntity for Candidate {
    type Status = CandidateStatus;
    type Draft = CandidateDraft;
    type Patch = CandidatePatch;

    fn collection() -> &'static str {
        "candidates"
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> String {
        self.full_name()
    }

    fn status(&self) -> &CandidateStatus {
        &self.status
    }

    fn is_valid(&self) -> bool {
        [&self.id, &self.first_name, &self.last_name, &self.email]
            .iter()
            .all(|field| !field.trim().is_empty())
    }

    fn matches_search(&self, needle: &str) -> bool {
        [&self.first_name, &self.last_name, &self.email, &self.position]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
            || self.full_name().to_lowercase().contains(needle)
    }

    fn department(&self) -> Option<&str> {
        self.department.as_deref()
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    fn draft_name(draft: &CandidateDraft) -> String {
        format!("{} {}", draft.first_name.trim(), draft.last_name.trim())
    }

    fn validate_draft(draft: &CandidateDraft) -> Result<(), String> {
        if draft.first_name.trim().is_empty() || draft.last_name.trim().is_empty() {
            return Err("Candidate first and last name are required".to_string());
        }
        if !draft.email.contains('@') {
            return Err(format!("'{}' is not a valid email address", draft.email));
        }
        Ok(())
    }

    fn from_draft(id: String, draft: &CandidateDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            first_name: draft.first_name.trim().to_string(),
            last_name: draft.last_name.trim().to_string(),
            email: draft.email.trim().to_string(),
            phone: draft.phone.clone(),
            position: draft.position.clone(),
            department: draft.department.clone(),
            status: CandidateStatus::New,
            created_at: Some(created_at),
            updated_at: Some(created_at),
            timeline: Vec::new(),
        }
    }

    fn apply_patch(&mut self, patch: &CandidatePatch) {
        if let Some(first_name) = &patch.first_name {
            self.first_name = first_name.clone();
        }
        if let Some(last_name) = &patch.last_name {
            self.last_name = last_name.clone();
        }
        if let Some(email) = &patch.email {
            self.email = email.clone();
        }
        if let Some(phone) = &patch.phone {
            self.phone = Some(phone.clone());
        }
        if let Some(position) = &patch.position {
            self.position = position.clone();
        }
        if let Some(department) = &patch.department {
            self.department = Some(department.clone());
        }
        self.updated_at = Some(Utc::now());
    }

    fn set_status(&mut self, status: CandidateStatus) {
        self.status = status;
        self.updated_at = Some(Utc::now());
    }

    fn record(&mut self, entry: TimelineEntry) {
        self.timeline.push(entry);
    }
}
