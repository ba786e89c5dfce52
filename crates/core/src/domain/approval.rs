use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::AuditTrail;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Leave,
    Expense,
    Wfh,
    Overtime,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leave => "leave",
            Self::Expense => "expense",
            Self::Wfh => "wfh",
            Self::Overtime => "overtime",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "leave" => Some(Self::Leave),
            "expense" => Some(Self::Expense),
            "wfh" => Some(Self::Wfh),
            "overtime" => Some(Self::Overtime),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    ApprovedByManager,
    ApprovedByHr,
    Approved,
    Rejected,
    Escalated,
}

impl RequestStatus {
    /// Statuses in which a request still waits on a human at some level.
    pub const OPEN: [RequestStatus; 3] =
        [RequestStatus::Pending, RequestStatus::ApprovedByManager, RequestStatus::ApprovedByHr];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ApprovedByManager => "approved_by_manager",
            Self::ApprovedByHr => "approved_by_hr",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Escalated => "escalated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved_by_manager" => Some(Self::ApprovedByManager),
            "approved_by_hr" => Some(Self::ApprovedByHr),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "escalated" => Some(Self::Escalated),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Escalated)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approval stage currently empowered to act. Serialized as its numeric level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ApprovalLevel {
    Manager = 1,
    Hr = 2,
    Admin = 3,
}

impl ApprovalLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Manager),
            2 => Some(Self::Hr),
            3 => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::from_u8(self.as_u8() + 1)
    }
}

impl From<ApprovalLevel> for u8 {
    fn from(level: ApprovalLevel) -> Self {
        level.as_u8()
    }
}

impl TryFrom<u8> for ApprovalLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value)
            .ok_or_else(|| format!("approval level must be 1, 2 or 3, got {value}"))
    }
}

impl fmt::Display for ApprovalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Roles that hold approval authority. Any other caller role has no level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverRole {
    Manager,
    Hr,
    Admin,
}

impl ApproverRole {
    pub const ALL: [ApproverRole; 3] =
        [ApproverRole::Manager, ApproverRole::Hr, ApproverRole::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Hr => "hr",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manager" => Some(Self::Manager),
            "hr" => Some(Self::Hr),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn level(self) -> ApprovalLevel {
        match self {
            Self::Manager => ApprovalLevel::Manager,
            Self::Hr => ApprovalLevel::Hr,
            Self::Admin => ApprovalLevel::Admin,
        }
    }
}

impl fmt::Display for ApproverRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: RequestId,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub requested_by: String,
    pub status: RequestStatus,
    pub current_level: ApprovalLevel,
    pub sla_deadline: DateTime<Utc>,
    pub is_escalated: bool,
    /// A read copy. Stores only ever append a transition's event to the
    /// persisted trail, so edits made here are never written back.
    pub audit_trail: AuditTrail,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// Bumped on every committed mutation; conditional writes compare against it.
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalRequest {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && !self.is_escalated && self.sla_deadline < now
    }
}
