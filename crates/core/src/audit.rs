use std::slice;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalLevel, ApproverRole};

/// Origin recorded for events produced by the escalation sweep.
pub const SYSTEM_ORIGIN: &str = "system";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approved,
    Rejected,
    Escalated,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Escalated => "escalated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "escalated" => Some(Self::Escalated),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditRole {
    Manager,
    Hr,
    Admin,
    System,
}

impl AuditRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Hr => "hr",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manager" => Some(Self::Manager),
            "hr" => Some(Self::Hr),
            "admin" => Some(Self::Admin),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

impl From<ApproverRole> for AuditRole {
    fn from(role: ApproverRole) -> Self {
        match role {
            ApproverRole::Manager => Self::Manager,
            ApproverRole::Hr => Self::Hr,
            ApproverRole::Admin => Self::Admin,
        }
    }
}

/// One state-changing action taken on a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalEvent {
    pub level: ApprovalLevel,
    pub role: AuditRole,
    pub actor_id: Option<String>,
    pub action: ApprovalAction,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub origin_address: String,
}

impl ApprovalEvent {
    pub fn by_approver(
        role: ApproverRole,
        actor_id: impl Into<String>,
        action: ApprovalAction,
        comment: Option<String>,
        occurred_at: DateTime<Utc>,
        origin_address: impl Into<String>,
    ) -> Self {
        Self {
            level: role.level(),
            role: role.into(),
            actor_id: Some(actor_id.into()),
            action,
            comment,
            occurred_at,
            origin_address: origin_address.into(),
        }
    }

    pub fn system_escalation(
        level: ApprovalLevel,
        comment: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            level,
            role: AuditRole::System,
            actor_id: None,
            action: ApprovalAction::Escalated,
            comment: Some(comment.into()),
            occurred_at,
            origin_address: SYSTEM_ORIGIN.to_string(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == AuditRole::System
    }
}

/// Append-only, chronologically ordered log owned by a single request.
///
/// Entries can only be added through a workflow transition, which is the only
/// caller of [`AuditTrail::append`]. Stores rebuild a persisted trail with
/// [`AuditTrail::from_entries`] and append a committed transition's event to
/// what they already hold, never to a caller's copy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditTrail {
    entries: Vec<ApprovalEvent>,
}

impl AuditTrail {
    pub fn from_entries(entries: Vec<ApprovalEvent>) -> Self {
        Self { entries }
    }

    /// Timestamps never run backwards: an event stamped earlier than the
    /// current tail is clamped to the tail's timestamp.
    pub(crate) fn append(&mut self, mut event: ApprovalEvent) -> &ApprovalEvent {
        if let Some(last) = self.entries.last() {
            if event.occurred_at < last.occurred_at {
                event.occurred_at = last.occurred_at;
            }
        }
        self.entries.push(event);
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[ApprovalEvent] {
        &self.entries
    }

    pub fn last(&self) -> Option<&ApprovalEvent> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, ApprovalEvent> {
        self.entries.iter()
    }

    pub fn escalation_count(&self) -> usize {
        self.entries.iter().filter(|event| event.action == ApprovalAction::Escalated).count()
    }
}

impl<'a> IntoIterator for &'a AuditTrail {
    type Item = &'a ApprovalEvent;
    type IntoIter = slice::Iter<'a, ApprovalEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
