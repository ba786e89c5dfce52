use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{ApprovalAction, ApprovalEvent};
use crate::domain::approval::{ApprovalLevel, ApprovalRequest, RequestId, RequestStatus};

/// The two actions a human approver may take.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    /// Accepts the audit vocabulary (`approved`, `rejected`). `escalated` is
    /// reserved for the scheduler and is not a decision.
    pub fn parse(value: &str) -> Option<Self> {
        match ApprovalAction::parse(value)? {
            ApprovalAction::Approved => Some(Self::Approve),
            ApprovalAction::Rejected => Some(Self::Reject),
            ApprovalAction::Escalated => None,
        }
    }

    pub fn action(self) -> ApprovalAction {
        match self {
            Self::Approve => ApprovalAction::Approved,
            Self::Reject => ApprovalAction::Rejected,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitCommand {
    pub title: String,
    pub description: String,
    pub request_type: String,
    pub requested_by: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCommand {
    pub request_id: RequestId,
    pub actor_id: String,
    pub actor_role: String,
    pub action: String,
    pub comment: Option<String>,
    pub origin_address: String,
}

/// A computed state change, ready for a conditional write.
///
/// Only [`WorkflowEngine`](crate::workflow::WorkflowEngine) builds one.
/// `next` already carries `event` at the tail of its audit trail and has its
/// version bumped past `expected_version`. Stores take the scalar fields from
/// `next` and append `event`; they never copy `next`'s trail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub(crate) request_id: RequestId,
    pub(crate) expected_version: u32,
    pub(crate) from: RequestStatus,
    pub(crate) from_level: ApprovalLevel,
    pub(crate) event: ApprovalEvent,
    pub(crate) next: ApprovalRequest,
}

impl Transition {
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn expected_version(&self) -> u32 {
        self.expected_version
    }

    pub fn from_status(&self) -> RequestStatus {
        self.from
    }

    pub fn from_level(&self) -> ApprovalLevel {
        self.from_level
    }

    pub fn event(&self) -> &ApprovalEvent {
        &self.event
    }

    /// The record as it reads once the write commits.
    pub fn next(&self) -> &ApprovalRequest {
        &self.next
    }

    pub fn into_next(self) -> ApprovalRequest {
        self.next
    }

    pub fn to(&self) -> RequestStatus {
        self.next.status
    }

    pub fn advances_level(&self) -> bool {
        self.next.current_level != self.from_level
    }
}
