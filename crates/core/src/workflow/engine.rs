use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::audit::{ApprovalEvent, AuditTrail};
use crate::domain::approval::{
    ApprovalLevel, ApprovalRequest, ApproverRole, RequestId, RequestStatus, RequestType,
};
use crate::workflow::states::{ActionCommand, Decision, SubmitCommand, Transition};

pub const DEFAULT_SLA_WINDOW_HOURS: u32 = 48;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowPolicy {
    pub sla_window: Duration,
}

impl WorkflowPolicy {
    pub fn from_hours(hours: u32) -> Self {
        Self { sla_window: Duration::hours(i64::from(hours.max(1))) }
    }

    pub fn sla_window_hours(&self) -> i64 {
        self.sla_window.num_hours()
    }
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self::from_hours(DEFAULT_SLA_WINDOW_HOURS)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("request already finalized with status `{status}`")]
    AlreadyFinalized { status: RequestStatus },
    #[error("role `{role}` is not authorized to act on requests")]
    Unauthorized { role: String },
    #[error("not your turn: `{role}` acts at level {actor_level}, current level is {current_level}")]
    WrongTurn { role: ApproverRole, actor_level: ApprovalLevel, current_level: ApprovalLevel },
    #[error("request is not overdue before {deadline}")]
    NotOverdue { deadline: DateTime<Utc> },
}

/// Pure state machine for approval requests. Computes transitions; never
/// persists anything.
#[derive(Clone, Debug, Default)]
pub struct WorkflowEngine {
    policy: WorkflowPolicy,
}

impl WorkflowEngine {
    pub fn new(policy: WorkflowPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &WorkflowPolicy {
        &self.policy
    }

    pub fn open(
        &self,
        command: SubmitCommand,
        now: DateTime<Utc>,
    ) -> Result<ApprovalRequest, WorkflowError> {
        let title = required("title", &command.title)?;
        let description = required("description", &command.description)?;
        let requested_by = required("requestedBy", &command.requested_by)?;
        let request_type = RequestType::parse(&command.request_type).ok_or_else(|| {
            WorkflowError::Validation(format!(
                "type `{}` is not one of leave|expense|wfh|overtime",
                command.request_type.trim()
            ))
        })?;

        if let (Some(start), Some(end)) = (command.start_date, command.end_date) {
            if end < start {
                return Err(WorkflowError::Validation(
                    "endDate must not be earlier than startDate".to_string(),
                ));
            }
        }

        Ok(ApprovalRequest {
            id: RequestId::generate(),
            title,
            description,
            request_type,
            requested_by,
            status: RequestStatus::Pending,
            current_level: ApprovalLevel::Manager,
            sla_deadline: now + self.policy.sla_window,
            is_escalated: false,
            audit_trail: AuditTrail::default(),
            start_date: command.start_date,
            end_date: command.end_date,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Checks the parts of a command that do not depend on stored state.
    pub fn validate_command(&self, command: &ActionCommand) -> Result<Decision, WorkflowError> {
        required("actorId", &command.actor_id)?;
        Decision::parse(&command.action).ok_or_else(|| {
            WorkflowError::Validation(format!(
                "action `{}` must be `approved` or `rejected`",
                command.action.trim()
            ))
        })
    }

    pub fn decide(
        &self,
        current: &ApprovalRequest,
        command: &ActionCommand,
        now: DateTime<Utc>,
    ) -> Result<Transition, WorkflowError> {
        let decision = self.validate_command(command)?;

        if current.status.is_terminal() {
            return Err(WorkflowError::AlreadyFinalized { status: current.status });
        }

        let role = ApproverRole::parse(&command.actor_role)
            .ok_or_else(|| WorkflowError::Unauthorized { role: command.actor_role.clone() })?;

        if role.level() != current.current_level {
            return Err(WorkflowError::WrongTurn {
                role,
                actor_level: role.level(),
                current_level: current.current_level,
            });
        }

        let mut next = current.clone();
        match decision {
            Decision::Reject => next.status = RequestStatus::Rejected,
            Decision::Approve => match current.current_level.next() {
                Some(level) => {
                    next.status = approved_status(current.current_level);
                    next.current_level = level;
                    next.sla_deadline = current.sla_deadline.max(now + self.policy.sla_window);
                }
                None => next.status = RequestStatus::Approved,
            },
        }

        let event = ApprovalEvent::by_approver(
            role,
            command.actor_id.trim(),
            decision.action(),
            normalize_comment(command.comment.as_deref()),
            now,
            origin_or_unknown(&command.origin_address),
        );

        Ok(seal(current, next, event, now))
    }

    pub fn escalate(
        &self,
        current: &ApprovalRequest,
        now: DateTime<Utc>,
    ) -> Result<Transition, WorkflowError> {
        if current.status.is_terminal() || current.is_escalated {
            return Err(WorkflowError::AlreadyFinalized { status: current.status });
        }
        if current.sla_deadline >= now {
            return Err(WorkflowError::NotOverdue { deadline: current.sla_deadline });
        }

        let mut next = current.clone();
        next.status = RequestStatus::Escalated;
        next.is_escalated = true;

        let event = ApprovalEvent::system_escalation(
            current.current_level,
            format!(
                "Auto-escalated due to SLA breach ({}h)",
                self.policy.sla_window_hours()
            ),
            now,
        );

        Ok(seal(current, next, event, now))
    }
}

fn seal(
    current: &ApprovalRequest,
    mut next: ApprovalRequest,
    event: ApprovalEvent,
    now: DateTime<Utc>,
) -> Transition {
    let event = next.audit_trail.append(event).clone();
    next.version = current.version.saturating_add(1);
    next.updated_at = current.updated_at.max(now);

    Transition {
        request_id: current.id.clone(),
        expected_version: current.version,
        from: current.status,
        from_level: current.current_level,
        event,
        next,
    }
}

fn approved_status(level: ApprovalLevel) -> RequestStatus {
    match level {
        ApprovalLevel::Manager => RequestStatus::ApprovedByManager,
        ApprovalLevel::Hr => RequestStatus::ApprovedByHr,
        ApprovalLevel::Admin => RequestStatus::Approved,
    }
}

fn required(field: &str, value: &str) -> Result<String, WorkflowError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn normalize_comment(comment: Option<&str>) -> Option<String> {
    comment.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}

fn origin_or_unknown(origin: &str) -> String {
    let trimmed = origin.trim();
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}
