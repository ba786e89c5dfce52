use thiserror::Error;

use crate::approvals::store::StoreError;
use crate::domain::approval::RequestId;
use crate::workflow::WorkflowError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("request `{0}` not found")]
    NotFound(RequestId),
    #[error("request `{0}` changed concurrently; reload and retry")]
    ConflictStaleState(RequestId),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        Self::Persistence(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to perform this action right now.",
            Self::NotFound { .. } => "The requested approval request does not exist.",
            Self::Conflict { .. } => {
                "The request was changed by someone else. Reload it and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        let message = value.to_string();
        match value {
            ApplicationError::Workflow(
                WorkflowError::Validation(_)
                | WorkflowError::AlreadyFinalized { .. }
                | WorkflowError::NotOverdue { .. },
            ) => Self::BadRequest { message, correlation_id },
            ApplicationError::Workflow(
                WorkflowError::Unauthorized { .. } | WorkflowError::WrongTurn { .. },
            ) => Self::Forbidden { message, correlation_id },
            ApplicationError::NotFound(_) => Self::NotFound { message, correlation_id },
            ApplicationError::ConflictStaleState(_) => Self::Conflict { message, correlation_id },
            ApplicationError::Persistence(_) => Self::ServiceUnavailable { message, correlation_id },
            ApplicationError::Configuration(_) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::approvals::store::StoreError;
    use crate::domain::approval::{ApprovalLevel, ApproverRole, RequestId, RequestStatus};
    use crate::errors::{ApplicationError, InterfaceError};
    use crate::workflow::WorkflowError;

    #[test]
    fn validation_error_maps_to_bad_request_with_correlation_id() {
        let interface =
            ApplicationError::from(WorkflowError::Validation("title is required".to_owned()))
                .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
        assert!(interface.message().contains("title is required"));
    }

    #[test]
    fn finalized_request_is_a_bad_request() {
        let interface = ApplicationError::from(WorkflowError::AlreadyFinalized {
            status: RequestStatus::Rejected,
        })
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
        assert!(interface.message().contains("rejected"));
    }

    #[test]
    fn authority_errors_map_to_forbidden() {
        let wrong_turn = ApplicationError::from(WorkflowError::WrongTurn {
            role: ApproverRole::Admin,
            actor_level: ApprovalLevel::Admin,
            current_level: ApprovalLevel::Manager,
        })
        .into_interface("req-3");
        let unauthorized =
            ApplicationError::from(WorkflowError::Unauthorized { role: "employee".to_owned() })
                .into_interface("req-3");

        assert!(matches!(wrong_turn, InterfaceError::Forbidden { .. }));
        assert!(matches!(unauthorized, InterfaceError::Forbidden { .. }));
        assert_eq!(wrong_turn.correlation_id(), "req-3");
    }

    #[test]
    fn missing_and_stale_requests_map_to_not_found_and_conflict() {
        let id = RequestId("REQ-9".to_owned());
        let missing = ApplicationError::NotFound(id.clone()).into_interface("req-4");
        let stale = ApplicationError::ConflictStaleState(id).into_interface("req-4");

        assert!(matches!(missing, InterfaceError::NotFound { .. }));
        assert!(matches!(stale, InterfaceError::Conflict { .. }));
    }

    #[test]
    fn store_failure_maps_to_service_unavailable() {
        let interface =
            ApplicationError::from(StoreError::Unavailable("database lock timeout".to_owned()))
                .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface = ApplicationError::Configuration("sla window out of range".to_owned())
            .into_interface("req-6");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
