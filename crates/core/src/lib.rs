pub mod approvals;
pub mod audit;
pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod escalation;
pub mod workflow;

pub use approvals::{
    ApprovalEngine, DashboardStats, InMemoryRequestStore, RequestStore, RetryPolicy, StoreError,
};
pub use audit::{ApprovalAction, ApprovalEvent, AuditRole, AuditTrail};
pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::approval::{
    ApprovalLevel, ApprovalRequest, ApproverRole, RequestId, RequestStatus, RequestType,
};
pub use errors::{ApplicationError, InterfaceError};
pub use escalation::{EscalationScheduler, EscalationSettings, SchedulerHandle, SweepStats};
pub use workflow::{
    ActionCommand, Decision, SubmitCommand, Transition, WorkflowEngine, WorkflowError,
    WorkflowPolicy,
};
