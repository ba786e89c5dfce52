pub mod engine;
pub mod states;

pub use engine::{WorkflowEngine, WorkflowError, WorkflowPolicy, DEFAULT_SLA_WINDOW_HOURS};
pub use states::{ActionCommand, Decision, SubmitCommand, Transition};
