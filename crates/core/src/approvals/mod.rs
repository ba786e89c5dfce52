pub mod engine;
pub mod store;

pub use engine::{ApprovalEngine, RetryPolicy};
pub use store::{DashboardStats, InMemoryRequestStore, RequestStore, StoreError};
