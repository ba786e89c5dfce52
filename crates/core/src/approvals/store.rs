use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::approval::{ApprovalRequest, RequestId, RequestStatus};
use crate::workflow::Transition;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
    #[error("request `{0}` already exists")]
    Duplicate(RequestId),
}

impl StoreError {
    /// Errors worth retrying. Corrupt rows and duplicate ids will not heal.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    pub escalated: u64,
}

/// Persistence port for approval requests.
///
/// `apply_transition` is the only mutation after `insert`. It must write the
/// transition's scalar fields and append its event in one atomic step, and only
/// when the stored record still has `expected_version`, is not escalated, and
/// sits in an open status. It returns `Ok(false)` when that precondition no
/// longer holds; nothing is written in that case.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert(&self, request: &ApprovalRequest) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<ApprovalRequest>, StoreError>;

    async fn apply_transition(&self, transition: &Transition) -> Result<bool, StoreError>;

    /// Newest first.
    async fn list_by_requester(
        &self,
        requested_by: &str,
    ) -> Result<Vec<ApprovalRequest>, StoreError>;

    /// Newest first.
    async fn list_all(&self) -> Result<Vec<ApprovalRequest>, StoreError>;

    /// Open, unescalated requests whose deadline is strictly before `now`,
    /// earliest deadline first.
    async fn list_overdue(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ApprovalRequest>, StoreError>;

    async fn dashboard_stats(&self) -> Result<DashboardStats, StoreError>;
}

#[derive(Default)]
pub struct InMemoryRequestStore {
    requests: RwLock<HashMap<String, ApprovalRequest>>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut requests: Vec<ApprovalRequest>) -> Vec<ApprovalRequest> {
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
    requests
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn insert(&self, request: &ApprovalRequest) -> Result<(), StoreError> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id.0) {
            return Err(StoreError::Duplicate(request.id.clone()));
        }
        requests.insert(request.id.0.clone(), request.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<ApprovalRequest>, StoreError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn apply_transition(&self, transition: &Transition) -> Result<bool, StoreError> {
        let mut requests = self.requests.write().await;
        let Some(stored) = requests.get_mut(&transition.request_id.0) else {
            return Ok(false);
        };

        let still_open = RequestStatus::OPEN.contains(&stored.status) && !stored.is_escalated;
        if stored.version != transition.expected_version || !still_open {
            return Ok(false);
        }

        let next = &transition.next;
        stored.status = next.status;
        stored.current_level = next.current_level;
        stored.sla_deadline = next.sla_deadline;
        stored.is_escalated = next.is_escalated;
        stored.version = next.version;
        stored.updated_at = next.updated_at;
        stored.audit_trail.append(transition.event.clone());
        Ok(true)
    }

    async fn list_by_requester(
        &self,
        requested_by: &str,
    ) -> Result<Vec<ApprovalRequest>, StoreError> {
        let requests = self.requests.read().await;
        let mine = requests
            .values()
            .filter(|request| request.requested_by == requested_by)
            .cloned()
            .collect();
        Ok(newest_first(mine))
    }

    async fn list_all(&self) -> Result<Vec<ApprovalRequest>, StoreError> {
        let requests = self.requests.read().await;
        Ok(newest_first(requests.values().cloned().collect()))
    }

    async fn list_overdue(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ApprovalRequest>, StoreError> {
        let requests = self.requests.read().await;
        let mut overdue: Vec<_> =
            requests.values().filter(|request| request.is_overdue(now)).cloned().collect();
        overdue.sort_by(|a, b| a.sla_deadline.cmp(&b.sla_deadline).then_with(|| a.id.cmp(&b.id)));
        overdue.truncate(limit);
        Ok(overdue)
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats, StoreError> {
        let requests = self.requests.read().await;
        let mut stats = DashboardStats { total: requests.len() as u64, ..DashboardStats::default() };
        for request in requests.values() {
            match request.status {
                RequestStatus::Pending => stats.pending += 1,
                RequestStatus::Approved => stats.approved += 1,
                RequestStatus::Rejected => stats.rejected += 1,
                _ => {}
            }
            if request.is_escalated {
                stats.escalated += 1;
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use crate::approvals::store::{InMemoryRequestStore, RequestStore, StoreError};
    use crate::audit::{AuditRole, AuditTrail};
    use crate::domain::approval::{ApprovalLevel, ApprovalRequest, RequestStatus};
    use crate::workflow::{ActionCommand, SubmitCommand, WorkflowEngine};

    fn open(engine: &WorkflowEngine, requested_by: &str, hours: i64) -> ApprovalRequest {
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).single().expect("valid time")
            + Duration::hours(hours);
        engine
            .open(
                SubmitCommand {
                    title: "Remote week".to_string(),
                    description: "Working from the coast".to_string(),
                    request_type: "wfh".to_string(),
                    requested_by: requested_by.to_string(),
                    start_date: None,
                    end_date: None,
                },
                at,
            )
            .expect("open")
    }

    fn manager_approves(request: &ApprovalRequest) -> ActionCommand {
        ActionCommand {
            request_id: request.id.clone(),
            actor_id: "mgr-1".to_string(),
            actor_role: "manager".to_string(),
            action: "approved".to_string(),
            comment: None,
            origin_address: "127.0.0.1".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let store = InMemoryRequestStore::new();
        let request = open(&WorkflowEngine::default(), "emp-1", 0);

        store.insert(&request).await.expect("first insert");
        let error = store.insert(&request).await.expect_err("duplicate insert");

        assert_eq!(error, StoreError::Duplicate(request.id.clone()));
        assert!(!error.is_transient());
    }

    #[tokio::test]
    async fn apply_transition_is_first_writer_wins() {
        let engine = WorkflowEngine::default();
        let store = InMemoryRequestStore::new();
        let request = open(&engine, "emp-1", 0);
        store.insert(&request).await.expect("insert");

        let now = request.created_at + Duration::hours(1);
        let first = engine.decide(&request, &manager_approves(&request), now).expect("decide");
        let second = engine.decide(&request, &manager_approves(&request), now).expect("decide");

        assert!(store.apply_transition(&first).await.expect("first write"));
        assert!(!store.apply_transition(&second).await.expect("stale write"));

        let stored = store.find_by_id(&request.id).await.expect("find").expect("present");
        assert_eq!(stored.audit_trail.len(), 1);
        assert_eq!(stored.status, RequestStatus::ApprovedByManager);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn transition_appends_its_event_and_keeps_stored_history() {
        let engine = WorkflowEngine::default();
        let store = InMemoryRequestStore::new();
        let request = open(&engine, "emp-1", 0);
        store.insert(&request).await.expect("insert");

        let now = request.created_at + Duration::hours(1);
        let by_manager = engine.decide(&request, &manager_approves(&request), now).expect("decide");
        assert!(store.apply_transition(&by_manager).await.expect("manager write"));

        let mut hr_approves = manager_approves(&request);
        hr_approves.actor_id = "hr-1".to_string();
        hr_approves.actor_role = "hr".to_string();
        let mut by_hr = engine.decide(by_manager.next(), &hr_approves, now).expect("decide");
        by_hr.next.audit_trail = AuditTrail::default();

        assert!(store.apply_transition(&by_hr).await.expect("hr write"));

        let stored = store.find_by_id(&request.id).await.expect("find").expect("present");
        let roles: Vec<_> = stored.audit_trail.iter().map(|event| event.role).collect();
        assert_eq!(roles, vec![AuditRole::Manager, AuditRole::Hr]);
        assert_eq!(stored.status, RequestStatus::ApprovedByHr);
        assert_eq!(stored.current_level, ApprovalLevel::Admin);
        assert_eq!(stored.version, 3);
    }

    #[tokio::test]
    async fn listings_are_newest_first_and_overdue_is_deadline_ordered() {
        let engine = WorkflowEngine::default();
        let store = InMemoryRequestStore::new();
        let older = open(&engine, "emp-1", 0);
        let newer = open(&engine, "emp-1", 2);
        let other = open(&engine, "emp-2", 1);
        for request in [&older, &newer, &other] {
            store.insert(request).await.expect("insert");
        }

        let mine = store.list_by_requester("emp-1").await.expect("list mine");
        assert_eq!(mine.iter().map(|r| r.id.clone()).collect::<Vec<_>>(), vec![
            newer.id.clone(),
            older.id.clone()
        ]);
        assert_eq!(store.list_all().await.expect("list all").len(), 3);

        let late = older.sla_deadline + Duration::hours(2);
        let overdue = store.list_overdue(late, 2).await.expect("overdue");
        assert_eq!(overdue.iter().map(|r| r.id.clone()).collect::<Vec<_>>(), vec![
            older.id.clone(),
            other.id.clone()
        ]);
    }

    #[tokio::test]
    async fn dashboard_counts_only_exact_status_buckets() {
        let engine = WorkflowEngine::default();
        let store = InMemoryRequestStore::new();
        let pending = open(&engine, "emp-1", 0);
        let advanced = open(&engine, "emp-2", 0);
        store.insert(&pending).await.expect("insert");
        store.insert(&advanced).await.expect("insert");

        let transition = engine
            .decide(&advanced, &manager_approves(&advanced), advanced.created_at)
            .expect("decide");
        assert!(store.apply_transition(&transition).await.expect("apply"));

        let stats = store.dashboard_stats().await.expect("stats");
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.approved + stats.rejected + stats.escalated, 0);
    }
}
