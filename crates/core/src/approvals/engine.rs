use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use tracing::{info, warn};

use crate::approvals::store::{DashboardStats, RequestStore, StoreError};
use crate::clock::Clock;
use crate::domain::approval::{ApprovalRequest, RequestId};
use crate::errors::ApplicationError;
use crate::workflow::{ActionCommand, SubmitCommand, WorkflowEngine};

/// Bounded exponential backoff for transient store failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 50, max_delay_ms: 1_000 }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> StdDuration {
        let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
        StdDuration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

/// Application service behind every request-facing operation: submit, act
/// and the read paths. The workflow decides, the store commits.
#[derive(Clone)]
pub struct ApprovalEngine {
    store: Arc<dyn RequestStore>,
    clock: Arc<dyn Clock>,
    workflow: WorkflowEngine,
    retry: RetryPolicy,
}

impl ApprovalEngine {
    pub fn new(
        store: Arc<dyn RequestStore>,
        clock: Arc<dyn Clock>,
        workflow: WorkflowEngine,
        retry: RetryPolicy,
    ) -> Self {
        Self { store, clock, workflow, retry }
    }

    pub fn workflow(&self) -> &WorkflowEngine {
        &self.workflow
    }

    pub async fn submit(&self, command: SubmitCommand) -> Result<ApprovalRequest, ApplicationError> {
        let request = self.workflow.open(command, self.clock.now())?;
        self.with_retry("insert", || self.store.insert(&request)).await?;

        info!(
            event_name = "request.submitted",
            request_id = %request.id,
            request_type = request.request_type.as_str(),
            requested_by = %request.requested_by,
            sla_deadline = %request.sla_deadline,
            "approval request submitted"
        );
        Ok(request)
    }

    pub async fn act(&self, command: ActionCommand) -> Result<ApprovalRequest, ApplicationError> {
        self.workflow.validate_command(&command)?;

        let current = self
            .with_retry("find_by_id", || self.store.find_by_id(&command.request_id))
            .await?
            .ok_or_else(|| ApplicationError::NotFound(command.request_id.clone()))?;

        let transition = self.workflow.decide(&current, &command, self.clock.now())?;
        let applied =
            self.with_retry("apply_transition", || self.store.apply_transition(&transition)).await?;

        if !applied {
            warn!(
                event_name = "request.action_conflict",
                request_id = %transition.request_id,
                expected_version = transition.expected_version,
                actor_id = %command.actor_id,
                "request changed between read and write"
            );
            return Err(ApplicationError::ConflictStaleState(transition.request_id));
        }

        info!(
            event_name = "request.action_applied",
            request_id = %transition.request_id,
            actor_id = %command.actor_id,
            role = transition.event.role.as_str(),
            action = transition.event.action.as_str(),
            from_status = %transition.from,
            to_status = %transition.to(),
            level = %transition.next.current_level,
            "approval action applied"
        );
        Ok(transition.next)
    }

    pub async fn get_by_id(&self, id: &RequestId) -> Result<ApprovalRequest, ApplicationError> {
        self.with_retry("find_by_id", || self.store.find_by_id(id))
            .await?
            .ok_or_else(|| ApplicationError::NotFound(id.clone()))
    }

    pub async fn list_mine(
        &self,
        requested_by: &str,
    ) -> Result<Vec<ApprovalRequest>, ApplicationError> {
        let requests = self
            .with_retry("list_by_requester", || self.store.list_by_requester(requested_by))
            .await?;
        Ok(requests)
    }

    pub async fn list_all(&self) -> Result<Vec<ApprovalRequest>, ApplicationError> {
        Ok(self.with_retry("list_all", || self.store.list_all()).await?)
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats, ApplicationError> {
        Ok(self.with_retry("dashboard_stats", || self.store.dashboard_stats()).await?)
    }

    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Err(error) if error.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        event_name = "request.store_retry",
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient store failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::approvals::engine::{ApprovalEngine, RetryPolicy};
    use crate::approvals::store::{DashboardStats, InMemoryRequestStore, RequestStore, StoreError};
    use crate::audit::{ApprovalAction, AuditRole};
    use crate::clock::ManualClock;
    use crate::domain::approval::{ApprovalLevel, ApprovalRequest, RequestId, RequestStatus};
    use crate::errors::ApplicationError;
    use crate::workflow::{ActionCommand, SubmitCommand, Transition, WorkflowEngine, WorkflowError};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 9, 9, 0, 0).single().expect("valid time")
    }

    fn engine_with(store: Arc<dyn RequestStore>, clock: ManualClock) -> ApprovalEngine {
        ApprovalEngine::new(
            store,
            Arc::new(clock),
            WorkflowEngine::default(),
            RetryPolicy { max_retries: 2, base_delay_ms: 1, max_delay_ms: 2 },
        )
    }

    fn leave_request() -> SubmitCommand {
        SubmitCommand {
            title: "Annual leave".to_string(),
            description: "Two weeks in June".to_string(),
            request_type: "leave".to_string(),
            requested_by: "emp-1".to_string(),
            start_date: Some(t0() + Duration::days(30)),
            end_date: Some(t0() + Duration::days(44)),
        }
    }

    fn action(id: &RequestId, role: &str, action: &str) -> ActionCommand {
        ActionCommand {
            request_id: id.clone(),
            actor_id: format!("{role}-7"),
            actor_role: role.to_string(),
            action: action.to_string(),
            comment: None,
            origin_address: "192.0.2.10".to_string(),
        }
    }

    #[tokio::test]
    async fn happy_path_walks_all_three_levels() {
        let clock = ManualClock::new(t0());
        let engine = engine_with(Arc::new(InMemoryRequestStore::new()), clock.clone());

        let submitted = engine.submit(leave_request()).await.expect("submit");
        assert_eq!(submitted.sla_deadline, t0() + Duration::hours(48));

        clock.advance(Duration::hours(10));
        let after_manager =
            engine.act(action(&submitted.id, "manager", "approved")).await.expect("manager");
        assert_eq!(after_manager.status, RequestStatus::ApprovedByManager);
        assert_eq!(after_manager.current_level, ApprovalLevel::Hr);
        assert_eq!(after_manager.sla_deadline, t0() + Duration::hours(58));

        clock.advance(Duration::hours(10));
        engine.act(action(&submitted.id, "hr", "approved")).await.expect("hr");

        clock.advance(Duration::hours(10));
        let done = engine.act(action(&submitted.id, "admin", "approved")).await.expect("admin");
        assert_eq!(done.status, RequestStatus::Approved);
        assert_eq!(done.current_level, ApprovalLevel::Admin);

        let stored = engine.get_by_id(&submitted.id).await.expect("reload");
        let roles: Vec<_> = stored.audit_trail.iter().map(|event| event.role).collect();
        assert_eq!(roles, vec![AuditRole::Manager, AuditRole::Hr, AuditRole::Admin]);
        assert!(stored.audit_trail.iter().all(|event| event.action == ApprovalAction::Approved));
    }

    #[tokio::test]
    async fn rejection_then_any_action_is_already_finalized() {
        let engine = engine_with(Arc::new(InMemoryRequestStore::new()), ManualClock::new(t0()));
        let submitted = engine.submit(leave_request()).await.expect("submit");

        let rejected =
            engine.act(action(&submitted.id, "manager", "rejected")).await.expect("reject");
        assert_eq!(rejected.status, RequestStatus::Rejected);

        let error = engine
            .act(action(&submitted.id, "hr", "approved"))
            .await
            .expect_err("finalized request");
        assert_eq!(
            error,
            ApplicationError::Workflow(WorkflowError::AlreadyFinalized {
                status: RequestStatus::Rejected
            })
        );
        let stored = engine.get_by_id(&submitted.id).await.expect("reload");
        assert_eq!(stored.audit_trail.len(), 1);
    }

    #[tokio::test]
    async fn wrong_turn_and_unknown_role_leave_record_untouched() {
        let engine = engine_with(Arc::new(InMemoryRequestStore::new()), ManualClock::new(t0()));
        let submitted = engine.submit(leave_request()).await.expect("submit");

        let wrong_turn =
            engine.act(action(&submitted.id, "hr", "approved")).await.expect_err("wrong turn");
        assert!(matches!(wrong_turn, ApplicationError::Workflow(WorkflowError::WrongTurn { .. })));

        let unauthorized = engine
            .act(action(&submitted.id, "employee", "approved"))
            .await
            .expect_err("no authority");
        assert!(matches!(
            unauthorized,
            ApplicationError::Workflow(WorkflowError::Unauthorized { .. })
        ));

        let stored = engine.get_by_id(&submitted.id).await.expect("reload");
        assert_eq!(stored, submitted);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found_but_bad_input_is_validated_first() {
        let engine = engine_with(Arc::new(InMemoryRequestStore::new()), ManualClock::new(t0()));
        let missing = RequestId("REQ-missing".to_string());

        let not_found =
            engine.act(action(&missing, "manager", "approved")).await.expect_err("missing");
        assert_eq!(not_found, ApplicationError::NotFound(missing.clone()));

        let invalid =
            engine.act(action(&missing, "manager", "maybe")).await.expect_err("bad action");
        assert!(matches!(invalid, ApplicationError::Workflow(WorkflowError::Validation(_))));
    }

    #[tokio::test]
    async fn concurrent_approvals_at_same_level_commit_exactly_once() {
        let store = Arc::new(InMemoryRequestStore::new());
        let engine = engine_with(store.clone(), ManualClock::new(t0()));
        let submitted = engine.submit(leave_request()).await.expect("submit");

        let (first, second) = tokio::join!(
            engine.act(action(&submitted.id, "manager", "approved")),
            engine.act(action(&submitted.id, "manager", "approved")),
        );

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
        assert!(outcomes.iter().any(|outcome| matches!(
            outcome,
            Err(ApplicationError::ConflictStaleState(_))
                | Err(ApplicationError::Workflow(WorkflowError::WrongTurn { .. }))
        )));

        let stored = engine.get_by_id(&submitted.id).await.expect("reload");
        assert_eq!(stored.audit_trail.len(), 1);
        assert_eq!(stored.status, RequestStatus::ApprovedByManager);
    }

    #[tokio::test]
    async fn stale_transition_is_not_applied() {
        let store = Arc::new(InMemoryRequestStore::new());
        let engine = engine_with(store.clone(), ManualClock::new(t0()));
        let submitted = engine.submit(leave_request()).await.expect("submit");

        // Another writer commits between our read and write.
        let competing = WorkflowEngine::default()
            .decide(&submitted, &action(&submitted.id, "manager", "rejected"), t0())
            .expect("decide");
        assert!(store.apply_transition(&competing).await.expect("competing write"));

        let stale = WorkflowEngine::default()
            .decide(&submitted, &action(&submitted.id, "manager", "approved"), t0())
            .expect("decide");
        assert!(!store.apply_transition(&stale).await.expect("stale write"));

        let stored = engine.get_by_id(&submitted.id).await.expect("reload");
        assert_eq!(stored.status, RequestStatus::Rejected);
    }

    /// Commits a scheduler escalation right after handing out a read, so the
    /// caller's follow-up write races a newer version.
    struct EscalatesAfterRead {
        inner: InMemoryRequestStore,
        armed: AtomicBool,
        now: DateTime<Utc>,
    }

    #[async_trait]
    impl RequestStore for EscalatesAfterRead {
        async fn insert(&self, request: &ApprovalRequest) -> Result<(), StoreError> {
            self.inner.insert(request).await
        }

        async fn find_by_id(
            &self,
            id: &RequestId,
        ) -> Result<Option<ApprovalRequest>, StoreError> {
            let found = self.inner.find_by_id(id).await?;
            if let Some(request) = &found {
                if self.armed.swap(false, Ordering::SeqCst) {
                    let escalation = WorkflowEngine::default()
                        .escalate(request, self.now)
                        .map_err(|error| StoreError::Unavailable(error.to_string()))?;
                    self.inner.apply_transition(&escalation).await?;
                }
            }
            Ok(found)
        }

        async fn apply_transition(&self, transition: &Transition) -> Result<bool, StoreError> {
            self.inner.apply_transition(transition).await
        }

        async fn list_by_requester(
            &self,
            requested_by: &str,
        ) -> Result<Vec<ApprovalRequest>, StoreError> {
            self.inner.list_by_requester(requested_by).await
        }

        async fn list_all(&self) -> Result<Vec<ApprovalRequest>, StoreError> {
            self.inner.list_all().await
        }

        async fn list_overdue(
            &self,
            now: DateTime<Utc>,
            limit: usize,
        ) -> Result<Vec<ApprovalRequest>, StoreError> {
            self.inner.list_overdue(now, limit).await
        }

        async fn dashboard_stats(&self) -> Result<DashboardStats, StoreError> {
            self.inner.dashboard_stats().await
        }
    }

    #[tokio::test]
    async fn escalation_between_read_and_write_fails_the_action_as_stale() {
        let late = t0() + Duration::hours(49);
        let store = Arc::new(EscalatesAfterRead {
            inner: InMemoryRequestStore::new(),
            armed: AtomicBool::new(false),
            now: late,
        });
        let clock = ManualClock::new(t0());
        let engine = engine_with(store.clone(), clock.clone());
        let submitted = engine.submit(leave_request()).await.expect("submit");

        clock.advance(Duration::hours(49));
        store.armed.store(true, Ordering::SeqCst);
        let error = engine
            .act(action(&submitted.id, "manager", "approved"))
            .await
            .expect_err("escalated underneath the approver");
        assert_eq!(error, ApplicationError::ConflictStaleState(submitted.id.clone()));

        let stored = engine.get_by_id(&submitted.id).await.expect("reload");
        assert_eq!(stored.status, RequestStatus::Escalated);
        assert!(stored.is_escalated);
        assert_eq!(stored.version, 2);
        assert_eq!(stored.audit_trail.len(), 1);
        assert_eq!(stored.audit_trail.entries()[0].action, ApprovalAction::Escalated);
        assert_eq!(stored.audit_trail.entries()[0].role, AuditRole::System);
    }

    struct FlakyStore {
        inner: InMemoryRequestStore,
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakyStore {
        fn failing(times: u32) -> Self {
            Self {
                inner: InMemoryRequestStore::new(),
                failures_left: AtomicU32::new(times),
                calls: AtomicU32::new(0),
            }
        }

        fn trip(&self) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Unavailable("database is locked".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RequestStore for FlakyStore {
        async fn insert(&self, request: &ApprovalRequest) -> Result<(), StoreError> {
            self.trip()?;
            self.inner.insert(request).await
        }

        async fn find_by_id(
            &self,
            id: &RequestId,
        ) -> Result<Option<ApprovalRequest>, StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn apply_transition(&self, transition: &Transition) -> Result<bool, StoreError> {
            self.inner.apply_transition(transition).await
        }

        async fn list_by_requester(
            &self,
            requested_by: &str,
        ) -> Result<Vec<ApprovalRequest>, StoreError> {
            self.inner.list_by_requester(requested_by).await
        }

        async fn list_all(&self) -> Result<Vec<ApprovalRequest>, StoreError> {
            self.inner.list_all().await
        }

        async fn list_overdue(
            &self,
            now: DateTime<Utc>,
            limit: usize,
        ) -> Result<Vec<ApprovalRequest>, StoreError> {
            self.inner.list_overdue(now, limit).await
        }

        async fn dashboard_stats(&self) -> Result<DashboardStats, StoreError> {
            self.inner.dashboard_stats().await
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_within_budget() {
        let store = Arc::new(FlakyStore::failing(2));
        let engine = engine_with(store.clone(), ManualClock::new(t0()));

        let submitted = engine.submit(leave_request()).await.expect("retried submit");

        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert!(engine.get_by_id(&submitted.id).await.is_ok());
    }

    #[tokio::test]
    async fn exhausted_retries_surface_as_persistence_error() {
        let store = Arc::new(FlakyStore::failing(5));
        let engine = engine_with(store.clone(), ManualClock::new(t0()));

        let error = engine.submit(leave_request()).await.expect_err("store stays down");

        assert!(matches!(error, ApplicationError::Persistence(_)));
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy { max_retries: 5, base_delay_ms: 50, max_delay_ms: 150 };

        assert_eq!(policy.backoff(1), StdDuration::from_millis(50));
        assert_eq!(policy.backoff(2), StdDuration::from_millis(100));
        assert_eq!(policy.backoff(3), StdDuration::from_millis(150));
        assert_eq!(RetryPolicy::none().max_retries, 0);
    }

    #[tokio::test]
    async fn dashboard_and_listings_reflect_submissions() {
        let engine = engine_with(Arc::new(InMemoryRequestStore::new()), ManualClock::new(t0()));
        let first = engine.submit(leave_request()).await.expect("submit");
        let mut other = leave_request();
        other.requested_by = "emp-2".to_string();
        engine.submit(other).await.expect("submit");
        engine.act(action(&first.id, "manager", "rejected")).await.expect("reject");

        assert_eq!(engine.list_mine("emp-1").await.expect("mine").len(), 1);
        assert_eq!(engine.list_all().await.expect("all").len(), 2);
        assert_eq!(
            engine.dashboard_stats().await.expect("stats"),
            DashboardStats { total: 2, pending: 1, approved: 0, rejected: 1, escalated: 0 }
        );
    }
}
