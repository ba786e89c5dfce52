use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use stageflow_core::approvals::{DashboardStats, RequestStore, StoreError};
use stageflow_core::audit::{ApprovalAction, ApprovalEvent, AuditRole, AuditTrail};
use stageflow_core::domain::approval::{
    ApprovalLevel, ApprovalRequest, RequestId, RequestStatus, RequestType,
};
use stageflow_core::workflow::Transition;

use super::RepositoryError;
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id, title, description, request_type, requested_by, status, \
     current_level, sla_deadline, is_escalated, start_date, end_date, version, created_at, \
     updated_at";

/// SQLite caps bound parameters per statement.
const EVENT_LOOKUP_CHUNK: usize = 500;

pub struct SqlRequestStore {
    pool: DbPool,
}

impl SqlRequestStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert_request(&self, request: &ApprovalRequest) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO approval_request (id, title, description, request_type, requested_by,
                                           status, current_level, sla_deadline, is_escalated,
                                           start_date, end_date, version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.request_type.as_str())
        .bind(&request.requested_by)
        .bind(request.status.as_str())
        .bind(i64::from(request.current_level.as_u8()))
        .bind(timestamp(&request.sla_deadline))
        .bind(request.is_escalated)
        .bind(request.start_date.as_ref().map(timestamp))
        .bind(request.end_date.as_ref().map(timestamp))
        .bind(i64::from(request.version))
        .bind(timestamp(&request.created_at))
        .bind(timestamp(&request.updated_at))
        .execute(&mut *tx)
        .await?;

        for (index, event) in request.audit_trail.iter().enumerate() {
            insert_event(&mut tx, &request.id, index as i64 + 1, event).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn conditional_update(&self, transition: &Transition) -> Result<bool, RepositoryError> {
        let next = transition.next();
        let [open_a, open_b, open_c] = RequestStatus::OPEN;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE approval_request
             SET status = ?, current_level = ?, sla_deadline = ?, is_escalated = ?,
                 version = ?, updated_at = ?
             WHERE id = ? AND version = ? AND is_escalated = 0 AND status IN (?, ?, ?)",
        )
        .bind(next.status.as_str())
        .bind(i64::from(next.current_level.as_u8()))
        .bind(timestamp(&next.sla_deadline))
        .bind(next.is_escalated)
        .bind(i64::from(next.version))
        .bind(timestamp(&next.updated_at))
        .bind(&transition.request_id().0)
        .bind(i64::from(transition.expected_version()))
        .bind(open_a.as_str())
        .bind(open_b.as_str())
        .bind(open_c.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let sequence: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM approval_event WHERE request_id = ?",
        )
        .bind(&transition.request_id().0)
        .fetch_one(&mut *tx)
        .await?;
        insert_event(&mut tx, transition.request_id(), sequence, transition.event()).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn fetch_one(&self, id: &RequestId) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM approval_request WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut requests = self.hydrate(vec![row]).await?;
        Ok(requests.pop())
    }

    async fn fetch_newest_first(
        &self,
        requested_by: Option<&str>,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let rows = match requested_by {
            Some(requested_by) => {
                sqlx::query(&format!(
                    "SELECT {REQUEST_COLUMNS} FROM approval_request
                     WHERE requested_by = ?
                     ORDER BY created_at DESC, id DESC"
                ))
                .bind(requested_by)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {REQUEST_COLUMNS} FROM approval_request
                     ORDER BY created_at DESC, id DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        self.hydrate(rows).await
    }

    async fn fetch_overdue(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let [open_a, open_b, open_c] = RequestStatus::OPEN;
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM approval_request
             WHERE is_escalated = 0 AND status IN (?, ?, ?) AND sla_deadline < ?
             ORDER BY sla_deadline ASC, id ASC
             LIMIT ?"
        ))
        .bind(open_a.as_str())
        .bind(open_b.as_str())
        .bind(open_c.as_str())
        .bind(timestamp(&now))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn fetch_stats(&self) -> Result<DashboardStats, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0) AS pending,
                    COALESCE(SUM(CASE WHEN status = 'approved' THEN 1 ELSE 0 END), 0) AS approved,
                    COALESCE(SUM(CASE WHEN status = 'rejected' THEN 1 ELSE 0 END), 0) AS rejected,
                    COALESCE(SUM(CASE WHEN is_escalated = 1 THEN 1 ELSE 0 END), 0) AS escalated
             FROM approval_request",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(DashboardStats {
            total: count(&row, "total")?,
            pending: count(&row, "pending")?,
            approved: count(&row, "approved")?,
            rejected: count(&row, "rejected")?,
            escalated: count(&row, "escalated")?,
        })
    }

    /// Decodes request rows and attaches each one's audit trail, preserving
    /// row order.
    async fn hydrate(&self, rows: Vec<SqliteRow>) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let mut requests = rows.iter().map(request_from_row).collect::<Result<Vec<_>, _>>()?;
        if requests.is_empty() {
            return Ok(requests);
        }

        let ids: Vec<&str> = requests.iter().map(|request| request.id.0.as_str()).collect();
        let mut trails = self.load_events(&ids).await?;
        for request in &mut requests {
            if let Some(events) = trails.remove(&request.id.0) {
                request.audit_trail = AuditTrail::from_entries(events);
            }
        }
        Ok(requests)
    }

    async fn load_events(
        &self,
        ids: &[&str],
    ) -> Result<HashMap<String, Vec<ApprovalEvent>>, RepositoryError> {
        let mut trails: HashMap<String, Vec<ApprovalEvent>> = HashMap::new();

        for chunk in ids.chunks(EVENT_LOOKUP_CHUNK) {
            let mut builder = QueryBuilder::<Sqlite>::new(
                "SELECT request_id, sequence, level, role, actor_id, action, comment,
                        occurred_at, origin_address
                 FROM approval_event WHERE request_id IN (",
            );
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(") ORDER BY request_id ASC, sequence ASC");

            let rows = builder.build().fetch_all(&self.pool).await?;
            for row in &rows {
                let request_id: String = row.try_get("request_id")?;
                trails.entry(request_id).or_default().push(event_from_row(row)?);
            }
        }

        Ok(trails)
    }
}

#[async_trait]
impl RequestStore for SqlRequestStore {
    async fn insert(&self, request: &ApprovalRequest) -> Result<(), StoreError> {
        match self.insert_request(request).await {
            Err(RepositoryError::Database(sqlx::Error::Database(error)))
                if error.is_unique_violation() =>
            {
                Err(StoreError::Duplicate(request.id.clone()))
            }
            other => other.map_err(StoreError::from),
        }
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<ApprovalRequest>, StoreError> {
        Ok(self.fetch_one(id).await?)
    }

    async fn apply_transition(&self, transition: &Transition) -> Result<bool, StoreError> {
        Ok(self.conditional_update(transition).await?)
    }

    async fn list_by_requester(
        &self,
        requested_by: &str,
    ) -> Result<Vec<ApprovalRequest>, StoreError> {
        Ok(self.fetch_newest_first(Some(requested_by)).await?)
    }

    async fn list_all(&self) -> Result<Vec<ApprovalRequest>, StoreError> {
        Ok(self.fetch_newest_first(None).await?)
    }

    async fn list_overdue(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ApprovalRequest>, StoreError> {
        Ok(self.fetch_overdue(now, limit).await?)
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats, StoreError> {
        Ok(self.fetch_stats().await?)
    }
}

async fn insert_event(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    request_id: &RequestId,
    sequence: i64,
    event: &ApprovalEvent,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO approval_event (request_id, sequence, level, role, actor_id, action,
                                     comment, occurred_at, origin_address)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&request_id.0)
    .bind(sequence)
    .bind(i64::from(event.level.as_u8()))
    .bind(event.role.as_str())
    .bind(event.actor_id.as_deref())
    .bind(event.action.as_str())
    .bind(event.comment.as_deref())
    .bind(timestamp(&event.occurred_at))
    .bind(&event.origin_address)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Fixed-width UTC so that text comparison in SQL matches time order.
fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column} `{raw}`: {error}")))
}

fn parse_optional_timestamp(
    column: &str,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.map(|value| parse_timestamp(column, &value)).transpose()
}

fn parse_level(raw: i64) -> Result<ApprovalLevel, RepositoryError> {
    u8::try_from(raw)
        .ok()
        .and_then(ApprovalLevel::from_u8)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown approval level `{raw}`")))
}

fn count(row: &SqliteRow, column: &str) -> Result<u64, RepositoryError> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("negative {column} count `{value}`")))
}

fn request_from_row(row: &SqliteRow) -> Result<ApprovalRequest, RepositoryError> {
    let request_type: String = row.try_get("request_type")?;
    let status: String = row.try_get("status")?;
    let sla_deadline: String = row.try_get("sla_deadline")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let version: i64 = row.try_get("version")?;

    Ok(ApprovalRequest {
        id: RequestId(row.try_get("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        request_type: RequestType::parse(&request_type).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown request type `{request_type}`"))
        })?,
        requested_by: row.try_get("requested_by")?,
        status: RequestStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown status `{status}`")))?,
        current_level: parse_level(row.try_get("current_level")?)?,
        sla_deadline: parse_timestamp("sla_deadline", &sla_deadline)?,
        is_escalated: row.try_get("is_escalated")?,
        audit_trail: AuditTrail::default(),
        start_date: parse_optional_timestamp("start_date", row.try_get("start_date")?)?,
        end_date: parse_optional_timestamp("end_date", row.try_get("end_date")?)?,
        version: u32::try_from(version)
            .map_err(|_| RepositoryError::Decode(format!("invalid version `{version}`")))?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<ApprovalEvent, RepositoryError> {
    let role: String = row.try_get("role")?;
    let action: String = row.try_get("action")?;
    let occurred_at: String = row.try_get("occurred_at")?;

    Ok(ApprovalEvent {
        level: parse_level(row.try_get("level")?)?,
        role: AuditRole::parse(&role)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown audit role `{role}`")))?,
        actor_id: row.try_get("actor_id")?,
        action: ApprovalAction::parse(&action)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown audit action `{action}`")))?,
        comment: row.try_get("comment")?,
        occurred_at: parse_timestamp("occurred_at", &occurred_at)?,
        origin_address: row.try_get("origin_address")?,
    })
}
