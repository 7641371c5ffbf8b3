use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use staffdesk_core::approvals::{LeaveRequestStore, StoreError};
use staffdesk_core::domain::leave::{LeaveRequest, LeaveRequestId, LeaveStatus};
use staffdesk_core::domain::org::UserId;

use super::{decode, RepositoryError};
use crate::DbPool;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqlLeaveRequestRepository {
    pool: DbPool,
}

impl SqlLeaveRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, request: &LeaveRequest) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO leave_requests (id, requester_id, status, start_date, end_date,
                                         decided_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.requester_id.0)
        .bind(request.status.as_str())
        .bind(request.start_date.format(DATE_FORMAT).to_string())
        .bind(request.end_date.format(DATE_FORMAT).to_string())
        .bind(request.decided_by.as_ref().map(|id| id.0.as_str()))
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find(&self, id: &LeaveRequestId) -> Result<Option<LeaveRequest>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, requester_id, status, start_date, end_date, decided_by,
                    created_at, updated_at
             FROM leave_requests WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_leave_request(r)?)),
            None => Ok(None),
        }
    }

    pub async fn list_for_requester(
        &self,
        requester_id: &UserId,
    ) -> Result<Vec<LeaveRequest>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, requester_id, status, start_date, end_date, decided_by,
                    created_at, updated_at
             FROM leave_requests WHERE requester_id = ?
             ORDER BY start_date, id",
        )
        .bind(&requester_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_leave_request).collect()
    }

    async fn update_status_if(
        &self,
        id: &LeaveRequestId,
        expected: LeaveStatus,
        next: LeaveStatus,
        decided_by: &UserId,
        decided_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE leave_requests
             SET status = ?, decided_by = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(next.as_str())
        .bind(&decided_by.0)
        .bind(decided_at.to_rfc3339())
        .bind(&id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

fn parse_date(column: &str, raw: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn row_to_leave_request(row: &sqlx::sqlite::SqliteRow) -> Result<LeaveRequest, RepositoryError> {
    let id: String = decode(row, "id")?;
    let requester_id: String = decode(row, "requester_id")?;
    let status: String = decode(row, "status")?;
    let start_date: String = decode(row, "start_date")?;
    let end_date: String = decode(row, "end_date")?;
    let decided_by: Option<String> = decode(row, "decided_by")?;
    let created_at: String = decode(row, "created_at")?;
    let updated_at: String = decode(row, "updated_at")?;

    Ok(LeaveRequest {
        id: LeaveRequestId(id),
        requester_id: UserId(requester_id),
        status: status
            .parse::<LeaveStatus>()
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        start_date: parse_date("start_date", &start_date)?,
        end_date: parse_date("end_date", &end_date)?,
        decided_by: decided_by.map(UserId),
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait]
impl LeaveRequestStore for SqlLeaveRequestRepository {
    async fn find_by_id(&self, id: &LeaveRequestId) -> Result<Option<LeaveRequest>, StoreError> {
        Ok(self.find(id).await?)
    }

    async fn compare_and_set_status(
        &self,
        id: &LeaveRequestId,
        expected: LeaveStatus,
        next: LeaveStatus,
        decided_by: &UserId,
        decided_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.update_status_if(id, expected, next, decided_by, decided_at).await?)
    }
}
