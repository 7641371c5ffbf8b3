use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite};

use staffdesk_core::directory::{AvailabilityOracle, DirectoryError};
use staffdesk_core::domain::org::UserId;

use super::RepositoryError;
use crate::DbPool;

/// A user is absent on a day covered by one of their approved leave requests.
#[derive(Clone)]
pub struct SqlAvailabilityOracle {
    pool: DbPool,
    fixed_date: Option<NaiveDate>,
}

impl SqlAvailabilityOracle {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, fixed_date: None }
    }

    /// Pins "today" instead of reading the UTC clock.
    pub fn with_fixed_date(mut self, date: NaiveDate) -> Self {
        self.fixed_date = Some(date);
        self
    }

    fn today(&self) -> String {
        self.fixed_date.unwrap_or_else(|| Utc::now().date_naive()).format("%Y-%m-%d").to_string()
    }

    async fn fetch_absent(&self, user_ids: &[UserId]) -> Result<Vec<String>, RepositoryError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let today = self.today();
        let mut query_builder = QueryBuilder::<Sqlite>::new(
            "SELECT DISTINCT requester_id FROM leave_requests
             WHERE status = 'approved' AND start_date <= ",
        );
        query_builder.push_bind(today.clone());
        query_builder.push(" AND end_date >= ");
        query_builder.push_bind(today);
        query_builder.push(" AND requester_id IN (");
        let mut separated = query_builder.separated(", ");
        for user_id in user_ids {
            separated.push_bind(&user_id.0);
        }
        separated.push_unseparated(")");

        let absent: Vec<String> =
            query_builder.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(absent)
    }
}

#[async_trait]
impl AvailabilityOracle for SqlAvailabilityOracle {
    async fn is_absent_today(&self, user_id: &UserId) -> Result<bool, DirectoryError> {
        let today = self.today();
        let absent: i64 = sqlx::query_scalar(
            "SELECT EXISTS(
                 SELECT 1 FROM leave_requests
                 WHERE requester_id = ?1 AND status = 'approved'
                   AND start_date <= ?2 AND end_date >= ?2
             )",
        )
        .bind(&user_id.0)
        .bind(today)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(absent == 1)
    }

    async fn absent_today(
        &self,
        user_ids: &[UserId],
    ) -> Result<HashMap<UserId, bool>, DirectoryError> {
        let absent = self.fetch_absent(user_ids).await?;
        Ok(user_ids
            .iter()
            .map(|user_id| (user_id.clone(), absent.iter().any(|id| id == &user_id.0)))
            .collect())
    }
}
