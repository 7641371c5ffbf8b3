use thiserror::Error;

use staffdesk_core::approvals::StoreError;
use staffdesk_core::directory::DirectoryError;

pub mod availability;
pub mod directory;
pub mod leave_request;

pub use availability::SqlAvailabilityOracle;
pub use directory::SqlOrgDirectory;
pub use leave_request::SqlLeaveRequestRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for DirectoryError {
    fn from(error: RepositoryError) -> Self {
        DirectoryError::Unavailable(error.to_string())
    }
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        StoreError::Unavailable(error.to_string())
    }
}

pub(crate) fn decode<T>(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    use sqlx::Row;

    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}
