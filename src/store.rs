use async_trait::async_trait;

use crate::models::{NewViolation, RecordFilter, Student, ViolationPatch, ViolationRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid stored value: {0}")]
    Corrupt(String),
    #[error("{0}")]
    Unavailable(String),
}

/// Persisted violation records plus the read-only student table.
///
/// Every write targets a single record by id, except `insert_violations`,
/// which commits all rows or none. There is no conflict detection: the last
/// write wins.
#[async_trait]
pub trait ViolationStore: Send + Sync {
    async fn list_students(&self) -> Result<Vec<Student>, StoreError>;
    async fn get_student(&self, nis: &str) -> Result<Option<Student>, StoreError>;
    async fn list_violations(&self, filter: &RecordFilter)
        -> Result<Vec<ViolationRecord>, StoreError>;
    async fn get_violation(&self, id: i64) -> Result<ViolationRecord, StoreError>;
    async fn insert_violation(&self, new: NewViolation) -> Result<ViolationRecord, StoreError>;
    async fn insert_violations(&self, rows: Vec<NewViolation>) -> Result<usize, StoreError>;
    async fn update_violation(
        &self,
        id: i64,
        patch: ViolationPatch,
    ) -> Result<ViolationRecord, StoreError>;
    async fn delete_violation(&self, id: i64) -> Result<(), StoreError>;
}
