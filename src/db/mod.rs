//! C1 — Job Store: the durable source of truth for job status, progress and
//! terminal results. Defined as a trait so `submission` and `worker` depend
//! on behavior, not on Postgres specifically; `postgres` is the only
//! implementation this crate ships.

pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{Job, JobStatus, Progress, Role, User};

/// Fields supplied by the caller of `Create`; everything else (`id`,
/// `status=queued`, `attempts=0`, `createdAt`) is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub narrative: String,
    pub duration: i32,
    pub generator: String,
    pub model: Option<String>,
    pub options: serde_json::Value,
    pub request_id: String,
}

#[derive(Debug, Clone)]
pub enum TerminalOutcome {
    Completed {
        artifact_url: Option<String>,
        result: Option<serde_json::Value>,
    },
    Failed {
        error: String,
    },
    Cancelled,
}

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<JobStatus>,
    pub limit: i64,
}

/// The Job Store (C1). All patches are compare-and-set: a forbidden
/// transition per `JobStatus::allowed_predecessors` returns
/// `DatabaseError::IllegalTransition` and mutates nothing.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, new_job: NewJob) -> Result<Job, DatabaseError>;

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, DatabaseError>;

    async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, DatabaseError>;

    /// CAS `queued -> processing`: `attempts += 1`, `started_at = now`.
    /// Also the entry point for `requestId` persistence when the stream
    /// entry carried a value the Job didn't have yet.
    async fn start_processing(
        &self,
        id: Uuid,
        request_id_if_absent: &str,
    ) -> Result<Job, DatabaseError>;

    /// CAS `processing -> processing` (no status change): updates
    /// `progress` only. Used by `Report(progress)`.
    async fn patch_progress(&self, id: Uuid, progress: Progress) -> Result<(), DatabaseError>;

    /// CAS into a terminal status. Idempotent: calling this again on a job
    /// already in the given terminal status is a no-op that returns the
    /// current row rather than erroring (`P6`/`L2`).
    async fn patch_terminal(
        &self,
        id: Uuid,
        outcome: TerminalOutcome,
    ) -> Result<Job, DatabaseError>;

    /// CAS `{queued, processing} -> cancelled`, cooperative cancellation.
    async fn cancel_job(&self, id: Uuid) -> Result<Job, DatabaseError>;

    /// CAS `processing -> queued`: releases the job back onto the stream
    /// after a retryable dispatch failure so the re-appended entry can be
    /// claimed again by `start_processing`.
    async fn requeue_job(&self, id: Uuid) -> Result<Job, DatabaseError>;
}

/// User directory backing C6. Kept separate from `JobStore` because it has
/// an entirely different access pattern (point lookups by email/id, no CAS).
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User, DatabaseError>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;
}

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}
