//! Core data types shared across every component: the Job record (C1), its
//! status machine, and the auth principals (C6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `I1`: transitions form the DAG `queued -> processing -> {completed,
/// failed}`, with `cancelled` superseding `queued` or `processing`. No
/// transition leaves `{completed, failed, cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, postgres_types::ToSql, postgres_types::FromSql)]
#[postgres(name = "job_status")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// `true` once a job has left every reachable state — `I1`.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// Statuses from which `status` is allowed to become `self`, used to
    /// build the CAS precondition in `db::postgres`. `Processing -> Queued`
    /// is the requeue edge: a retryable dispatch failure puts the job back
    /// in line for another worker to claim.
    pub fn allowed_predecessors(self) -> &'static [JobStatus] {
        use JobStatus::*;
        match self {
            Queued => &[Processing],
            Processing => &[Queued],
            Completed => &[Processing],
            Failed => &[Queued, Processing],
            Cancelled => &[Queued, Processing],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Progress {
    pub current: u64,
    pub total: u64,
    pub percentage: f32,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub narrative: String,
    pub duration: i32,
    pub generator: String,
    pub model: Option<String>,
    pub options: serde_json::Value,
    pub status: JobStatus,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub artifact_url: Option<String>,
    pub result: Option<serde_json::Value>,
    pub progress: Option<Progress>,
    pub error: Option<String>,
    pub request_id: String,
}

pub const NARRATIVE_MAX_BYTES: usize = 1_500;
pub const OPTIONS_MAX_BYTES: usize = 16 * 1024;
pub const DURATION_MIN_SECS: i32 = 5;
pub const DURATION_MAX_SECS: i32 = 600;

/// A single entry read off `jobs:stream` (C2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEntry {
    pub job_id: Uuid,
    pub narrative: String,
    pub duration: i32,
    pub generator: String,
    pub model: Option<String>,
    pub options: serde_json::Value,
    pub request_id: String,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job_id: Uuid,
    pub error: String,
    pub attempts: i32,
    pub request_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    /// Matches the `role=orchestrator` service-token claim (C6); never
    /// stored as a `User` row.
    Orchestrator,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Orchestrator => "orchestrator",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "orchestrator" => Ok(Role::Orchestrator),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn processing_only_reachable_from_queued() {
        assert_eq!(JobStatus::Processing.allowed_predecessors(), &[JobStatus::Queued]);
    }

    #[test]
    fn queued_reachable_from_processing_for_requeue() {
        assert_eq!(JobStatus::Queued.allowed_predecessors(), &[JobStatus::Processing]);
    }

    #[test]
    fn cancelled_reachable_from_queued_or_processing() {
        let preds = JobStatus::Cancelled.allowed_predecessors();
        assert!(preds.contains(&JobStatus::Queued));
        assert!(preds.contains(&JobStatus::Processing));
    }

    #[test]
    fn role_roundtrips_through_str() {
        for role in [Role::User, Role::Admin, Role::Orchestrator] {
            let parsed: Role = role.as_str().parse().unwrap();
            assert_eq!(parsed, role);
        }
    }
}
