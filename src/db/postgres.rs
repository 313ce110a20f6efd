//! Postgres-backed `JobStore`/`UserStore`, reached through a
//! `deadpool_postgres` connection pool. Schema is applied by `refinery`
//! before the process serves traffic; see `crate::bin::migrate` and
//! `migrations/`.

use async_trait::async_trait;
use deadpool_postgres::{Config as PoolConfig, Pool, Runtime};
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

use crate::db::{JobFilter, JobStore, NewJob, TerminalOutcome, UserStore};
use crate::error::DatabaseError;
use crate::model::{Job, JobStatus, Progress, Role, User};

mod embedded {
    refinery::embed_migrations!("migrations");
}

pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self, DatabaseError> {
        let mut cfg = PoolConfig::new();
        cfg.url = Some(database_url.to_string());
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<deadpool_postgres::Client, DatabaseError> {
        Ok(self.pool.get().await?)
    }

    /// Applies every pending migration under `migrations/`. Called once at
    /// startup in every binary before serving traffic.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let mut client = self.conn().await?;
        embedded::migrations::runner()
            .run_async(&mut *client)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        Ok(())
    }
}

fn row_to_job(row: &Row) -> Job {
    let progress_json: Option<serde_json::Value> = row.get("progress");
    Job {
        id: row.get("id"),
        user_id: row.get("user_id"),
        narrative: row.get("narrative"),
        duration: row.get("duration"),
        generator: row.get("generator"),
        model: row.get("model"),
        options: row.get("options"),
        status: row.get("status"),
        attempts: row.get("attempts"),
        created_at: row.get("created_at"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        artifact_url: row.get("artifact_url"),
        result: row.get("result"),
        progress: progress_json.and_then(|v| serde_json::from_value(v).ok()),
        error: row.get("error"),
        request_id: row.get("request_id"),
    }
}

fn row_to_user(row: &Row) -> User {
    let role_str: String = row.get("role");
    User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: role_str.parse().unwrap_or(Role::User),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl JobStore for PostgresStore {
    async fn create_job(&self, new_job: NewJob) -> Result<Job, DatabaseError> {
        let conn = self.conn().await?;

        // Idempotent on `id` conflict (I5): a resubmission of the same id
        // returns the job already on record instead of erroring.
        let row = conn
            .query_opt(
                "INSERT INTO jobs
                    (id, user_id, narrative, duration, generator, model, options,
                     status, attempts, created_at, request_id)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, 'queued', 0, now(), $8)
                 ON CONFLICT (id) DO NOTHING
                 RETURNING *",
                &[
                    &new_job.id,
                    &new_job.user_id,
                    &new_job.narrative,
                    &new_job.duration,
                    &new_job.generator,
                    &new_job.model,
                    &new_job.options,
                    &new_job.request_id,
                ],
            )
            .await?;

        match row {
            Some(row) => Ok(row_to_job(&row)),
            None => self
                .get_job(new_job.id)
                .await?
                .ok_or(DatabaseError::NotFound(new_job.id)),
        }
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn.query_opt("SELECT * FROM jobs WHERE id = $1", &[&id]).await?;
        Ok(row.as_ref().map(row_to_job))
    }

    async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, DatabaseError> {
        let conn = self.conn().await?;
        let limit = if filter.limit > 0 { filter.limit } else { 50 };

        let rows = match (filter.user_id, filter.status) {
            (Some(uid), Some(status)) => {
                conn.query(
                    "SELECT * FROM jobs WHERE user_id = $1 AND status = $2
                     ORDER BY created_at DESC LIMIT $3",
                    &[&uid, &status, &limit],
                )
                .await?
            }
            (Some(uid), None) => {
                conn.query(
                    "SELECT * FROM jobs WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
                    &[&uid, &limit],
                )
                .await?
            }
            (None, Some(status)) => {
                conn.query(
                    "SELECT * FROM jobs WHERE status = $1 ORDER BY created_at DESC LIMIT $2",
                    &[&status, &limit],
                )
                .await?
            }
            (None, None) => {
                conn.query("SELECT * FROM jobs ORDER BY created_at DESC LIMIT $1", &[&limit])
                    .await?
            }
        };

        Ok(rows.iter().map(row_to_job).collect())
    }

    async fn start_processing(
        &self,
        id: Uuid,
        request_id_if_absent: &str,
    ) -> Result<Job, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "UPDATE jobs
                 SET status = 'processing',
                     attempts = attempts + 1,
                     started_at = now(),
                     request_id = COALESCE(NULLIF(request_id, ''), $2)
                 WHERE id = $1 AND status = 'queued'
                 RETURNING *",
                &[&id, &request_id_if_absent],
            )
            .await?;

        if let Some(row) = row {
            return Ok(row_to_job(&row));
        }

        let current = self.get_job(id).await?.ok_or(DatabaseError::NotFound(id))?;
        Err(DatabaseError::IllegalTransition {
            job_id: id,
            from: current.status.as_str().to_string(),
            to: JobStatus::Processing.as_str().to_string(),
        })
    }

    async fn patch_progress(&self, id: Uuid, progress: Progress) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        let json = serde_json::to_value(&progress).expect("Progress always serializes");

        let rows = conn
            .execute(
                "UPDATE jobs SET progress = $2 WHERE id = $1 AND status = 'processing'",
                &[&id, &json],
            )
            .await?;

        if rows == 0 {
            let current = self.get_job(id).await?.ok_or(DatabaseError::NotFound(id))?;
            return Err(DatabaseError::IllegalTransition {
                job_id: id,
                from: current.status.as_str().to_string(),
                to: "progress-update".to_string(),
            });
        }
        Ok(())
    }

    async fn patch_terminal(
        &self,
        id: Uuid,
        outcome: TerminalOutcome,
    ) -> Result<Job, DatabaseError> {
        let conn = self.conn().await?;

        let (target, row) = match &outcome {
            TerminalOutcome::Completed { artifact_url, result } => {
                let row = conn
                    .query_opt(
                        "UPDATE jobs
                         SET status = 'completed', completed_at = now(),
                             artifact_url = $2, result = $3
                         WHERE id = $1 AND status = 'processing'
                         RETURNING *",
                        &[&id, artifact_url, result],
                    )
                    .await?;
                (JobStatus::Completed, row)
            }
            TerminalOutcome::Failed { error } => {
                let row = conn
                    .query_opt(
                        "UPDATE jobs
                         SET status = 'failed', completed_at = now(), error = $2
                         WHERE id = $1 AND status IN ('queued', 'processing')
                         RETURNING *",
                        &[&id, error],
                    )
                    .await?;
                (JobStatus::Failed, row)
            }
            TerminalOutcome::Cancelled => {
                let row = conn
                    .query_opt(
                        "UPDATE jobs
                         SET status = 'cancelled', completed_at = now()
                         WHERE id = $1 AND status IN ('queued', 'processing')
                         RETURNING *",
                        &[&id],
                    )
                    .await?;
                (JobStatus::Cancelled, row)
            }
        };

        if let Some(row) = row {
            return Ok(row_to_job(&row));
        }

        // No rows matched: either a genuine illegal transition, or this is
        // a duplicate Report for a job already in the target state, in
        // which case `patch_terminal` is a no-op (`P6`, `L2`).
        let current = self.get_job(id).await?.ok_or(DatabaseError::NotFound(id))?;
        if current.status == target {
            return Ok(current);
        }
        Err(DatabaseError::IllegalTransition {
            job_id: id,
            from: current.status.as_str().to_string(),
            to: target.as_str().to_string(),
        })
    }

    async fn cancel_job(&self, id: Uuid) -> Result<Job, DatabaseError> {
        self.patch_terminal(id, TerminalOutcome::Cancelled).await
    }

    async fn requeue_job(&self, id: Uuid) -> Result<Job, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "UPDATE jobs
                 SET status = 'queued', started_at = NULL
                 WHERE id = $1 AND status = 'processing'
                 RETURNING *",
                &[&id],
            )
            .await?;

        if let Some(row) = row {
            return Ok(row_to_job(&row));
        }

        let current = self.get_job(id).await?.ok_or(DatabaseError::NotFound(id))?;
        Err(DatabaseError::IllegalTransition {
            job_id: id,
            from: current.status.as_str().to_string(),
            to: JobStatus::Queued.as_str().to_string(),
        })
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                "INSERT INTO users (id, email, password_hash, role, created_at)
                 VALUES (gen_random_uuid(), $1, $2, $3, now())
                 RETURNING *",
                &[&email, &password_hash, &role.as_str()],
            )
            .await
            // unique_violation on email surfaces here; auth::register maps
            // it to AuthError::Conflict rather than a generic 5xx.
            .map_err(DatabaseError::Query)?;
        Ok(row_to_user(&row))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt("SELECT * FROM users WHERE email = $1", &[&email])
            .await?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn.query_opt("SELECT * FROM users WHERE id = $1", &[&id]).await?;
        Ok(row.as_ref().map(row_to_user))
    }
}
