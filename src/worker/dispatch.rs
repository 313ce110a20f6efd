//! The dispatch algorithm for a single stream entry (SPEC_FULL.md §4.4).
//! Grounded in the claim -> process -> ack/retry/dead-letter shape common
//! to stream-consumer worker loops, generalized to this job's CAS-guarded
//! completion.

use serde_json::json;
use uuid::Uuid;

use crate::db::TerminalOutcome;
use crate::error::{DatabaseError, GeneratorError};
use crate::model::StreamEntry;
use crate::stream::Delivery;
use crate::worker::backoff::backoff;
use crate::worker::report::ReportType;
use crate::worker::WorkerContext;

pub async fn dispatch(ctx: &WorkerContext, delivery: Delivery) {
    let Delivery { entry_id, entry } = delivery;
    let job_id = entry.job_id;

    // Step 1: orphaned entries (job record missing) are acked and dropped.
    let job = match ctx.db.get_job(job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            tracing::warn!(%job_id, "no job record for stream entry, dropping");
            ack(ctx, &entry_id).await;
            return;
        }
        Err(e) => {
            tracing::error!(%job_id, error = %e, "job lookup failed, leaving entry pending for reclaim");
            return;
        }
    };

    // Step 3: CAS into processing. Failure here means another consumer
    // already claimed this attempt, or the job is already terminal —
    // either way this delivery is redundant (L1: exactly one advancement).
    let job = match ctx.db.start_processing(job_id, &entry.request_id).await {
        Ok(job) => job,
        Err(DatabaseError::IllegalTransition { .. }) => {
            tracing::debug!(%job_id, "job already claimed or terminal, skipping duplicate delivery");
            ack(ctx, &entry_id).await;
            return;
        }
        Err(e) => {
            tracing::error!(%job_id, error = %e, "failed to CAS job to processing, leaving pending");
            return;
        }
    };

    let request_id = job.request_id.clone();

    let result = ctx
        .generator
        .generate(
            &entry.generator,
            &request_id,
            &entry.narrative,
            entry.duration,
            &entry.model,
            &entry.options,
        )
        .await;

    match result {
        Ok(response) => {
            let mut artifact_url = response.artifact_url.clone();

            if let (Some(store), Some(bytes_b64), Some(ext)) = (
                ctx.artifacts.as_ref(),
                response.artifact_bytes_base64.as_ref(),
                response.artifact_ext.as_ref(),
            ) {
                use base64::Engine;
                match base64::engine::general_purpose::STANDARD.decode(bytes_b64) {
                    Ok(bytes) => match store.put_artifact(&entry.generator, job_id, ext, bytes).await {
                        Ok(url) => artifact_url = Some(url),
                        Err(e) => {
                            // Non-fatal: job still completes without an artifact URL.
                            tracing::warn!(%job_id, error = %e, "artifact upload failed");
                        }
                    },
                    Err(e) => tracing::warn!(%job_id, error = %e, "artifact bytes were not valid base64"),
                }
            }

            let outcome = TerminalOutcome::Completed {
                artifact_url,
                result: response.result.clone(),
            };

            match ctx.db.patch_terminal(job_id, outcome).await {
                Ok(_) => {
                    ack(ctx, &entry_id).await;
                    ctx.report
                        .report(
                            job_id,
                            ReportType::Completed,
                            &request_id,
                            &json!({"artifactUrl": response.artifact_url, "result": response.result}),
                        )
                        .await;
                }
                Err(e) => {
                    tracing::error!(%job_id, error = %e, "failed to CAS job to completed");
                    ack(ctx, &entry_id).await;
                }
            }
        }
        Err(err) => handle_failure(ctx, &entry_id, job_id, &request_id, entry, job.attempts, err).await,
    }
}

async fn handle_failure(
    ctx: &WorkerContext,
    entry_id: &str,
    job_id: Uuid,
    request_id: &str,
    entry: StreamEntry,
    attempts: i32,
    err: GeneratorError,
) {
    // Permanent 4xx failures terminate immediately, regardless of
    // remaining retry budget.
    if !err.is_retryable() {
        tracing::info!(%job_id, error = %err, "permanent generator error, failing job");
        fail_terminally(ctx, entry_id, job_id, request_id, err.to_string()).await;
        return;
    }

    let new_attempts = attempts as u32;
    if new_attempts < ctx.max_retries {
        tracing::info!(%job_id, attempt = new_attempts, error = %err, "retryable error, scheduling retry");
        let delay = backoff(new_attempts);
        // Sleep-before-append blocks one concurrency slot for the retry
        // delay; simple and correct per the design notes in SPEC_FULL.md §9.
        tokio::time::sleep(delay).await;

        // Release the job back to `queued` before re-appending, otherwise
        // the redelivered entry's `start_processing` CAS finds the job
        // still `processing` and treats it as a duplicate delivery — the
        // job would sit in `processing` forever.
        if let Err(e) = ctx.db.requeue_job(job_id).await {
            tracing::error!(%job_id, error = %e, "failed to requeue job, leaving entry pending for reclaim");
            return;
        }

        let retry_entry = StreamEntry {
            retry_count: new_attempts,
            ..entry
        };
        if let Err(e) = ctx.stream.append(&retry_entry).await {
            tracing::error!(%job_id, error = %e, "failed to re-enqueue retry, entry stays pending for reclaim");
            return;
        }
        ack(ctx, entry_id).await;
    } else {
        tracing::warn!(%job_id, attempts = new_attempts, "retries exhausted, failing job");
        fail_terminally(ctx, entry_id, job_id, request_id, err.to_string()).await;
    }
}

async fn fail_terminally(
    ctx: &WorkerContext,
    entry_id: &str,
    job_id: Uuid,
    request_id: &str,
    error: String,
) {
    match ctx
        .db
        .patch_terminal(job_id, TerminalOutcome::Failed { error: error.clone() })
        .await
    {
        Ok(job) => {
            if let Err(e) = ctx
                .stream
                .append_dead_letter(job_id, &error, job.attempts, request_id)
                .await
            {
                tracing::error!(%job_id, error = %e, "failed to append dead-letter entry");
            }
            ack(ctx, entry_id).await;
            ctx.report
                .report(job_id, ReportType::Failed, request_id, &json!({"error": error}))
                .await;
        }
        Err(e) => {
            tracing::error!(%job_id, error = %e, "failed to CAS job to failed");
            ack(ctx, entry_id).await;
        }
    }
}

async fn ack(ctx: &WorkerContext, entry_id: &str) {
    if let Err(e) = ctx.stream.ack(entry_id).await {
        tracing::error!(entry_id, error = %e, "failed to ack stream entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_entry_carries_incremented_count() {
        let entry = StreamEntry {
            job_id: Uuid::new_v4(),
            narrative: "n".into(),
            duration: 30,
            generator: "jen1".into(),
            model: None,
            options: serde_json::json!({}),
            request_id: "r".into(),
            retry_count: 0,
        };
        let retried = StreamEntry {
            retry_count: 2,
            ..entry.clone()
        };
        assert_eq!(retried.retry_count, 2);
        assert_eq!(retried.job_id, entry.job_id);
    }
}
