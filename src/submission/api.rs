//! C3 — Job Submission & Persistence API.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use uuid::Uuid;

use crate::auth::middleware::{auth_middleware, require_orchestrator};
use crate::auth::Claims;
use crate::context::AppContext;
use crate::correlation::RequestId;
use crate::db::{NewJob, TerminalOutcome};
use crate::error::{ApiError, AuthError};
use crate::gateway::types::ServerMessage;
use crate::model::{Job, Role, DURATION_MAX_SECS, DURATION_MIN_SECS, NARRATIVE_MAX_BYTES, OPTIONS_MAX_BYTES};
use crate::submission::types::{ReportPayload, ReportRequest, SubmitRequest, SubmitResponse};

pub fn router(ctx: AppContext) -> Router<AppContext> {
    let protected = Router::new()
        .route("/songs/generate-song", post(submit))
        .route("/jobs/{id}", get(get_job))
        .route_layer(axum::middleware::from_fn_with_state(ctx.clone(), auth_middleware));

    let reporting = Router::new()
        .route("/jobs/report", post(report))
        .route_layer(axum::middleware::from_fn(require_orchestrator))
        .route_layer(axum::middleware::from_fn_with_state(ctx.clone(), auth_middleware));

    Router::new()
        .merge(protected)
        .merge(reporting)
        .route("/healthz", get(healthz))
}

fn validate(req: &SubmitRequest) -> Result<(), ApiError> {
    if req.narrative.is_empty() {
        return Err(ApiError::Validation("narrative must not be empty".into()));
    }
    if req.narrative.len() > NARRATIVE_MAX_BYTES {
        return Err(ApiError::Validation(format!(
            "narrative exceeds {NARRATIVE_MAX_BYTES} bytes"
        )));
    }
    if req.duration < DURATION_MIN_SECS || req.duration > DURATION_MAX_SECS {
        return Err(ApiError::Validation(format!(
            "duration must be between {DURATION_MIN_SECS} and {DURATION_MAX_SECS} seconds"
        )));
    }
    let options_len = serde_json::to_vec(&req.options).map(|v| v.len()).unwrap_or(0);
    if options_len > OPTIONS_MAX_BYTES {
        return Err(ApiError::Validation(format!("options exceeds {OPTIONS_MAX_BYTES} bytes")));
    }
    Ok(())
}

async fn submit(
    State(ctx): State<AppContext>,
    Extension(claims): Extension<Claims>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    validate(&req)?;

    let job_id = Uuid::new_v4();
    let user_id = claims.sub.parse::<Uuid>().ok();

    let new_job = NewJob {
        id: job_id,
        user_id,
        narrative: req.narrative,
        duration: req.duration,
        generator: req.generator,
        model: req.model,
        options: req.options,
        request_id: request_id.0.clone(),
    };

    // Ordering matters (SPEC_FULL.md §4.1): the persistence write must
    // complete before the enqueue. If the enqueue fails, the job is marked
    // failed rather than left invisibly `queued` forever.
    let job = ctx.db.create_job(new_job).await?;

    let stream_entry = crate::model::StreamEntry {
        job_id: job.id,
        narrative: job.narrative.clone(),
        duration: job.duration,
        generator: job.generator.clone(),
        model: job.model.clone(),
        options: job.options.clone(),
        request_id: job.request_id.clone(),
        retry_count: 0,
    };

    if let Err(e) = ctx.stream.append(&stream_entry).await {
        tracing::error!(job_id = %job.id, error = %e, "enqueue failed after persistence, failing job");
        let _ = ctx
            .db
            .patch_terminal(
                job.id,
                // start_processing isn't called yet, so this CAS targets
                // `queued -> failed` directly.
                TerminalOutcome::Failed {
                    error: "enqueue-failed".to_string(),
                },
            )
            .await;
        return Err(ApiError::Stream(e));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: job.id,
            request_id: job.request_id,
        }),
    ))
}

async fn get_job(
    State(ctx): State<AppContext>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, ApiError> {
    let job = ctx.db.get_job(id).await?.ok_or(ApiError::NotFound)?;

    let is_owner = job.user_id.map(|uid| uid.to_string()) == Some(claims.sub.clone());
    let is_admin = claims.role == Role::Admin;
    let is_anonymous_job = job.user_id.is_none();

    if !is_owner && !is_admin && !is_anonymous_job {
        return Err(ApiError::Auth(AuthError::Forbidden("job owner or admin")));
    }

    Ok(Json(job))
}

async fn report(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<ReportRequest>,
) -> Result<(), ApiError> {
    let _ = &request_id;
    match req.payload {
        ReportPayload::Progress { progress } => {
            ctx.db.patch_progress(req.job_id, progress.clone()).await?;
            ctx.registry.push_to_job(
                req.job_id,
                ServerMessage::JobProgress { id: req.job_id, progress },
            );
        }
        ReportPayload::Completed { artifact_url, result } => {
            let job = ctx
                .db
                .patch_terminal(req.job_id, TerminalOutcome::Completed { artifact_url, result })
                .await?;
            ctx.registry
                .push_to_job(req.job_id, ServerMessage::JobCompleted { job: Box::new(job) });
        }
        ReportPayload::Failed { error } => {
            ctx.db
                .patch_terminal(req.job_id, TerminalOutcome::Failed { error: error.clone() })
                .await?;
            ctx.registry
                .push_to_job(req.job_id, ServerMessage::JobFailed { id: req.job_id, error });
        }
    }
    Ok(())
}

async fn healthz(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    let db_ok = ctx.db.get_job(Uuid::nil()).await.is_ok();
    Json(serde_json::json!({ "status": if db_ok { "ok" } else { "degraded" } }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> SubmitRequest {
        SubmitRequest {
            narrative: "a".repeat(10),
            duration: 30,
            generator: "jen1".to_string(),
            model: None,
            options: serde_json::json!({}),
        }
    }

    #[test]
    fn narrative_at_cap_is_accepted() {
        let mut req = base_request();
        req.narrative = "a".repeat(NARRATIVE_MAX_BYTES);
        assert!(validate(&req).is_ok());
    }

    #[test]
    fn narrative_over_cap_is_rejected() {
        let mut req = base_request();
        req.narrative = "a".repeat(NARRATIVE_MAX_BYTES + 1);
        assert!(validate(&req).is_err());
    }

    #[test]
    fn duration_out_of_range_is_rejected() {
        let mut req = base_request();
        req.duration = DURATION_MAX_SECS + 1;
        assert!(validate(&req).is_err());

        req.duration = DURATION_MIN_SECS - 1;
        assert!(validate(&req).is_err());
    }

    #[test]
    fn duration_at_bounds_is_accepted() {
        let mut req = base_request();
        req.duration = DURATION_MIN_SECS;
        assert!(validate(&req).is_ok());
        req.duration = DURATION_MAX_SECS;
        assert!(validate(&req).is_ok());
    }
}
