//! Worker -> Submission API reporting: every accepted `Report` triggers
//! exactly one Gateway push (SPEC_FULL.md §4.1). Delivery failure here is
//! logged, not retried — the Job Store already reflects the terminal state
//! the worker itself wrote, so a dropped report only delays the push to
//! subscribed clients, not correctness of the record.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Progress,
    Completed,
    Failed,
}

#[derive(Debug, Serialize)]
struct ReportBody<'a> {
    job_id: Uuid,
    #[serde(rename = "type")]
    kind: ReportType,
    payload: &'a serde_json::Value,
}

pub struct ReportClient {
    http: reqwest::Client,
    base_url: String,
    service_token: SecretString,
}

impl ReportClient {
    pub fn new(http: reqwest::Client, base_url: String, service_token: SecretString) -> Self {
        Self {
            http,
            base_url,
            service_token,
        }
    }

    pub async fn report(
        &self,
        job_id: Uuid,
        kind: ReportType,
        request_id: &str,
        payload: &serde_json::Value,
    ) {
        let url = format!("{}/jobs/report", self.base_url.trim_end_matches('/'));
        let result = self
            .http
            .post(&url)
            .header("x-request-id", request_id)
            .header(
                "authorization",
                format!("Bearer {}", self.service_token.expose_secret()),
            )
            .json(&ReportBody { job_id, kind, payload })
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!(%job_id, ?kind, "report delivered");
            }
            Ok(resp) => {
                tracing::warn!(%job_id, ?kind, status = %resp.status(), "report rejected");
            }
            Err(e) => {
                tracing::warn!(%job_id, ?kind, error = %e, "report delivery failed");
            }
        }
    }
}
