//! DTOs for the Submission API's HTTP surface.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Progress;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub narrative: String,
    pub duration: i32,
    pub generator: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_options")]
    pub options: serde_json::Value,
}

fn default_options() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub request_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportPayload {
    Progress { progress: Progress },
    Completed {
        #[serde(default)]
        artifact_url: Option<String>,
        #[serde(default)]
        result: Option<serde_json::Value>,
    },
    Failed { error: String },
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub job_id: Uuid,
    #[serde(flatten)]
    pub payload: ReportPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_request_defaults_options_to_empty_object() {
        let json = r#"{"narrative":"a song","duration":30,"generator":"jen1"}"#;
        let req: SubmitRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.options, serde_json::json!({}));
    }

    #[test]
    fn report_request_parses_completed_variant() {
        let json = r#"{"job_id":"00000000-0000-0000-0000-000000000001","type":"completed","artifact_url":"https://x/y.wav"}"#;
        let req: ReportRequest = serde_json::from_str(json).unwrap();
        match req.payload {
            ReportPayload::Completed { artifact_url, .. } => {
                assert_eq!(artifact_url.as_deref(), Some("https://x/y.wav"));
            }
            _ => panic!("expected Completed variant"),
        }
    }
}
