//! Wire protocol for the real-time channel (C5), a tagged-enum pair mirroring
//! the client/server message shapes from SPEC_FULL.md §6.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Job, Progress};

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "job:subscribe")]
    JobSubscribe { job_id: Uuid },
    #[serde(rename = "job:unsubscribe")]
    JobUnsubscribe { job_id: Uuid },
    #[serde(rename = "jobs:subscribe:user")]
    JobsSubscribeUser,
    #[serde(rename = "jobs:unsubscribe:user")]
    JobsUnsubscribeUser,
    #[serde(rename = "ping")]
    Ping,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
#[allow(clippy::large_enum_variant)]
pub enum ServerMessage {
    #[serde(rename = "job:status")]
    JobStatus { id: Uuid, status: &'static str },
    #[serde(rename = "job:progress")]
    JobProgress { id: Uuid, progress: Progress },
    #[serde(rename = "job:completed")]
    JobCompleted { job: Box<Job> },
    #[serde(rename = "job:failed")]
    JobFailed { id: Uuid, error: String },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "error")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_deserializes_with_tag() {
        let json = r#"{"type":"job:subscribe","job_id":"00000000-0000-0000-0000-000000000001"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::JobSubscribe {
                job_id: "00000000-0000-0000-0000-000000000001".parse().unwrap()
            }
        );
    }

    #[test]
    fn server_status_serializes_with_tag() {
        let msg = ServerMessage::JobStatus {
            id: Uuid::nil(),
            status: "processing",
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"job:status\""));
        assert!(json.contains("\"status\":\"processing\""));
    }

    #[test]
    fn plain_variants_roundtrip() {
        let json = r#"{"type":"ping"}"#;
        assert_eq!(serde_json::from_str::<ClientMessage>(json).unwrap(), ClientMessage::Ping);
    }
}
