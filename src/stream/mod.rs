//! C2 — Job Stream: ordered, ack-based queue between the Submission API
//! and the Worker Pool.

pub mod redis_stream;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StreamError;
use crate::model::StreamEntry;

/// One pending delivery, opaque broker id plus the decoded payload.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub entry_id: String,
    pub entry: StreamEntry,
}

/// Ordered, persistent, consumer-group queue. Entries are never removed
/// implicitly; each consumer in the group sees each entry at least once;
/// acknowledgement is explicit; entries pending beyond a claim threshold
/// may be reclaimed by another consumer.
#[async_trait]
pub trait JobStream: Send + Sync {
    async fn append(&self, entry: &StreamEntry) -> Result<String, StreamError>;

    async fn append_dead_letter(&self, job_id: Uuid, error: &str, attempts: i32, request_id: &str) -> Result<(), StreamError>;

    /// Ensures the consumer group exists, creating the stream if needed.
    async fn ensure_group(&self) -> Result<(), StreamError>;

    /// Reads up to `count` new entries for `consumer`, blocking up to
    /// `block_ms` if none are immediately available.
    async fn read_new(&self, consumer: &str, count: usize, block_ms: usize) -> Result<Vec<Delivery>, StreamError>;

    /// Re-reads entries already pending for `consumer` (crash recovery of
    /// this consumer's own unacked work on restart).
    async fn read_pending(&self, consumer: &str, count: usize) -> Result<Vec<Delivery>, StreamError>;

    async fn ack(&self, entry_id: &str) -> Result<(), StreamError>;

    /// Claims entries idle longer than `min_idle_ms` from any consumer in
    /// the group and hands them to `consumer`.
    async fn claim_abandoned(&self, consumer: &str, min_idle_ms: i64, count: usize) -> Result<Vec<Delivery>, StreamError>;
}
