//! C4 — Orchestrator Worker Pool, the hardest subsystem: concurrency-limited
//! dispatch against the Job Stream, CAS-guarded Job Store mutation, retry
//! with backoff, dead-lettering, and graceful shutdown.

pub mod backoff;
pub mod dispatch;
pub mod generator;
pub mod pool;
pub mod report;

use std::sync::Arc;

use crate::db::JobStore;
use crate::objectstore::ArtifactStore;
use crate::stream::JobStream;
use crate::worker::generator::GeneratorClient;
use crate::worker::report::ReportClient;

/// Everything one dispatch needs, shared across the pool's concurrent
/// tasks. Cheaply `Clone` since every field is an `Arc` (or a plain `Copy`
/// value), matching `AppContext`'s shape.
#[derive(Clone)]
pub struct WorkerContext {
    pub db: Arc<dyn JobStore>,
    pub stream: Arc<dyn JobStream>,
    pub generator: Arc<GeneratorClient>,
    pub report: Arc<ReportClient>,
    pub artifacts: Option<Arc<ArtifactStore>>,
    pub max_retries: u32,
}
