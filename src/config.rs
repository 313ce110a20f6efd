//! Environment-driven configuration for all three binaries.
//!
//! Every binary builds one of these from `clap`'s `env` derive and fails
//! fast on startup if a required value is missing, rather than discovering
//! it mid-request.

use std::collections::HashMap;
use std::time::Duration;

use clap::Parser;
use secrecy::SecretString;

/// Shared settings for `auralis` (C3 + C5 + C6).
#[derive(Parser, Debug, Clone)]
#[command(name = "auralis")]
pub struct ApiConfig {
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "REDIS_URL")]
    pub redis_url: String,

    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: SecretString,

    #[arg(long, env = "REQUIRE_ORCHESTRATOR_JWT", default_value_t = true)]
    pub require_orchestrator_jwt: bool,

    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    #[arg(long, env = "JOBS_STREAM", default_value = "jobs:stream")]
    pub jobs_stream: String,

    #[arg(long, env = "JOBS_GROUP", default_value = "jobs-workers")]
    pub jobs_group: String,

    #[arg(long, env = "ARTIFACT_S3_BUCKET")]
    pub artifact_s3_bucket: Option<String>,

    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    pub aws_region: String,
}

impl ApiConfig {
    pub fn dead_letter_stream(&self) -> String {
        format!("{}:dead", self.jobs_stream)
    }
}

/// Settings for `auralis-worker` (C4), one or more of which share a
/// consumer group against the same stream.
#[derive(Parser, Debug, Clone)]
#[command(name = "auralis-worker")]
pub struct WorkerConfig {
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "REDIS_URL")]
    pub redis_url: String,

    #[arg(long, env = "JOBS_STREAM", default_value = "jobs:stream")]
    pub jobs_stream: String,

    #[arg(long, env = "JOBS_GROUP", default_value = "jobs-workers")]
    pub jobs_group: String,

    #[arg(long, env = "JOBS_CONSUMER")]
    pub jobs_consumer: Option<String>,

    #[arg(long, env = "WORKER_CONCURRENCY", default_value_t = 2)]
    pub concurrency: usize,

    #[arg(long, env = "MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    #[arg(long, env = "CLAIM_THRESHOLD_SECS", default_value_t = 60)]
    pub claim_threshold_secs: u64,

    #[arg(long, env = "GENERATOR_TIMEOUT_SECS", default_value_t = 120)]
    pub generator_timeout_secs: u64,

    #[arg(long, env = "DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    pub drain_timeout_secs: u64,

    #[arg(long, env = "WORKER_WRITE_ARTIFACTS", default_value_t = false)]
    pub write_artifacts: bool,

    #[arg(long, env = "ARTIFACT_S3_BUCKET")]
    pub artifact_s3_bucket: Option<String>,

    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    pub aws_region: String,

    #[arg(long, env = "ORCHESTRATOR_BIND_ADDR", default_value = "http://localhost:8080")]
    pub orchestrator_bind_addr: String,

    #[arg(long, env = "SERVICE_TOKEN")]
    pub service_token: SecretString,

    /// `generator name -> base URL`, supplied as `GENERATOR_URL_<NAME>` env
    /// vars and assembled by `generator_endpoints_from_env` since clap has
    /// no native support for a dynamically-keyed map of env vars.
    #[arg(skip)]
    pub generator_endpoints: HashMap<String, String>,
}

impl WorkerConfig {
    pub fn claim_threshold(&self) -> Duration {
        Duration::from_secs(self.claim_threshold_secs)
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_secs(self.generator_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    /// Scans the process environment for `GENERATOR_URL_<NAME>` entries and
    /// fills `generator_endpoints`. Called once after `parse()` in `main`.
    pub fn load_generator_endpoints(mut self) -> Self {
        const PREFIX: &str = "GENERATOR_URL_";
        for (key, value) in std::env::vars() {
            if let Some(name) = key.strip_prefix(PREFIX) {
                self.generator_endpoints.insert(name.to_lowercase(), value);
            }
        }
        self
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "auralis-migrate")]
pub struct MigrateConfig {
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,
}

/// Installs `tracing-subscriber` with an `EnvFilter` driven by `RUST_LOG`.
/// JSON output in production, human-readable in development, matching the
/// source repo's logging stack.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

pub fn is_production() -> bool {
    std::env::var("APP_ENV").map(|v| v == "production").unwrap_or(false)
}
