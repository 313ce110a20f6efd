//! The ambient `Context` bundle: logger, config and shared clients threaded
//! through constructors instead of living as global state (design note in
//! SPEC_FULL.md §9).

use std::sync::Arc;

use crate::auth::TokenIssuer;
use crate::config::ApiConfig;
use crate::db::{JobStore, UserStore};
use crate::gateway::registry::Registry;
use crate::stream::JobStream;

/// Shared state for the `auralis` binary (C3 + C5 + C6). Cheaply `Clone`
/// since every field is an `Arc`; axum handlers receive it via
/// `State<AppContext>`.
#[derive(Clone)]
pub struct AppContext {
    pub db: Arc<dyn JobStore>,
    pub users: Arc<dyn UserStore>,
    pub stream: Arc<dyn JobStream>,
    pub token_issuer: Arc<TokenIssuer>,
    pub registry: Arc<Registry>,
    pub config: Arc<ApiConfig>,
    pub http: reqwest::Client,
}

impl AppContext {
    pub fn new(
        db: Arc<dyn JobStore>,
        users: Arc<dyn UserStore>,
        stream: Arc<dyn JobStream>,
        token_issuer: Arc<TokenIssuer>,
        config: Arc<ApiConfig>,
    ) -> Self {
        Self {
            db,
            users,
            stream,
            token_issuer,
            registry: Arc::new(Registry::new()),
            config,
            http: reqwest::Client::new(),
        }
    }
}
