//! `auralis-migrate`: applies pending Job Store schema migrations and
//! exits. Also run automatically at startup by `auralis` and
//! `auralis-worker`; this binary exists for deploy-time migration steps
//! that must run before any replica starts serving traffic.

use auralis::config::{init_tracing, is_production, MigrateConfig};
use auralis::db::postgres::PostgresStore;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(is_production());

    let config = MigrateConfig::parse();
    let store = PostgresStore::connect(&config.database_url).await?;
    store.run_migrations().await?;

    tracing::info!("migrations applied");
    Ok(())
}
