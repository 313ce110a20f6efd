//! C5 — Real-Time Notification Gateway.

pub mod registry;
pub mod types;
pub mod ws;

use axum::routing::get;
use axum::Router;

use crate::auth::middleware::auth_middleware;
use crate::context::AppContext;

pub fn router(ctx: AppContext) -> Router<AppContext> {
    Router::new()
        .route("/ws", get(ws::upgrade))
        .route_layer(axum::middleware::from_fn_with_state(ctx, auth_middleware))
}
