//! C5 — WebSocket upgrade handler. Auth happens in `auth::middleware`
//! before this handler ever runs; `subscribe`/`unsubscribe` here only
//! checks ownership of the requested job.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::Extension;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::interval;
use uuid::Uuid;

use crate::auth::Claims;
use crate::context::AppContext;
use crate::gateway::types::{ClientMessage, ServerMessage};
use crate::model::Role;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(ctx): State<AppContext>,
    Extension(claims): Extension<Claims>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx, claims))
}

async fn handle_socket(socket: WebSocket, ctx: AppContext, claims: Claims) {
    let conn_id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    ctx.registry.register(conn_id, tx);
    tracing::info!(connection_id = %conn_id, sub = %claims.sub, "gateway connection opened");

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    let mut last_activity = tokio::time::Instant::now();

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(message) => {
                        let Ok(json) = serde_json::to_string(&message) else { continue };
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = tokio::time::Instant::now();
                        handle_client_message(&ctx, &claims, conn_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        last_activity = tokio::time::Instant::now();
                    }
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %conn_id, error = %e, "websocket read error");
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if last_activity.elapsed() > IDLE_TIMEOUT {
                    tracing::info!(connection_id = %conn_id, "closing idle gateway connection");
                    break;
                }
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    ctx.registry.disconnect(conn_id);
    tracing::info!(connection_id = %conn_id, "gateway connection closed");
}

async fn handle_client_message(ctx: &AppContext, claims: &Claims, conn_id: Uuid, text: &str) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(_) => {
            ctx.registry.send_to(conn_id, ServerMessage::Error {
                message: "malformed message".to_string(),
            });
            return;
        }
    };

    match message {
        ClientMessage::JobSubscribe { job_id } => {
            if authorize(ctx, claims, job_id).await {
                ctx.registry.subscribe(conn_id, job_id);
            }
        }
        ClientMessage::JobUnsubscribe { job_id } => {
            ctx.registry.unsubscribe(conn_id, job_id);
        }
        // Bulk per-user subscription is left for a future iteration; the
        // per-job subscribe/unsubscribe pair covers every current client.
        ClientMessage::JobsSubscribeUser | ClientMessage::JobsUnsubscribeUser => {}
        ClientMessage::Ping => {
            ctx.registry.send_to(conn_id, ServerMessage::Pong);
        }
    }
}

/// Ownership check: the job's `user_id` must match the caller, or the
/// caller must be an admin.
async fn authorize(ctx: &AppContext, claims: &Claims, job_id: Uuid) -> bool {
    if claims.role == Role::Admin {
        return true;
    }
    match ctx.db.get_job(job_id).await {
        Ok(Some(job)) => job.user_id.map(|id| id.to_string()) == Some(claims.sub.clone()),
        _ => false,
    }
}
