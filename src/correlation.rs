//! C7 — request-id minting and propagation.
//!
//! Every inbound request is associated with a `requestId`: taken from the
//! `X-Request-Id` header when present, else minted. The same value rides
//! C3 -> C2 -> C4 -> Generator -> C3 as a plain field/header, never
//! regenerated along the way, so every log line for one user action can be
//! joined on it.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

pub const HEADER: &str = "x-request-id";

pub fn mint() -> String {
    Uuid::new_v4().to_string()
}

/// Reads `X-Request-Id` off an inbound request, minting one if absent, and
/// stores it as a request extension so handlers can pull it out without
/// re-parsing headers.
pub async fn correlation_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(mint);

    req.extensions_mut().insert(RequestId(request_id.clone()));

    let span = tracing::info_span!("request", request_id = %request_id);
    let _enter = span.enter();

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(HEADER, value);
    }
    response
}

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_produces_distinct_ids() {
        assert_ne!(mint(), mint());
    }

    #[test]
    fn mint_is_valid_uuid() {
        let id = mint();
        assert!(Uuid::parse_str(&id).is_ok());
    }
}
