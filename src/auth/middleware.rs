//! Bearer-token extraction shared by the HTTP API (C3) and the WebSocket
//! gateway (C5) — both authenticate with the same `TokenIssuer::verify`.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::auth::Claims;
use crate::context::AppContext;
use crate::error::{ApiError, AuthError};
use crate::model::Role;

/// Pulls a bearer token out of `Authorization: Bearer <token>`, falling
/// back to a `?token=` query parameter so the WebSocket handshake (which
/// can't set headers from a browser) can authenticate the same way.
fn extract_token(req: &Request) -> Option<String> {
    if let Some(value) = req.headers().get(axum::http::header::AUTHORIZATION) {
        if let Ok(s) = value.to_str() {
            if let Some(token) = s.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    req.uri().query().and_then(|q| {
        q.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == "token").then(|| v.to_string())
        })
    })
}

/// Verifies the caller's access token and stashes `Claims` as a request
/// extension for downstream handlers/middleware to read.
pub async fn auth_middleware(
    State(ctx): State<AppContext>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(&req).ok_or(AuthError::MissingCredential)?;
    let claims = ctx.token_issuer.verify_access(&token)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Route-layer guard for `POST /jobs/report`, placed after
/// `auth_middleware` in the stack.
pub async fn require_orchestrator(req: Request, next: Next) -> Result<Response, ApiError> {
    require_role(&req, Role::Orchestrator)?;
    Ok(next.run(req).await)
}

/// Route-layer guard for admin-only endpoints such as
/// `POST /auth/service-tokens`.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    require_role(&req, Role::Admin)?;
    Ok(next.run(req).await)
}

fn require_role(req: &Request, required: Role) -> Result<(), ApiError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .cloned()
        .ok_or(AuthError::MissingCredential)?;
    if claims.role != required {
        return Err(ApiError::Auth(AuthError::Forbidden(required.as_str())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    #[test]
    fn extracts_bearer_header() {
        let req = HttpRequest::builder()
            .header("authorization", "Bearer abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_token(&req), Some("abc123".to_string()));
    }

    #[test]
    fn extracts_query_token_when_header_absent() {
        let req = HttpRequest::builder()
            .uri("/ws?token=xyz")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_token(&req), Some("xyz".to_string()));
    }

    #[test]
    fn no_credential_returns_none() {
        let req = HttpRequest::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_token(&req), None);
    }
}
