//! HTTP surface for C6: registration, login, refresh, session, logout, and
//! admin-issued service tokens.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use tokio_postgres::error::SqlState;

use crate::auth::middleware::{auth_middleware, require_admin};
use crate::auth::{hash_password, verify_password, Claims};
use crate::context::AppContext;
use crate::error::{ApiError, AuthError, DatabaseError};
use crate::model::{Role, User};

pub fn router(ctx: AppContext) -> Router<AppContext> {
    let public = Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh));

    let authenticated = Router::new()
        .route("/auth/session", get(session))
        .route("/auth/logout", post(logout))
        .route_layer(axum::middleware::from_fn_with_state(ctx.clone(), auth_middleware));

    let admin_only = Router::new()
        .route("/auth/service-tokens", post(issue_service_token))
        .route_layer(axum::middleware::from_fn(require_admin))
        .route_layer(axum::middleware::from_fn_with_state(ctx.clone(), auth_middleware));

    Router::new().merge(public).merge(authenticated).merge(admin_only)
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Debug, Serialize)]
struct UserProjection {
    id: String,
    email: String,
    role: Role,
}

impl From<&User> for UserProjection {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.to_string(),
            email: u.email.clone(),
            role: u.role,
        }
    }
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    user: UserProjection,
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

async fn register(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterRequest>,
) -> Result<(axum::http::StatusCode, Json<AuthResponse>), ApiError> {
    if req.password.len() < 8 {
        return Err(ApiError::Validation("password must be at least 8 characters".into()));
    }

    let password_hash = hash_password(&req.password)?;
    let user = ctx
        .users
        .create_user(&req.email, &password_hash, Role::User)
        .await
        .map_err(|e| match &e {
            DatabaseError::Query(pg_err) if pg_err.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                ApiError::Auth(AuthError::Conflict)
            }
            _ => ApiError::Storage(e),
        })?;

    let access_token = ctx.token_issuer.issue_access(user.id, user.role)?;
    let refresh_token = ctx.token_issuer.issue_refresh(user.id, user.role)?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(AuthResponse {
            user: (&user).into(),
            access_token,
            refresh_token,
            expires_in: crate::auth::ACCESS_TOKEN_TTL_SECS,
        }),
    ))
}

async fn login(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = ctx
        .users
        .get_user_by_email(&req.email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    verify_password(&req.password, &user.password_hash)?;

    let access_token = ctx.token_issuer.issue_access(user.id, user.role)?;
    let refresh_token = ctx.token_issuer.issue_refresh(user.id, user.role)?;

    Ok(Json(AuthResponse {
        user: (&user).into(),
        access_token,
        refresh_token,
        expires_in: crate::auth::ACCESS_TOKEN_TTL_SECS,
    }))
}

async fn refresh(
    State(ctx): State<AppContext>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let claims = ctx.token_issuer.verify_refresh(&req.refresh_token)?;
    let user_id = claims
        .sub
        .parse()
        .map_err(|_| AuthError::InvalidToken("malformed subject".into()))?;
    let user = ctx.users.get_user_by_id(user_id).await?.ok_or(AuthError::InvalidCredentials)?;

    let access_token = ctx.token_issuer.issue_access(user.id, user.role)?;
    let refresh_token = ctx.token_issuer.issue_refresh(user.id, user.role)?;

    Ok(Json(AuthResponse {
        user: (&user).into(),
        access_token,
        refresh_token,
        expires_in: crate::auth::ACCESS_TOKEN_TTL_SECS,
    }))
}

async fn session(
    State(ctx): State<AppContext>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserProjection>, ApiError> {
    let user_id = claims
        .sub
        .parse()
        .map_err(|_| AuthError::InvalidToken("malformed subject".into()))?;
    let user = ctx.users.get_user_by_id(user_id).await?.ok_or(AuthError::InvalidCredentials)?;
    Ok(Json((&user).into()))
}

/// JWTs are stateless; there is no server-side session to invalidate here.
/// Clients are expected to discard the token pair on logout.
async fn logout() -> axum::http::StatusCode {
    axum::http::StatusCode::OK
}

#[derive(Debug, Serialize)]
struct ServiceTokenResponse {
    token: String,
    expires_in: i64,
    sub: &'static str,
    role: &'static str,
}

async fn issue_service_token(
    State(ctx): State<AppContext>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ServiceTokenResponse>, ApiError> {
    let (token, jti) = ctx.token_issuer.issue_service_token()?;
    tracing::info!(issuing_admin = %claims.sub, jti = %jti, "issued service token");
    Ok(Json(ServiceTokenResponse {
        token,
        expires_in: crate::auth::SERVICE_TOKEN_TTL_SECS,
        sub: "orchestrator",
        role: "orchestrator",
    }))
}
