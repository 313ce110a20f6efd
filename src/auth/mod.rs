//! C6 — Auth & Service-Token Module.
//!
//! User credentials are salted/hashed with argon2id. Access, refresh and
//! service tokens are all signed JWTs carrying `{sub, role, exp}`; refresh
//! tokens additionally carry `token_type: "refresh"` so they can't be
//! replayed as access tokens. Verification is the same code path for C3
//! and C5.

pub mod api;
pub mod middleware;

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;
use crate::model::Role;

pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;
pub const REFRESH_TOKEN_TTL_SECS: i64 = 14 * 24 * 60 * 60;
pub const SERVICE_TOKEN_TTL_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl Claims {
    pub fn is_refresh(&self) -> bool {
        self.token_type.as_deref() == Some("refresh")
    }
}

pub struct TokenIssuer {
    secret: SecretString,
}

impl TokenIssuer {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(self.secret.expose_secret().as_bytes())
    }

    fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(self.secret.expose_secret().as_bytes())
    }

    pub fn issue_access(&self, user_id: Uuid, role: Role) -> Result<String, AuthError> {
        self.issue(user_id.to_string(), role, ACCESS_TOKEN_TTL_SECS, None)
    }

    pub fn issue_refresh(&self, user_id: Uuid, role: Role) -> Result<String, AuthError> {
        self.issue(
            user_id.to_string(),
            role,
            REFRESH_TOKEN_TTL_SECS,
            Some("refresh".to_string()),
        )
    }

    /// Issuable only by an admin-authenticated caller. `jti` is logged by
    /// the caller alongside the issuing admin's `sub`; the token value
    /// itself is never logged.
    pub fn issue_service_token(&self) -> Result<(String, String), AuthError> {
        let jti = Uuid::new_v4().to_string();
        let claims = Claims {
            sub: "orchestrator".to_string(),
            role: Role::Orchestrator,
            exp: (Utc::now() + Duration::seconds(SERVICE_TOKEN_TTL_SECS)).timestamp(),
            token_type: None,
            jti: Some(jti.clone()),
        };
        let token = encode(&Header::default(), &claims, &self.encoding_key())
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        Ok((token, jti))
    }

    fn issue(
        &self,
        sub: String,
        role: Role,
        ttl_secs: i64,
        token_type: Option<String>,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            sub,
            role,
            exp: (Utc::now() + Duration::seconds(ttl_secs)).timestamp(),
            token_type,
            jti: None,
        };
        encode(&Header::default(), &claims, &self.encoding_key())
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key(), &Validation::default())
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        Ok(data.claims)
    }

    /// Verifies an access token specifically, rejecting refresh tokens
    /// presented where an access token is required.
    pub fn verify_access(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.verify(token)?;
        if claims.is_refresh() {
            return Err(AuthError::InvalidToken("refresh token used as access token".into()));
        }
        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.verify(token)?;
        if !claims.is_refresh() {
            return Err(AuthError::InvalidToken("expected a refresh token".into()));
        }
        Ok(claims)
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|e| AuthError::Hash(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(SecretString::from("test-secret-at-least-32-bytes-long"))
    }

    #[test]
    fn password_roundtrips() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash).is_ok());
        assert!(verify_password("wrong", &hash).is_err());
    }

    #[test]
    fn access_token_verifies_as_access() {
        let issuer = issuer();
        let user_id = Uuid::new_v4();
        let token = issuer.issue_access(user_id, Role::User).unwrap();
        let claims = issuer.verify_access(&token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, Role::User);
    }

    #[test]
    fn refresh_token_rejected_as_access() {
        let issuer = issuer();
        let token = issuer.issue_refresh(Uuid::new_v4(), Role::User).unwrap();
        assert!(issuer.verify_access(&token).is_err());
        assert!(issuer.verify_refresh(&token).is_ok());
    }

    #[test]
    fn service_token_carries_orchestrator_role() {
        let issuer = issuer();
        let (token, jti) = issuer.issue_service_token().unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.role, Role::Orchestrator);
        assert_eq!(claims.jti, Some(jti));
    }

    #[test]
    fn tampered_token_fails_verification() {
        let issuer = issuer();
        let mut token = issuer.issue_access(Uuid::new_v4(), Role::User).unwrap();
        token.push('x');
        assert!(issuer.verify(&token).is_err());
    }
}
