//! Bearer token authentication
//!
//! HS256 JWTs compatible with Supabase-style claims. The company and
//! company role may arrive either as top-level claims or inside
//! `app_metadata`.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scope carried by tokens minted for the realtime socket
pub const REALTIME_SCOPE: &str = "realtime";

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_metadata: Option<AppMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AppMetadata {
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Authenticated user extracted from JWT.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
    pub company_id: Option<String>,
    pub role: Option<String>,
}

impl AuthUser {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            company_id: None,
            role: None,
        }
    }

    pub fn with_company(mut self, company_id: impl Into<String>, role: impl Into<String>) -> Self {
        self.company_id = Some(company_id.into());
        self.role = Some(role.into());
        self
    }

    /// Managers and admins may approve receipts and switching orders
    pub fn is_manager(&self) -> bool {
        matches!(self.role.as_deref(), Some("manager") | Some("admin"))
    }

    fn from_claims(claims: Claims) -> Self {
        let metadata = claims.app_metadata.unwrap_or_default();
        // Supabase puts the Postgres role ("authenticated") at the top level
        let top_role = claims.role.filter(|r| r != "authenticated" && r != "anon");
        Self {
            user_id: claims.sub,
            email: claims.email,
            company_id: metadata.company_id.or(claims.company_id),
            role: metadata.role.or(top_role),
        }
    }
}

/// Token verification failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token is not valid for this endpoint")]
    WrongScope,

    #[error("Failed to issue token: {0}")]
    Issue(String),
}

/// Shared signing material
#[derive(Clone)]
pub struct AuthKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl AuthKeys {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Decode a token, returning the claims
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    /// Verify an API token (realtime tokens are rejected)
    pub fn verify(&self, token: &str) -> Result<AuthUser, AuthError> {
        let claims = self.decode(token)?;
        if claims.scope.as_deref() == Some(REALTIME_SCOPE) {
            return Err(AuthError::WrongScope);
        }
        Ok(AuthUser::from_claims(claims))
    }

    /// Verify a token presented to the realtime socket; API tokens are accepted too
    pub fn verify_realtime(&self, token: &str) -> Result<AuthUser, AuthError> {
        self.decode(token).map(AuthUser::from_claims)
    }

    /// Create a JWT for a user session.
    pub fn issue(&self, user: &AuthUser, ttl_secs: u64) -> Result<(String, usize), AuthError> {
        self.issue_scoped(user, ttl_secs, None)
    }

    /// Create a JWT restricted to a scope
    pub fn issue_scoped(
        &self,
        user: &AuthUser,
        ttl_secs: u64,
        scope: Option<&str>,
    ) -> Result<(String, usize), AuthError> {
        let now = chrono::Utc::now().timestamp().max(0) as usize;
        let exp = now + ttl_secs as usize;

        let claims = Claims {
            sub: user.user_id.clone(),
            exp,
            iat: now,
            email: user.email.clone(),
            company_id: user.company_id.clone(),
            role: user.role.clone(),
            app_metadata: None,
            scope: scope.map(str::to_string),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Issue(e.to_string()))?;
        Ok((token, exp))
    }
}

/// Pull the token out of an `Authorization: Bearer` header value
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    match header {
        Some(h) if h.starts_with("Bearer ") && h.len() > 7 => Ok(h[7..].trim()),
        _ => Err(AuthError::MissingToken),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify_round_trip() {
        let keys = AuthKeys::from_secret("secret");
        let user = AuthUser::new("user-1").with_company("acme", "manager");

        let (token, exp) = keys.issue(&user, 3600).unwrap();
        assert!(exp > 0);

        let verified = keys.verify(&token).unwrap();
        assert_eq!(verified, user);
        assert!(verified.is_manager());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let keys = AuthKeys::from_secret("secret");
        let other = AuthKeys::from_secret("other");
        let (token, _) = keys.issue(&AuthUser::new("u"), 60).unwrap();

        assert!(matches!(other.verify(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_realtime_scope_not_accepted_for_api() {
        let keys = AuthKeys::from_secret("secret");
        let (token, _) = keys
            .issue_scoped(&AuthUser::new("u"), 60, Some(REALTIME_SCOPE))
            .unwrap();

        assert!(matches!(keys.verify(&token), Err(AuthError::WrongScope)));
        assert_eq!(keys.verify_realtime(&token).unwrap().user_id, "u");
    }

    #[test]
    fn test_supabase_style_claims() {
        let claims = Claims {
            sub: "abc".into(),
            exp: 0,
            iat: 0,
            email: Some("a@b.c".into()),
            company_id: None,
            role: Some("authenticated".into()),
            app_metadata: Some(AppMetadata {
                company_id: Some("co".into()),
                role: Some("admin".into()),
            }),
            scope: None,
        };
        let user = AuthUser::from_claims(claims);
        assert_eq!(user.company_id.as_deref(), Some("co"));
        assert_eq!(user.role.as_deref(), Some("admin"));

        let plain = AuthUser::from_claims(Claims {
            sub: "abc".into(),
            exp: 0,
            iat: 0,
            email: None,
            company_id: None,
            role: Some("authenticated".into()),
            app_metadata: None,
            scope: None,
        });
        assert!(plain.role.is_none());
        assert!(!plain.is_manager());
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc")).unwrap(), "abc");
        assert!(bearer_token(Some("Basic abc")).is_err());
        assert!(bearer_token(Some("Bearer ")).is_err());
        assert!(bearer_token(None).is_err());
    }
}
