use axum::http::{self, HeaderMap};
use chrono::DateTime;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, TokenData, Validation};
use serde_json::Value;
use tracing::{info, warn};

use crate::models::{SyncError, UserIdentity};

// Get the auth token from the handshake: query parameter, header or cookie
pub fn get_auth_token(headers: &HeaderMap, query_token: Option<&str>) -> Result<String, String> {
    // 1. Token passed as query parameter (browsers can't set headers on websockets)
    if let Some(token) = query_token.filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }
    // 2. Try to get token from Authorization header
    if let Some(auth_header) = headers.get(http::header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().map_err(|_| "Invalid Authorization header".to_string())?;
        Ok(auth_str
            .strip_prefix("Bearer ")
            .unwrap_or(auth_str)
            .to_string())
    }
    // 3. Try to get token from cookies
    else {
        let cookie_header = headers.get(http::header::COOKIE)
            .ok_or_else(|| "Missing token, Authorization header or Cookie".to_string())?
            .to_str()
            .map_err(|_| "Invalid Cookie header".to_string())?;

        for cookie in cookie::Cookie::split_parse(cookie_header) {
            if let Ok(c) = cookie {
                if c.name() == "auth_token" {
                    return Ok(c.value().to_string());
                }
            }
        }
        Err("auth_token cookie not found".to_string())
    }
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<Value>(token, &decoding_key, &validation)
}

/// Verifies bearer credentials presented on the connection handshake.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<UserIdentity, SyncError>;
}

/// HS256 JWT verifier. A missing secret rejects every token.
pub struct JwtVerifier {
    secret: Option<String>,
}

impl JwtVerifier {
    pub fn new(secret: Option<String>) -> Self {
        if secret.is_none() {
            warn!("No JWT secret configured - every connection will be refused");
        }
        Self { secret }
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<UserIdentity, SyncError> {
        let secret = self
            .secret
            .as_deref()
            .ok_or_else(|| SyncError::Authentication("JWT_SECRET not configured".to_string()))?;

        let token_data = validate_jwt(token, secret).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => SyncError::Authentication("Token expired".to_string()),
            _ => SyncError::Authentication(format!("JWT validation failed: {}", e)),
        })?;

        let identity = identity_from_claims(&token_data.claims)?;
        info!("JWT token validated successfully for user: {}", identity.id);
        Ok(identity)
    }
}

// User ids may be issued as strings or numbers
fn claim_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn identity_from_claims(claims: &Value) -> Result<UserIdentity, SyncError> {
    let id = claims
        .get("sub")
        .and_then(claim_as_string)
        .or_else(|| claims.get("id").and_then(claim_as_string))
        .ok_or_else(|| SyncError::Authentication("Can't extract a UID from the JWT token".to_string()))?;

    let name = claims
        .get("name")
        .and_then(claim_as_string)
        .or_else(|| claims.get("email").and_then(claim_as_string))
        .unwrap_or_else(|| id.clone());

    let timestamp = |key: &str| {
        claims
            .get(key)
            .and_then(|v| v.as_i64())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    };

    Ok(UserIdentity {
        id,
        name,
        issued_at: timestamp("iat"),
        expires_at: timestamp("exp"),
    })
}
