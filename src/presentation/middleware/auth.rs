//! Authentication Middleware
//!
//! JWT validation for protected routes. The WebSocket upgrade request
//! cannot always carry an Authorization header (browser WebSocket clients
//! have no header API), so a `?token=` query parameter is accepted as a
//! fallback on the same middleware.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, Uri},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;
use crate::startup::AppState;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at time (Unix timestamp)
    pub iat: i64,
}

/// Authenticated user extension
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
}

/// Authentication middleware that validates JWT tokens
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request)
        .or_else(|| query_token(request.uri()))
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".into()))?;

    // Decode and validate JWT
    let token_data = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(state.settings.jwt.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::Unauthorized("Token expired".into())
        }
        _ => AppError::Unauthorized("Invalid token".into()),
    })?;

    // Parse user ID from claims
    let user_id: i64 = token_data
        .claims
        .sub
        .parse()
        .map_err(|_| AppError::Unauthorized("Invalid token claims".into()))?;

    // Insert authenticated user into request extensions
    request.extensions_mut().insert(AuthUser { user_id });

    // Continue to the next handler
    Ok(next.run(request).await)
}

/// Token from the Authorization header, if present.
fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.to_string())
}

/// Token from the `?token=` query parameter, if present.
fn query_token(uri: &Uri) -> Option<String> {
    uri.query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_token_is_extracted_from_the_uri() {
        let uri: Uri = "/ws/chat.io?foo=bar&token=abc.def.ghi".parse().unwrap();
        assert_eq!(query_token(&uri), Some("abc.def.ghi".to_string()));

        let uri: Uri = "/ws/chat.io?token=".parse().unwrap();
        assert_eq!(query_token(&uri), None);

        let uri: Uri = "/ws/chat.io".parse().unwrap();
        assert_eq!(query_token(&uri), None);
    }
}
