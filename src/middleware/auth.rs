use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::convert::Infallible;

use crate::error::AppError;
use crate::services::access::Credential;
use crate::AppState;

/// Header carrying a plain album password
pub const ALBUM_PASSWORD_HEADER: &str = "X-Album-Password";

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Admin middleware
/// Requires `Authorization: Bearer <admin api key>` when a key is configured
pub async fn admin_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.config.admin.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let provided = bearer_token(request.headers()).ok_or_else(|| {
        AppError::Unauthorized("Missing or invalid Authorization header".to_string())
    })?;

    // Equal-length digests keep the comparison independent of key length
    if Sha256::digest(provided.as_bytes()) != Sha256::digest(expected.as_bytes()) {
        tracing::warn!("Rejected admin request to {}", request.uri().path());
        return Err(AppError::Unauthorized("Invalid admin key".to_string()));
    }

    Ok(next.run(request).await)
}

#[derive(Debug, Default, Deserialize)]
struct CredentialQuery {
    token: Option<String>,
    password: Option<String>,
}

/// Album credential taken from headers first, then the query string
#[derive(Debug, Clone)]
pub struct AlbumCredential(pub Credential);

#[async_trait]
impl<S> FromRequestParts<S> for AlbumCredential
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let query = Query::<CredentialQuery>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();

        let header_password = parts
            .headers
            .get(ALBUM_PASSWORD_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
            .filter(|p| !p.is_empty());

        let token = bearer_token(&parts.headers).or(query.token);
        let password = header_password.or(query.password);

        Ok(Self(Credential::from_parts(token, password)))
    }
}
