use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{DecodingKey, Validation, decode};

use tincan_types::api::{Claims, Identity};

use crate::AppState;
use crate::error::ApiError;

/// Extract and validate the bearer token, then stash the caller's identity
/// in request extensions for the handlers downstream.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthenticated)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthenticated)?;

    let claims = decode_token(&state.jwt_secret, token)?;
    req.extensions_mut().insert(Identity::from(claims));

    Ok(next.run(req).await)
}

/// Decode and validate a session token. Shared with the gateway upgrade
/// handler, which authenticates before accepting the socket.
pub fn decode_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthenticated)?;
    Ok(data.claims)
}
