use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use tincan_types::api::{AuthResponse, Claims, Identity, LoginRequest, RegisterRequest};
use tincan_types::models::User;

use crate::AppState;
use crate::error::ApiError;
use crate::hydrate;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("name must not be empty"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::validation("password must be at least 8 characters"));
    }
    if let Some(username) = &req.username {
        if username.len() < 3 || username.len() > 32 {
            return Err(ApiError::validation("username must be 3-32 characters"));
        }
        if state.store.user_by_username(username)?.is_some() {
            return Err(ApiError::Conflict("username already taken".into()));
        }
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {e}")))?
        .to_string();

    let user_id = Uuid::new_v4();
    state.store.create_user(
        &user_id.to_string(),
        name,
        req.username.as_deref(),
        req.image.as_deref(),
        Some(&password_hash),
    )?;

    let row = state
        .store
        .user_by_id(&user_id.to_string())?
        .ok_or_else(|| anyhow::anyhow!("user {} vanished after insert", user_id))?;
    let user = hydrate::user_from_row(row)?;
    let token = create_token(&state.jwt_secret, &user)?;

    info!("registered user {} ({})", user.name, user.id);

    Ok((StatusCode::CREATED, Json(AuthResponse { user, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .store
        .user_by_username(&req.username)?
        .ok_or(ApiError::Unauthenticated)?;

    // Accounts provisioned without a password can't log in this way.
    let stored_hash = row
        .password
        .clone()
        .ok_or(ApiError::Unauthenticated)?;
    let parsed_hash = PasswordHash::new(&stored_hash)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored hash unreadable: {e}")))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthenticated)?;

    let user = hydrate::user_from_row(row)?;
    let token = create_token(&state.jwt_secret, &user)?;

    Ok(Json(AuthResponse { user, token }))
}

/// Resolve the caller's current profile. Backfills a generated username the
/// first time a user who registered without one shows up here.
pub async fn session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .store
        .user_by_id(&identity.id.to_string())?
        .ok_or(ApiError::Unauthenticated)?;

    let user = if row.username.is_none() {
        backfill_username(&state, &identity.id.to_string(), &row.name)?
    } else {
        hydrate::user_from_row(row)?
    };

    Ok(Json(user))
}

/// Everyone a chat can be started with.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let users = state
        .store
        .list_users()?
        .into_iter()
        .map(hydrate::user_from_row)
        .collect::<anyhow::Result<Vec<User>>>()?;
    Ok(Json(users))
}

/// Derive a handle from the display name plus a random numeric suffix,
/// retrying on collision.
fn backfill_username(state: &AppState, user_id: &str, name: &str) -> Result<User, ApiError> {
    let base: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    let base = if base.is_empty() { "user".to_string() } else { base };

    let mut rng = rand::rng();
    for _ in 0..8 {
        let candidate = format!("{}{}", base, rng.random_range(1000..10000));
        if state.store.user_by_username(&candidate)?.is_some() {
            continue;
        }
        // A concurrent claim of the same candidate fails the unique index;
        // treat that like a collision and retry.
        if state.store.set_username(user_id, &candidate).is_err() {
            continue;
        }
        info!("backfilled username {} for user {}", candidate, user_id);
        let row = state
            .store
            .user_by_id(user_id)?
            .ok_or_else(|| anyhow::anyhow!("user {} vanished during backfill", user_id))?;
        return Ok(hydrate::user_from_row(row)?);
    }

    Err(ApiError::Internal(anyhow::anyhow!(
        "could not find a free username for {user_id}"
    )))
}

fn create_token(secret: &str, user: &User) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        name: user.name.clone(),
        username: user.username.clone(),
        image: user.image.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
