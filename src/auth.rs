use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::AppError,
    guard,
    models::User,
    repository::RepositoryState,
};

/// Name of the cookie carrying the session token.
pub const TOKEN_COOKIE: &str = "token";

/// Claims
///
/// Payload of a session token. Signed with `AppConfig::jwt_secret` (HS256) and
/// checked for signature and expiry on every request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's id.
    pub sub: Uuid,
    pub username: String,
    /// Expiration time (seconds since the epoch).
    pub exp: usize,
    /// Issued at (seconds since the epoch).
    pub iat: usize,
}

fn now_secs() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as usize)
        .unwrap_or(0)
}

/// issue_token
///
/// Signs a session token for `user`, valid for `config.token_ttl_secs`.
pub fn issue_token(config: &AppConfig, user: &User) -> Result<String, AppError> {
    let iat = now_secs();
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        iat,
        exp: iat.saturating_add(usize::try_from(config.token_ttl_secs).unwrap_or(usize::MAX)),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))
}

/// verify_token
///
/// Stateless verification: signature and expiry are always validated before
/// the payload is trusted. Every failure collapses into `AppError::TokenError`.
pub fn verify_token(config: &AppConfig, token: &str) -> Result<Claims, AppError> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.leeway = 0;

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!("token rejected: {:?}", e.kind());
            AppError::TokenError
        })
}

/// hash_password
///
/// Produces an argon2id PHC string with a fresh random salt.
pub fn hash_password(plain: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

/// verify_password
///
/// Returns false for a mismatch and for a stored hash that cannot be parsed.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("stored password hash is malformed: {}", e);
            false
        }
    }
}

/// token_from_parts
///
/// Reads the session token from `Authorization: Bearer <token>`, falling back
/// to the `token` cookie set by the login endpoint.
pub fn token_from_parts(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .strip_prefix("Bearer ")
                .or_else(|| value.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|token| !token.is_empty())
}

/// session_cookie
///
/// `Set-Cookie` value for a freshly issued token. With `remember_me` the cookie
/// persists for one day; otherwise it is a session cookie.
pub fn session_cookie(token: &str, remember_me: bool) -> String {
    let mut cookie = format!("{TOKEN_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax");
    if remember_me {
        cookie.push_str("; Max-Age=86400");
    }
    cookie
}

/// SessionToken
///
/// The raw credential of a request, if any. Handlers that need the guard's
/// ownership or self-account checks take this and hand it to `guard`.
#[derive(Debug, Clone, Default)]
pub struct SessionToken(pub Option<String>);

impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(SessionToken(token_from_parts(parts)))
    }
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Any verified user may
/// post, comment and vote, so these handlers only need this extractor.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

/// Rejects with `AppError::TokenError` (401) when the token is missing,
/// invalid, expired, or names a user that no longer exists.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let token = token_from_parts(parts);
        let user = guard::resolve_caller(repo.as_ref(), &config, token.as_deref()).await?;

        Ok(user.into())
    }
}
