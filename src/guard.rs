use uuid::Uuid;

use crate::{
    auth::{verify_password, verify_token},
    config::AppConfig,
    error::AppError,
    ledger::Votable,
    models::User,
    repository::Repository,
};

/// resolve_caller
///
/// Verifies `token` and loads the user it names. A missing token, a token
/// that fails verification, and a token for a deleted user all yield
/// `TokenError`.
pub async fn resolve_caller(
    repo: &dyn Repository,
    config: &AppConfig,
    token: Option<&str>,
) -> Result<User, AppError> {
    let token = token.ok_or(AppError::TokenError)?;
    let claims = verify_token(config, token)?;

    repo.get_user(claims.sub).await?.ok_or_else(|| {
        tracing::debug!(user = %claims.sub, "token names a user that no longer exists");
        AppError::TokenError
    })
}

/// authorize_mutation
///
/// Gate for editing or deleting a question or comment: the caller must be the
/// entity's owner. Returns the caller's id. Never writes.
pub async fn authorize_mutation<V: Votable + ?Sized>(
    repo: &dyn Repository,
    config: &AppConfig,
    token: Option<&str>,
    entity: &V,
) -> Result<Uuid, AppError> {
    let caller = resolve_caller(repo, config, token).await?;

    if caller.id != entity.owner_id() {
        let target = entity.vote_target();
        tracing::info!(
            caller = %caller.id,
            kind = target.kind.as_str(),
            target = %target.id,
            "mutation by non-owner rejected"
        );
        return Err(AppError::OwnershipError);
    }

    Ok(caller.id)
}

/// authorize_self_account
///
/// Gate for editing or deleting an account. The token must name exactly
/// `target_user_id`; a supplied confirmation password must match the stored
/// hash. An empty password counts as not supplied.
pub async fn authorize_self_account(
    repo: &dyn Repository,
    config: &AppConfig,
    token: Option<&str>,
    target_user_id: Uuid,
    supplied_password: Option<&str>,
) -> Result<User, AppError> {
    let token = token.ok_or(AppError::TokenError)?;
    let claims = verify_token(config, token)?;

    if claims.sub != target_user_id {
        tracing::info!(
            caller = %claims.sub,
            target = %target_user_id,
            "account mutation for another user rejected"
        );
        return Err(AppError::TokenError);
    }

    let user = repo
        .get_user(claims.sub)
        .await?
        .ok_or(AppError::TokenError)?;

    if let Some(password) = supplied_password.filter(|p| !p.is_empty()) {
        if !verify_password(password, &user.password_hash) {
            return Err(AppError::PasswordError);
        }
    }

    Ok(user)
}
