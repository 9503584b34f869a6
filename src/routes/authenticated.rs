use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Every route here sits behind the `AuthUser` route layer installed in
/// `create_router`, so a request without a valid session token never reaches
/// a handler. Voting and commenting need nothing more. Edits and deletes also
/// pass through `guard::authorize_mutation` (questions, comments) or
/// `guard::authorize_self_account` (accounts) inside the handler.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /api/login/isValidToken
        .route("/api/login/isValidToken", get(handlers::is_valid_token))
        // PUT/DELETE /api/users/{id}
        // Account self-service. The token must name {id}; a supplied password is re-checked.
        .route(
            "/api/users/{id}",
            put(handlers::update_user).delete(handlers::delete_user),
        )
        // --- Questions ---
        .route("/api/questions", post(handlers::create_question))
        .route(
            "/api/questions/{id}",
            put(handlers::update_question).delete(handlers::delete_question),
        )
        .route(
            "/api/questions/{id}/title-content",
            post(handlers::update_title_content),
        )
        .route("/api/questions/{id}/tags", post(handlers::update_tags))
        .route("/api/questions/{id}/solved", post(handlers::update_solved))
        // POST /api/questions/{id}/likes
        // Vote ledger entry point for questions.
        .route("/api/questions/{id}/likes", post(handlers::vote_question))
        // --- Comments ---
        .route("/api/questions/{id}/comments", post(handlers::add_comment))
        .route(
            "/api/questions/{id}/comments/{comment_id}",
            put(handlers::update_comment).delete(handlers::delete_comment),
        )
        // POST /api/questions/{id}/comments/{comment_id}/likes
        // Vote ledger entry point for comments.
        .route(
            "/api/questions/{id}/comments/{comment_id}/likes",
            post(handlers::vote_comment),
        )
}
