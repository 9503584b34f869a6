use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that need no session token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /api/users
        // Registration. Duplicate usernames or emails answer 409.
        .route(
            "/api/users",
            get(handlers::list_users).post(handlers::register_user),
        )
        // GET /api/users/{id}
        // A user's profile with their questions and scores.
        .route("/api/users/{id}", get(handlers::get_user))
        // POST /api/login
        // Issues the session token (JSON body and `token` cookie).
        .route("/api/login", post(handlers::login))
        // GET /api/questions
        // Every question with author, score, ledger and comments.
        .route("/api/questions", get(handlers::list_questions))
        // GET /api/questions/{id}
        .route("/api/questions/{id}", get(handlers::get_question))
}
