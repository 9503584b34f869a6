use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod guard;
pub mod handlers;
pub mod ledger;
pub mod memory;
pub mod models;
pub mod repository;

// Routing split by access level (public, authenticated).
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::AppError;
pub use memory::InMemoryRepository;
pub use repository::{PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document for the forum, served at `/api-docs/openapi.json` and
/// browsable through Swagger UI.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_user, handlers::list_users, handlers::get_user,
        handlers::update_user, handlers::delete_user, handlers::login,
        handlers::is_valid_token, handlers::list_questions, handlers::get_question,
        handlers::create_question, handlers::update_question, handlers::update_title_content,
        handlers::update_tags, handlers::update_solved, handlers::delete_question,
        handlers::vote_question, handlers::add_comment, handlers::update_comment,
        handlers::delete_comment, handlers::vote_comment
    ),
    components(
        schemas(
            models::Question, models::Comment, models::VoteEvent, models::VoteTarget,
            models::VotableKind, models::RegisterUserRequest, models::UpdateUserRequest,
            models::PasswordConfirmation, models::LoginRequest, models::LoginResponse,
            models::QuestionRequest, models::TagsRequest, models::SolvedRequest,
            models::CommentRequest, models::VoteRequest, models::VoteResponse,
            models::UserProfile, models::UserDetail, models::QuestionSummary,
            models::QuestionDetail, models::CommentDetail,
        )
    ),
    tags(
        (name = "qa-forum", description = "Q&A Forum API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The shared, cloneable container of every service a request may need.
#[derive(Clone)]
pub struct AppState {
    /// Persistence: Postgres in deployments, in-memory in tests.
    pub repo: RepositoryState,
    /// The loaded, immutable configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Let extractors such as `AuthUser` pull single components out of the state.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Route layer for the authenticated router. Extracting `AuthUser` verifies the
/// session token; a failure short-circuits with 401 before the handler runs.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routes, applies the observability and CORS layers, and
/// registers the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .fallback(handlers::unknown_endpoint)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one HTTP request, tagged with the `x-request-id` so every log line
/// of the request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
