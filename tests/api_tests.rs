use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use qa_forum::{
    AppConfig, AppState, InMemoryRepository, create_router,
    models::{LoginResponse, Question, QuestionDetail, UserDetail, UserProfile, VoteResponse},
    repository::RepositoryState,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

// --- Test Harness ---

fn app() -> Router {
    app_with(InMemoryRepository::new())
}

fn app_with(repo: InMemoryRepository) -> Router {
    let state = AppState {
        repo: Arc::new(repo) as RepositoryState,
        config: AppConfig::default(),
    };
    create_router(state)
}

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    app.clone().oneshot(request.body(body).unwrap()).await.unwrap()
}

async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Registers `username` and signs in, returning the session token.
async fn sign_up(app: &Router, username: &str) -> LoginResponse {
    let registered = send(
        app,
        "POST",
        "/api/users",
        None,
        Some(json!({
            "username": username,
            "password": "correct horse",
            "email": format!("{username}@forum.test"),
        })),
    )
    .await;
    assert_eq!(registered.status(), StatusCode::OK);

    let login = send(
        app,
        "POST",
        "/api/login",
        None,
        Some(json!({ "username": username, "password": "correct horse" })),
    )
    .await;
    assert_eq!(login.status(), StatusCode::OK);
    body_json(login).await
}

async fn ask(app: &Router, token: &str) -> Question {
    let response = send(
        app,
        "POST",
        "/api/questions",
        Some(token),
        Some(json!({
            "title": "What does Pin guarantee?",
            "content": "And when do I need it?",
            "tags": ["async"],
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

// --- Tests ---

#[tokio::test]
async fn test_health_check() {
    let response = send(&app(), "GET", "/health", None, None).await;
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_unknown_endpoint_is_json_404() {
    let response = send(&app(), "GET", "/api/nothing-here", None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body: Value = body_json(response).await;
    assert_eq!(body["error"], "unknown endpoint");
}

#[tokio::test]
async fn test_register_hides_password_hash() {
    let app = app();
    let response = send(
        &app,
        "POST",
        "/api/users",
        None,
        Some(json!({
            "username": "alice",
            "password": "correct horse",
            "email": "alice@forum.test",
            "fullname": "Alice",
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = body_json(response).await;
    assert_eq!(body["username"], "alice");
    assert!(body.get("passwordHash").is_none());
    assert!(body.get("password_hash").is_none());
    assert!(!body.to_string().contains("argon2"));
}

#[tokio::test]
async fn test_register_missing_field_is_400() {
    let response = send(
        &app(),
        "POST",
        "/api/users",
        None,
        Some(json!({ "username": "alice", "password": "pw" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = body_json(response).await;
    assert_eq!(body["error"], "email must be provided");
}

#[tokio::test]
async fn test_duplicate_username_is_409() {
    let app = app();
    sign_up(&app, "alice").await;

    let response = send(
        &app,
        "POST",
        "/api/users",
        None,
        Some(json!({
            "username": "alice",
            "password": "pw",
            "email": "other@forum.test",
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_token_validity_endpoint() {
    let app = app();
    let alice = sign_up(&app, "alice").await;

    let valid = send(&app, "GET", "/api/login/isValidToken", Some(alice.token.as_str()), None).await;
    assert_eq!(valid.status(), StatusCode::OK);

    let missing = send(&app, "GET", "/api/login/isValidToken", None, None).await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let garbage = send(&app, "GET", "/api/login/isValidToken", Some("not.a.jwt"), None).await;
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_cookie_authenticates_later_requests() {
    let app = app();
    sign_up(&app, "alice").await;

    let login = send(
        &app,
        "POST",
        "/api/login",
        None,
        Some(json!({ "username": "alice", "password": "correct horse" })),
    )
    .await;
    let cookie = login
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();
    assert!(!login.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .contains("Max-Age"));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/login/isValidToken")
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = app();
    let id = Uuid::new_v4();

    let create = send(
        &app,
        "POST",
        "/api/questions",
        None,
        Some(json!({ "title": "t", "content": "c" })),
    )
    .await;
    assert_eq!(create.status(), StatusCode::UNAUTHORIZED);

    let vote = send(
        &app,
        "POST",
        &format!("/api/questions/{id}/likes"),
        None,
        Some(json!({ "direction": 1 })),
    )
    .await;
    assert_eq!(vote.status(), StatusCode::UNAUTHORIZED);

    let body: Value = body_json(vote).await;
    assert_eq!(body["error"], "token missing or invalid");
}

#[tokio::test]
async fn test_question_vote_lifecycle() {
    let app = app();
    let alice = sign_up(&app, "alice").await;
    let bob = sign_up(&app, "bob").await;
    let question = ask(&app, &alice.token).await;
    let likes = format!("/api/questions/{}/likes", question.id);

    let up = send(&app, "POST", &likes, Some(bob.token.as_str()), Some(json!({ "direction": 1 }))).await;
    assert_eq!(up.status(), StatusCode::OK);
    let up: VoteResponse = body_json(up).await;
    assert_eq!((up.magnitude, up.score), (1, 1));

    let repeat = send(&app, "POST", &likes, Some(bob.token.as_str()), Some(json!({ "direction": 5 }))).await;
    assert_eq!(repeat.status(), StatusCode::UNAUTHORIZED);
    let body: Value = body_json(repeat).await;
    assert_eq!(body["error"], "already voted this direction");

    // Older clients send `likes`.
    let flip = send(&app, "POST", &likes, Some(bob.token.as_str()), Some(json!({ "likes": -1 }))).await;
    let flip: VoteResponse = body_json(flip).await;
    assert_eq!((flip.magnitude, flip.score), (-2, -1));

    let own = send(&app, "POST", &likes, Some(alice.token.as_str()), Some(json!({ "direction": 1 }))).await;
    let own: VoteResponse = body_json(own).await;
    assert_eq!(own.score, 0);

    let detail = send(&app, "GET", &format!("/api/questions/{}", question.id), None, None).await;
    let detail: QuestionDetail = body_json(detail).await;
    assert_eq!(detail.score, 0);
    assert_eq!(detail.votes.len(), 3);
    assert_eq!(detail.author.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_vote_with_zero_direction_is_400() {
    let app = app();
    let alice = sign_up(&app, "alice").await;
    let question = ask(&app, &alice.token).await;

    let response = send(
        &app,
        "POST",
        &format!("/api/questions/{}/likes", question.id),
        Some(alice.token.as_str()),
        Some(json!({ "direction": 0 })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_vote_without_body_is_missing_direction() {
    let app = app();
    let alice = sign_up(&app, "alice").await;
    let question = ask(&app, &alice.token).await;

    let response = send(
        &app,
        "POST",
        &format!("/api/questions/{}/likes", question.id),
        Some(alice.token.as_str()),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = body_json(response).await;
    assert_eq!(body["error"], "direction must be provided");
}

#[tokio::test]
async fn test_mistyped_body_is_json_400() {
    let app = app();
    let alice = sign_up(&app, "alice").await;
    let question = ask(&app, &alice.token).await;
    let uri = format!("/api/questions/{}/likes", question.id);

    let response = send(
        &app,
        "POST",
        &uri,
        Some(alice.token.as_str()),
        Some(json!({ "direction": "up" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = body_json(response).await;
    assert_eq!(body["error"], "malformed request body");

    let request = Request::builder()
        .method("POST")
        .uri(&uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", alice.token))
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("up"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = body_json(response).await;
    assert_eq!(body["error"], "malformed request body");

    let detail: QuestionDetail =
        body_json(send(&app, "GET", &format!("/api/questions/{}", question.id), None, None).await)
            .await;
    assert!(detail.votes.is_empty());
}

#[tokio::test]
async fn test_malformed_id_is_json_400() {
    let app = app();
    let response = send(&app, "GET", "/api/questions/not-a-uuid", None, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = body_json(response).await;
    assert_eq!(body["error"], "malformed id");

    let alice = sign_up(&app, "alice").await;
    let response = send(
        &app,
        "POST",
        "/api/questions/not-a-uuid/comments/also-not-a-uuid/likes",
        Some(alice.token.as_str()),
        Some(json!({ "direction": 1 })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = body_json(response).await;
    assert_eq!(body["error"], "malformed id");
}

#[tokio::test]
async fn test_non_owner_cannot_delete_question() {
    let app = app();
    let alice = sign_up(&app, "alice").await;
    let bob = sign_up(&app, "bob").await;
    let question = ask(&app, &alice.token).await;
    let uri = format!("/api/questions/{}", question.id);

    let rejected = send(&app, "DELETE", &uri, Some(bob.token.as_str()), None).await;
    assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);
    let body: Value = body_json(rejected).await;
    assert_eq!(body["error"], "can be modified by author only");

    let still_there = send(&app, "GET", &uri, None, None).await;
    assert_eq!(still_there.status(), StatusCode::OK);

    let deleted = send(&app, "DELETE", &uri, Some(alice.token.as_str()), None).await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let gone = send(&app, "GET", &uri, None, None).await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_comment_thread_and_comment_votes() {
    let app = app();
    let alice = sign_up(&app, "alice").await;
    let bob = sign_up(&app, "bob").await;
    let question = ask(&app, &alice.token).await;

    let posted = send(
        &app,
        "POST",
        &format!("/api/questions/{}/comments", question.id),
        Some(bob.token.as_str()),
        Some(json!({ "content": "It pins the value in memory." })),
    )
    .await;
    assert_eq!(posted.status(), StatusCode::OK);
    let comment: Value = body_json(posted).await;
    let comment_id = comment["id"].as_str().unwrap().to_string();

    let vote = send(
        &app,
        "POST",
        &format!("/api/questions/{}/comments/{comment_id}/likes", question.id),
        Some(alice.token.as_str()),
        Some(json!({ "direction": -1 })),
    )
    .await;
    let vote: VoteResponse = body_json(vote).await;
    assert_eq!(vote.score, -1);

    let detail = send(&app, "GET", &format!("/api/questions/{}", question.id), None, None).await;
    let detail: QuestionDetail = body_json(detail).await;
    assert_eq!(detail.score, 0);
    assert_eq!(detail.comments.len(), 1);
    assert_eq!(detail.comments[0].score, -1);
    assert_eq!(detail.comments[0].author.as_deref(), Some("bob"));
}

#[tokio::test]
async fn test_user_page_lists_question_scores() {
    let app = app();
    let alice = sign_up(&app, "alice").await;
    let bob = sign_up(&app, "bob").await;
    let question = ask(&app, &alice.token).await;
    send(
        &app,
        "POST",
        &format!("/api/questions/{}/likes", question.id),
        Some(bob.token.as_str()),
        Some(json!({ "direction": 1 })),
    )
    .await;

    let response = send(&app, "GET", &format!("/api/users/{}", alice.id), None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let detail: UserDetail = body_json(response).await;
    assert_eq!(detail.user.username, "alice");
    assert_eq!(detail.questions.len(), 1);
    assert_eq!(detail.questions[0].score, 1);

    let everyone = send(&app, "GET", "/api/users", None, None).await;
    let everyone: Vec<UserDetail> = body_json(everyone).await;
    assert_eq!(everyone.len(), 2);
}

#[tokio::test]
async fn test_account_update_is_self_only() {
    let app = app();
    let alice = sign_up(&app, "alice").await;
    let bob = sign_up(&app, "bob").await;
    let uri = format!("/api/users/{}", alice.id);
    let changes = json!({
        "email": "alice@elsewhere.test",
        "fullname": "Alice A.",
        "dateOfBirth": "1992-02-29",
    });

    let by_bob = send(&app, "PUT", &uri, Some(bob.token.as_str()), Some(changes.clone())).await;
    assert_eq!(by_bob.status(), StatusCode::UNAUTHORIZED);

    let by_alice = send(&app, "PUT", &uri, Some(alice.token.as_str()), Some(changes)).await;
    assert_eq!(by_alice.status(), StatusCode::OK);
    let profile: UserProfile = body_json(by_alice).await;
    assert_eq!(profile.email, "alice@elsewhere.test");
    assert_eq!(profile.date_of_birth.map(|d| d.to_string()).as_deref(), Some("1992-02-29"));
}

#[tokio::test]
async fn test_deleted_account_token_stops_working() {
    let app = app();
    let alice = sign_up(&app, "alice").await;

    let deleted = send(
        &app,
        "DELETE",
        &format!("/api/users/{}", alice.id),
        Some(alice.token.as_str()),
        Some(json!({ "password": "correct horse" })),
    )
    .await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let check = send(&app, "GET", "/api/login/isValidToken", Some(alice.token.as_str()), None).await;
    assert_eq!(check.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_backend_outage_is_500_without_details() {
    let app = app_with(InMemoryRepository::new_failing());

    let response = send(&app, "GET", "/api/questions", None, None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = body_json(response).await;
    assert!(!body.to_string().contains("simulated outage"));
}
