use crate::{
    AppState,
    auth::{self, AuthUser, SessionToken},
    error::AppError,
    extract::{JsonBody, PathId},
    guard, ledger,
    models::{
        Comment, CommentDetail, CommentRequest, LoginRequest, LoginResponse, NewQuestion, NewUser,
        PasswordConfirmation, Question, QuestionChanges, QuestionDetail, QuestionRequest,
        QuestionSummary, RegisterUserRequest, SolvedRequest, TagsRequest, UpdateUserRequest, User,
        UserChanges, UserDetail, UserProfile, VoteRequest, VoteResponse, VoteTarget,
    },
    repository::Repository,
};
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

// --- Input Helpers ---

/// Rejects absent and blank text fields.
fn require_text(value: Option<String>, what: &'static str) -> Result<String, AppError> {
    value
        .filter(|text| !text.trim().is_empty())
        .ok_or(AppError::MissingInput(what))
}

fn require<T>(value: Option<T>, what: &'static str) -> Result<T, AppError> {
    value.ok_or(AppError::MissingInput(what))
}

// --- Lookup Helpers ---

async fn find_question(repo: &dyn Repository, id: Uuid) -> Result<Question, AppError> {
    repo.get_question(id)
        .await?
        .ok_or(AppError::NotFound("question"))
}

async fn find_comment(
    repo: &dyn Repository,
    question_id: Uuid,
    comment_id: Uuid,
) -> Result<Comment, AppError> {
    // The parent must exist as well; a comment id under the wrong question is not found.
    find_question(repo, question_id).await?;
    repo.get_comment(question_id, comment_id)
        .await?
        .ok_or(AppError::NotFound("comment"))
}

/// Caches username lookups while a response is assembled.
#[derive(Default)]
struct Authors(HashMap<Uuid, Option<String>>);

impl Authors {
    async fn name(&mut self, repo: &dyn Repository, id: Uuid) -> Result<Option<String>, AppError> {
        if let Some(name) = self.0.get(&id) {
            return Ok(name.clone());
        }
        let name = repo.get_user(id).await?.map(|user| user.username);
        self.0.insert(id, name.clone());
        Ok(name)
    }
}

async fn question_detail(
    repo: &dyn Repository,
    authors: &mut Authors,
    question: Question,
) -> Result<QuestionDetail, AppError> {
    let question_ledger = ledger::load_votable(repo, &question).await?;

    let mut comments = Vec::new();
    for comment in repo.list_comments(question.id).await? {
        let comment_ledger = ledger::load_votable(repo, &comment).await?;
        comments.push(CommentDetail {
            author: authors.name(repo, comment.owner_id).await?,
            score: comment_ledger.score(),
            votes: comment_ledger.vote_events,
            comment,
        });
    }

    Ok(QuestionDetail {
        author: authors.name(repo, question.owner_id).await?,
        score: question_ledger.score(),
        votes: question_ledger.vote_events,
        comments,
        question,
    })
}

async fn user_detail(repo: &dyn Repository, user: User) -> Result<UserDetail, AppError> {
    let mut questions = Vec::new();
    for question in repo.list_questions_by_owner(user.id).await? {
        let question_ledger = ledger::load_votable(repo, &question).await?;
        questions.push(QuestionSummary {
            id: question.id,
            title: question.title,
            score: question_ledger.score(),
        });
    }

    Ok(UserDetail {
        user: user.into(),
        questions,
    })
}

// --- Users ---

/// register_user
///
/// [Public Route] Creates an account. Username, password and email are
/// required; the password is stored as an argon2 hash.
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = RegisterUserRequest,
    responses(
        (status = 200, description = "Registered", body = UserProfile),
        (status = 400, description = "Missing field"),
        (status = 409, description = "Username or email taken")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterUserRequest>,
) -> Result<Json<UserProfile>, AppError> {
    let username = require_text(payload.username, "username")?;
    let password = require_text(payload.password, "password")?;
    let email = require_text(payload.email, "email")?;

    let new_user = NewUser {
        username,
        email,
        password_hash: auth::hash_password(&password)?,
        fullname: payload.fullname,
        location: payload.location,
        date_of_birth: payload.date_of_birth,
    };

    let created = state.repo.create_user(new_user).await?;
    tracing::info!(user = %created.id, username = %created.username, "user registered");

    Ok(Json(created.into()))
}

/// list_users
///
/// [Public Route] Every user with the titles and scores of their questions.
#[utoipa::path(
    get,
    path = "/api/users",
    responses((status = 200, description = "Users", body = [UserDetail]))
)]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserDetail>>, AppError> {
    let mut users = Vec::new();
    for user in state.repo.list_users().await? {
        users.push(user_detail(state.repo.as_ref(), user).await?);
    }
    Ok(Json(users))
}

/// get_user
///
/// [Public Route] One user's page.
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Found", body = UserDetail),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
) -> Result<Json<UserDetail>, AppError> {
    let user = state
        .repo
        .get_user(id)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    Ok(Json(user_detail(state.repo.as_ref(), user).await?))
}

/// update_user
///
/// [Authenticated Route] Rewrites the caller's own profile.
///
/// *Authorization*: the token must name `{id}` exactly, and a supplied
/// `password` must match the stored one.
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 401, description = "Token or password rejected")
    )
)]
pub async fn update_user(
    SessionToken(token): SessionToken,
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    JsonBody(payload): JsonBody<UpdateUserRequest>,
) -> Result<Json<UserProfile>, AppError> {
    let user = guard::authorize_self_account(
        state.repo.as_ref(),
        &state.config,
        token.as_deref(),
        id,
        payload.password.as_deref(),
    )
    .await?;

    let changes = UserChanges {
        email: require_text(payload.email, "email")?,
        fullname: require_text(payload.fullname, "fullname")?,
        date_of_birth: require(payload.date_of_birth, "dateOfBirth")?,
        location: payload.location,
    };

    let updated = state
        .repo
        .update_user(user.id, changes)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    Ok(Json(updated.into()))
}

/// delete_user
///
/// [Authenticated Route] Deletes the caller's own account together with
/// their questions and comments.
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = PasswordConfirmation,
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Token or password rejected")
    )
)]
pub async fn delete_user(
    SessionToken(token): SessionToken,
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    JsonBody(payload): JsonBody<PasswordConfirmation>,
) -> Result<StatusCode, AppError> {
    let password = payload.password;

    let user = guard::authorize_self_account(
        state.repo.as_ref(),
        &state.config,
        token.as_deref(),
        id,
        password.as_deref(),
    )
    .await?;

    if !state.repo.delete_user(user.id).await? {
        return Err(AppError::NotFound("user"));
    }
    tracing::info!(user = %user.id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Login ---

/// login
///
/// [Public Route] Exchanges username and password for a session token. The
/// token is returned in the body and set as the `token` cookie.
#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (Some(username), Some(password)) = (payload.username, payload.password) else {
        return Err(AppError::MissingInput("username and password"));
    };

    let user = state
        .repo
        .get_user_by_username(&username)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !auth::verify_password(&password, &user.password_hash) {
        tracing::info!(username = %username, "sign-in with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    state.repo.record_sign_in(user.id).await?;
    let token = auth::issue_token(&state.config, &user)?;
    let cookie = auth::session_cookie(&token, payload.remember_me);

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            id: user.id,
            username: user.username,
            token,
        }),
    ))
}

/// is_valid_token
///
/// [Authenticated Route] 200 when the request carries a valid session token.
/// The `AuthUser` extractor answers 401 otherwise.
#[utoipa::path(
    get,
    path = "/api/login/isValidToken",
    responses(
        (status = 200, description = "Token valid"),
        (status = 401, description = "Token missing or invalid")
    )
)]
pub async fn is_valid_token(_caller: AuthUser) -> StatusCode {
    StatusCode::OK
}

// --- Questions ---

/// list_questions
///
/// [Public Route] Every question with its author, score, ledger and comments.
#[utoipa::path(
    get,
    path = "/api/questions",
    responses((status = 200, description = "Questions", body = [QuestionDetail]))
)]
pub async fn list_questions(
    State(state): State<AppState>,
) -> Result<Json<Vec<QuestionDetail>>, AppError> {
    let repo = state.repo.as_ref();
    let mut authors = Authors::default();

    let mut questions = Vec::new();
    for question in repo.list_questions().await? {
        questions.push(question_detail(repo, &mut authors, question).await?);
    }
    Ok(Json(questions))
}

/// get_question
///
/// [Public Route] One question with its author, score, ledger and comments.
#[utoipa::path(
    get,
    path = "/api/questions/{id}",
    params(("id" = Uuid, Path, description = "Question ID")),
    responses(
        (status = 200, description = "Found", body = QuestionDetail),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_question(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
) -> Result<Json<QuestionDetail>, AppError> {
    let repo = state.repo.as_ref();
    let question = find_question(repo, id).await?;
    Ok(Json(
        question_detail(repo, &mut Authors::default(), question).await?,
    ))
}

/// create_question
///
/// [Authenticated Route] Posts a new, unsolved question owned by the caller.
#[utoipa::path(
    post,
    path = "/api/questions",
    request_body = QuestionRequest,
    responses(
        (status = 201, description = "Created", body = Question),
        (status = 400, description = "Missing title or content")
    )
)]
pub async fn create_question(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<QuestionRequest>,
) -> Result<(StatusCode, Json<Question>), AppError> {
    let question = NewQuestion {
        title: require_text(payload.title, "title")?,
        content: require_text(payload.content, "content")?,
        tags: payload.tags.unwrap_or_default(),
    };

    let created = state.repo.create_question(id, question).await?;
    tracing::info!(question = %created.id, owner = %id, "question posted");
    Ok((StatusCode::CREATED, Json(created)))
}

/// Loads a question and checks that the caller owns it.
async fn owned_question(state: &AppState, token: Option<&str>, id: Uuid) -> Result<Question, AppError> {
    let repo = state.repo.as_ref();
    let question = find_question(repo, id).await?;
    guard::authorize_mutation(repo, &state.config, token, &question).await?;
    Ok(question)
}

async fn apply_question_changes(
    state: &AppState,
    id: Uuid,
    changes: QuestionChanges,
) -> Result<Json<Question>, AppError> {
    let updated = state
        .repo
        .update_question(id, changes)
        .await?
        .ok_or(AppError::NotFound("question"))?;
    Ok(Json(updated))
}

/// update_question
///
/// [Authenticated Route] Rewrites a question. Title and content are required;
/// `solved` and `tags` are applied when present.
///
/// *Authorization*: owner only.
#[utoipa::path(
    put,
    path = "/api/questions/{id}",
    params(("id" = Uuid, Path, description = "Question ID")),
    request_body = QuestionRequest,
    responses(
        (status = 200, description = "Updated", body = Question),
        (status = 401, description = "Not the author"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_question(
    SessionToken(token): SessionToken,
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    JsonBody(payload): JsonBody<QuestionRequest>,
) -> Result<Json<Question>, AppError> {
    owned_question(&state, token.as_deref(), id).await?;

    let changes = QuestionChanges {
        title: Some(require_text(payload.title, "title")?),
        content: Some(require_text(payload.content, "content")?),
        solved: payload.solved,
        tags: payload.tags,
    };
    apply_question_changes(&state, id, changes).await
}

/// update_title_content
///
/// [Authenticated Route] Replaces only the title and content of a question.
#[utoipa::path(
    post,
    path = "/api/questions/{id}/title-content",
    params(("id" = Uuid, Path, description = "Question ID")),
    request_body = QuestionRequest,
    responses((status = 200, description = "Updated", body = Question))
)]
pub async fn update_title_content(
    SessionToken(token): SessionToken,
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    JsonBody(payload): JsonBody<QuestionRequest>,
) -> Result<Json<Question>, AppError> {
    owned_question(&state, token.as_deref(), id).await?;

    let changes = QuestionChanges {
        title: Some(require_text(payload.title, "title")?),
        content: Some(require_text(payload.content, "content")?),
        ..QuestionChanges::default()
    };
    apply_question_changes(&state, id, changes).await
}

/// update_tags
///
/// [Authenticated Route] Replaces the tag list of a question.
#[utoipa::path(
    post,
    path = "/api/questions/{id}/tags",
    params(("id" = Uuid, Path, description = "Question ID")),
    request_body = TagsRequest,
    responses((status = 200, description = "Updated", body = Question))
)]
pub async fn update_tags(
    SessionToken(token): SessionToken,
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    JsonBody(payload): JsonBody<TagsRequest>,
) -> Result<Json<Question>, AppError> {
    owned_question(&state, token.as_deref(), id).await?;

    let changes = QuestionChanges {
        tags: Some(require(payload.tags, "tags")?),
        ..QuestionChanges::default()
    };
    apply_question_changes(&state, id, changes).await
}

/// update_solved
///
/// [Authenticated Route] Marks a question solved or unsolved.
#[utoipa::path(
    post,
    path = "/api/questions/{id}/solved",
    params(("id" = Uuid, Path, description = "Question ID")),
    request_body = SolvedRequest,
    responses((status = 200, description = "Updated", body = Question))
)]
pub async fn update_solved(
    SessionToken(token): SessionToken,
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    JsonBody(payload): JsonBody<SolvedRequest>,
) -> Result<Json<Question>, AppError> {
    owned_question(&state, token.as_deref(), id).await?;

    let changes = QuestionChanges {
        solved: Some(require(payload.solved, "solved")?),
        ..QuestionChanges::default()
    };
    apply_question_changes(&state, id, changes).await
}

/// delete_question
///
/// [Authenticated Route] Deletes a question, its comments and their ledgers.
///
/// *Authorization*: owner only; a rejected delete leaves storage untouched.
#[utoipa::path(
    delete,
    path = "/api/questions/{id}",
    params(("id" = Uuid, Path, description = "Question ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Not the author"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_question(
    SessionToken(token): SessionToken,
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
) -> Result<StatusCode, AppError> {
    owned_question(&state, token.as_deref(), id).await?;

    if !state.repo.delete_question(id).await? {
        return Err(AppError::NotFound("question"));
    }
    tracing::info!(question = %id, "question deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// vote_question
///
/// [Authenticated Route] Casts an up or down vote on a question. Any
/// authenticated user may vote, including the author.
#[utoipa::path(
    post,
    path = "/api/questions/{id}/likes",
    params(("id" = Uuid, Path, description = "Question ID")),
    request_body = VoteRequest,
    responses(
        (status = 200, description = "Vote recorded", body = VoteResponse),
        (status = 400, description = "Missing or malformed direction"),
        (status = 401, description = "Already voted this direction"),
        (status = 404, description = "Question not found"),
        (status = 409, description = "Concurrent vote by the same user")
    )
)]
pub async fn vote_question(
    AuthUser { id: voter_id, .. }: AuthUser,
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    JsonBody(payload): JsonBody<VoteRequest>,
) -> Result<Json<VoteResponse>, AppError> {
    let repo = state.repo.as_ref();
    find_question(repo, id).await?;

    let outcome = ledger::cast_vote(repo, VoteTarget::question(id), voter_id, payload.direction).await?;
    Ok(Json(VoteResponse {
        magnitude: outcome.event.magnitude,
        score: outcome.score,
    }))
}

// --- Comments ---

/// add_comment
///
/// [Authenticated Route] Posts a comment under a question.
#[utoipa::path(
    post,
    path = "/api/questions/{id}/comments",
    params(("id" = Uuid, Path, description = "Question ID")),
    request_body = CommentRequest,
    responses(
        (status = 200, description = "Comment added", body = Comment),
        (status = 404, description = "Question not found")
    )
)]
pub async fn add_comment(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    PathId(question_id): PathId<Uuid>,
    JsonBody(payload): JsonBody<CommentRequest>,
) -> Result<Json<Comment>, AppError> {
    let repo = state.repo.as_ref();
    find_question(repo, question_id).await?;
    let content = require_text(payload.content, "content")?;

    let comment = repo.create_comment(question_id, user_id, content).await?;
    Ok(Json(comment))
}

/// update_comment
///
/// [Authenticated Route] Rewrites the content of a comment.
///
/// *Authorization*: owner only.
#[utoipa::path(
    put,
    path = "/api/questions/{id}/comments/{comment_id}",
    params(
        ("id" = Uuid, Path, description = "Question ID"),
        ("comment_id" = Uuid, Path, description = "Comment ID")
    ),
    request_body = CommentRequest,
    responses(
        (status = 200, description = "Updated", body = Comment),
        (status = 401, description = "Not the author")
    )
)]
pub async fn update_comment(
    SessionToken(token): SessionToken,
    State(state): State<AppState>,
    PathId((question_id, comment_id)): PathId<(Uuid, Uuid)>,
    JsonBody(payload): JsonBody<CommentRequest>,
) -> Result<Json<Comment>, AppError> {
    let repo = state.repo.as_ref();
    let comment = find_comment(repo, question_id, comment_id).await?;
    guard::authorize_mutation(repo, &state.config, token.as_deref(), &comment).await?;
    let content = require_text(payload.content, "content")?;

    let updated = repo
        .update_comment(comment.id, content)
        .await?
        .ok_or(AppError::NotFound("comment"))?;
    Ok(Json(updated))
}

/// delete_comment
///
/// [Authenticated Route] Deletes a comment and its ledger.
///
/// *Authorization*: owner only.
#[utoipa::path(
    delete,
    path = "/api/questions/{id}/comments/{comment_id}",
    params(
        ("id" = Uuid, Path, description = "Question ID"),
        ("comment_id" = Uuid, Path, description = "Comment ID")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Not the author")
    )
)]
pub async fn delete_comment(
    SessionToken(token): SessionToken,
    State(state): State<AppState>,
    PathId((question_id, comment_id)): PathId<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let repo = state.repo.as_ref();
    let comment = find_comment(repo, question_id, comment_id).await?;
    guard::authorize_mutation(repo, &state.config, token.as_deref(), &comment).await?;

    if !repo.delete_comment(comment.id).await? {
        return Err(AppError::NotFound("comment"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// vote_comment
///
/// [Authenticated Route] Casts an up or down vote on a comment. Same rules
/// as question votes; each comment keeps its own ledger.
#[utoipa::path(
    post,
    path = "/api/questions/{id}/comments/{comment_id}/likes",
    params(
        ("id" = Uuid, Path, description = "Question ID"),
        ("comment_id" = Uuid, Path, description = "Comment ID")
    ),
    request_body = VoteRequest,
    responses(
        (status = 200, description = "Vote recorded", body = VoteResponse),
        (status = 401, description = "Already voted this direction")
    )
)]
pub async fn vote_comment(
    AuthUser { id: voter_id, .. }: AuthUser,
    State(state): State<AppState>,
    PathId((question_id, comment_id)): PathId<(Uuid, Uuid)>,
    JsonBody(payload): JsonBody<VoteRequest>,
) -> Result<Json<VoteResponse>, AppError> {
    let repo = state.repo.as_ref();
    let comment = find_comment(repo, question_id, comment_id).await?;

    let outcome = ledger::cast_vote(repo, VoteTarget::comment(comment.id), voter_id, payload.direction).await?;
    Ok(Json(VoteResponse {
        magnitude: outcome.event.magnitude,
        score: outcome.score,
    }))
}

/// unknown_endpoint
///
/// Router fallback.
pub async fn unknown_endpoint() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "unknown endpoint" })),
    )
}
