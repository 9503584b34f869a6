use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// Canonical account record from the `users` table. Carries the password hash,
/// so it is never serialized; responses use `UserProfile` instead.
#[derive(Debug, Clone, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub fullname: Option<String>,
    pub location: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub register_date: DateTime<Utc>,
    pub last_signed_in_date: Option<DateTime<Utc>>,
}

/// NewUser
///
/// Insert payload for `Repository::create_user`. The password is already hashed.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub fullname: Option<String>,
    pub location: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

/// UserChanges
///
/// Profile fields an account owner may rewrite (PUT /api/users/{id}).
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: String,
    pub fullname: String,
    pub date_of_birth: NaiveDate,
    pub location: Option<String>,
}

/// Question
///
/// A row of the `questions` table. Its vote ledger lives in `vote_events`
/// under the `question` kind.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Question {
    pub id: Uuid,
    // FK to users.id (author).
    pub owner_id: Uuid,
    pub title: String,
    pub content: String,
    pub solved: bool,
    pub tags: Vec<String>,
    #[ts(type = "string")]
    pub posted_date: DateTime<Utc>,
}

/// NewQuestion
///
/// Insert payload for `Repository::create_question`. New questions start unsolved.
#[derive(Debug, Clone, Default)]
pub struct NewQuestion {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

/// QuestionChanges
///
/// Partial update applied by the owner. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct QuestionChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub solved: Option<bool>,
    pub tags: Option<Vec<String>>,
}

/// Comment
///
/// A row of the `comments` table, always attached to a parent question.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Comment {
    pub id: Uuid,
    pub question_id: Uuid,
    pub owner_id: Uuid,
    pub content: String,
    #[ts(type = "string")]
    pub posted_date: DateTime<Utc>,
}

/// VotableKind
///
/// Tag distinguishing the two entity kinds that carry a vote ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum VotableKind {
    Question,
    Comment,
}

impl VotableKind {
    /// Value stored in `vote_events.target_kind`.
    pub fn as_str(self) -> &'static str {
        match self {
            VotableKind::Question => "question",
            VotableKind::Comment => "comment",
        }
    }
}

/// VoteTarget
///
/// Addresses one vote ledger: the entity kind plus its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct VoteTarget {
    pub kind: VotableKind,
    pub id: Uuid,
}

impl VoteTarget {
    pub fn question(id: Uuid) -> Self {
        Self { kind: VotableKind::Question, id }
    }

    pub fn comment(id: Uuid) -> Self {
        Self { kind: VotableKind::Comment, id }
    }
}

/// VoteEvent
///
/// One signed entry of a vote ledger. Magnitude is one of +1, +2, -1, -2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct VoteEvent {
    pub voter_id: Uuid,
    pub magnitude: i16,
    #[ts(type = "string")]
    pub cast_at: DateTime<Utc>,
}

/// VoteGuard
///
/// Optimistic-concurrency token for `Repository::append_vote_event`: the number
/// of events the voter already had on the target when the vote was decided.
/// The append only succeeds if that count is still current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteGuard {
    pub voter_sequence: i32,
}

/// Result of a conditional ledger append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// The voter's sequence moved on since the vote was decided.
    Stale,
    /// The question or comment no longer exists.
    TargetGone,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterUserRequest
///
/// Input payload for POST /api/users. Username, password and email are required.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RegisterUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub fullname: Option<String>,
    pub location: Option<String>,
    #[ts(type = "string | null")]
    pub date_of_birth: Option<NaiveDate>,
}

/// UpdateUserRequest
///
/// Input payload for PUT /api/users/{id}. `password`, when present, is a
/// confirmation that is checked against the stored hash.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub fullname: Option<String>,
    #[ts(type = "string | null")]
    pub date_of_birth: Option<NaiveDate>,
    pub location: Option<String>,
    pub password: Option<String>,
}

/// PasswordConfirmation
///
/// Optional body of DELETE /api/users/{id}.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PasswordConfirmation {
    pub password: Option<String>,
}

/// LoginRequest
///
/// Input payload for POST /api/login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub remember_me: bool,
}

/// QuestionRequest
///
/// Input payload for creating (POST) or rewriting (PUT) a question.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct QuestionRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub solved: Option<bool>,
    pub tags: Option<Vec<String>>,
}

/// TagsRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TagsRequest {
    pub tags: Option<Vec<String>>,
}

/// SolvedRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SolvedRequest {
    pub solved: Option<bool>,
}

/// CommentRequest
///
/// Input payload for posting or editing a comment.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CommentRequest {
    pub content: Option<String>,
}

/// VoteRequest
///
/// Input payload for the `/likes` endpoints. Only the sign of `direction`
/// matters; `likes` is accepted as an alias for older clients.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct VoteRequest {
    #[serde(alias = "likes")]
    pub direction: Option<i64>,
}

// --- Response Schemas (Output) ---

/// UserProfile
///
/// Public view of a user. Never includes the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub fullname: Option<String>,
    pub location: Option<String>,
    #[ts(type = "string | null")]
    pub date_of_birth: Option<NaiveDate>,
    #[ts(type = "string")]
    pub register_date: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub last_signed_in_date: Option<DateTime<Utc>>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            fullname: user.fullname,
            location: user.location,
            date_of_birth: user.date_of_birth,
            register_date: user.register_date,
            last_signed_in_date: user.last_signed_in_date,
        }
    }
}

/// QuestionSummary
///
/// Title and current score of a question, listed on a user's page.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct QuestionSummary {
    pub id: Uuid,
    pub title: String,
    pub score: i64,
}

/// UserDetail
///
/// Output of GET /api/users and GET /api/users/{id}.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserDetail {
    pub user: UserProfile,
    pub questions: Vec<QuestionSummary>,
}

/// LoginResponse
///
/// Output of POST /api/login. The token is also set as the `token` cookie.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginResponse {
    pub id: Uuid,
    pub username: String,
    pub token: String,
}

/// CommentDetail
///
/// A comment with its author's username and its ledger.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CommentDetail {
    pub comment: Comment,
    pub author: Option<String>,
    pub score: i64,
    pub votes: Vec<VoteEvent>,
}

/// QuestionDetail
///
/// Output of the question read endpoints: the question, its author, its ledger
/// and every comment posted under it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct QuestionDetail {
    pub question: Question,
    pub author: Option<String>,
    pub score: i64,
    pub votes: Vec<VoteEvent>,
    pub comments: Vec<CommentDetail>,
}

/// VoteResponse
///
/// Output of an accepted vote: the magnitude appended and the new score.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct VoteResponse {
    pub magnitude: i16,
    pub score: i64,
}
