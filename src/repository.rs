use crate::{
    error::AppError,
    models::{
        AppendOutcome, Comment, NewQuestion, NewUser, Question, QuestionChanges, User, UserChanges,
        VoteEvent, VoteGuard, VoteTarget,
    },
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// The persistence contract of the forum. Handlers, the vote ledger and the
/// authorization guard only ever see `Arc<dyn Repository>`, so the Postgres
/// backend and the in-memory backend are interchangeable.
///
/// Every method returns `Result`; a lost backend surfaces as `AppError::Internal`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    // Fails with `AppError::Conflict` when the username or email is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, AppError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, AppError>;
    async fn list_users(&self) -> Result<Vec<User>, AppError>;
    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>, AppError>;
    async fn record_sign_in(&self, id: Uuid) -> Result<(), AppError>;
    // Cascades to the user's questions and comments, and their vote ledgers.
    async fn delete_user(&self, id: Uuid) -> Result<bool, AppError>;

    // --- Questions ---
    async fn create_question(&self, owner_id: Uuid, question: NewQuestion) -> Result<Question, AppError>;
    async fn get_question(&self, id: Uuid) -> Result<Option<Question>, AppError>;
    async fn list_questions(&self) -> Result<Vec<Question>, AppError>;
    async fn list_questions_by_owner(&self, owner_id: Uuid) -> Result<Vec<Question>, AppError>;
    async fn update_question(&self, id: Uuid, changes: QuestionChanges) -> Result<Option<Question>, AppError>;
    // Cascades to the question's comments and every affected vote ledger.
    async fn delete_question(&self, id: Uuid) -> Result<bool, AppError>;

    // --- Comments ---
    async fn create_comment(&self, question_id: Uuid, owner_id: Uuid, content: String) -> Result<Comment, AppError>;
    // Only returns the comment if it belongs to `question_id`.
    async fn get_comment(&self, question_id: Uuid, comment_id: Uuid) -> Result<Option<Comment>, AppError>;
    async fn list_comments(&self, question_id: Uuid) -> Result<Vec<Comment>, AppError>;
    async fn update_comment(&self, id: Uuid, content: String) -> Result<Option<Comment>, AppError>;
    async fn delete_comment(&self, id: Uuid) -> Result<bool, AppError>;

    // --- Vote Ledger ---
    // Events of one ledger in insertion order.
    async fn vote_events(&self, target: VoteTarget) -> Result<Vec<VoteEvent>, AppError>;

    /// Atomic conditional append. Stores `event` only if the voter still has
    /// exactly `guard.voter_sequence` events on `target` and the target exists.
    /// Otherwise reports which of the two conditions failed.
    async fn append_vote_event(
        &self,
        target: VoteTarget,
        event: &VoteEvent,
        guard: VoteGuard,
    ) -> Result<AppendOutcome, AppError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL (schema in `migrations/`).
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, fullname, location, \
     date_of_birth, register_date, last_signed_in_date";
const QUESTION_COLUMNS: &str = "id, owner_id, title, content, solved, tags, posted_date";
const COMMENT_COLUMNS: &str = "id, question_id, owner_id, content, posted_date";

#[async_trait]
impl Repository for PostgresRepository {
    /// create_user
    ///
    /// Unique constraints `users_username_key` and `users_email_key` turn a
    /// duplicate into `AppError::Conflict` via `From<sqlx::Error>`.
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let query = format!(
            "INSERT INTO users (id, username, email, password_hash, fullname, location, date_of_birth, register_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW()) RETURNING {USER_COLUMNS}"
        );
        let created = sqlx::query_as::<_, User>(&query)
            .bind(Uuid::new_v4())
            .bind(user.username)
            .bind(user.email)
            .bind(user.password_hash)
            .bind(user.fullname)
            .bind(user.location)
            .bind(user.date_of_birth)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY register_date ASC");
        Ok(sqlx::query_as::<_, User>(&query).fetch_all(&self.pool).await?)
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>, AppError> {
        let query = format!(
            "UPDATE users SET email = $2, fullname = $3, date_of_birth = $4, location = $5 \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(changes.email)
            .bind(changes.fullname)
            .bind(changes.date_of_birth)
            .bind(changes.location)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn record_sign_in(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_signed_in_date = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// delete_user
    ///
    /// `vote_events` is keyed by (kind, id) and has no foreign key to the
    /// entities, so the ledgers are cleared explicitly in the same transaction.
    /// The entity rows go first: once they are locked and deleted, a concurrent
    /// `append_vote_event` blocks on its `FOR KEY SHARE` and then finds no
    /// target, so no vote can land after its ledger was cleared.
    async fn delete_user(&self, id: Uuid) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        // Row locks on the user and their questions hold off new content under them.
        let locked = sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Ok(false);
        }
        let question_ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM questions WHERE owner_id = $1 FOR UPDATE")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        let comment_ids: Vec<Uuid> = sqlx::query_scalar(
            "DELETE FROM comments WHERE owner_id = $1 OR question_id = ANY($2) RETURNING id",
        )
        .bind(id)
        .bind(&question_ids)
        .fetch_all(&mut *tx)
        .await?;

        // Questions follow through the owner_id cascade.
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        clear_ledgers(&mut tx, &question_ids, &comment_ids).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn create_question(&self, owner_id: Uuid, question: NewQuestion) -> Result<Question, AppError> {
        let query = format!(
            "INSERT INTO questions (id, owner_id, title, content, solved, tags, posted_date) \
             VALUES ($1, $2, $3, $4, false, $5, NOW()) RETURNING {QUESTION_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Question>(&query)
            .bind(Uuid::new_v4())
            .bind(owner_id)
            .bind(question.title)
            .bind(question.content)
            .bind(question.tags)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_question(&self, id: Uuid) -> Result<Option<Question>, AppError> {
        let query = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1");
        Ok(sqlx::query_as::<_, Question>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_questions(&self) -> Result<Vec<Question>, AppError> {
        let query = format!("SELECT {QUESTION_COLUMNS} FROM questions ORDER BY posted_date ASC");
        Ok(sqlx::query_as::<_, Question>(&query).fetch_all(&self.pool).await?)
    }

    async fn list_questions_by_owner(&self, owner_id: Uuid) -> Result<Vec<Question>, AppError> {
        let query = format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE owner_id = $1 ORDER BY posted_date ASC"
        );
        Ok(sqlx::query_as::<_, Question>(&query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?)
    }

    /// update_question
    ///
    /// COALESCE keeps every column whose change is `None`.
    async fn update_question(&self, id: Uuid, changes: QuestionChanges) -> Result<Option<Question>, AppError> {
        let query = format!(
            r#"
            UPDATE questions
            SET title = COALESCE($2, title),
                content = COALESCE($3, content),
                solved = COALESCE($4, solved),
                tags = COALESCE($5, tags)
            WHERE id = $1
            RETURNING {QUESTION_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, Question>(&query)
            .bind(id)
            .bind(changes.title)
            .bind(changes.content)
            .bind(changes.solved)
            .bind(changes.tags)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_question(&self, id: Uuid) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query("SELECT id FROM questions WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Ok(false);
        }

        let comment_ids: Vec<Uuid> =
            sqlx::query_scalar("DELETE FROM comments WHERE question_id = $1 RETURNING id")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        clear_ledgers(&mut tx, &[id], &comment_ids).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn create_comment(&self, question_id: Uuid, owner_id: Uuid, content: String) -> Result<Comment, AppError> {
        let query = format!(
            "INSERT INTO comments (id, question_id, owner_id, content, posted_date) \
             VALUES ($1, $2, $3, $4, NOW()) RETURNING {COMMENT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Comment>(&query)
            .bind(Uuid::new_v4())
            .bind(question_id)
            .bind(owner_id)
            .bind(content)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_comment(&self, question_id: Uuid, comment_id: Uuid) -> Result<Option<Comment>, AppError> {
        let query =
            format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1 AND question_id = $2");
        Ok(sqlx::query_as::<_, Comment>(&query)
            .bind(comment_id)
            .bind(question_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_comments(&self, question_id: Uuid) -> Result<Vec<Comment>, AppError> {
        let query = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE question_id = $1 ORDER BY posted_date ASC"
        );
        Ok(sqlx::query_as::<_, Comment>(&query)
            .bind(question_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_comment(&self, id: Uuid, content: String) -> Result<Option<Comment>, AppError> {
        let query =
            format!("UPDATE comments SET content = $2 WHERE id = $1 RETURNING {COMMENT_COLUMNS}");
        Ok(sqlx::query_as::<_, Comment>(&query)
            .bind(id)
            .bind(content)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_comment(&self, id: Uuid) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let res = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if res.rows_affected() == 0 {
            return Ok(false);
        }

        clear_ledgers(&mut tx, &[], &[id]).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn vote_events(&self, target: VoteTarget) -> Result<Vec<VoteEvent>, AppError> {
        Ok(sqlx::query_as::<_, VoteEvent>(
            "SELECT voter_id, magnitude, cast_at FROM vote_events \
             WHERE target_kind = $1 AND target_id = $2 ORDER BY id ASC",
        )
        .bind(target.kind.as_str())
        .bind(target.id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// append_vote_event
    ///
    /// The unique index on (target_kind, target_id, voter_id, voter_seq) makes
    /// two appends decided from the same snapshot collide; `ON CONFLICT DO
    /// NOTHING` turns the loser into `rows_affected == 0`. Appends by different
    /// voters never collide.
    ///
    /// `FOR KEY SHARE` holds the target row until commit. A delete running
    /// alongside either waits for the vote and clears it with the ledger, or
    /// commits first and leaves no target to vote on.
    async fn append_vote_event(
        &self,
        target: VoteTarget,
        event: &VoteEvent,
        guard: VoteGuard,
    ) -> Result<AppendOutcome, AppError> {
        let res = sqlx::query(
            r#"
            INSERT INTO vote_events (target_kind, target_id, voter_id, voter_seq, magnitude, cast_at)
            SELECT $1::text, $2::uuid, $3::uuid, $4::int4, $5::int2, $6::timestamptz
            WHERE EXISTS (SELECT 1 FROM questions WHERE $1 = 'question' AND id = $2 FOR KEY SHARE)
               OR EXISTS (SELECT 1 FROM comments WHERE $1 = 'comment' AND id = $2 FOR KEY SHARE)
            ON CONFLICT (target_kind, target_id, voter_id, voter_seq) DO NOTHING
            "#,
        )
        .bind(target.kind.as_str())
        .bind(target.id)
        .bind(event.voter_id)
        .bind(guard.voter_sequence)
        .bind(event.magnitude)
        .bind(event.cast_at)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() > 0 {
            return Ok(AppendOutcome::Appended);
        }

        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (SELECT 1 FROM questions WHERE $1 = 'question' AND id = $2)
                OR EXISTS (SELECT 1 FROM comments WHERE $1 = 'comment' AND id = $2)
            "#,
        )
        .bind(target.kind.as_str())
        .bind(target.id)
        .fetch_one(&self.pool)
        .await?;

        Ok(if exists {
            AppendOutcome::Stale
        } else {
            AppendOutcome::TargetGone
        })
    }
}

/// Removes the vote ledgers of the given questions and comments.
async fn clear_ledgers(
    tx: &mut Transaction<'_, Postgres>,
    question_ids: &[Uuid],
    comment_ids: &[Uuid],
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        DELETE FROM vote_events
        WHERE (target_kind = 'question' AND target_id = ANY($1))
           OR (target_kind = 'comment' AND target_id = ANY($2))
        "#,
    )
    .bind(question_ids)
    .bind(comment_ids)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
