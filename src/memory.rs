use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        AppendOutcome, Comment, NewQuestion, NewUser, Question, QuestionChanges, User, UserChanges,
        VotableKind, VoteEvent, VoteGuard, VoteTarget,
    },
    repository::Repository,
};

/// InMemoryRepository
///
/// A `Repository` held entirely in process memory. Used by the test suites and
/// for running the server without a database. A single `RwLock` serializes
/// writers, which makes `append_vote_event` a true check-and-push.
#[derive(Default)]
pub struct InMemoryRepository {
    state: RwLock<MemoryState>,
    /// When true, every operation fails as if the backend were unreachable.
    pub should_fail: bool,
}

#[derive(Default)]
struct MemoryState {
    users: Vec<User>,
    questions: Vec<Question>,
    comments: Vec<Comment>,
    votes: HashMap<VoteTarget, Vec<VoteEvent>>,
}

impl MemoryState {
    fn target_exists(&self, target: VoteTarget) -> bool {
        match target.kind {
            VotableKind::Question => self.questions.iter().any(|q| q.id == target.id),
            VotableKind::Comment => self.comments.iter().any(|c| c.id == target.id),
        }
    }

    /// Removes a comment together with its ledger.
    fn remove_comments(&mut self, doomed: impl Fn(&Comment) -> bool) {
        let (removed, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.comments).into_iter().partition(|c| doomed(c));
        self.comments = kept;
        for comment in removed {
            self.votes.remove(&VoteTarget::comment(comment.id));
        }
    }

    /// Removes a question together with its comments and every affected ledger.
    fn remove_question(&mut self, id: Uuid) -> bool {
        let before = self.questions.len();
        self.questions.retain(|q| q.id != id);
        if self.questions.len() == before {
            return false;
        }
        self.votes.remove(&VoteTarget::question(id));
        self.remove_comments(|c| c.question_id == id);
        true
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    fn check(&self) -> Result<(), AppError> {
        if self.should_fail {
            return Err(AppError::Internal(
                "in-memory backend: simulated outage".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        self.check()?;
        let mut state = self.state.write().await;

        if state.users.iter().any(|u| u.username == user.username) {
            return Err(AppError::Conflict("username"));
        }
        if state.users.iter().any(|u| u.email == user.email) {
            return Err(AppError::Conflict("email"));
        }

        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            fullname: user.fullname,
            location: user.location,
            date_of_birth: user.date_of_birth,
            register_date: Utc::now(),
            last_signed_in_date: None,
        };
        state.users.push(created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| u.username == username).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        self.check()?;
        Ok(self.state.read().await.users.clone())
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>, AppError> {
        self.check()?;
        let mut state = self.state.write().await;

        if state
            .users
            .iter()
            .any(|u| u.id != id && u.email == changes.email)
        {
            return Err(AppError::Conflict("email"));
        }

        Ok(state.users.iter_mut().find(|u| u.id == id).map(|user| {
            user.email = changes.email;
            user.fullname = Some(changes.fullname);
            user.date_of_birth = Some(changes.date_of_birth);
            user.location = changes.location;
            user.clone()
        }))
    }

    async fn record_sign_in(&self, id: Uuid) -> Result<(), AppError> {
        self.check()?;
        let mut state = self.state.write().await;
        if let Some(user) = state.users.iter_mut().find(|u| u.id == id) {
            user.last_signed_in_date = Some(Utc::now());
        }
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, AppError> {
        self.check()?;
        let mut state = self.state.write().await;

        let before = state.users.len();
        state.users.retain(|u| u.id != id);
        if state.users.len() == before {
            return Ok(false);
        }

        let owned: Vec<Uuid> = state
            .questions
            .iter()
            .filter(|q| q.owner_id == id)
            .map(|q| q.id)
            .collect();
        for question_id in owned {
            state.remove_question(question_id);
        }
        state.remove_comments(|c| c.owner_id == id);
        Ok(true)
    }

    async fn create_question(&self, owner_id: Uuid, question: NewQuestion) -> Result<Question, AppError> {
        self.check()?;
        let created = Question {
            id: Uuid::new_v4(),
            owner_id,
            title: question.title,
            content: question.content,
            solved: false,
            tags: question.tags,
            posted_date: Utc::now(),
        };
        self.state.write().await.questions.push(created.clone());
        Ok(created)
    }

    async fn get_question(&self, id: Uuid) -> Result<Option<Question>, AppError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state.questions.iter().find(|q| q.id == id).cloned())
    }

    async fn list_questions(&self) -> Result<Vec<Question>, AppError> {
        self.check()?;
        Ok(self.state.read().await.questions.clone())
    }

    async fn list_questions_by_owner(&self, owner_id: Uuid) -> Result<Vec<Question>, AppError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .questions
            .iter()
            .filter(|q| q.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn update_question(&self, id: Uuid, changes: QuestionChanges) -> Result<Option<Question>, AppError> {
        self.check()?;
        let mut state = self.state.write().await;
        Ok(state.questions.iter_mut().find(|q| q.id == id).map(|q| {
            if let Some(title) = changes.title {
                q.title = title;
            }
            if let Some(content) = changes.content {
                q.content = content;
            }
            if let Some(solved) = changes.solved {
                q.solved = solved;
            }
            if let Some(tags) = changes.tags {
                q.tags = tags;
            }
            q.clone()
        }))
    }

    async fn delete_question(&self, id: Uuid) -> Result<bool, AppError> {
        self.check()?;
        Ok(self.state.write().await.remove_question(id))
    }

    async fn create_comment(&self, question_id: Uuid, owner_id: Uuid, content: String) -> Result<Comment, AppError> {
        self.check()?;
        let mut state = self.state.write().await;

        if !state.questions.iter().any(|q| q.id == question_id) {
            return Err(AppError::NotFound("question"));
        }

        let created = Comment {
            id: Uuid::new_v4(),
            question_id,
            owner_id,
            content,
            posted_date: Utc::now(),
        };
        state.comments.push(created.clone());
        Ok(created)
    }

    async fn get_comment(&self, question_id: Uuid, comment_id: Uuid) -> Result<Option<Comment>, AppError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .comments
            .iter()
            .find(|c| c.id == comment_id && c.question_id == question_id)
            .cloned())
    }

    async fn list_comments(&self, question_id: Uuid) -> Result<Vec<Comment>, AppError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .comments
            .iter()
            .filter(|c| c.question_id == question_id)
            .cloned()
            .collect())
    }

    async fn update_comment(&self, id: Uuid, content: String) -> Result<Option<Comment>, AppError> {
        self.check()?;
        let mut state = self.state.write().await;
        Ok(state.comments.iter_mut().find(|c| c.id == id).map(|c| {
            c.content = content;
            c.clone()
        }))
    }

    async fn delete_comment(&self, id: Uuid) -> Result<bool, AppError> {
        self.check()?;
        let mut state = self.state.write().await;
        let before = state.comments.len();
        state.remove_comments(|c| c.id == id);
        Ok(state.comments.len() < before)
    }

    async fn vote_events(&self, target: VoteTarget) -> Result<Vec<VoteEvent>, AppError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state.votes.get(&target).cloned().unwrap_or_default())
    }

    async fn append_vote_event(
        &self,
        target: VoteTarget,
        event: &VoteEvent,
        guard: VoteGuard,
    ) -> Result<AppendOutcome, AppError> {
        self.check()?;
        let mut state = self.state.write().await;

        if !state.target_exists(target) {
            return Ok(AppendOutcome::TargetGone);
        }

        let ledger = state.votes.entry(target).or_default();
        let voter_sequence = ledger.iter().filter(|e| e.voter_id == event.voter_id).count();
        if voter_sequence != guard.voter_sequence as usize {
            return Ok(AppendOutcome::Stale);
        }

        ledger.push(event.clone());
        Ok(AppendOutcome::Appended)
    }
}
