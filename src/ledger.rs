//! Vote ledger shared by questions and comments.
//!
//! Every votable entity owns an append-only list of signed [`VoteEvent`]s.
//! The score is the sum of their magnitudes and is never stored anywhere else.
//! A voter's polarity on an entity is the sign of their most recent event:
//!
//! * no events yet: any vote is accepted and appends ±1;
//! * same direction as the current polarity: rejected;
//! * opposite direction: appends ±2, which cancels the earlier vote and
//!   counts the new one in a single event.

use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{AppendOutcome, Comment, Question, VoteEvent, VoteGuard, VoteTarget},
    repository::Repository,
};

/// The only magnitudes a ledger may contain.
pub const ALLOWED_MAGNITUDES: [i16; 4] = [1, 2, -1, -2];

pub fn is_valid_magnitude(magnitude: i16) -> bool {
    ALLOWED_MAGNITUDES.contains(&magnitude)
}

/// Direction
///
/// The normalized intent of a vote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// from_requested
    ///
    /// Only the sign of the requested value matters. A missing value and zero
    /// are both rejected with `MissingInput`.
    pub fn from_requested(requested: Option<i64>) -> Result<Self, AppError> {
        match requested {
            None | Some(0) => Err(AppError::MissingInput("direction")),
            Some(value) if value > 0 => Ok(Direction::Up),
            Some(_) => Ok(Direction::Down),
        }
    }

    /// Polarity of a recorded magnitude.
    pub fn of(magnitude: i16) -> Self {
        if magnitude >= 0 {
            Direction::Up
        } else {
            Direction::Down
        }
    }

    pub fn sign(self) -> i16 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
        }
    }
}

/// Votable
///
/// The capability shared by questions and comments: an addressable ledger and
/// an immutable owner.
pub trait Votable {
    fn vote_target(&self) -> VoteTarget;
    fn owner_id(&self) -> Uuid;
}

impl Votable for Question {
    fn vote_target(&self) -> VoteTarget {
        VoteTarget::question(self.id)
    }

    fn owner_id(&self) -> Uuid {
        self.owner_id
    }
}

impl Votable for Comment {
    fn vote_target(&self) -> VoteTarget {
        VoteTarget::comment(self.id)
    }

    fn owner_id(&self) -> Uuid {
        self.owner_id
    }
}

/// VotableEntity
///
/// A question or comment reduced to what the ledger needs, with its events loaded.
#[derive(Debug, Clone)]
pub struct VotableEntity {
    pub target: VoteTarget,
    pub owner_id: Uuid,
    pub vote_events: Vec<VoteEvent>,
}

impl VotableEntity {
    pub fn score(&self) -> i64 {
        score(&self.vote_events)
    }
}

impl Votable for VotableEntity {
    fn vote_target(&self) -> VoteTarget {
        self.target
    }

    fn owner_id(&self) -> Uuid {
        self.owner_id
    }
}

/// Loads the ledger of `entity` from storage.
pub async fn load_votable<V: Votable + ?Sized>(
    repo: &dyn Repository,
    entity: &V,
) -> Result<VotableEntity, AppError> {
    let target = entity.vote_target();
    Ok(VotableEntity {
        target,
        owner_id: entity.owner_id(),
        vote_events: repo.vote_events(target).await?,
    })
}

/// Current score: the sum of every magnitude in the ledger.
pub fn score(events: &[VoteEvent]) -> i64 {
    events.iter().map(|event| i64::from(event.magnitude)).sum()
}

/// Most recent event cast by `voter_id`.
pub fn last_vote_by(events: &[VoteEvent], voter_id: Uuid) -> Option<&VoteEvent> {
    events.iter().rev().find(|event| event.voter_id == voter_id)
}

/// The voter's current polarity, or `None` if they have not voted.
pub fn polarity(events: &[VoteEvent], voter_id: Uuid) -> Option<Direction> {
    last_vote_by(events, voter_id).map(|event| Direction::of(event.magnitude))
}

/// Number of events `voter_id` has cast on this ledger.
pub fn votes_by(events: &[VoteEvent], voter_id: Uuid) -> usize {
    events.iter().filter(|event| event.voter_id == voter_id).count()
}

/// decide
///
/// Pure transition function: given the ledger and a request, returns the
/// magnitude to append or `RepeatVoteError`.
pub fn decide(events: &[VoteEvent], voter_id: Uuid, direction: Direction) -> Result<i16, AppError> {
    let current = direction.sign();

    let Some(last) = last_vote_by(events, voter_id) else {
        return Ok(current);
    };

    // A replayed flip lands here too: its ±2 already carries the requested polarity.
    if current == last.magnitude.signum() || current * 2 == last.magnitude {
        return Err(AppError::RepeatVoteError);
    }

    Ok(current * 2)
}

/// VoteOutcome
///
/// Result of an accepted vote.
#[derive(Debug, Clone)]
pub struct VoteOutcome {
    pub event: VoteEvent,
    /// Score after the append.
    pub score: i64,
    /// Ledger length after the append.
    pub ledger_len: usize,
}

/// cast_vote
///
/// Reads the ledger, decides, and appends through the repository's conditional
/// append. If another append by the same voter landed in between, the vote
/// fails with `VoteConflict` and nothing is written; if the target was deleted
/// in between, it fails with `NotFound`.
pub async fn cast_vote(
    repo: &dyn Repository,
    target: VoteTarget,
    voter_id: Uuid,
    requested: Option<i64>,
) -> Result<VoteOutcome, AppError> {
    let direction = Direction::from_requested(requested)?;

    let mut events = repo.vote_events(target).await?;

    let magnitude = match decide(&events, voter_id, direction) {
        Ok(magnitude) => magnitude,
        Err(e) => {
            tracing::info!(
                kind = target.kind.as_str(),
                target = %target.id,
                voter = %voter_id,
                "repeat vote rejected"
            );
            return Err(e);
        }
    };
    debug_assert!(is_valid_magnitude(magnitude));

    let guard = VoteGuard {
        voter_sequence: votes_by(&events, voter_id) as i32,
    };
    let event = VoteEvent {
        voter_id,
        magnitude,
        cast_at: Utc::now(),
    };

    match repo.append_vote_event(target, &event, guard).await? {
        AppendOutcome::Appended => {}
        AppendOutcome::Stale => {
            tracing::warn!(
                kind = target.kind.as_str(),
                target = %target.id,
                voter = %voter_id,
                "conditional vote append lost"
            );
            return Err(AppError::VoteConflict);
        }
        AppendOutcome::TargetGone => {
            tracing::info!(
                kind = target.kind.as_str(),
                target = %target.id,
                voter = %voter_id,
                "vote target deleted before the append"
            );
            return Err(AppError::NotFound(target.kind.as_str()));
        }
    }

    events.push(event.clone());
    let score = score(&events);

    tracing::debug!(
        kind = target.kind.as_str(),
        target = %target.id,
        voter = %voter_id,
        magnitude,
        score,
        "vote appended"
    );

    Ok(VoteOutcome {
        event,
        score,
        ledger_len: events.len(),
    })
}
