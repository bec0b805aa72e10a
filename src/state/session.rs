use std::{collections::BTreeSet, time::SystemTime};

use indexmap::IndexSet;
use uuid::Uuid;

use crate::{
    dao::models::{ItemEntity, SessionEntity, StatusEntity},
    error::ServiceError,
    rules::scoring::{FAV_ALLOWANCE, SKULL_ALLOWANCE},
    state::state_machine::SessionPhase,
};

/// Aggregate root of a picking session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Session identifier.
    pub id: Uuid,
    /// Creator of the session, first in the turn order.
    pub owner_id: String,
    /// Invited participants in invitation order.
    pub guest_ids: Vec<String>,
    /// Current round.
    pub phase: SessionPhase,
    /// Participant allowed to attack; meaningful during attrition.
    pub current_turn: Option<String>,
    /// Alive titles in pool order.
    pub item_refs: Vec<Uuid>,
    /// Winning title, set on completion.
    pub winner_id: Option<Uuid>,
    /// Revision of the persisted record this value was read from.
    pub revision: u64,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last write timestamp.
    pub updated_at: SystemTime,
}

impl Session {
    /// Build a fresh session in the invite round with the turn on the owner.
    pub fn new(owner_id: String, guest_ids: Vec<String>) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            current_turn: Some(owner_id.clone()),
            owner_id,
            guest_ids,
            phase: SessionPhase::Invite,
            item_refs: Vec::new(),
            winner_id: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Owner followed by the guests; the order never changes.
    pub fn participants(&self) -> Vec<String> {
        std::iter::once(self.owner_id.clone())
            .chain(self.guest_ids.iter().cloned())
            .collect()
    }

    /// Whether `user_id` takes part in the session.
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.owner_id == user_id || self.guest_ids.iter().any(|guest| guest == user_id)
    }
}

impl TryFrom<SessionEntity> for Session {
    type Error = ServiceError;

    fn try_from(entity: SessionEntity) -> Result<Self, Self::Error> {
        let phase = SessionPhase::from_ordinal(entity.step).ok_or_else(|| {
            ServiceError::InvalidSession(format!(
                "session `{}` has unknown step {}",
                entity.id, entity.step
            ))
        })?;
        Ok(Self {
            id: entity.id,
            owner_id: entity.owner_id,
            guest_ids: entity.guest_ids,
            phase,
            current_turn: entity.current_turn,
            item_refs: entity.item_refs,
            winner_id: entity.winner_id,
            revision: entity.revision,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}

impl From<Session> for SessionEntity {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            owner_id: session.owner_id,
            guest_ids: session.guest_ids,
            step: session.phase.ordinal(),
            current_turn: session.current_turn,
            item_refs: session.item_refs,
            winner_id: session.winner_id,
            revision: session.revision,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

/// A title in the candidate pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateItem {
    /// Title identifier, unique per session.
    pub id: Uuid,
    /// Owning session.
    pub session_id: Uuid,
    /// Identifier in the metadata catalog.
    pub catalog_id: u64,
    /// Shared accumulated score.
    pub score: i32,
    /// Lives left in attrition; zero means eliminated.
    pub lives: u8,
}

impl CandidateItem {
    /// New title with a neutral score and no lives yet.
    pub fn new(session_id: Uuid, catalog_id: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            catalog_id,
            score: 0,
            lives: 0,
        }
    }

    /// Whether the title still has lives left.
    pub fn is_alive(&self) -> bool {
        self.lives > 0
    }
}

impl From<ItemEntity> for CandidateItem {
    fn from(entity: ItemEntity) -> Self {
        Self {
            id: entity.id,
            session_id: entity.session_id,
            catalog_id: entity.catalog_id,
            score: entity.score,
            lives: entity.lives,
        }
    }
}

impl From<CandidateItem> for ItemEntity {
    fn from(item: CandidateItem) -> Self {
        Self {
            id: item.id,
            session_id: item.session_id,
            catalog_id: item.catalog_id,
            score: item.score,
            lives: item.lives,
        }
    }
}

/// Per-participant, per-session round bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantStatus {
    /// Owning session.
    pub session_id: Uuid,
    /// Participant.
    pub user_id: String,
    /// Invitation accepted.
    pub invited: bool,
    /// Swipe round finished.
    pub swipe_done: bool,
    /// Rank round finished.
    pub rank_done: bool,
    /// Attrition round closed.
    pub attrition_done: bool,
    /// Fav power-ups left; never below zero.
    pub fav_remaining: u8,
    /// Skull power-ups left; never below zero.
    pub skull_remaining: u8,
    /// Titles swiped so far.
    pub swiped: IndexSet<Uuid>,
    /// Rank groups committed so far.
    pub ranked_groups: BTreeSet<usize>,
    /// Revision of the persisted record this value was read from.
    pub revision: u64,
}

impl ParticipantStatus {
    /// Fresh status with the full power-up allowance.
    pub fn new(session_id: Uuid, user_id: String, invited: bool) -> Self {
        Self {
            session_id,
            user_id,
            invited,
            swipe_done: false,
            rank_done: false,
            attrition_done: false,
            fav_remaining: FAV_ALLOWANCE,
            skull_remaining: SKULL_ALLOWANCE,
            swiped: IndexSet::new(),
            ranked_groups: BTreeSet::new(),
            revision: 0,
        }
    }

    /// Completion flag guarding the exit of `phase`. A complete session has no barrier.
    pub fn flag(&self, phase: SessionPhase) -> bool {
        match phase {
            SessionPhase::Invite => self.invited,
            SessionPhase::Swipe => self.swipe_done,
            SessionPhase::Rank => self.rank_done,
            SessionPhase::Attrition => self.attrition_done,
            SessionPhase::Complete => true,
        }
    }

    /// Raise the completion flag of `phase`.
    pub fn set_flag(&mut self, phase: SessionPhase) {
        match phase {
            SessionPhase::Invite => self.invited = true,
            SessionPhase::Swipe => self.swipe_done = true,
            SessionPhase::Rank => self.rank_done = true,
            SessionPhase::Attrition => self.attrition_done = true,
            SessionPhase::Complete => {}
        }
    }
}

impl From<StatusEntity> for ParticipantStatus {
    fn from(entity: StatusEntity) -> Self {
        Self {
            session_id: entity.session_id,
            user_id: entity.user_id,
            invited: entity.invited,
            swipe_done: entity.swipe_done,
            rank_done: entity.rank_done,
            attrition_done: entity.attrition_done,
            fav_remaining: entity.fav_remaining,
            skull_remaining: entity.skull_remaining,
            swiped: entity.swiped.into_iter().collect(),
            ranked_groups: entity.ranked_groups.into_iter().collect(),
            revision: entity.revision,
        }
    }
}

impl From<ParticipantStatus> for StatusEntity {
    fn from(status: ParticipantStatus) -> Self {
        Self {
            session_id: status.session_id,
            user_id: status.user_id,
            invited: status.invited,
            swipe_done: status.swipe_done,
            rank_done: status.rank_done,
            attrition_done: status.attrition_done,
            fav_remaining: status.fav_remaining,
            skull_remaining: status.skull_remaining,
            swiped: status.swiped.into_iter().collect(),
            ranked_groups: status.ranked_groups.into_iter().collect(),
            revision: status.revision,
        }
    }
}
