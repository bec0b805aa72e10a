use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::metadata::MovieDetails,
    dto::{
        format_system_time,
        validation::{validate_user_id, validate_user_ids},
    },
    services::session_service::{PoolOutcome, SessionDetails, TitleCard},
    state::{
        session::{CandidateItem, ParticipantStatus, Session},
        state_machine::SessionPhase,
    },
};

/// Payload creating a session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateSessionRequest {
    /// Creator, first in the turn order.
    #[validate(custom(function = "validate_user_id"))]
    pub owner_id: String,
    /// Invited participants in turn order. Duplicates and the owner are ignored.
    #[serde(default)]
    #[validate(length(max = 16), custom(function = "validate_user_ids"))]
    pub guest_ids: Vec<String>,
}

/// Payload filling the candidate pool.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PopulatePoolRequest {
    /// Caller; must be the owner.
    #[validate(custom(function = "validate_user_id"))]
    pub user_id: String,
    /// Catalog ids offered. Larger lists are sampled down to the configured maximum.
    #[validate(length(min = 2, max = 1000))]
    pub catalog_ids: Vec<u64>,
}

/// Round of a session as exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PhaseDto {
    /// Accepting invitations.
    Invite,
    /// Swiping titles.
    Swipe,
    /// Ranking groups.
    Rank,
    /// Taking turns eliminating titles.
    Attrition,
    /// Winner known.
    Complete,
}

impl From<SessionPhase> for PhaseDto {
    fn from(phase: SessionPhase) -> Self {
        match phase {
            SessionPhase::Invite => PhaseDto::Invite,
            SessionPhase::Swipe => PhaseDto::Swipe,
            SessionPhase::Rank => PhaseDto::Rank,
            SessionPhase::Attrition => PhaseDto::Attrition,
            SessionPhase::Complete => PhaseDto::Complete,
        }
    }
}

/// Session record.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSummary {
    pub id: Uuid,
    pub owner_id: String,
    pub guest_ids: Vec<String>,
    pub phase: PhaseDto,
    pub current_turn: Option<String>,
    /// Titles still in the pool, in pool order.
    pub item_refs: Vec<Uuid>,
    pub winner_id: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Session> for SessionSummary {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            owner_id: session.owner_id,
            guest_ids: session.guest_ids,
            phase: session.phase.into(),
            current_turn: session.current_turn,
            item_refs: session.item_refs,
            winner_id: session.winner_id,
            created_at: format_system_time(session.created_at),
            updated_at: format_system_time(session.updated_at),
        }
    }
}

/// Candidate title.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ItemSummary {
    pub id: Uuid,
    pub catalog_id: u64,
    pub score: i32,
    pub lives: u8,
}

impl From<CandidateItem> for ItemSummary {
    fn from(item: CandidateItem) -> Self {
        Self {
            id: item.id,
            catalog_id: item.catalog_id,
            score: item.score,
            lives: item.lives,
        }
    }
}

/// Progress of one participant.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusSummary {
    pub user_id: String,
    pub invited: bool,
    pub swipe_done: bool,
    pub rank_done: bool,
    pub attrition_done: bool,
    pub fav_remaining: u8,
    pub skull_remaining: u8,
    /// Titles swiped so far.
    pub swiped: usize,
    /// Rank groups committed so far.
    pub ranked_groups: Vec<usize>,
}

impl From<ParticipantStatus> for StatusSummary {
    fn from(status: ParticipantStatus) -> Self {
        Self {
            swiped: status.swiped.len(),
            ranked_groups: status.ranked_groups.into_iter().collect(),
            user_id: status.user_id,
            invited: status.invited,
            swipe_done: status.swipe_done,
            rank_done: status.rank_done,
            attrition_done: status.attrition_done,
            fav_remaining: status.fav_remaining,
            skull_remaining: status.skull_remaining,
        }
    }
}

/// Session with its pool and participant progress.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionDetailsResponse {
    pub session: SessionSummary,
    pub items: Vec<ItemSummary>,
    pub statuses: Vec<StatusSummary>,
}

impl From<SessionDetails> for SessionDetailsResponse {
    fn from(details: SessionDetails) -> Self {
        Self {
            session: details.session.into(),
            items: details.items.into_iter().map(Into::into).collect(),
            statuses: details.statuses.into_iter().map(Into::into).collect(),
        }
    }
}

/// Titles created by a pool fill.
#[derive(Debug, Serialize, ToSchema)]
pub struct PoolResponse {
    pub items: Vec<ItemSummary>,
    /// `swipe` when every invitation was already accepted.
    pub phase: PhaseDto,
}

impl From<PoolOutcome> for PoolResponse {
    fn from(outcome: PoolOutcome) -> Self {
        Self {
            items: outcome.items.into_iter().map(Into::into).collect(),
            phase: outcome.phase.into(),
        }
    }
}

/// Provider metadata of a title.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MovieDto {
    pub title: String,
    pub overview: String,
    pub poster_url: Option<String>,
    pub genres: Vec<String>,
    pub vote_average: f32,
    /// True when the provider could not describe the title.
    pub placeholder: bool,
}

impl From<MovieDetails> for MovieDto {
    fn from(details: MovieDetails) -> Self {
        Self {
            placeholder: details.is_placeholder(),
            title: details.title,
            overview: details.overview,
            poster_url: details.poster_url,
            genres: details.genres,
            vote_average: details.vote_average,
        }
    }
}

/// Title with its metadata.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TitleCardDto {
    pub item: ItemSummary,
    pub movie: MovieDto,
}

impl From<TitleCard> for TitleCardDto {
    fn from(card: TitleCard) -> Self {
        Self {
            item: card.item.into(),
            movie: card.details.into(),
        }
    }
}
