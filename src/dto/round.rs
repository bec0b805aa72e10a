use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        session::{ItemSummary, PhaseDto, TitleCardDto},
        validation::validate_user_id,
    },
    rules::scoring::SwipeAction,
    services::{
        attrition_service::AttackOutcome,
        barrier::BarrierOutcome,
        rank_service::{PickOutcome, RankGroupView},
        swipe_service::SwipeOutcome,
    },
};

/// Body naming the acting participant.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ParticipantRequest {
    #[validate(custom(function = "validate_user_id"))]
    pub user_id: String,
}

/// Swipe on one title.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SwipeRequest {
    #[validate(custom(function = "validate_user_id"))]
    pub user_id: String,
    pub item_id: Uuid,
    pub action: SwipeAction,
}

/// Give the next rank in a group.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct RankPickRequest {
    #[validate(custom(function = "validate_user_id"))]
    pub user_id: String,
    /// Group index as listed by `GET /sessions/{id}/groups`.
    pub group: usize,
    pub item_id: Uuid,
}

/// Take a life from a finalist.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AttackRequest {
    #[validate(custom(function = "validate_user_id"))]
    pub user_id: String,
    pub item_id: Uuid,
}

/// Query string of `GET /sessions/{id}/groups`.
#[derive(Debug, Deserialize, Validate)]
pub struct ParticipantQuery {
    #[validate(custom(function = "validate_user_id"))]
    pub user_id: String,
}

/// State of the round barrier after a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BarrierState {
    /// Others still have to finish.
    Waiting,
    /// This signal closed the round.
    Advanced,
    /// The round had already been closed.
    AlreadyAdvanced,
}

/// Result of accepting an invite or finishing a round.
#[derive(Debug, Serialize, ToSchema)]
pub struct BarrierResponse {
    pub state: BarrierState,
    /// Phase the session is in now, when it moved on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<PhaseDto>,
    /// Participants still pending.
    pub pending: Vec<String>,
}

impl From<BarrierOutcome> for BarrierResponse {
    fn from(outcome: BarrierOutcome) -> Self {
        match outcome {
            BarrierOutcome::Waiting { pending } => Self {
                state: BarrierState::Waiting,
                phase: None,
                pending,
            },
            BarrierOutcome::Advanced { to } => Self {
                state: BarrierState::Advanced,
                phase: Some(to.into()),
                pending: Vec::new(),
            },
            BarrierOutcome::AlreadyAdvanced { phase } => Self {
                state: BarrierState::AlreadyAdvanced,
                phase: Some(phase.into()),
                pending: Vec::new(),
            },
        }
    }
}

/// Result of a swipe.
#[derive(Debug, Serialize, ToSchema)]
pub struct SwipeResponse {
    pub item: ItemSummary,
    pub delta: i32,
    pub fav_remaining: u8,
    pub skull_remaining: u8,
    /// Titles swiped so far by the caller.
    pub swiped: usize,
}

impl From<SwipeOutcome> for SwipeResponse {
    fn from(outcome: SwipeOutcome) -> Self {
        Self {
            item: outcome.item.into(),
            delta: outcome.delta,
            fav_remaining: outcome.status.fav_remaining,
            skull_remaining: outcome.status.skull_remaining,
            swiped: outcome.status.swiped.len(),
        }
    }
}

/// A rank given to a title.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RankEntry {
    pub item_id: Uuid,
    /// 1 is best.
    pub rank: usize,
}

fn rank_entries(ranks: Vec<(Uuid, usize)>) -> Vec<RankEntry> {
    ranks
        .into_iter()
        .map(|(item_id, rank)| RankEntry { item_id, rank })
        .collect()
}

/// One rank group with the caller's progress.
#[derive(Debug, Serialize, ToSchema)]
pub struct RankGroupDto {
    pub index: usize,
    pub members: Vec<TitleCardDto>,
    pub committed: bool,
    /// In-progress ranks on this group.
    pub picks: Vec<RankEntry>,
}

impl From<RankGroupView> for RankGroupDto {
    fn from(view: RankGroupView) -> Self {
        Self {
            index: view.index,
            members: view.members.into_iter().map(Into::into).collect(),
            committed: view.committed,
            picks: rank_entries(view.picks),
        }
    }
}

/// Result of a rank pick.
#[derive(Debug, Serialize, ToSchema)]
pub struct RankPickResponse {
    pub group: usize,
    /// True once the fourth pick scored the group.
    pub committed: bool,
    /// Ranks given so far; empty once committed.
    pub ranks: Vec<RankEntry>,
    /// Scored titles; empty until committed.
    pub items: Vec<ItemSummary>,
}

impl From<PickOutcome> for RankPickResponse {
    fn from(outcome: PickOutcome) -> Self {
        match outcome {
            PickOutcome::Pending { group, ranks } => Self {
                group,
                committed: false,
                ranks: rank_entries(ranks),
                items: Vec::new(),
            },
            PickOutcome::Committed { group, items } => Self {
                group,
                committed: true,
                ranks: Vec::new(),
                items: items.into_iter().map(Into::into).collect(),
            },
        }
    }
}

/// Result of clearing in-progress ranks.
#[derive(Debug, Serialize, ToSchema)]
pub struct RankResetResponse {
    /// Group whose picks were cleared, if one was in progress.
    pub group: Option<usize>,
}

/// Result of an attack.
#[derive(Debug, Serialize, ToSchema)]
pub struct AttackResponse {
    pub item: ItemSummary,
    pub next_turn: String,
    pub phase: PhaseDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<ItemSummary>,
}

impl From<AttackOutcome> for AttackResponse {
    fn from(outcome: AttackOutcome) -> Self {
        Self {
            item: outcome.item.into(),
            next_turn: outcome.next_turn,
            phase: outcome.phase.into(),
            winner: outcome.winner.map(Into::into),
        }
    }
}
