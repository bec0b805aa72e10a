use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Aggregate session record persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Primary key of the session.
    pub id: Uuid,
    /// Participant who created the session.
    pub owner_id: String,
    /// Invited participants, in invitation order.
    pub guest_ids: Vec<String>,
    /// Phase ordinal (0 = invite ... 4 = complete).
    pub step: u8,
    /// Participant allowed to attack during attrition.
    pub current_turn: Option<String>,
    /// Titles still alive in the pool, in pool order.
    pub item_refs: Vec<Uuid>,
    /// Winning title once the session is complete.
    pub winner_id: Option<Uuid>,
    /// Optimistic concurrency counter, bumped on every write.
    pub revision: u64,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last time the session record was written.
    pub updated_at: SystemTime,
}

/// Candidate title record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemEntity {
    /// Primary key, unique per session.
    pub id: Uuid,
    /// Owning session.
    pub session_id: Uuid,
    /// Identifier in the movie metadata catalog.
    pub catalog_id: u64,
    /// Accumulated score from the swipe and rank rounds.
    pub score: i32,
    /// Lives left during attrition.
    pub lives: u8,
}

/// Per-participant round bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusEntity {
    /// Owning session.
    pub session_id: Uuid,
    /// Participant the record belongs to.
    pub user_id: String,
    /// Invitation accepted.
    pub invited: bool,
    /// Swipe round finished.
    pub swipe_done: bool,
    /// Rank round finished.
    pub rank_done: bool,
    /// Attrition round closed.
    pub attrition_done: bool,
    /// Fav power-ups left.
    pub fav_remaining: u8,
    /// Skull power-ups left.
    pub skull_remaining: u8,
    /// Titles already swiped, in swipe order.
    pub swiped: Vec<Uuid>,
    /// Rank groups already committed.
    pub ranked_groups: Vec<usize>,
    /// Optimistic concurrency counter, bumped on every write.
    pub revision: u64,
}
