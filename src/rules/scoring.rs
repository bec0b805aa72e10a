//! Score deltas produced by swipe and rank actions.
//!
//! Everything here works on an in-memory copy of a participant's status; callers
//! persist the mutated copy in a single store write.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::session::ParticipantStatus;

/// Number of titles ranked against each other in one rank group.
pub const GROUP_SIZE: usize = 4;
/// Fav power-ups granted to each participant per session.
pub const FAV_ALLOWANCE: u8 = 2;
/// Skull power-ups granted to each participant per session.
pub const SKULL_ALLOWANCE: u8 = 1;

/// Verdict a participant gives a title during the swipe round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SwipeAction {
    /// Not interested.
    Reject,
    /// Interested.
    Accept,
    /// Strong preference, spends a fav power-up.
    Fav,
    /// Veto, spends a skull power-up.
    Skull,
}

impl SwipeAction {
    /// Score added to the title.
    pub fn score_delta(self) -> i32 {
        match self {
            SwipeAction::Reject => 0,
            SwipeAction::Accept => 1,
            SwipeAction::Fav => 3,
            SwipeAction::Skull => -5,
        }
    }

    /// Power-up consumed by the action, if any.
    pub fn power_up(self) -> Option<PowerUp> {
        match self {
            SwipeAction::Fav => Some(PowerUp::Fav),
            SwipeAction::Skull => Some(PowerUp::Skull),
            SwipeAction::Reject | SwipeAction::Accept => None,
        }
    }
}

/// Limited-use swipe boosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerUp {
    /// +3 boost.
    Fav,
    /// -5 veto.
    Skull,
}

impl fmt::Display for PowerUp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerUp::Fav => f.write_str("fav"),
            PowerUp::Skull => f.write_str("skull"),
        }
    }
}

/// Rejections raised while scoring an action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoringError {
    /// The power-up counter is already at zero.
    #[error("no {0} power-up left")]
    PowerUpExhausted(PowerUp),
    /// The participant already acted on this title in this round.
    #[error("title `{item_id}` already received an action from this participant")]
    DuplicateAction {
        /// Title acted upon twice.
        item_id: Uuid,
    },
    /// The participant already committed this rank group.
    #[error("rank group {group} already committed")]
    GroupAlreadyRanked {
        /// Index of the group.
        group: usize,
    },
    /// The title is not part of the group being ranked.
    #[error("title `{item_id}` is not part of rank group {group}")]
    NotInGroup {
        /// Title picked.
        item_id: Uuid,
        /// Group being ranked.
        group: usize,
    },
    /// A full ranking did not name every member of the group exactly once.
    #[error("rank group {group} needs {GROUP_SIZE} distinct titles")]
    IncompleteGroup {
        /// Group being ranked.
        group: usize,
    },
}

/// Record a swipe on the participant's status and return the score delta for the title.
///
/// The status is left untouched when the action is rejected.
pub fn apply_swipe(
    status: &mut ParticipantStatus,
    item_id: Uuid,
    action: SwipeAction,
) -> Result<i32, ScoringError> {
    if status.swiped.contains(&item_id) {
        return Err(ScoringError::DuplicateAction { item_id });
    }

    match action.power_up() {
        Some(PowerUp::Fav) => {
            status.fav_remaining = status
                .fav_remaining
                .checked_sub(1)
                .ok_or(ScoringError::PowerUpExhausted(PowerUp::Fav))?;
        }
        Some(PowerUp::Skull) => {
            status.skull_remaining = status
                .skull_remaining
                .checked_sub(1)
                .ok_or(ScoringError::PowerUpExhausted(PowerUp::Skull))?;
        }
        None => {}
    }

    status.swiped.insert(item_id);
    Ok(action.score_delta())
}

/// Score awarded for a 1-based rank inside a group: 1 → 4, 2 → 3, 3 → 2, 4 → 1.
pub fn rank_points(rank: usize) -> i32 {
    debug_assert!((1..=GROUP_SIZE).contains(&rank));
    (GROUP_SIZE + 1 - rank) as i32
}

/// Partition the pool into consecutive rank groups. Leftover titles are not ranked.
pub fn rank_groups(pool: &[Uuid]) -> Vec<Vec<Uuid>> {
    pool.chunks_exact(GROUP_SIZE).map(<[Uuid]>::to_vec).collect()
}

/// Score deltas for a group given in pick order (first pick is rank 1).
pub fn score_ranking(
    group: usize,
    members: &[Uuid],
    ordered: &[Uuid],
) -> Result<Vec<(Uuid, i32)>, ScoringError> {
    if ordered.len() != GROUP_SIZE || members.len() != GROUP_SIZE {
        return Err(ScoringError::IncompleteGroup { group });
    }
    for (position, item_id) in ordered.iter().enumerate() {
        if !members.contains(item_id) {
            return Err(ScoringError::NotInGroup {
                item_id: *item_id,
                group,
            });
        }
        if ordered[..position].contains(item_id) {
            return Err(ScoringError::IncompleteGroup { group });
        }
    }

    Ok(ordered
        .iter()
        .enumerate()
        .map(|(position, item_id)| (*item_id, rank_points(position + 1)))
        .collect())
}

/// Mark a rank group as committed for the participant.
pub fn commit_group(status: &mut ParticipantStatus, group: usize) -> Result<(), ScoringError> {
    if !status.ranked_groups.insert(group) {
        return Err(ScoringError::GroupAlreadyRanked { group });
    }
    Ok(())
}

/// Result of a single pick on a [`RankBoard`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankPick {
    /// The title received `rank`; the group still has unranked titles.
    Pending {
        /// Rank assigned to the title.
        rank: usize,
    },
    /// The last title was ranked; the deltas are ready to commit.
    Complete {
        /// Score delta per title.
        deltas: Vec<(Uuid, i32)>,
    },
}

/// In-progress ranking of one group by one participant.
///
/// Nothing on the board is scored until every member has been picked.
#[derive(Debug, Clone)]
pub struct RankBoard {
    group: usize,
    members: Vec<Uuid>,
    picks: Vec<Uuid>,
}

impl RankBoard {
    /// Start an empty board for `members` of group `group`.
    pub fn new(group: usize, members: Vec<Uuid>) -> Self {
        Self {
            group,
            members,
            picks: Vec::with_capacity(GROUP_SIZE),
        }
    }

    /// Group being ranked.
    pub fn group(&self) -> usize {
        self.group
    }

    /// Titles picked so far with their 1-based ranks.
    pub fn ranks(&self) -> Vec<(Uuid, usize)> {
        self.picks
            .iter()
            .enumerate()
            .map(|(position, item_id)| (*item_id, position + 1))
            .collect()
    }

    /// Give the next rank to `item_id`.
    pub fn pick(&mut self, item_id: Uuid) -> Result<RankPick, ScoringError> {
        if !self.members.contains(&item_id) {
            return Err(ScoringError::NotInGroup {
                item_id,
                group: self.group,
            });
        }
        if self.picks.contains(&item_id) {
            return Err(ScoringError::DuplicateAction { item_id });
        }

        self.picks.push(item_id);
        if self.picks.len() < self.members.len() {
            return Ok(RankPick::Pending {
                rank: self.picks.len(),
            });
        }

        let deltas = score_ranking(self.group, &self.members, &self.picks)?;
        Ok(RankPick::Complete { deltas })
    }

    /// Drop every in-progress pick.
    pub fn reset(&mut self) {
        self.picks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> ParticipantStatus {
        ParticipantStatus::new(Uuid::new_v4(), "alice".into(), false)
    }

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn swipe_deltas() {
        assert_eq!(SwipeAction::Reject.score_delta(), 0);
        assert_eq!(SwipeAction::Accept.score_delta(), 1);
        assert_eq!(SwipeAction::Fav.score_delta(), 3);
        assert_eq!(SwipeAction::Skull.score_delta(), -5);
    }

    #[test]
    fn fav_is_rejected_once_exhausted() {
        let mut status = status();
        let items = ids(3);

        assert_eq!(apply_swipe(&mut status, items[0], SwipeAction::Fav), Ok(3));
        assert_eq!(apply_swipe(&mut status, items[1], SwipeAction::Fav), Ok(3));
        assert_eq!(status.fav_remaining, 0);

        let err = apply_swipe(&mut status, items[2], SwipeAction::Fav).unwrap_err();
        assert_eq!(err, ScoringError::PowerUpExhausted(PowerUp::Fav));
        assert_eq!(status.fav_remaining, 0);
        assert!(!status.swiped.contains(&items[2]));
    }

    #[test]
    fn skull_is_single_use() {
        let mut status = status();
        let items = ids(2);

        assert_eq!(apply_swipe(&mut status, items[0], SwipeAction::Skull), Ok(-5));
        assert_eq!(
            apply_swipe(&mut status, items[1], SwipeAction::Skull),
            Err(ScoringError::PowerUpExhausted(PowerUp::Skull))
        );
        // A plain swipe on the same title still goes through.
        assert_eq!(apply_swipe(&mut status, items[1], SwipeAction::Accept), Ok(1));
    }

    #[test]
    fn second_swipe_on_same_title_is_duplicate() {
        let mut status = status();
        let item = Uuid::new_v4();

        apply_swipe(&mut status, item, SwipeAction::Accept).unwrap();
        let err = apply_swipe(&mut status, item, SwipeAction::Fav).unwrap_err();
        assert_eq!(err, ScoringError::DuplicateAction { item_id: item });
        assert_eq!(status.fav_remaining, FAV_ALLOWANCE);
    }

    #[test]
    fn rank_points_descend() {
        let points: Vec<i32> = (1..=4).map(rank_points).collect();
        assert_eq!(points, vec![4, 3, 2, 1]);
    }

    #[test]
    fn groups_drop_leftovers() {
        let pool = ids(10);
        let groups = rank_groups(&pool);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1], pool[4..8].to_vec());
    }

    #[test]
    fn board_commits_only_when_full() {
        let members = ids(4);
        let mut board = RankBoard::new(0, members.clone());

        assert_eq!(board.pick(members[2]), Ok(RankPick::Pending { rank: 1 }));
        assert_eq!(board.pick(members[0]), Ok(RankPick::Pending { rank: 2 }));
        assert_eq!(board.pick(members[3]), Ok(RankPick::Pending { rank: 3 }));

        match board.pick(members[1]).unwrap() {
            RankPick::Complete { deltas } => assert_eq!(
                deltas,
                vec![
                    (members[2], 4),
                    (members[0], 3),
                    (members[3], 2),
                    (members[1], 1)
                ]
            ),
            other => panic!("expected complete board, got {other:?}"),
        }
    }

    #[test]
    fn reset_clears_in_progress_picks() {
        let members = ids(4);
        let mut board = RankBoard::new(1, members.clone());
        board.pick(members[0]).unwrap();
        board.pick(members[1]).unwrap();

        board.reset();
        assert!(board.ranks().is_empty());
        assert_eq!(board.pick(members[1]), Ok(RankPick::Pending { rank: 1 }));
    }

    #[test]
    fn board_rejects_foreign_and_repeated_picks() {
        let members = ids(4);
        let stranger = Uuid::new_v4();
        let mut board = RankBoard::new(3, members.clone());

        assert_eq!(
            board.pick(stranger),
            Err(ScoringError::NotInGroup {
                item_id: stranger,
                group: 3
            })
        );
        board.pick(members[0]).unwrap();
        assert_eq!(
            board.pick(members[0]),
            Err(ScoringError::DuplicateAction {
                item_id: members[0]
            })
        );
    }

    #[test]
    fn full_ranking_must_cover_group() {
        let members = ids(4);
        let repeated = vec![members[0], members[0], members[1], members[2]];
        assert_eq!(
            score_ranking(0, &members, &repeated),
            Err(ScoringError::IncompleteGroup { group: 0 })
        );
        assert_eq!(
            score_ranking(0, &members, &members[..3]),
            Err(ScoringError::IncompleteGroup { group: 0 })
        );
    }

    #[test]
    fn group_commits_once() {
        let mut status = status();
        assert!(commit_group(&mut status, 1).is_ok());
        assert_eq!(
            commit_group(&mut status, 1),
            Err(ScoringError::GroupAlreadyRanked { group: 1 })
        );
    }
}
