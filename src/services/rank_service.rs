use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::session_store::SessionStore,
    error::ServiceError,
    rules::scoring::{RankBoard, RankPick, ScoringError, commit_group, rank_groups},
    services::{
        feed_events,
        session_service::{
            TitleCard, ensure_participant, ensure_phase, load_pool, load_session, load_status,
            mutate_status, with_details,
        },
    },
    state::{
        SharedState, feed::ChangeKind, session::CandidateItem, state_machine::SessionPhase,
    },
};

/// One rank group as seen by a participant.
#[derive(Debug, Clone)]
pub struct RankGroupView {
    /// Position of the group in the pool.
    pub index: usize,
    /// Members with metadata, in pool order.
    pub members: Vec<TitleCard>,
    /// Whether the participant already committed this group.
    pub committed: bool,
    /// In-progress ranks `(title, rank)` of the participant, if this group is on their board.
    pub picks: Vec<(Uuid, usize)>,
}

/// Result of a rank pick.
#[derive(Debug, Clone)]
pub enum PickOutcome {
    /// The group still has unranked titles.
    Pending {
        /// Group being ranked.
        group: usize,
        /// Ranks given so far.
        ranks: Vec<(Uuid, usize)>,
    },
    /// The fourth pick committed the group and scored its titles.
    Committed {
        /// Group committed.
        group: usize,
        /// Titles after their scores were adjusted.
        items: Vec<CandidateItem>,
    },
}

/// Rank groups of the session with the caller's progress.
pub async fn groups(
    state: &SharedState,
    session_id: Uuid,
    user_id: &str,
) -> Result<Vec<RankGroupView>, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(&store, session_id).await?;
    ensure_participant(&session, user_id)?;
    ensure_phase(&session, SessionPhase::Rank)?;

    let status = load_status(&store, session_id, user_id).await?;
    let board = state
        .rank_boards()
        .get(&(session_id, user_id.to_owned()))
        .map(|board| (board.group(), board.ranks()));

    let cards = with_details(state, load_pool(&store, &session).await?).await;
    let mut views = Vec::new();
    for (index, members) in rank_groups(&session.item_refs).into_iter().enumerate() {
        let members: Vec<TitleCard> = members
            .iter()
            .filter_map(|id| cards.iter().find(|card| card.item.id == *id).cloned())
            .collect();
        let picks = match &board {
            Some((group, ranks)) if *group == index => ranks.clone(),
            _ => Vec::new(),
        };
        views.push(RankGroupView {
            index,
            members,
            committed: status.ranked_groups.contains(&index),
            picks,
        });
    }
    Ok(views)
}

/// Give the next rank in `group` to `item_id`.
///
/// Picks stay on an in-memory board until all four titles are ranked; the group is then
/// committed on the participant's status and the scores are applied. Switching to
/// another group discards the unfinished board.
pub async fn pick(
    state: &SharedState,
    session_id: Uuid,
    user_id: &str,
    group: usize,
    item_id: Uuid,
) -> Result<PickOutcome, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(&store, session_id).await?;
    ensure_participant(&session, user_id)?;
    ensure_phase(&session, SessionPhase::Rank)?;

    let members = rank_groups(&session.item_refs)
        .into_iter()
        .nth(group)
        .ok_or_else(|| ServiceError::InvalidInput(format!("rank group {group} does not exist")))?;

    let status = load_status(&store, session_id, user_id).await?;
    if status.rank_done {
        return Err(ServiceError::AlreadySignaled {
            phase: SessionPhase::Rank,
        });
    }
    if status.ranked_groups.contains(&group) {
        return Err(ScoringError::GroupAlreadyRanked { group }.into());
    }

    let key = (session_id, user_id.to_owned());
    let (picked, ranks) = {
        let mut board = state
            .rank_boards()
            .entry(key.clone())
            .or_insert_with(|| RankBoard::new(group, members.clone()));
        if board.group() != group {
            debug!(session_id = %session_id, user_id, from = board.group(), to = group, "switching rank group");
            *board = RankBoard::new(group, members.clone());
        }
        let picked = board.pick(item_id);
        (picked, board.ranks())
    };

    let deltas = match picked? {
        RankPick::Pending { rank } => {
            debug!(session_id = %session_id, user_id, group, item_id = %item_id, rank, "rank picked");
            return Ok(PickOutcome::Pending { group, ranks });
        }
        RankPick::Complete { deltas } => deltas,
    };

    let committed = mutate_status(&store, session_id, user_id, |status| {
        if status.rank_done {
            return Err(ServiceError::AlreadySignaled {
                phase: SessionPhase::Rank,
            });
        }
        Ok(commit_group(status, group)?)
    })
    .await;
    let (status, ()) = match committed {
        Ok(committed) => committed,
        Err(err) => {
            drop_board(state, &key, group);
            return Err(err);
        }
    };

    let items = match apply_deltas(&store, &deltas).await {
        Ok(items) => items,
        Err(err) => {
            drop_board(state, &key, group);
            uncommit_group(&store, session_id, user_id, group).await;
            return Err(err);
        }
    };
    drop_board(state, &key, group);

    debug!(session_id = %session_id, user_id, group, "rank group committed");
    for item in &items {
        feed_events::publish_item(state, ChangeKind::Update, item);
    }
    feed_events::publish_status(state, ChangeKind::Update, &status);

    Ok(PickOutcome::Committed { group, items })
}

/// Clear the in-progress ranks of the caller's current group. Returns the group reset, if any.
pub async fn reset(
    state: &SharedState,
    session_id: Uuid,
    user_id: &str,
) -> Result<Option<usize>, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(&store, session_id).await?;
    ensure_participant(&session, user_id)?;
    ensure_phase(&session, SessionPhase::Rank)?;

    let reset = state
        .rank_boards()
        .get_mut(&(session_id, user_id.to_owned()))
        .map(|mut board| {
            board.reset();
            board.group()
        });
    Ok(reset)
}

/// Add every delta; on failure subtract the ones already added.
async fn apply_deltas(
    store: &Arc<dyn SessionStore>,
    deltas: &[(Uuid, i32)],
) -> Result<Vec<CandidateItem>, ServiceError> {
    let mut items = Vec::with_capacity(deltas.len());
    for (position, (item_id, delta)) in deltas.iter().enumerate() {
        let failure = match store.adjust_item_score(*item_id, *delta).await {
            Ok(Some(item)) => {
                items.push(CandidateItem::from(item));
                continue;
            }
            Ok(None) => ServiceError::NotFound(format!("title `{item_id}`")),
            Err(err) => err.into(),
        };

        for (applied, delta) in &deltas[..position] {
            if let Err(err) = store.adjust_item_score(*applied, -delta).await {
                warn!(item_id = %applied, error = %err, "failed to revert rank score");
            }
        }
        return Err(failure);
    }
    Ok(items)
}

async fn uncommit_group(store: &Arc<dyn SessionStore>, session_id: Uuid, user_id: &str, group: usize) {
    let reverted = mutate_status(store, session_id, user_id, |status| {
        status.ranked_groups.remove(&group);
        Ok(())
    })
    .await;
    if let Err(err) = reverted {
        warn!(session_id = %session_id, user_id, group, error = %err, "failed to revert rank commit");
    }
}

fn drop_board(state: &SharedState, key: &(Uuid, String), group: usize) {
    state
        .rank_boards()
        .remove_if(key, |_, board| board.group() == group);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{metadata::PlaceholderMetadata, session_store::memory::MemorySessionStore},
        rules::scoring::SwipeAction,
        services::{
            barrier::{BarrierOutcome, accept_invite, signal_done},
            session_service::{create_session, populate_pool},
            swipe_service::swipe,
        },
        state::AppState,
    };

    /// Solo session with a nine-title pool in the rank round: two groups and a leftover.
    async fn ranking_session() -> (SharedState, Uuid, Vec<Vec<Uuid>>) {
        let state = AppState::new(AppConfig::default(), Arc::new(PlaceholderMetadata));
        state
            .install_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        let id = create_session(&state, "solo".into(), Vec::new())
            .await
            .unwrap()
            .session
            .id;
        let pool = populate_pool(&state, id, "solo", (1..=9).collect())
            .await
            .unwrap();
        assert_eq!(pool.phase, SessionPhase::Swipe);
        for item in &pool.items {
            swipe(&state, id, "solo", item.id, SwipeAction::Accept)
                .await
                .unwrap();
        }
        assert_eq!(
            signal_done(&state, id, "solo").await.unwrap(),
            BarrierOutcome::Advanced {
                to: SessionPhase::Rank
            }
        );
        let refs: Vec<Uuid> = pool.items.iter().map(|item| item.id).collect();
        (state, id, rank_groups(&refs))
    }

    #[tokio::test]
    async fn fourth_pick_commits_and_scores() {
        let (state, id, groups) = ranking_session().await;
        let group = &groups[0];

        for (n, item) in group.iter().take(3).enumerate() {
            match pick(&state, id, "solo", 0, *item).await.unwrap() {
                PickOutcome::Pending { ranks, .. } => assert_eq!(ranks.len(), n + 1),
                other => panic!("unexpected {other:?}"),
            }
        }
        let PickOutcome::Committed { items, .. } =
            pick(&state, id, "solo", 0, group[3]).await.unwrap()
        else {
            panic!("group should be committed");
        };
        let scores: Vec<i32> = items.iter().map(|item| item.score).collect();
        assert_eq!(scores, vec![5, 4, 3, 2]);

        assert!(matches!(
            pick(&state, id, "solo", 0, group[0]).await,
            Err(ServiceError::DuplicateAction(_))
        ));
    }

    #[tokio::test]
    async fn reset_and_group_switch_discard_picks() {
        let (state, id, groups) = ranking_session().await;

        pick(&state, id, "solo", 0, groups[0][0]).await.unwrap();
        assert_eq!(reset(&state, id, "solo").await.unwrap(), Some(0));
        let PickOutcome::Pending { ranks, .. } =
            pick(&state, id, "solo", 0, groups[0][0]).await.unwrap()
        else {
            panic!("expected pending");
        };
        assert_eq!(ranks, vec![(groups[0][0], 1)]);

        let PickOutcome::Pending { group, ranks } =
            pick(&state, id, "solo", 1, groups[1][2]).await.unwrap()
        else {
            panic!("expected pending");
        };
        assert_eq!(group, 1);
        assert_eq!(ranks, vec![(groups[1][2], 1)]);
    }

    #[tokio::test]
    async fn leftover_group_does_not_exist() {
        let (state, id, groups) = ranking_session().await;
        assert_eq!(groups.len(), 2);
        assert!(matches!(
            pick(&state, id, "solo", 2, groups[0][0]).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn rank_round_needs_every_group() {
        let (state, id, groups) = ranking_session().await;
        for item in &groups[0] {
            pick(&state, id, "solo", 0, *item).await.unwrap();
        }
        assert!(matches!(
            signal_done(&state, id, "solo").await,
            Err(ServiceError::InvalidState(_))
        ));
        for item in &groups[1] {
            pick(&state, id, "solo", 1, *item).await.unwrap();
        }
        assert_eq!(
            signal_done(&state, id, "solo").await.unwrap(),
            BarrierOutcome::Advanced {
                to: SessionPhase::Attrition
            }
        );
        assert!(state.rank_boards().is_empty());
    }
}
