use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::ServiceError,
    rules::scoring::{SwipeAction, apply_swipe},
    services::{
        feed_events,
        session_service::{ensure_participant, ensure_phase, load_session, mutate_status},
    },
    state::{
        SharedState,
        feed::ChangeKind,
        session::{CandidateItem, ParticipantStatus},
        state_machine::SessionPhase,
    },
};

/// What a swipe changed.
#[derive(Debug, Clone)]
pub struct SwipeOutcome {
    /// Title after its score was adjusted.
    pub item: CandidateItem,
    /// Caller's status after the swipe was recorded.
    pub status: ParticipantStatus,
    /// Score added to the title.
    pub delta: i32,
}

/// Record `action` on `item_id` for `user_id` during the swipe round.
///
/// The participant's status is written first so a duplicate or an exhausted power-up
/// never touches the shared score. If the score update then fails, the status write is
/// reverted and the swipe can be re-issued.
pub async fn swipe(
    state: &SharedState,
    session_id: Uuid,
    user_id: &str,
    item_id: Uuid,
    action: SwipeAction,
) -> Result<SwipeOutcome, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(&store, session_id).await?;
    ensure_participant(&session, user_id)?;
    ensure_phase(&session, SessionPhase::Swipe)?;
    if !session.item_refs.contains(&item_id) {
        return Err(ServiceError::NotFound(format!(
            "title `{item_id}` in session `{session_id}`"
        )));
    }

    let (status, delta) = mutate_status(&store, session_id, user_id, |status| {
        if status.swipe_done {
            return Err(ServiceError::AlreadySignaled {
                phase: SessionPhase::Swipe,
            });
        }
        Ok(apply_swipe(status, item_id, action)?)
    })
    .await?;

    let item = match store.adjust_item_score(item_id, delta).await {
        Ok(Some(item)) => CandidateItem::from(item),
        Ok(None) => {
            revert_swipe(state, session_id, user_id, item_id, action).await;
            return Err(ServiceError::NotFound(format!("title `{item_id}`")));
        }
        Err(err) => {
            revert_swipe(state, session_id, user_id, item_id, action).await;
            return Err(err.into());
        }
    };

    debug!(session_id = %session_id, user_id, item_id = %item_id, ?action, delta, "swipe recorded");
    feed_events::publish_item(state, ChangeKind::Update, &item);
    feed_events::publish_status(state, ChangeKind::Update, &status);

    Ok(SwipeOutcome {
        item,
        status,
        delta,
    })
}

async fn revert_swipe(
    state: &SharedState,
    session_id: Uuid,
    user_id: &str,
    item_id: Uuid,
    action: SwipeAction,
) {
    let Some(store) = state.session_store().await else {
        warn!(session_id = %session_id, user_id, "storage gone; swipe left recorded without score");
        return;
    };
    let reverted = mutate_status(&store, session_id, user_id, |status| {
        if status.swiped.shift_remove(&item_id) {
            match action {
                SwipeAction::Fav => status.fav_remaining = status.fav_remaining.saturating_add(1),
                SwipeAction::Skull => {
                    status.skull_remaining = status.skull_remaining.saturating_add(1)
                }
                SwipeAction::Reject | SwipeAction::Accept => {}
            }
        }
        Ok(())
    })
    .await;
    if let Err(err) = reverted {
        warn!(
            session_id = %session_id,
            user_id,
            item_id = %item_id,
            error = %err,
            "failed to revert swipe after score update failure"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{metadata::PlaceholderMetadata, session_store::memory::MemorySessionStore},
        rules::scoring::PowerUp,
        services::{
            barrier::accept_invite,
            session_service::{create_session, populate_pool},
        },
        state::AppState,
    };

    async fn swiping_session() -> (SharedState, Uuid, Vec<Uuid>) {
        let state = AppState::new(AppConfig::default(), Arc::new(PlaceholderMetadata));
        state
            .install_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        let id = create_session(&state, "owner".into(), vec!["ann".into()])
            .await
            .unwrap()
            .session
            .id;
        let pool = populate_pool(&state, id, "owner", (1..=4).collect())
            .await
            .unwrap();
        accept_invite(&state, id, "ann").await.unwrap();
        let items = pool.items.into_iter().map(|item| item.id).collect();
        (state, id, items)
    }

    #[tokio::test]
    async fn swipes_accumulate_on_the_shared_score() {
        let (state, id, items) = swiping_session().await;

        swipe(&state, id, "owner", items[0], SwipeAction::Fav)
            .await
            .unwrap();
        let outcome = swipe(&state, id, "ann", items[0], SwipeAction::Accept)
            .await
            .unwrap();

        assert_eq!(outcome.item.score, 4);
        assert_eq!(outcome.delta, 1);
        assert!(outcome.status.swiped.contains(&items[0]));
    }

    #[tokio::test]
    async fn repeated_swipe_leaves_score_alone() {
        let (state, id, items) = swiping_session().await;
        swipe(&state, id, "ann", items[1], SwipeAction::Skull)
            .await
            .unwrap();

        assert!(matches!(
            swipe(&state, id, "ann", items[1], SwipeAction::Accept).await,
            Err(ServiceError::DuplicateAction(_))
        ));
        assert!(matches!(
            swipe(&state, id, "ann", items[2], SwipeAction::Skull).await,
            Err(ServiceError::PowerUpExhausted(PowerUp::Skull))
        ));

        let store = state.session_store().await.unwrap();
        let scores: Vec<i32> = store
            .find_items(id)
            .await
            .unwrap()
            .into_iter()
            .filter(|item| item.id == items[1] || item.id == items[2])
            .map(|item| item.score)
            .collect();
        assert!(scores.contains(&-5));
        assert!(scores.contains(&0));
    }

    #[tokio::test]
    async fn unknown_title_is_not_found() {
        let (state, id, _) = swiping_session().await;
        assert!(matches!(
            swipe(&state, id, "ann", Uuid::new_v4(), SwipeAction::Accept).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
