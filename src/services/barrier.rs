//! Round completion barrier and the phase-exit transformations.

use std::{collections::HashSet, sync::Arc};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::session_store::SessionStore,
    error::ServiceError,
    rules::{
        cutoff::{rank_target_size, select_survivors, target_size},
        lives::assign_lives,
        scoring::rank_groups,
    },
    services::{
        feed_events,
        session_service::{
            ensure_participant, ensure_phase, load_pool, load_session, load_status, mutate_status,
        },
    },
    state::{
        SharedState, TransitionOutcome,
        feed::ChangeKind,
        session::{CandidateItem, ParticipantStatus, Session},
        state_machine::{SessionEvent, SessionPhase},
    },
};

/// Result of signalling the end of a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarrierOutcome {
    /// Others still have to finish. An empty list during invites means the pool is not filled yet.
    Waiting {
        /// Participants whose flag is still down, in roster order.
        pending: Vec<String>,
    },
    /// This call closed the round.
    Advanced {
        /// Phase entered.
        to: SessionPhase,
    },
    /// Someone else closed the round first.
    AlreadyAdvanced {
        /// Phase observed.
        phase: SessionPhase,
    },
}

#[derive(Debug, Default)]
struct ExitEffects {
    cut: Vec<Uuid>,
    finalists: Vec<CandidateItem>,
}

/// Accept an invitation. Same as [`signal_done`] restricted to the invite round.
pub async fn accept_invite(
    state: &SharedState,
    session_id: Uuid,
    user_id: &str,
) -> Result<BarrierOutcome, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(&store, session_id).await?;
    ensure_participant(&session, user_id)?;
    ensure_phase(&session, SessionPhase::Invite)?;
    signal_done(state, session_id, user_id).await
}

/// Raise the caller's flag for the current round and close the round when everyone is done.
///
/// The swipe round requires every title to be swiped and the rank round every group to be
/// committed. A repeated signal is rejected with [`ServiceError::AlreadySignaled`] unless
/// every flag is up and the round is still open, in which case the close is retried.
pub async fn signal_done(
    state: &SharedState,
    session_id: Uuid,
    user_id: &str,
) -> Result<BarrierOutcome, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(&store, session_id).await?;
    ensure_participant(&session, user_id)?;

    let phase = session.phase;
    match phase {
        SessionPhase::Complete => {
            return Err(ServiceError::InvalidState("session is complete".into()));
        }
        SessionPhase::Attrition => {
            return Err(ServiceError::InvalidState(
                "attrition ends when a single title is left".into(),
            ));
        }
        SessionPhase::Invite | SessionPhase::Swipe | SessionPhase::Rank => {}
    }

    if load_status(&store, session_id, user_id).await?.flag(phase) {
        // Only a stalled close is worth retrying.
        return match close_if_complete(state, session_id, phase).await? {
            BarrierOutcome::Waiting { .. } => Err(ServiceError::AlreadySignaled { phase }),
            outcome => Ok(outcome),
        };
    }

    let (status, ()) = mutate_status(&store, session_id, user_id, |status| {
        if status.flag(phase) {
            return Err(ServiceError::AlreadySignaled { phase });
        }
        check_prerequisites(&session, status)?;
        status.set_flag(phase);
        Ok(())
    })
    .await?;
    debug!(session_id = %session_id, user_id, ?phase, "round completion signalled");
    feed_events::publish_status(state, ChangeKind::Update, &status);

    close_if_complete(state, session_id, phase).await
}

/// Close `phase` if every participant raised its flag; otherwise report who is missing.
pub async fn close_if_complete(
    state: &SharedState,
    session_id: Uuid,
    phase: SessionPhase,
) -> Result<BarrierOutcome, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(&store, session_id).await?;
    if session.phase != phase {
        return Ok(BarrierOutcome::AlreadyAdvanced {
            phase: session.phase,
        });
    }

    let flagged: HashSet<String> = store
        .list_statuses(session_id)
        .await?
        .into_iter()
        .map(ParticipantStatus::from)
        .filter(|status| status.flag(phase))
        .map(|status| status.user_id)
        .collect();
    let pending: Vec<String> = session
        .participants()
        .into_iter()
        .filter(|user| !flagged.contains(user))
        .collect();

    if !pending.is_empty() {
        return Ok(BarrierOutcome::Waiting { pending });
    }
    if phase == SessionPhase::Invite && session.item_refs.is_empty() {
        debug!(session_id = %session_id, "everyone accepted; waiting for the pool");
        return Ok(BarrierOutcome::Waiting { pending });
    }

    close_phase(state, session_id, phase).await
}

/// Run the exit transformation of `phase` and advance the session, at most once.
///
/// Does not look at the completion flags; callers go through [`close_if_complete`].
pub(crate) async fn close_phase(
    state: &SharedState,
    session_id: Uuid,
    phase: SessionPhase,
) -> Result<BarrierOutcome, ServiceError> {
    let event = match phase.closing_event() {
        Some(SessionEvent::WinnerFound) | None => {
            return Err(ServiceError::InvalidState(format!(
                "{phase:?} is not closed by the barrier"
            )));
        }
        Some(event) => event,
    };

    let outcome = state
        .run_transition(session_id, event, move |session, store| {
            exit_transformation(event, session, store)
        })
        .await?;

    match outcome {
        TransitionOutcome::Applied { session, value } => {
            finish_close(state, &session, event, value).await;
            info!(session_id = %session_id, ?event, to = ?session.phase, "round closed");
            Ok(BarrierOutcome::Advanced { to: session.phase })
        }
        TransitionOutcome::AlreadyAdvanced { phase } => {
            Ok(BarrierOutcome::AlreadyAdvanced { phase })
        }
    }
}

fn check_prerequisites(session: &Session, status: &ParticipantStatus) -> Result<(), ServiceError> {
    match session.phase {
        SessionPhase::Swipe => {
            let left = session
                .item_refs
                .iter()
                .filter(|id| !status.swiped.contains(*id))
                .count();
            if left > 0 {
                return Err(ServiceError::InvalidState(format!(
                    "{left} titles left to swipe"
                )));
            }
        }
        SessionPhase::Rank => {
            let groups = rank_groups(&session.item_refs).len();
            let left = (0..groups)
                .filter(|group| !status.ranked_groups.contains(group))
                .count();
            if left > 0 {
                return Err(ServiceError::InvalidState(format!(
                    "{left} rank groups left to commit"
                )));
            }
        }
        SessionPhase::Invite | SessionPhase::Attrition | SessionPhase::Complete => {}
    }
    Ok(())
}

async fn exit_transformation(
    event: SessionEvent,
    mut session: Session,
    store: Arc<dyn SessionStore>,
) -> Result<(Session, ExitEffects), ServiceError> {
    match event {
        SessionEvent::InvitesAccepted => {
            if session.item_refs.is_empty() {
                return Err(ServiceError::InvalidSession(format!(
                    "session `{}` has an empty pool",
                    session.id
                )));
            }
            Ok((session, ExitEffects::default()))
        }
        SessionEvent::SwipeClosed => {
            let pool = load_pool(&store, &session).await?;
            let keep = target_size(pool.len());
            let (kept, cut) = select_survivors(pool, keep, |item| item.score);
            retain_refs(&mut session, &kept);
            Ok((
                session,
                ExitEffects {
                    cut: cut.into_iter().map(|item| item.id).collect(),
                    finalists: Vec::new(),
                },
            ))
        }
        SessionEvent::RankClosed => {
            let pool = load_pool(&store, &session).await?;
            let keep = rank_target_size(pool.len());
            let (kept, cut) = select_survivors(pool, keep, |item| item.score);

            let ranked: Vec<Uuid> = kept.iter().map(|item| item.id).collect();
            let mut finalists = Vec::with_capacity(kept.len());
            for (item, (_, lives)) in kept.iter().zip(assign_lives(&ranked)) {
                store.set_item_lives(item.id, lives).await?;
                finalists.push(CandidateItem {
                    lives,
                    ..item.clone()
                });
            }

            retain_refs(&mut session, &kept);
            session.current_turn = Some(session.owner_id.clone());
            Ok((
                session,
                ExitEffects {
                    cut: cut.into_iter().map(|item| item.id).collect(),
                    finalists,
                },
            ))
        }
        SessionEvent::WinnerFound => Err(ServiceError::InvalidState(
            "the winner is settled by attacks".into(),
        )),
    }
}

/// Keep only the surviving ids, preserving pool order.
fn retain_refs(session: &mut Session, kept: &[CandidateItem]) {
    let kept: HashSet<Uuid> = kept.iter().map(|item| item.id).collect();
    session.item_refs.retain(|id| kept.contains(id));
}

async fn finish_close(state: &SharedState, session: &Session, event: SessionEvent, effects: ExitEffects) {
    if !effects.cut.is_empty() {
        match state.session_store().await {
            Some(store) => {
                if let Err(err) = store.delete_items(effects.cut.clone()).await {
                    warn!(session_id = %session.id, error = %err, "failed to delete cut titles");
                }
            }
            None => warn!(session_id = %session.id, "storage gone before cut titles were deleted"),
        }
    }

    if event == SessionEvent::RankClosed {
        state
            .rank_boards()
            .retain(|(owner, _), _| *owner != session.id);
    }

    feed_events::publish_session(state, ChangeKind::Update, session);
    feed_events::publish_items_deleted(state, session.id, &effects.cut);
    for item in &effects.finalists {
        feed_events::publish_item(state, ChangeKind::Update, item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{metadata::PlaceholderMetadata, session_store::memory::MemorySessionStore},
        services::session_service::{create_session, populate_pool},
        state::AppState,
    };

    async fn invited_session(guests: &[&str], pool: u64) -> (SharedState, Uuid) {
        let state = AppState::new(AppConfig::default(), Arc::new(PlaceholderMetadata));
        state
            .install_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        let id = create_session(
            &state,
            "owner".into(),
            guests.iter().map(|guest| guest.to_string()).collect(),
        )
        .await
        .unwrap()
        .session
        .id;
        populate_pool(&state, id, "owner", (1..=pool).collect())
            .await
            .unwrap();
        (state, id)
    }

    #[tokio::test]
    async fn last_invite_opens_the_swipe_round() {
        let (state, id) = invited_session(&["ann", "bob"], 5).await;

        assert_eq!(
            accept_invite(&state, id, "ann").await.unwrap(),
            BarrierOutcome::Waiting {
                pending: vec!["bob".into()]
            }
        );
        assert_eq!(
            accept_invite(&state, id, "bob").await.unwrap(),
            BarrierOutcome::Advanced {
                to: SessionPhase::Swipe
            }
        );
    }

    #[tokio::test]
    async fn second_signal_is_rejected() {
        let (state, id) = invited_session(&["ann", "bob"], 5).await;
        accept_invite(&state, id, "ann").await.unwrap();

        assert!(matches!(
            accept_invite(&state, id, "ann").await,
            Err(ServiceError::AlreadySignaled {
                phase: SessionPhase::Invite
            })
        ));
    }

    #[tokio::test]
    async fn swipe_round_needs_every_title() {
        let (state, id) = invited_session(&["ann"], 3).await;
        accept_invite(&state, id, "ann").await.unwrap();

        assert!(matches!(
            signal_done(&state, id, "ann").await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn outsiders_cannot_signal() {
        let (state, id) = invited_session(&["ann"], 3).await;
        assert!(matches!(
            accept_invite(&state, id, "eve").await,
            Err(ServiceError::NotParticipant(_))
        ));
    }

    #[tokio::test]
    async fn attrition_is_not_closed_by_signals() {
        assert!(matches!(
            close_phase(
                &AppState::new(AppConfig::default(), Arc::new(PlaceholderMetadata)),
                Uuid::new_v4(),
                SessionPhase::Attrition
            )
            .await,
            Err(ServiceError::InvalidState(_))
        ));
    }
}
