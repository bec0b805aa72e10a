//! Turn-based elimination round.
//!
//! Attacks on one session are serialised. Each attack takes the life first and then
//! commits the turn change and the pruned pool in one session write; when that write
//! loses to another writer the life is put back.

use std::{sync::Arc, time::SystemTime};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::CompletionPolicy,
    dao::session_store::SessionStore,
    error::ServiceError,
    services::{
        feed_events,
        session_service::{ensure_participant, ensure_phase, load_pool, load_session, mutate_status},
    },
    state::{
        SharedState, TransitionOutcome,
        feed::ChangeKind,
        session::{CandidateItem, Session},
        state_machine::{SessionEvent, SessionPhase},
        turns::TurnOrder,
    },
};

/// Attempts at committing an attack while other writers keep touching the session.
const MAX_ATTACK_ATTEMPTS: u32 = 5;

/// Result of an attack.
#[derive(Debug, Clone)]
pub struct AttackOutcome {
    /// Title after losing a life.
    pub item: CandidateItem,
    /// Participant holding the turn now.
    pub next_turn: String,
    /// Winning title, when this attack left a single one alive.
    pub winner: Option<CandidateItem>,
    /// Phase after the attack.
    pub phase: SessionPhase,
}

/// Attack that made it into the session record.
struct Landed {
    session: Session,
    item: CandidateItem,
    alive: usize,
}

/// Take one life from `item_id`. Only the turn holder may attack; the turn always moves on.
pub async fn attack(
    state: &SharedState,
    session_id: Uuid,
    user_id: &str,
    item_id: Uuid,
) -> Result<AttackOutcome, ServiceError> {
    let _attacks = state.lock_attacks(session_id).await;
    let store = state.require_session_store().await?;

    let mut landed = None;
    for attempt in 1..=MAX_ATTACK_ATTEMPTS {
        if let Some(done) = try_attack(&store, session_id, user_id, item_id).await? {
            landed = Some(done);
            break;
        }
        debug!(session_id = %session_id, user_id, attempt, "attack lost a session write race; retrying");
    }
    let Landed {
        session,
        item,
        alive,
    } = landed.ok_or_else(|| {
        ServiceError::InvalidState("session kept changing while attacking".into())
    })?;

    let next_turn = session.current_turn.clone().unwrap_or_default();
    debug!(
        session_id = %session_id,
        user_id,
        item_id = %item_id,
        lives = item.lives,
        next_turn = %next_turn,
        "attack landed"
    );
    feed_events::publish_session(state, ChangeKind::Update, &session);
    feed_events::publish_item(state, ChangeKind::Update, &item);

    if item.is_alive() {
        return Ok(AttackOutcome {
            item,
            next_turn,
            winner: None,
            phase: SessionPhase::Attrition,
        });
    }

    match store.delete_items(vec![item.id]).await {
        Ok(_) => feed_events::publish_items_deleted(state, session_id, &[item.id]),
        Err(err) => warn!(session_id = %session_id, error = %err, "failed to delete eliminated title"),
    }

    match alive {
        0 => Err(ServiceError::InvalidSession(format!(
            "session `{session_id}` has no title left alive"
        ))),
        1 => {
            let winner = finish(state, session_id).await?;
            Ok(AttackOutcome {
                item,
                next_turn,
                winner,
                phase: SessionPhase::Complete,
            })
        }
        _ => Ok(AttackOutcome {
            item,
            next_turn,
            winner: None,
            phase: SessionPhase::Attrition,
        }),
    }
}

/// One attempt: validate against a fresh read, take the life, then write the turn
/// change and the pruned pool. `None` means the write lost and the life was restored.
async fn try_attack(
    store: &Arc<dyn SessionStore>,
    session_id: Uuid,
    user_id: &str,
    item_id: Uuid,
) -> Result<Option<Landed>, ServiceError> {
    let session = load_session(store, session_id).await?;
    ensure_participant(&session, user_id)?;
    ensure_phase(&session, SessionPhase::Attrition)?;

    let holder = session.current_turn.clone().ok_or_else(|| {
        ServiceError::InvalidSession(format!("session `{session_id}` has no turn holder"))
    })?;
    let mut turns = TurnOrder::resume(session.participants(), &holder)?;
    if !turns.is_turn_of(user_id) {
        return Err(ServiceError::NotYourTurn { holder });
    }

    let pool = load_pool(store, &session).await?;
    let target = pool
        .iter()
        .find(|item| item.id == item_id)
        .cloned()
        .ok_or_else(|| ServiceError::NotFound(format!("title `{item_id}` in session `{session_id}`")))?;
    if !target.is_alive() {
        return Err(ServiceError::InvalidInput(format!(
            "title `{item_id}` is already eliminated"
        )));
    }

    let item: CandidateItem = store
        .decrement_item_lives(item_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("title `{item_id}`")))?
        .into();

    let alive: Vec<Uuid> = pool
        .iter()
        .filter(|candidate| {
            if candidate.id == item_id {
                item.is_alive()
            } else {
                candidate.is_alive()
            }
        })
        .map(|candidate| candidate.id)
        .collect();

    let mut next = session.clone();
    next.current_turn = Some(turns.advance().to_owned());
    next.item_refs.retain(|id| alive.contains(id));
    next.updated_at = SystemTime::now();
    match store.update_session(next.clone().into(), session.revision).await {
        Ok(()) => {
            next.revision += 1;
            Ok(Some(Landed {
                session: next,
                item,
                alive: alive.len(),
            }))
        }
        Err(err) => {
            restore_life(store, session_id, &target).await?;
            if err.is_conflict() {
                Ok(None)
            } else {
                Err(err.into())
            }
        }
    }
}

async fn restore_life(
    store: &Arc<dyn SessionStore>,
    session_id: Uuid,
    target: &CandidateItem,
) -> Result<(), ServiceError> {
    store
        .set_item_lives(target.id, target.lives)
        .await
        .map_err(|err| {
            warn!(session_id = %session_id, item_id = %target.id, error = %err, "failed to restore life after a lost attack");
            ServiceError::from(err)
        })
}

async fn finish(
    state: &SharedState,
    session_id: Uuid,
) -> Result<Option<CandidateItem>, ServiceError> {
    let outcome = state
        .run_transition(session_id, SessionEvent::WinnerFound, |session, store| {
            crown_winner(session, store)
        })
        .await?;

    let (session, winner) = match outcome {
        TransitionOutcome::Applied { session, value } => (session, value),
        TransitionOutcome::AlreadyAdvanced { phase } => {
            debug!(session_id = %session_id, ?phase, "winner already settled");
            return Ok(None);
        }
    };
    info!(session_id = %session_id, winner = %winner.id, catalog_id = winner.catalog_id, "winner found");

    let store = state.require_session_store().await?;
    for user_id in session.participants() {
        let closed = mutate_status(&store, session_id, &user_id, |status| {
            status.attrition_done = true;
            Ok(())
        })
        .await;
        match closed {
            Ok((status, ())) => feed_events::publish_status(state, ChangeKind::Update, &status),
            Err(err) => warn!(session_id = %session_id, user_id, error = %err, "failed to close attrition flag"),
        }
    }

    match state.config().completion() {
        CompletionPolicy::Retain => {
            feed_events::publish_session(state, ChangeKind::Update, &session);
        }
        CompletionPolicy::Delete => {
            delete_session_cascade(state, &store, &session).await;
        }
    }
    Ok(Some(winner))
}

async fn crown_winner(
    mut session: Session,
    store: Arc<dyn SessionStore>,
) -> Result<(Session, CandidateItem), ServiceError> {
    let mut alive: Vec<CandidateItem> = load_pool(&store, &session)
        .await?
        .into_iter()
        .filter(CandidateItem::is_alive)
        .collect();
    if alive.len() != 1 {
        return Err(ServiceError::InvalidState(format!(
            "{} titles still alive",
            alive.len()
        )));
    }
    let winner = alive.remove(0);
    session.item_refs = vec![winner.id];
    session.winner_id = Some(winner.id);
    Ok((session, winner))
}

async fn delete_session_cascade(state: &SharedState, store: &Arc<dyn SessionStore>, session: &Session) {
    let item_ids: Vec<Uuid> = match store.find_items(session.id).await {
        Ok(items) => items.into_iter().map(|item| item.id).collect(),
        Err(err) => {
            warn!(session_id = %session.id, error = %err, "failed to list titles for deletion");
            Vec::new()
        }
    };
    if !item_ids.is_empty() {
        if let Err(err) = store.delete_items(item_ids.clone()).await {
            warn!(session_id = %session.id, error = %err, "failed to delete titles");
        }
    }
    if let Err(err) = store.delete_statuses(session.id).await {
        warn!(session_id = %session.id, error = %err, "failed to delete statuses");
    }
    match store.delete_session(session.id).await {
        Ok(_) => {
            info!(session_id = %session.id, "completed session deleted");
            feed_events::publish_items_deleted(state, session.id, &item_ids);
            feed_events::publish_session_deleted(state, session.id);
        }
        Err(err) => warn!(session_id = %session.id, error = %err, "failed to delete session"),
    }
    state.forget_session(session.id);
}
