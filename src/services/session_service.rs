use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::SystemTime,
};

use futures::future::join_all;
use rand::seq::index;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        metadata::MovieDetails,
        models::{ItemEntity, StatusEntity},
        session_store::SessionStore,
        storage::StorageError,
    },
    error::ServiceError,
    services::{
        barrier::{self, BarrierOutcome},
        feed_events,
    },
    state::{
        SharedState,
        feed::ChangeKind,
        session::{CandidateItem, ParticipantStatus, Session},
        state_machine::SessionPhase,
    },
};

/// Attempts for a status read-modify-write before giving up.
const MAX_STATUS_ATTEMPTS: u32 = 5;
/// Smallest pool worth running the rounds on.
const MIN_POOL_SIZE: usize = 2;

/// A session with its pool and statuses.
#[derive(Debug, Clone)]
pub struct SessionDetails {
    /// Session record.
    pub session: Session,
    /// Alive titles in pool order.
    pub items: Vec<CandidateItem>,
    /// Status of every participant in roster order.
    pub statuses: Vec<ParticipantStatus>,
}

/// A title paired with its display metadata.
#[derive(Debug, Clone)]
pub struct TitleCard {
    /// Pool record.
    pub item: CandidateItem,
    /// Provider metadata or a placeholder.
    pub details: MovieDetails,
}

/// Result of filling the pool.
#[derive(Debug, Clone)]
pub struct PoolOutcome {
    /// Titles created, in pool order.
    pub items: Vec<CandidateItem>,
    /// Phase after the call; `Swipe` when every invite was already accepted.
    pub phase: SessionPhase,
}

/// Create a session owned by `owner_id` with the given guests.
///
/// The owner's invitation counts as accepted; guests accept through the invite barrier.
pub async fn create_session(
    state: &SharedState,
    owner_id: String,
    guest_ids: Vec<String>,
) -> Result<SessionDetails, ServiceError> {
    let owner_id = owner_id.trim().to_owned();
    if owner_id.is_empty() {
        return Err(ServiceError::InvalidInput("owner id must not be empty".into()));
    }

    let mut seen = HashSet::from([owner_id.clone()]);
    let guests: Vec<String> = guest_ids
        .into_iter()
        .map(|guest| guest.trim().to_owned())
        .filter(|guest| !guest.is_empty() && seen.insert(guest.clone()))
        .collect();

    let store = state.require_session_store().await?;
    let session = Session::new(owner_id, guests);
    let statuses: Vec<ParticipantStatus> = session
        .participants()
        .into_iter()
        .map(|user_id| {
            let invited = user_id == session.owner_id;
            ParticipantStatus::new(session.id, user_id, invited)
        })
        .collect();

    store.insert_session(session.clone().into()).await?;
    store
        .insert_statuses(statuses.iter().cloned().map(StatusEntity::from).collect())
        .await?;

    info!(
        session_id = %session.id,
        owner = %session.owner_id,
        guests = session.guest_ids.len(),
        "session created"
    );
    feed_events::publish_session(state, ChangeKind::Create, &session);
    for status in &statuses {
        feed_events::publish_status(state, ChangeKind::Create, status);
    }

    Ok(SessionDetails {
        session,
        items: Vec::new(),
        statuses,
    })
}

/// Load a session with its pool and statuses.
pub async fn get_session(
    state: &SharedState,
    session_id: Uuid,
) -> Result<SessionDetails, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(&store, session_id).await?;
    let items = load_pool(&store, &session).await?;
    let mut statuses: Vec<ParticipantStatus> = store
        .list_statuses(session_id)
        .await?
        .into_iter()
        .map(ParticipantStatus::from)
        .collect();
    let roster = session.participants();
    statuses.sort_by_key(|status| {
        roster
            .iter()
            .position(|user| *user == status.user_id)
            .unwrap_or(usize::MAX)
    });

    Ok(SessionDetails {
        session,
        items,
        statuses,
    })
}

/// Sessions where `user_id` is owner or guest, newest first.
pub async fn list_sessions(
    state: &SharedState,
    user_id: &str,
) -> Result<Vec<Session>, ServiceError> {
    let store = state.require_session_store().await?;
    let mut sessions = store
        .list_sessions_for_user(user_id.to_owned())
        .await?
        .into_iter()
        .map(Session::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(sessions)
}

/// Fill the candidate pool from catalog ids. Only the owner may do this, once, during invites.
///
/// Duplicate ids are ignored; when more than the configured maximum remain, a
/// uniform random sample of that size is kept in input order.
pub async fn populate_pool(
    state: &SharedState,
    session_id: Uuid,
    user_id: &str,
    catalog_ids: Vec<u64>,
) -> Result<PoolOutcome, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(&store, session_id).await?;
    if session.owner_id != user_id {
        return Err(ServiceError::NotParticipant(format!(
            "{user_id} (only the owner fills the pool)"
        )));
    }
    ensure_phase(&session, SessionPhase::Invite)?;
    if !session.item_refs.is_empty() {
        return Err(ServiceError::InvalidState("pool already populated".into()));
    }

    let mut seen = HashSet::new();
    let unique: Vec<u64> = catalog_ids
        .into_iter()
        .filter(|id| seen.insert(*id))
        .collect();
    if unique.len() < MIN_POOL_SIZE {
        return Err(ServiceError::InvalidInput(format!(
            "a pool needs at least {MIN_POOL_SIZE} distinct titles"
        )));
    }
    let catalog = sample_pool(unique, state.config().max_pool_size());

    let items: Vec<CandidateItem> = catalog
        .into_iter()
        .map(|catalog_id| CandidateItem::new(session_id, catalog_id))
        .collect();
    let ids: Vec<Uuid> = items.iter().map(|item| item.id).collect();

    store
        .insert_items(items.iter().cloned().map(ItemEntity::from).collect())
        .await?;

    let mut next = session.clone();
    next.item_refs = ids.clone();
    next.updated_at = SystemTime::now();
    if let Err(err) = store.update_session(next.clone().into(), session.revision).await {
        // The titles were never referenced; drop them.
        if let Err(cleanup) = store.delete_items(ids).await {
            warn!(session_id = %session_id, error = %cleanup, "failed to drop orphaned titles");
        }
        return Err(match err {
            StorageError::Conflict { .. } => {
                ServiceError::InvalidState("session changed while filling the pool".into())
            }
            other => other.into(),
        });
    }
    next.revision += 1;

    info!(session_id = %session_id, titles = items.len(), "pool populated");
    feed_events::publish_session(state, ChangeKind::Update, &next);
    for item in &items {
        feed_events::publish_item(state, ChangeKind::Create, item);
    }

    let phase = match barrier::close_if_complete(state, session_id, SessionPhase::Invite).await? {
        BarrierOutcome::Waiting { .. } => SessionPhase::Invite,
        BarrierOutcome::Advanced { to } => to,
        BarrierOutcome::AlreadyAdvanced { phase } => phase,
    };

    Ok(PoolOutcome { items, phase })
}

/// Titles `user_id` still has to swipe, with metadata.
pub async fn deck(
    state: &SharedState,
    session_id: Uuid,
    user_id: &str,
) -> Result<Vec<TitleCard>, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(&store, session_id).await?;
    ensure_participant(&session, user_id)?;
    ensure_phase(&session, SessionPhase::Swipe)?;

    let status = load_status(&store, session_id, user_id).await?;
    let pending: Vec<CandidateItem> = load_pool(&store, &session)
        .await?
        .into_iter()
        .filter(|item| !status.swiped.contains(&item.id))
        .collect();

    Ok(with_details(state, pending).await)
}

/// Winning title of a complete session, with metadata.
pub async fn winner(state: &SharedState, session_id: Uuid) -> Result<TitleCard, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(&store, session_id).await?;
    let winner_id = match (session.phase, session.winner_id) {
        (SessionPhase::Complete, Some(winner_id)) => winner_id,
        _ => {
            return Err(ServiceError::InvalidState(
                "session has no winner yet".into(),
            ));
        }
    };

    let item = store
        .find_items(session_id)
        .await?
        .into_iter()
        .find(|item| item.id == winner_id)
        .map(CandidateItem::from)
        .ok_or_else(|| ServiceError::NotFound(format!("winning title `{winner_id}`")))?;

    let details = state.metadata().lookup(item.catalog_id).await;
    Ok(TitleCard { item, details })
}

/// Attach provider metadata to each title, preserving order.
pub(crate) async fn with_details(state: &SharedState, items: Vec<CandidateItem>) -> Vec<TitleCard> {
    let lookups = items
        .iter()
        .map(|item| state.metadata().lookup(item.catalog_id));
    let details = join_all(lookups).await;
    items
        .into_iter()
        .zip(details)
        .map(|(item, details)| TitleCard { item, details })
        .collect()
}

fn sample_pool(catalog: Vec<u64>, max: usize) -> Vec<u64> {
    if catalog.len() <= max {
        return catalog;
    }
    let mut rng = rand::rng();
    let mut picked = index::sample(&mut rng, catalog.len(), max).into_vec();
    picked.sort_unstable();
    debug!(offered = catalog.len(), kept = max, "sampled pool down");
    picked.into_iter().map(|position| catalog[position]).collect()
}

pub(crate) async fn load_session(
    store: &Arc<dyn SessionStore>,
    session_id: Uuid,
) -> Result<Session, ServiceError> {
    store
        .find_session(session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}`")))?
        .try_into()
}

/// Titles referenced by the session, in pool order.
pub(crate) async fn load_pool(
    store: &Arc<dyn SessionStore>,
    session: &Session,
) -> Result<Vec<CandidateItem>, ServiceError> {
    let mut by_id: HashMap<Uuid, CandidateItem> = store
        .find_items(session.id)
        .await?
        .into_iter()
        .map(|item| (item.id, CandidateItem::from(item)))
        .collect();
    Ok(session
        .item_refs
        .iter()
        .filter_map(|id| by_id.remove(id))
        .collect())
}

pub(crate) async fn load_status(
    store: &Arc<dyn SessionStore>,
    session_id: Uuid,
    user_id: &str,
) -> Result<ParticipantStatus, ServiceError> {
    store
        .find_status(session_id, user_id.to_owned())
        .await?
        .map(ParticipantStatus::from)
        .ok_or_else(|| {
            ServiceError::InvalidSession(format!(
                "participant `{user_id}` has no status in session `{session_id}`"
            ))
        })
}

pub(crate) fn ensure_participant(session: &Session, user_id: &str) -> Result<(), ServiceError> {
    if session.is_participant(user_id) {
        Ok(())
    } else {
        Err(ServiceError::NotParticipant(user_id.to_owned()))
    }
}

pub(crate) fn ensure_phase(session: &Session, expected: SessionPhase) -> Result<(), ServiceError> {
    if session.phase == expected {
        Ok(())
    } else {
        Err(ServiceError::InvalidState(format!(
            "session is in {:?}, not {:?}",
            session.phase, expected
        )))
    }
}

/// Read-modify-write a participant status with compare-and-swap, retrying on conflicts.
///
/// `change` runs on a fresh copy each attempt; an error from it aborts without writing.
pub(crate) async fn mutate_status<F, R>(
    store: &Arc<dyn SessionStore>,
    session_id: Uuid,
    user_id: &str,
    mut change: F,
) -> Result<(ParticipantStatus, R), ServiceError>
where
    F: FnMut(&mut ParticipantStatus) -> Result<R, ServiceError>,
{
    for attempt in 1..=MAX_STATUS_ATTEMPTS {
        let mut status = load_status(store, session_id, user_id).await?;
        let expected = status.revision;
        let produced = change(&mut status)?;

        match store
            .update_status(status.clone().into(), expected)
            .await
        {
            Ok(()) => {
                status.revision = expected + 1;
                return Ok((status, produced));
            }
            Err(err) if err.is_conflict() => {
                debug!(session_id = %session_id, user_id, attempt, "status write conflicted; retrying");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(ServiceError::InvalidState(format!(
        "status of `{user_id}` kept changing concurrently"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{metadata::PlaceholderMetadata, session_store::memory::MemorySessionStore},
        state::AppState,
    };

    async fn state_with(config: AppConfig) -> SharedState {
        let state = AppState::new(config, Arc::new(PlaceholderMetadata));
        state
            .install_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        state
    }

    #[tokio::test]
    async fn owner_starts_invited_and_holds_the_turn() {
        let state = state_with(AppConfig::default()).await;
        let details = create_session(
            &state,
            "owner".into(),
            vec!["ann".into(), "owner".into(), "ann".into(), " ".into()],
        )
        .await
        .unwrap();

        assert_eq!(details.session.guest_ids, vec!["ann"]);
        assert_eq!(details.session.current_turn.as_deref(), Some("owner"));
        let flags: Vec<(String, bool)> = details
            .statuses
            .iter()
            .map(|status| (status.user_id.clone(), status.invited))
            .collect();
        assert_eq!(flags, vec![("owner".into(), true), ("ann".into(), false)]);
    }

    #[tokio::test]
    async fn oversized_pool_is_sampled_without_duplicates() {
        let state = state_with(AppConfig::default().with_max_pool_size(10)).await;
        let details = create_session(&state, "owner".into(), vec!["ann".into()])
            .await
            .unwrap();

        let offered: Vec<u64> = (1..=30).chain(1..=5).collect();
        let outcome = populate_pool(&state, details.session.id, "owner", offered)
            .await
            .unwrap();

        assert_eq!(outcome.items.len(), 10);
        assert_eq!(outcome.phase, SessionPhase::Invite);
        let catalog: Vec<u64> = outcome.items.iter().map(|item| item.catalog_id).collect();
        let mut sorted = catalog.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted, catalog);
    }

    #[tokio::test]
    async fn pool_is_filled_once_by_the_owner() {
        let state = state_with(AppConfig::default()).await;
        let id = create_session(&state, "owner".into(), vec!["ann".into()])
            .await
            .unwrap()
            .session
            .id;

        assert!(matches!(
            populate_pool(&state, id, "ann", vec![1, 2, 3]).await,
            Err(ServiceError::NotParticipant(_))
        ));
        assert!(matches!(
            populate_pool(&state, id, "owner", vec![7, 7]).await,
            Err(ServiceError::InvalidInput(_))
        ));
        populate_pool(&state, id, "owner", vec![1, 2, 3]).await.unwrap();
        assert!(matches!(
            populate_pool(&state, id, "owner", vec![4, 5]).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn sessions_are_listed_for_guests() {
        let state = state_with(AppConfig::default()).await;
        create_session(&state, "owner".into(), vec!["ann".into()])
            .await
            .unwrap();
        create_session(&state, "bob".into(), vec![]).await.unwrap();

        assert_eq!(list_sessions(&state, "ann").await.unwrap().len(), 1);
        assert_eq!(list_sessions(&state, "bob").await.unwrap().len(), 1);
        assert!(list_sessions(&state, "eve").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn degraded_state_rejects_calls() {
        let state = AppState::new(AppConfig::default(), Arc::new(PlaceholderMetadata));
        assert!(matches!(
            create_session(&state, "owner".into(), Vec::new()).await,
            Err(ServiceError::Degraded)
        ));
    }
}
