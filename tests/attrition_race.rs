use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::future::BoxFuture;
use reel_pick::{
    config::AppConfig,
    dao::{
        metadata::PlaceholderMetadata,
        models::{ItemEntity, SessionEntity, StatusEntity},
        session_store::{SessionStore, memory::MemorySessionStore},
        storage::StorageResult,
    },
    error::ServiceError,
    services::attrition_service,
    state::{
        AppState, SharedState,
        session::{CandidateItem, ParticipantStatus, Session},
        state_machine::SessionPhase,
    },
};
use uuid::Uuid;

/// Memory store with a slow lives decrement and, on demand, a foreign session
/// write slipped in ahead of the next session update.
#[derive(Default)]
struct RacyStore {
    inner: Arc<MemorySessionStore>,
    decrement_delay: Duration,
    foreign_writes: AtomicUsize,
}

impl SessionStore for RacyStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.insert_session(session)
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        self.inner.find_session(id)
    }

    fn update_session(
        &self,
        session: SessionEntity,
        expected_revision: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        let interfere = self
            .foreign_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        Box::pin(async move {
            if interfere {
                if let Some(current) = inner.find_session(session.id).await? {
                    let revision = current.revision;
                    inner.update_session(current, revision).await?;
                }
            }
            inner.update_session(session, expected_revision).await
        })
    }

    fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.delete_session(id)
    }

    fn list_sessions_for_user(
        &self,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        self.inner.list_sessions_for_user(user_id)
    }

    fn insert_items(&self, items: Vec<ItemEntity>) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.insert_items(items)
    }

    fn find_items(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ItemEntity>>> {
        self.inner.find_items(session_id)
    }

    fn adjust_item_score(
        &self,
        id: Uuid,
        delta: i32,
    ) -> BoxFuture<'static, StorageResult<Option<ItemEntity>>> {
        self.inner.adjust_item_score(id, delta)
    }

    fn set_item_lives(&self, id: Uuid, lives: u8) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.set_item_lives(id, lives)
    }

    fn decrement_item_lives(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ItemEntity>>> {
        let inner = self.inner.clone();
        let delay = self.decrement_delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            inner.decrement_item_lives(id).await
        })
    }

    fn delete_items(&self, ids: Vec<Uuid>) -> BoxFuture<'static, StorageResult<usize>> {
        self.inner.delete_items(ids)
    }

    fn insert_statuses(&self, statuses: Vec<StatusEntity>) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.insert_statuses(statuses)
    }

    fn find_status(
        &self,
        session_id: Uuid,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<StatusEntity>>> {
        self.inner.find_status(session_id, user_id)
    }

    fn list_statuses(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<StatusEntity>>> {
        self.inner.list_statuses(session_id)
    }

    fn update_status(
        &self,
        status: StatusEntity,
        expected_revision: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.update_status(status, expected_revision)
    }

    fn delete_statuses(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<usize>> {
        self.inner.delete_statuses(session_id)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}

/// Session in attrition with the owner holding the turn and one title per entry of `lives`.
async fn attrition_session(store: RacyStore, lives: &[u8]) -> (SharedState, Arc<RacyStore>, Uuid, Vec<Uuid>) {
    let state = AppState::new(AppConfig::default(), Arc::new(PlaceholderMetadata));
    let store = Arc::new(store);
    state.install_session_store(store.clone()).await;

    let mut session = Session::new("owner".into(), vec!["ann".into(), "bob".into()]);
    session.phase = SessionPhase::Attrition;
    session.current_turn = Some("owner".into());
    let items: Vec<CandidateItem> = lives
        .iter()
        .enumerate()
        .map(|(n, lives)| CandidateItem {
            lives: *lives,
            ..CandidateItem::new(session.id, n as u64 + 1)
        })
        .collect();
    session.item_refs = items.iter().map(|item| item.id).collect();

    store.insert_session(session.clone().into()).await.unwrap();
    store
        .insert_items(items.iter().cloned().map(Into::into).collect())
        .await
        .unwrap();
    store
        .insert_statuses(
            session
                .participants()
                .into_iter()
                .map(|user| ParticipantStatus::new(session.id, user, true).into())
                .collect(),
        )
        .await
        .unwrap();
    (state, store, session.id, session.item_refs)
}

fn slow_decrements() -> RacyStore {
    RacyStore {
        decrement_delay: Duration::from_millis(100),
        ..RacyStore::default()
    }
}

async fn lives_of(store: &RacyStore, session_id: Uuid) -> Vec<(Uuid, u8)> {
    store
        .find_items(session_id)
        .await
        .unwrap()
        .into_iter()
        .map(|item| (item.id, item.lives))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn late_attack_cannot_hit_the_crowned_title() {
    let (state, store, id, items) = attrition_session(slow_decrements(), &[1, 1]).await;

    let first = {
        let state = state.clone();
        let target = items[0];
        tokio::spawn(async move { attrition_service::attack(&state, id, "owner", target).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = {
        let state = state.clone();
        let target = items[1];
        tokio::spawn(async move { attrition_service::attack(&state, id, "ann", target).await })
    };

    let first = first.await.unwrap().unwrap();
    assert_eq!(first.phase, SessionPhase::Complete);
    assert_eq!(first.winner.map(|item| item.id), Some(items[1]));
    assert!(matches!(
        second.await.unwrap(),
        Err(ServiceError::InvalidState(_))
    ));

    let session: Session = store.find_session(id).await.unwrap().unwrap().try_into().unwrap();
    assert_eq!(session.phase, SessionPhase::Complete);
    assert_eq!(session.winner_id, Some(items[1]));
    assert_eq!(lives_of(&store, id).await, vec![(items[1], 1)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn queued_attacks_each_take_exactly_one_life() {
    let (state, store, id, items) = attrition_session(slow_decrements(), &[2, 2, 2]).await;

    let handles: Vec<_> = ["owner", "ann", "bob"]
        .into_iter()
        .zip(items.clone())
        .map(|(player, target)| {
            let state = state.clone();
            tokio::spawn(async move { attrition_service::attack(&state, id, player, target).await })
        })
        .collect();

    let mut landed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(outcome) => {
                assert_eq!(outcome.item.lives, 1);
                landed += 1;
            }
            Err(ServiceError::NotYourTurn { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    let total: u32 = lives_of(&store, id)
        .await
        .iter()
        .map(|(_, lives)| u32::from(*lives))
        .sum();
    assert!(landed >= 1);
    assert_eq!(total, 6 - landed);
    let session: Session = store.find_session(id).await.unwrap().unwrap().try_into().unwrap();
    assert_eq!(session.revision, landed as u64);
}

#[tokio::test]
async fn holder_keeps_the_turn_when_another_write_lands_first() {
    let (state, store, id, items) = attrition_session(RacyStore::default(), &[2, 2]).await;
    store.foreign_writes.store(1, Ordering::SeqCst);

    let outcome = attrition_service::attack(&state, id, "owner", items[0])
        .await
        .unwrap();
    assert_eq!(outcome.item.lives, 1);
    assert_eq!(outcome.next_turn, "ann");

    let lives = lives_of(&store, id).await;
    assert!(lives.contains(&(items[0], 1)));
    assert!(lives.contains(&(items[1], 2)));
}
