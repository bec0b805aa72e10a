//! Process-local store used for tests and single-instance deployments without a database.

use std::{sync::Arc, time::SystemTime};

use dashmap::DashMap;
use futures::future::{BoxFuture, ready};
use uuid::Uuid;

use crate::dao::{
    models::{ItemEntity, SessionEntity, StatusEntity},
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};

#[derive(Default)]
struct MemoryInner {
    sessions: DashMap<Uuid, SessionEntity>,
    items: DashMap<Uuid, ItemEntity>,
    statuses: DashMap<(Uuid, String), StatusEntity>,
}

/// [`SessionStore`] keeping every record in concurrent hash maps.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<MemoryInner>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of title records currently stored, across sessions.
    pub fn item_count(&self) -> usize {
        self.inner.items.len()
    }

    /// Number of session records currently stored.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }
}

fn done<T: Send + 'static>(value: StorageResult<T>) -> BoxFuture<'static, StorageResult<T>> {
    Box::pin(ready(value))
}

impl SessionStore for MemorySessionStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.sessions.insert(session.id, session);
        done(Ok(()))
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let found = self.inner.sessions.get(&id).map(|entry| entry.clone());
        done(Ok(found))
    }

    fn update_session(
        &self,
        mut session: SessionEntity,
        expected_revision: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let result = match self.inner.sessions.get_mut(&session.id) {
            Some(mut stored) if stored.revision == expected_revision => {
                session.revision = expected_revision + 1;
                session.updated_at = SystemTime::now();
                *stored = session;
                Ok(())
            }
            _ => Err(StorageError::conflict(
                format!("session {}", session.id),
                expected_revision,
            )),
        };
        done(result)
    }

    fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        done(Ok(self.inner.sessions.remove(&id).is_some()))
    }

    fn list_sessions_for_user(
        &self,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let sessions = self
            .inner
            .sessions
            .iter()
            .filter(|entry| entry.owner_id == user_id || entry.guest_ids.contains(&user_id))
            .map(|entry| entry.clone())
            .collect();
        done(Ok(sessions))
    }

    fn insert_items(&self, items: Vec<ItemEntity>) -> BoxFuture<'static, StorageResult<()>> {
        for item in items {
            self.inner.items.insert(item.id, item);
        }
        done(Ok(()))
    }

    fn find_items(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ItemEntity>>> {
        let items = self
            .inner
            .items
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .map(|entry| entry.clone())
            .collect();
        done(Ok(items))
    }

    fn adjust_item_score(
        &self,
        id: Uuid,
        delta: i32,
    ) -> BoxFuture<'static, StorageResult<Option<ItemEntity>>> {
        let updated = self.inner.items.get_mut(&id).map(|mut item| {
            item.score += delta;
            item.clone()
        });
        done(Ok(updated))
    }

    fn set_item_lives(&self, id: Uuid, lives: u8) -> BoxFuture<'static, StorageResult<()>> {
        if let Some(mut item) = self.inner.items.get_mut(&id) {
            item.lives = lives;
        }
        done(Ok(()))
    }

    fn decrement_item_lives(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ItemEntity>>> {
        let updated = self.inner.items.get_mut(&id).map(|mut item| {
            item.lives = item.lives.saturating_sub(1);
            item.clone()
        });
        done(Ok(updated))
    }

    fn delete_items(&self, ids: Vec<Uuid>) -> BoxFuture<'static, StorageResult<usize>> {
        let removed = ids
            .iter()
            .filter(|id| self.inner.items.remove(id).is_some())
            .count();
        done(Ok(removed))
    }

    fn insert_statuses(
        &self,
        statuses: Vec<StatusEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        for status in statuses {
            self.inner
                .statuses
                .insert((status.session_id, status.user_id.clone()), status);
        }
        done(Ok(()))
    }

    fn find_status(
        &self,
        session_id: Uuid,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<StatusEntity>>> {
        let found = self
            .inner
            .statuses
            .get(&(session_id, user_id))
            .map(|entry| entry.clone());
        done(Ok(found))
    }

    fn list_statuses(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<StatusEntity>>> {
        let statuses = self
            .inner
            .statuses
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .map(|entry| entry.clone())
            .collect();
        done(Ok(statuses))
    }

    fn update_status(
        &self,
        mut status: StatusEntity,
        expected_revision: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let key = (status.session_id, status.user_id.clone());
        let result = match self.inner.statuses.get_mut(&key) {
            Some(mut stored) if stored.revision == expected_revision => {
                status.revision = expected_revision + 1;
                *stored = status;
                Ok(())
            }
            _ => Err(StorageError::conflict(
                format!("status {}/{}", key.0, key.1),
                expected_revision,
            )),
        };
        done(result)
    }

    fn delete_statuses(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<usize>> {
        let before = self.inner.statuses.len();
        self.inner
            .statuses
            .retain(|(owner, _), _| *owner != session_id);
        done(Ok(before - self.inner.statuses.len()))
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        done(Ok(()))
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        done(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(owner: &str, guests: &[&str]) -> SessionEntity {
        let now = SystemTime::now();
        SessionEntity {
            id: Uuid::new_v4(),
            owner_id: owner.into(),
            guest_ids: guests.iter().map(|guest| guest.to_string()).collect(),
            step: 0,
            current_turn: Some(owner.into()),
            item_refs: Vec::new(),
            winner_id: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn stale_session_write_conflicts() {
        let store = MemorySessionStore::new();
        let record = session("owner", &["ann"]);
        store.insert_session(record.clone()).await.unwrap();

        store.update_session(record.clone(), 0).await.unwrap();
        let err = store.update_session(record.clone(), 0).await.unwrap_err();
        assert!(err.is_conflict());

        let stored = store.find_session(record.id).await.unwrap().unwrap();
        assert_eq!(stored.revision, 1);
    }

    #[tokio::test]
    async fn sessions_are_listed_for_owner_and_guests() {
        let store = MemorySessionStore::new();
        store
            .insert_session(session("owner", &["ann", "bob"]))
            .await
            .unwrap();
        store.insert_session(session("ann", &[])).await.unwrap();

        assert_eq!(store.list_sessions_for_user("ann".into()).await.unwrap().len(), 2);
        assert_eq!(store.list_sessions_for_user("bob".into()).await.unwrap().len(), 1);
        assert!(store.list_sessions_for_user("eve".into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lives_never_drop_below_zero() {
        let store = MemorySessionStore::new();
        let item = ItemEntity {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            catalog_id: 603,
            score: 0,
            lives: 1,
        };
        store.insert_items(vec![item.clone()]).await.unwrap();

        let first = store.decrement_item_lives(item.id).await.unwrap().unwrap();
        let second = store.decrement_item_lives(item.id).await.unwrap().unwrap();
        assert_eq!(first.lives, 0);
        assert_eq!(second.lives, 0);
    }
}
