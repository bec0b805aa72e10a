#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{ItemEntity, SessionEntity, StatusEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the document store holding sessions, their titles, and the
/// per-participant round statuses.
///
/// Writes to sessions and statuses are compare-and-swap: `expected_revision` is the
/// revision the caller read, the backend stores the record with `expected_revision + 1`
/// and fails with [`StorageError::Conflict`](crate::dao::storage::StorageError::Conflict)
/// when another writer got there first.
pub trait SessionStore: Send + Sync {
    /// Create a session record.
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a session by id.
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Replace a session if its stored revision still equals `expected_revision`.
    fn update_session(
        &self,
        session: SessionEntity,
        expected_revision: u64,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete a session record, returning whether it existed.
    fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// Sessions where `user_id` is the owner or one of the guests.
    fn list_sessions_for_user(
        &self,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>>;

    /// Create title records in bulk.
    fn insert_items(&self, items: Vec<ItemEntity>) -> BoxFuture<'static, StorageResult<()>>;
    /// All title records of a session, in no particular order.
    fn find_items(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ItemEntity>>>;
    /// Atomically add `delta` to a title's score, returning the updated record.
    fn adjust_item_score(
        &self,
        id: Uuid,
        delta: i32,
    ) -> BoxFuture<'static, StorageResult<Option<ItemEntity>>>;
    /// Overwrite a title's lives.
    fn set_item_lives(&self, id: Uuid, lives: u8) -> BoxFuture<'static, StorageResult<()>>;
    /// Atomically remove one life (never below zero), returning the updated record.
    fn decrement_item_lives(&self, id: Uuid)
    -> BoxFuture<'static, StorageResult<Option<ItemEntity>>>;
    /// Delete title records, returning how many existed.
    fn delete_items(&self, ids: Vec<Uuid>) -> BoxFuture<'static, StorageResult<usize>>;

    /// Create status records in bulk.
    fn insert_statuses(&self, statuses: Vec<StatusEntity>)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch the status of one participant.
    fn find_status(
        &self,
        session_id: Uuid,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<StatusEntity>>>;
    /// Every participant status of a session.
    fn list_statuses(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<StatusEntity>>>;
    /// Replace a status if its stored revision still equals `expected_revision`.
    fn update_status(
        &self,
        status: StatusEntity,
        expected_revision: u64,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete every status of a session, returning how many existed.
    fn delete_statuses(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<usize>>;

    /// Cheap round-trip proving the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
