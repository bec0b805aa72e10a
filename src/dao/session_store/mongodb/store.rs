use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection, Database, IndexModel,
    bson::doc,
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::open_database,
    error::{MongoDaoError, MongoResult},
    models::{
        ITEM_COLLECTION_NAME, MongoItemDocument, MongoSessionDocument, MongoStatusDocument,
        SESSION_COLLECTION_NAME, STATUS_COLLECTION_NAME, doc_id, status_doc_id,
    },
};
use crate::dao::{
    models::{ItemEntity, SessionEntity, StatusEntity},
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};

/// [`SessionStore`] backed by three MongoDB collections.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: RwLock<Database>,
    config: MongoConfig,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let database = open_database(&self.config).await?;
        *self.database.write().await = database;
        Ok(())
    }
}

impl MongoSessionStore {
    /// Connect and make sure the lookup indexes exist.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = open_database(&config).await?;
        let inner = Arc::new(MongoInner {
            database: RwLock::new(database),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let indexes: [(&'static str, &'static str, mongodb::bson::Document); 4] = [
            (SESSION_COLLECTION_NAME, "owner_id", doc! { "owner_id": 1 }),
            (SESSION_COLLECTION_NAME, "guest_ids", doc! { "guest_ids": 1 }),
            (ITEM_COLLECTION_NAME, "session_id", doc! { "session_id": 1 }),
            (STATUS_COLLECTION_NAME, "session_id", doc! { "session_id": 1 }),
        ];

        let database = self.database().await;
        for (collection, index, keys) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(Some(format!("{collection}_{index}_idx")))
                        .build(),
                )
                .build();
            database
                .collection::<mongodb::bson::Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
        }
        Ok(())
    }

    async fn database(&self) -> Database {
        self.inner.database.read().await.clone()
    }

    async fn sessions(&self) -> Collection<MongoSessionDocument> {
        self.database().await.collection(SESSION_COLLECTION_NAME)
    }

    async fn items(&self) -> Collection<MongoItemDocument> {
        self.database().await.collection(ITEM_COLLECTION_NAME)
    }

    async fn statuses(&self) -> Collection<MongoStatusDocument> {
        self.database().await.collection(STATUS_COLLECTION_NAME)
    }

    async fn insert_session(&self, session: SessionEntity) -> MongoResult<()> {
        let document = MongoSessionDocument::from(session);
        self.sessions()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: SESSION_COLLECTION_NAME,
                id: document.id.clone(),
                source,
            })?;
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> MongoResult<Option<SessionEntity>> {
        let key = id.to_string();
        self.sessions()
            .await
            .find_one(doc_id(&key))
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: SESSION_COLLECTION_NAME,
                id: key,
                source,
            })?
            .map(SessionEntity::try_from)
            .transpose()
    }

    /// Returns `false` when the stored revision no longer matches.
    async fn replace_session(
        &self,
        mut session: SessionEntity,
        expected_revision: u64,
    ) -> MongoResult<bool> {
        session.revision = expected_revision + 1;
        session.updated_at = std::time::SystemTime::now();
        let document = MongoSessionDocument::from(session);
        let result = self
            .sessions()
            .await
            .replace_one(
                doc! { "_id": document.id.as_str(), "revision": expected_revision as i64 },
                &document,
            )
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: SESSION_COLLECTION_NAME,
                id: document.id.clone(),
                source,
            })?;
        Ok(result.matched_count > 0)
    }

    async fn delete_session(&self, id: Uuid) -> MongoResult<bool> {
        let key = id.to_string();
        let result = self
            .sessions()
            .await
            .delete_one(doc_id(&key))
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: SESSION_COLLECTION_NAME,
                id: key,
                source,
            })?;
        Ok(result.deleted_count > 0)
    }

    async fn list_sessions_for_user(&self, user_id: String) -> MongoResult<Vec<SessionEntity>> {
        let filter = doc! { "$or": [ { "owner_id": user_id.as_str() }, { "guest_ids": user_id.as_str() } ] };
        let documents: Vec<MongoSessionDocument> = self
            .sessions()
            .await
            .find(filter)
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: SESSION_COLLECTION_NAME,
                id: format!("participant {user_id}"),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: SESSION_COLLECTION_NAME,
                id: format!("participant {user_id}"),
                source,
            })?;
        documents.into_iter().map(SessionEntity::try_from).collect()
    }

    async fn insert_items(&self, items: Vec<ItemEntity>) -> MongoResult<()> {
        let Some(first) = items.first() else {
            return Ok(());
        };
        let session_id = first.session_id.to_string();
        let documents: Vec<MongoItemDocument> = items.into_iter().map(Into::into).collect();
        self.items()
            .await
            .insert_many(&documents)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: ITEM_COLLECTION_NAME,
                id: format!("pool of {session_id}"),
                source,
            })?;
        Ok(())
    }

    async fn find_items(&self, session_id: Uuid) -> MongoResult<Vec<ItemEntity>> {
        let key = session_id.to_string();
        let documents: Vec<MongoItemDocument> = self
            .items()
            .await
            .find(doc! { "session_id": key.as_str() })
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: ITEM_COLLECTION_NAME,
                id: format!("pool of {key}"),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: ITEM_COLLECTION_NAME,
                id: format!("pool of {key}"),
                source,
            })?;
        documents.into_iter().map(ItemEntity::try_from).collect()
    }

    async fn update_item(
        &self,
        id: Uuid,
        filter: mongodb::bson::Document,
        update: mongodb::bson::Document,
    ) -> MongoResult<Option<ItemEntity>> {
        self.items()
            .await
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: ITEM_COLLECTION_NAME,
                id: id.to_string(),
                source,
            })?
            .map(ItemEntity::try_from)
            .transpose()
    }

    async fn find_item(&self, id: Uuid) -> MongoResult<Option<ItemEntity>> {
        let key = id.to_string();
        self.items()
            .await
            .find_one(doc_id(&key))
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: ITEM_COLLECTION_NAME,
                id: key,
                source,
            })?
            .map(ItemEntity::try_from)
            .transpose()
    }

    async fn decrement_item_lives(&self, id: Uuid) -> MongoResult<Option<ItemEntity>> {
        let key = id.to_string();
        let updated = self
            .update_item(
                id,
                doc! { "_id": key.as_str(), "lives": { "$gt": 0 } },
                doc! { "$inc": { "lives": -1 } },
            )
            .await?;
        match updated {
            Some(item) => Ok(Some(item)),
            // Already at zero (or missing): report the stored state unchanged.
            None => self.find_item(id).await,
        }
    }

    async fn delete_items(&self, ids: Vec<Uuid>) -> MongoResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let keys: Vec<String> = ids.iter().map(Uuid::to_string).collect();
        let result = self
            .items()
            .await
            .delete_many(doc! { "_id": { "$in": keys } })
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: ITEM_COLLECTION_NAME,
                id: format!("{} item(s)", ids.len()),
                source,
            })?;
        Ok(result.deleted_count as usize)
    }

    async fn insert_statuses(&self, statuses: Vec<StatusEntity>) -> MongoResult<()> {
        let Some(first) = statuses.first() else {
            return Ok(());
        };
        let session_id = first.session_id.to_string();
        let documents: Vec<MongoStatusDocument> = statuses.into_iter().map(Into::into).collect();
        self.statuses()
            .await
            .insert_many(&documents)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: STATUS_COLLECTION_NAME,
                id: format!("statuses of {session_id}"),
                source,
            })?;
        Ok(())
    }

    async fn find_status(
        &self,
        session_id: Uuid,
        user_id: String,
    ) -> MongoResult<Option<StatusEntity>> {
        let key = status_doc_id(session_id, &user_id);
        self.statuses()
            .await
            .find_one(doc_id(&key))
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: STATUS_COLLECTION_NAME,
                id: key,
                source,
            })?
            .map(StatusEntity::try_from)
            .transpose()
    }

    async fn list_statuses(&self, session_id: Uuid) -> MongoResult<Vec<StatusEntity>> {
        let key = session_id.to_string();
        let documents: Vec<MongoStatusDocument> = self
            .statuses()
            .await
            .find(doc! { "session_id": key.as_str() })
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: STATUS_COLLECTION_NAME,
                id: format!("statuses of {key}"),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: STATUS_COLLECTION_NAME,
                id: format!("statuses of {key}"),
                source,
            })?;
        documents.into_iter().map(StatusEntity::try_from).collect()
    }

    async fn replace_status(
        &self,
        mut status: StatusEntity,
        expected_revision: u64,
    ) -> MongoResult<bool> {
        status.revision = expected_revision + 1;
        let document = MongoStatusDocument::from(status);
        let result = self
            .statuses()
            .await
            .replace_one(
                doc! { "_id": document.id.as_str(), "revision": expected_revision as i64 },
                &document,
            )
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: STATUS_COLLECTION_NAME,
                id: document.id.clone(),
                source,
            })?;
        Ok(result.matched_count > 0)
    }

    async fn delete_statuses(&self, session_id: Uuid) -> MongoResult<usize> {
        let key = session_id.to_string();
        let result = self
            .statuses()
            .await
            .delete_many(doc! { "session_id": key.as_str() })
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: STATUS_COLLECTION_NAME,
                id: format!("statuses of {key}"),
                source,
            })?;
        Ok(result.deleted_count as usize)
    }
}

impl SessionStore for MongoSessionStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_session(session).await.map_err(Into::into) })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session(id).await.map_err(Into::into) })
    }

    fn update_session(
        &self,
        session: SessionEntity,
        expected_revision: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = session.id;
            if store.replace_session(session, expected_revision).await? {
                Ok(())
            } else {
                debug!(session_id = %id, expected_revision, "session write lost the race");
                Err(StorageError::conflict(format!("session {id}"), expected_revision))
            }
        })
    }

    fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_session(id).await.map_err(Into::into) })
    }

    fn list_sessions_for_user(
        &self,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_sessions_for_user(user_id).await.map_err(Into::into) })
    }

    fn insert_items(&self, items: Vec<ItemEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_items(items).await.map_err(Into::into) })
    }

    fn find_items(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ItemEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_items(session_id).await.map_err(Into::into) })
    }

    fn adjust_item_score(
        &self,
        id: Uuid,
        delta: i32,
    ) -> BoxFuture<'static, StorageResult<Option<ItemEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let key = id.to_string();
            store
                .update_item(id, doc_id(&key), doc! { "$inc": { "score": delta } })
                .await
                .map_err(Into::into)
        })
    }

    fn set_item_lives(&self, id: Uuid, lives: u8) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let key = id.to_string();
            store
                .update_item(id, doc_id(&key), doc! { "$set": { "lives": i32::from(lives) } })
                .await?;
            Ok(())
        })
    }

    fn decrement_item_lives(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ItemEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.decrement_item_lives(id).await.map_err(Into::into) })
    }

    fn delete_items(&self, ids: Vec<Uuid>) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move { store.delete_items(ids).await.map_err(Into::into) })
    }

    fn insert_statuses(
        &self,
        statuses: Vec<StatusEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_statuses(statuses).await.map_err(Into::into) })
    }

    fn find_status(
        &self,
        session_id: Uuid,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<StatusEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_status(session_id, user_id).await.map_err(Into::into) })
    }

    fn list_statuses(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<StatusEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_statuses(session_id).await.map_err(Into::into) })
    }

    fn update_status(
        &self,
        status: StatusEntity,
        expected_revision: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let record = status_doc_id(status.session_id, &status.user_id);
            if store.replace_status(status, expected_revision).await? {
                Ok(())
            } else {
                Err(StorageError::conflict(format!("status {record}"), expected_revision))
            }
        })
    }

    fn delete_statuses(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move { store.delete_statuses(session_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
