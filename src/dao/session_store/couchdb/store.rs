use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{from_value, json};
use tracing::debug;
use uuid::Uuid;

use crate::dao::{
    models::{ItemEntity, SessionEntity, StatusEntity},
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, CouchDocument, CouchItemDocument, CouchSessionDocument,
        CouchStatusDocument, END_SUFFIX, FindResponse, ITEM_PREFIX, SESSION_PREFIX,
        item_doc_id, prefix_selector, session_doc_id, status_doc_id, status_prefix,
    },
};

/// Attempts for read-modify-write updates that CouchDB cannot express atomically.
const MAX_UPDATE_ATTEMPTS: u32 = 8;
/// Upper bound on `_find` results; pools never exceed a few hundred records.
const FIND_LIMIT: usize = 10_000;

/// Outcome of a revisioned write.
enum Written {
    Stored,
    Conflict,
}

/// [`SessionStore`] persisting every record as a CouchDB document.
#[derive(Clone)]
pub struct CouchSessionStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchSessionStore {
    /// Connect to CouchDB and create the database when missing.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config.credentials.map(|credentials| {
            (
                Arc::<str>::from(credentials.username),
                Arc::<str>::from(credentials.password),
            )
        });

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.with_auth(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = format!("{}/{}", self.base_url, self.database);

        let response = self
            .with_auth(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .with_auth(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// PUT a document; a `409` means the `_rev` carried by `document` is stale.
    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<Written>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Ok(Written::Conflict),
            status if status.is_success() => Ok(Written::Stored),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// Delete the current revision of a document, returning whether it existed.
    async fn delete_document(&self, doc_id: &str) -> CouchResult<bool> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let Some(current) = self.get_document::<CouchDocument<serde_json::Value>>(doc_id).await?
            else {
                return Ok(false);
            };
            let Some(rev) = current.rev else {
                return Ok(false);
            };

            let response = self
                .request(Method::DELETE, doc_id)
                .query(&[("rev", rev)])
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: doc_id.to_string(),
                    source,
                })?;
            match response.status() {
                StatusCode::CONFLICT => continue,
                StatusCode::NOT_FOUND => return Ok(false),
                status if status.is_success() => return Ok(true),
                other => {
                    return Err(CouchDaoError::RequestStatus {
                        path: doc_id.to_string(),
                        status: other,
                    });
                }
            }
        }
        Err(CouchDaoError::ContentionExhausted {
            path: doc_id.to_string(),
            attempts: MAX_UPDATE_ATTEMPTS,
        })
    }

    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{}\"", prefix)),
            ("endkey", format!("\"{}{}\"", prefix, END_SUFFIX)),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            }
        })?;

        payload
            .rows
            .into_iter()
            .filter_map(|row| row.doc)
            .map(|doc| {
                from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: ALL_DOCS.to_string(),
                    source,
                })
            })
            .collect()
    }

    /// Run a Mango query.
    async fn find_documents<T>(&self, selector: serde_json::Value) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const FIND: &str = "_find";
        let response = self
            .request(Method::POST, FIND)
            .json(&json!({ "selector": selector, "limit": FIND_LIMIT }))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: FIND.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: FIND.to_string(),
                status: response.status(),
            });
        }

        let payload = response
            .json::<FindResponse>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: FIND.to_string(),
                source,
            })?;

        payload
            .docs
            .into_iter()
            .map(|doc| {
                from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: FIND.to_string(),
                    source,
                })
            })
            .collect()
    }

    /// Compare-and-swap on the body's own `revision` counter, guarded by `_rev`.
    async fn swap_revisioned<T>(
        &self,
        doc_id: &str,
        body: T,
        expected_revision: u64,
        revision_of: fn(&T) -> u64,
    ) -> StorageResult<()>
    where
        T: Serialize + DeserializeOwned,
    {
        let Some(current) = self.get_document::<CouchDocument<T>>(doc_id).await? else {
            return Err(StorageError::conflict(doc_id, expected_revision));
        };
        if revision_of(&current.body) != expected_revision {
            return Err(StorageError::conflict(doc_id, expected_revision));
        }

        let document = CouchDocument {
            id: doc_id.to_string(),
            rev: current.rev,
            body,
        };
        match self.put_document(doc_id, &document).await? {
            Written::Stored => Ok(()),
            Written::Conflict => {
                debug!(doc_id, expected_revision, "CouchDB rejected stale _rev");
                Err(StorageError::conflict(doc_id, expected_revision))
            }
        }
    }

    /// Read-modify-write an item, retrying on `_rev` conflicts.
    async fn modify_item<F>(&self, id: Uuid, mut change: F) -> CouchResult<Option<ItemEntity>>
    where
        F: FnMut(&mut ItemEntity),
    {
        let doc_id = item_doc_id(id);
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let Some(mut document) = self.get_document::<CouchItemDocument>(&doc_id).await? else {
                return Ok(None);
            };
            change(&mut document.body);
            match self.put_document(&doc_id, &document).await? {
                Written::Stored => return Ok(Some(document.body)),
                Written::Conflict => continue,
            }
        }
        Err(CouchDaoError::ContentionExhausted {
            path: doc_id,
            attempts: MAX_UPDATE_ATTEMPTS,
        })
    }

    async fn create<T: Serialize>(&self, doc_id: String, body: T) -> CouchResult<()> {
        let document = CouchDocument::new(doc_id.clone(), body);
        match self.put_document(&doc_id, &document).await? {
            Written::Stored => Ok(()),
            Written::Conflict => Err(CouchDaoError::RequestStatus {
                path: doc_id,
                status: StatusCode::CONFLICT,
            }),
        }
    }
}

impl SessionStore for CouchSessionStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .create(session_doc_id(session.id), session)
                .await
                .map_err(Into::into)
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let maybe_doc = store
                .get_document::<CouchSessionDocument>(&session_doc_id(id))
                .await?;
            Ok(maybe_doc.map(|doc| doc.body))
        })
    }

    fn update_session(
        &self,
        mut session: SessionEntity,
        expected_revision: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = session_doc_id(session.id);
            session.revision = expected_revision + 1;
            session.updated_at = std::time::SystemTime::now();
            store
                .swap_revisioned(&doc_id, session, expected_revision, |body| body.revision)
                .await
        })
    }

    fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_document(&session_doc_id(id))
                .await
                .map_err(Into::into)
        })
    }

    fn list_sessions_for_user(
        &self,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let selector = json!({
                "_id": prefix_selector(SESSION_PREFIX),
                "$or": [
                    { "owner_id": &user_id },
                    { "guest_ids": { "$elemMatch": { "$eq": &user_id } } }
                ]
            });
            let docs = store
                .find_documents::<CouchSessionDocument>(selector)
                .await?;
            Ok(docs.into_iter().map(|doc| doc.body).collect())
        })
    }

    fn insert_items(&self, items: Vec<ItemEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            for item in items {
                store.create(item_doc_id(item.id), item).await?;
            }
            Ok(())
        })
    }

    fn find_items(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ItemEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let selector = json!({
                "_id": prefix_selector(ITEM_PREFIX),
                "session_id": session_id,
            });
            let docs = store.find_documents::<CouchItemDocument>(selector).await?;
            Ok(docs.into_iter().map(|doc| doc.body).collect())
        })
    }

    fn adjust_item_score(
        &self,
        id: Uuid,
        delta: i32,
    ) -> BoxFuture<'static, StorageResult<Option<ItemEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .modify_item(id, |item| item.score += delta)
                .await
                .map_err(Into::into)
        })
    }

    fn set_item_lives(&self, id: Uuid, lives: u8) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.modify_item(id, |item| item.lives = lives).await?;
            Ok(())
        })
    }

    fn decrement_item_lives(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ItemEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .modify_item(id, |item| item.lives = item.lives.saturating_sub(1))
                .await
                .map_err(Into::into)
        })
    }

    fn delete_items(&self, ids: Vec<Uuid>) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move {
            let mut removed = 0;
            for id in ids {
                if store.delete_document(&item_doc_id(id)).await? {
                    removed += 1;
                }
            }
            Ok(removed)
        })
    }

    fn insert_statuses(
        &self,
        statuses: Vec<StatusEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            for status in statuses {
                let doc_id = status_doc_id(status.session_id, &status.user_id);
                store.create(doc_id, status).await?;
            }
            Ok(())
        })
    }

    fn find_status(
        &self,
        session_id: Uuid,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<StatusEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let maybe_doc = store
                .get_document::<CouchStatusDocument>(&status_doc_id(session_id, &user_id))
                .await?;
            Ok(maybe_doc.map(|doc| doc.body))
        })
    }

    fn list_statuses(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<StatusEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchStatusDocument>(&status_prefix(session_id))
                .await?;
            Ok(docs.into_iter().map(|doc| doc.body).collect())
        })
    }

    fn update_status(
        &self,
        mut status: StatusEntity,
        expected_revision: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = status_doc_id(status.session_id, &status.user_id);
            status.revision = expected_revision + 1;
            store
                .swap_revisioned(&doc_id, status, expected_revision, |body| body.revision)
                .await
        })
    }

    fn delete_statuses(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchStatusDocument>(&status_prefix(session_id))
                .await?;
            let mut removed = 0;
            for doc in docs {
                if store.delete_document(&doc.id).await? {
                    removed += 1;
                }
            }
            Ok(removed)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = format!("{}/{}", store.base_url, store.database);
            let response = store
                .with_auth(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
