use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::models::{ItemEntity, SessionEntity, StatusEntity};

pub const SESSION_PREFIX: &str = "session::";
pub const ITEM_PREFIX: &str = "item::";
pub const STATUS_PREFIX: &str = "status::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[allow(dead_code)]
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct FindResponse {
    pub docs: Vec<Value>,
}

/// Envelope adding CouchDB's `_id`/`_rev` to a stored body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchDocument<T> {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: T,
}

impl<T> CouchDocument<T> {
    pub fn new(id: String, body: T) -> Self {
        Self {
            id,
            rev: None,
            body,
        }
    }
}

pub type CouchSessionDocument = CouchDocument<SessionEntity>;
pub type CouchItemDocument = CouchDocument<ItemEntity>;
pub type CouchStatusDocument = CouchDocument<StatusEntity>;

pub fn session_doc_id(id: Uuid) -> String {
    format!("{SESSION_PREFIX}{id}")
}

pub fn item_doc_id(id: Uuid) -> String {
    format!("{ITEM_PREFIX}{id}")
}

pub fn status_prefix(session_id: Uuid) -> String {
    format!("{STATUS_PREFIX}{session_id}::")
}

pub fn status_doc_id(session_id: Uuid, user_id: &str) -> String {
    format!("{}{user_id}", status_prefix(session_id))
}

/// Mango selector restricting `_find` to one document family.
pub fn prefix_selector(prefix: &str) -> Value {
    serde_json::json!({ "$gt": prefix, "$lt": format!("{prefix}{END_SUFFIX}") })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ids_share_the_session_prefix() {
        let session_id = Uuid::new_v4();
        let id = status_doc_id(session_id, "ann");
        assert!(id.starts_with(&status_prefix(session_id)));
        assert!(id.ends_with("::ann"));
    }

    #[test]
    fn envelope_flattens_the_body() {
        let item = ItemEntity {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            catalog_id: 550,
            score: 3,
            lives: 2,
        };
        let document = CouchDocument::new(item_doc_id(item.id), item.clone());
        let value = serde_json::to_value(&document).unwrap();
        assert_eq!(value["_id"], serde_json::json!(item_doc_id(item.id)));
        assert!(value.get("_rev").is_none());
        assert_eq!(value["catalog_id"], serde_json::json!(550));

        let parsed: CouchItemDocument = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.body, item);
    }
}
