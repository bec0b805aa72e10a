use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::dao::models::{ItemEntity, SessionEntity, StatusEntity};

pub const SESSION_COLLECTION_NAME: &str = "sessions";
pub const ITEM_COLLECTION_NAME: &str = "items";
pub const STATUS_COLLECTION_NAME: &str = "statuses";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub owner_id: String,
    pub guest_ids: Vec<String>,
    pub step: i32,
    pub current_turn: Option<String>,
    pub item_refs: Vec<String>,
    pub winner_id: Option<String>,
    pub revision: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoItemDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub session_id: String,
    pub catalog_id: i64,
    pub score: i32,
    pub lives: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoStatusDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub invited: bool,
    pub swipe_done: bool,
    pub rank_done: bool,
    pub attrition_done: bool,
    pub fav_remaining: i32,
    pub skull_remaining: i32,
    #[serde(default)]
    pub swiped: Vec<String>,
    #[serde(default)]
    pub ranked_groups: Vec<i64>,
    pub revision: i64,
}

pub fn doc_id(id: &str) -> Document {
    doc! { "_id": id }
}

pub fn status_doc_id(session_id: Uuid, user_id: &str) -> String {
    format!("{session_id}:{user_id}")
}

fn parse_uuid(collection: &'static str, id: &str, raw: &str) -> Result<Uuid, MongoDaoError> {
    Uuid::parse_str(raw).map_err(|err| MongoDaoError::Corrupt {
        collection,
        id: id.to_owned(),
        reason: format!("invalid uuid `{raw}`: {err}"),
    })
}

fn parse_uuids(
    collection: &'static str,
    id: &str,
    raw: &[String],
) -> Result<Vec<Uuid>, MongoDaoError> {
    raw.iter()
        .map(|value| parse_uuid(collection, id, value))
        .collect()
}

fn narrow<T: TryFrom<i64>>(collection: &'static str, id: &str, field: &str, value: i64) -> Result<T, MongoDaoError> {
    T::try_from(value).map_err(|_| MongoDaoError::Corrupt {
        collection,
        id: id.to_owned(),
        reason: format!("`{field}` out of range: {value}"),
    })
}

impl From<SessionEntity> for MongoSessionDocument {
    fn from(value: SessionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            owner_id: value.owner_id,
            guest_ids: value.guest_ids,
            step: i32::from(value.step),
            current_turn: value.current_turn,
            item_refs: value.item_refs.iter().map(Uuid::to_string).collect(),
            winner_id: value.winner_id.map(|id| id.to_string()),
            revision: value.revision as i64,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoSessionDocument> for SessionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoSessionDocument) -> Result<Self, Self::Error> {
        const COLLECTION: &str = SESSION_COLLECTION_NAME;
        let id = parse_uuid(COLLECTION, &value.id, &value.id)?;
        let winner_id = value
            .winner_id
            .as_deref()
            .map(|raw| parse_uuid(COLLECTION, &value.id, raw))
            .transpose()?;
        Ok(Self {
            id,
            step: narrow(COLLECTION, &value.id, "step", i64::from(value.step))?,
            item_refs: parse_uuids(COLLECTION, &value.id, &value.item_refs)?,
            revision: narrow(COLLECTION, &value.id, "revision", value.revision)?,
            winner_id,
            owner_id: value.owner_id,
            guest_ids: value.guest_ids,
            current_turn: value.current_turn,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

impl From<ItemEntity> for MongoItemDocument {
    fn from(value: ItemEntity) -> Self {
        Self {
            id: value.id.to_string(),
            session_id: value.session_id.to_string(),
            catalog_id: value.catalog_id as i64,
            score: value.score,
            lives: i32::from(value.lives),
        }
    }
}

impl TryFrom<MongoItemDocument> for ItemEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoItemDocument) -> Result<Self, Self::Error> {
        const COLLECTION: &str = ITEM_COLLECTION_NAME;
        Ok(Self {
            id: parse_uuid(COLLECTION, &value.id, &value.id)?,
            session_id: parse_uuid(COLLECTION, &value.id, &value.session_id)?,
            catalog_id: narrow(COLLECTION, &value.id, "catalog_id", value.catalog_id)?,
            score: value.score,
            // Lives are only ever decremented while positive.
            lives: narrow(COLLECTION, &value.id, "lives", i64::from(value.lives.max(0)))?,
        })
    }
}

impl From<StatusEntity> for MongoStatusDocument {
    fn from(value: StatusEntity) -> Self {
        Self {
            id: status_doc_id(value.session_id, &value.user_id),
            session_id: value.session_id.to_string(),
            user_id: value.user_id,
            invited: value.invited,
            swipe_done: value.swipe_done,
            rank_done: value.rank_done,
            attrition_done: value.attrition_done,
            fav_remaining: i32::from(value.fav_remaining),
            skull_remaining: i32::from(value.skull_remaining),
            swiped: value.swiped.iter().map(Uuid::to_string).collect(),
            ranked_groups: value.ranked_groups.iter().map(|group| *group as i64).collect(),
            revision: value.revision as i64,
        }
    }
}

impl TryFrom<MongoStatusDocument> for StatusEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoStatusDocument) -> Result<Self, Self::Error> {
        const COLLECTION: &str = STATUS_COLLECTION_NAME;
        let ranked_groups = value
            .ranked_groups
            .iter()
            .map(|group| narrow(COLLECTION, &value.id, "ranked_groups", *group))
            .collect::<Result<Vec<usize>, _>>()?;
        Ok(Self {
            session_id: parse_uuid(COLLECTION, &value.id, &value.session_id)?,
            fav_remaining: narrow(COLLECTION, &value.id, "fav_remaining", i64::from(value.fav_remaining))?,
            skull_remaining: narrow(COLLECTION, &value.id, "skull_remaining", i64::from(value.skull_remaining))?,
            swiped: parse_uuids(COLLECTION, &value.id, &value.swiped)?,
            revision: narrow(COLLECTION, &value.id, "revision", value.revision)?,
            ranked_groups,
            user_id: value.user_id,
            invited: value.invited,
            swipe_done: value.swipe_done,
            rank_done: value.rank_done,
            attrition_done: value.attrition_done,
        })
    }
}
