use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::state::session::{CandidateItem, Session};

/// Record family a change belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Session records.
    Sessions,
    /// Candidate titles.
    Items,
    /// Participant statuses.
    Statuses,
}

/// Kind of mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Record created.
    Create,
    /// Record updated.
    Update,
    /// Record deleted.
    Delete,
}

/// One document mutation pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Record family.
    pub collection: Collection,
    /// Mutation kind.
    pub kind: ChangeKind,
    /// Session the record belongs to.
    pub session_id: Uuid,
    /// Record body after the mutation (ids only for deletions).
    pub payload: serde_json::Value,
}

impl ChangeEvent {
    /// SSE event name, e.g. `items.update`.
    pub fn name(&self) -> String {
        let collection = match self.collection {
            Collection::Sessions => "sessions",
            Collection::Items => "items",
            Collection::Statuses => "statuses",
        };
        let kind = match self.kind {
            ChangeKind::Create => "create",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        };
        format!("{collection}.{kind}")
    }
}

/// Session fields carried by session events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    /// Session id.
    pub id: Uuid,
    /// Phase ordinal.
    pub step: u8,
    /// Turn holder.
    pub current_turn: Option<String>,
    /// Alive titles.
    pub item_refs: Vec<Uuid>,
    /// Winner, once complete.
    pub winner_id: Option<Uuid>,
    /// Record revision the event was published at.
    pub revision: u64,
}

impl From<&Session> for SessionPayload {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            step: session.phase.ordinal(),
            current_turn: session.current_turn.clone(),
            item_refs: session.item_refs.clone(),
            winner_id: session.winner_id,
            revision: session.revision,
        }
    }
}

/// Title fields carried by item events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPayload {
    /// Title id.
    pub id: Uuid,
    /// Catalog id.
    pub catalog_id: u64,
    /// Shared score.
    pub score: i32,
    /// Lives left.
    pub lives: u8,
}

impl From<&CandidateItem> for ItemPayload {
    fn from(item: &CandidateItem) -> Self {
        Self {
            id: item.id,
            catalog_id: item.catalog_id,
            score: item.score,
            lives: item.lives,
        }
    }
}

/// Broadcast hub fanning change events out to feed subscribers.
pub struct FeedHub {
    sender: broadcast::Sender<ChangeEvent>,
}

impl FeedHub {
    /// Hub backed by a broadcast channel of `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register a subscriber receiving every subsequent event.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Publish an event, ignoring the absence of subscribers.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.sender.send(event);
    }
}
