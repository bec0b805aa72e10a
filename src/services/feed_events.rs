use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::state::{
    SharedState,
    feed::{ChangeEvent, ChangeKind, Collection, ItemPayload, SessionPayload},
    session::{CandidateItem, ParticipantStatus, Session},
};

#[derive(Serialize)]
struct DeletedPayload {
    ids: Vec<Uuid>,
}

#[derive(Serialize)]
struct StatusPayload<'a> {
    user_id: &'a str,
    invited: bool,
    swipe_done: bool,
    rank_done: bool,
    attrition_done: bool,
    fav_remaining: u8,
    skull_remaining: u8,
}

impl<'a> From<&'a ParticipantStatus> for StatusPayload<'a> {
    fn from(status: &'a ParticipantStatus) -> Self {
        Self {
            user_id: &status.user_id,
            invited: status.invited,
            swipe_done: status.swipe_done,
            rank_done: status.rank_done,
            attrition_done: status.attrition_done,
            fav_remaining: status.fav_remaining,
            skull_remaining: status.skull_remaining,
        }
    }
}

/// Publish a session mutation.
pub fn publish_session(state: &SharedState, kind: ChangeKind, session: &Session) {
    send_change(
        state,
        Collection::Sessions,
        kind,
        session.id,
        &SessionPayload::from(session),
    );
}

/// Publish a session deletion.
pub fn publish_session_deleted(state: &SharedState, session_id: Uuid) {
    send_change(
        state,
        Collection::Sessions,
        ChangeKind::Delete,
        session_id,
        &DeletedPayload {
            ids: vec![session_id],
        },
    );
}

/// Publish a title mutation.
pub fn publish_item(state: &SharedState, kind: ChangeKind, item: &CandidateItem) {
    send_change(
        state,
        Collection::Items,
        kind,
        item.session_id,
        &ItemPayload::from(item),
    );
}

/// Publish the removal of titles from a session.
pub fn publish_items_deleted(state: &SharedState, session_id: Uuid, ids: &[Uuid]) {
    if ids.is_empty() {
        return;
    }
    send_change(
        state,
        Collection::Items,
        ChangeKind::Delete,
        session_id,
        &DeletedPayload { ids: ids.to_vec() },
    );
}

/// Publish a participant status mutation.
pub fn publish_status(state: &SharedState, kind: ChangeKind, status: &ParticipantStatus) {
    send_change(
        state,
        Collection::Statuses,
        kind,
        status.session_id,
        &StatusPayload::from(status),
    );
}

fn send_change<T: Serialize>(
    state: &SharedState,
    collection: Collection,
    kind: ChangeKind,
    session_id: Uuid,
    payload: &T,
) {
    match serde_json::to_value(payload) {
        Ok(payload) => state.feed().publish(ChangeEvent {
            collection,
            kind,
            session_id,
            payload,
        }),
        Err(err) => warn!(
            ?collection,
            ?kind,
            session_id = %session_id,
            error = %err,
            "failed to serialize change event"
        ),
    }
}
