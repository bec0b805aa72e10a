//! Client-side view state re-derived from the change feed.
//!
//! The reducer only folds record updates into display state; it never scores,
//! cuts or advances anything.

use indexmap::IndexMap;
use uuid::Uuid;

use crate::state::{
    feed::{ChangeEvent, ChangeKind, Collection, ItemPayload, SessionPayload},
    session::{CandidateItem, Session},
    state_machine::SessionPhase,
};

/// What one participant sees of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    session_id: Uuid,
    viewer: String,
    phase: SessionPhase,
    current_turn: Option<String>,
    lives: IndexMap<Uuid, u8>,
    winner: Option<Uuid>,
    revision: u64,
}

impl SessionView {
    /// Seed the view from a full read of the session and its titles.
    pub fn new(viewer: impl Into<String>, session: &Session, items: &[CandidateItem]) -> Self {
        let lives = session
            .item_refs
            .iter()
            .map(|id| {
                let lives = items
                    .iter()
                    .find(|item| item.id == *id)
                    .map_or(0, |item| item.lives);
                (*id, lives)
            })
            .collect();
        Self {
            session_id: session.id,
            viewer: viewer.into(),
            phase: session.phase,
            current_turn: session.current_turn.clone(),
            lives,
            winner: session.winner_id,
            revision: session.revision,
        }
    }

    /// Fold one feed event into the view, returning whether anything changed.
    ///
    /// Only updates to sessions and titles are considered. Session events at or
    /// below the last applied revision are dropped, so redelivered or reordered
    /// events never move the view backwards.
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        if event.session_id != self.session_id || event.kind != ChangeKind::Update {
            return false;
        }
        match event.collection {
            Collection::Sessions => match serde_json::from_value::<SessionPayload>(event.payload.clone()) {
                Ok(payload) => self.apply_session(payload),
                Err(_) => false,
            },
            Collection::Items => match serde_json::from_value::<ItemPayload>(event.payload.clone()) {
                Ok(payload) => self.apply_item(payload),
                Err(_) => false,
            },
            Collection::Statuses => false,
        }
    }

    fn apply_session(&mut self, payload: SessionPayload) -> bool {
        let Some(phase) = SessionPhase::from_ordinal(payload.step) else {
            return false;
        };
        if payload.revision <= self.revision || phase < self.phase {
            return false;
        }
        let before = self.clone();

        self.revision = payload.revision;
        self.phase = phase;
        self.current_turn = payload.current_turn;
        self.winner = payload.winner_id;
        self.lives.retain(|id, _| payload.item_refs.contains(id));
        for id in payload.item_refs {
            self.lives.entry(id).or_insert(0);
        }

        *self != before
    }

    fn apply_item(&mut self, payload: ItemPayload) -> bool {
        match self.lives.get_mut(&payload.id) {
            Some(lives) if *lives != payload.lives => {
                *lives = payload.lives;
                true
            }
            _ => false,
        }
    }

    /// Current round.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Whether the viewer may attack right now.
    pub fn is_my_turn(&self) -> bool {
        self.phase == SessionPhase::Attrition && self.current_turn.as_deref() == Some(&self.viewer)
    }

    /// Titles that still have lives.
    pub fn alive_count(&self) -> usize {
        self.lives.values().filter(|lives| **lives > 0).count()
    }

    /// Lives per pool title in pool order.
    pub fn lives(&self) -> &IndexMap<Uuid, u8> {
        &self.lives
    }

    /// Winner once the session is complete.
    pub fn winner(&self) -> Option<Uuid> {
        self.winner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrition_session() -> (Session, Vec<CandidateItem>) {
        let mut session = Session::new("owner".into(), vec!["ann".into()]);
        session.phase = SessionPhase::Attrition;
        let items: Vec<CandidateItem> = (0..3)
            .map(|n| {
                let mut item = CandidateItem::new(session.id, 100 + n);
                item.lives = 1 + n as u8;
                item
            })
            .collect();
        session.item_refs = items.iter().map(|item| item.id).collect();
        (session, items)
    }

    fn item_update(session_id: Uuid, item: &CandidateItem) -> ChangeEvent {
        ChangeEvent {
            collection: Collection::Items,
            kind: ChangeKind::Update,
            session_id,
            payload: serde_json::to_value(ItemPayload::from(item)).unwrap(),
        }
    }

    #[test]
    fn item_update_is_idempotent() {
        let (session, mut items) = attrition_session();
        let mut view = SessionView::new("ann", &session, &items);
        assert_eq!(view.alive_count(), 3);

        items[0].lives = 0;
        let event = item_update(session.id, &items[0]);
        assert!(view.apply(&event));
        assert!(!view.apply(&event));
        assert_eq!(view.alive_count(), 2);
    }

    fn session_update(session: &Session) -> ChangeEvent {
        ChangeEvent {
            collection: Collection::Sessions,
            kind: ChangeKind::Update,
            session_id: session.id,
            payload: serde_json::to_value(SessionPayload::from(session)).unwrap(),
        }
    }

    #[test]
    fn turn_follows_session_updates() {
        let (mut session, items) = attrition_session();
        let mut view = SessionView::new("ann", &session, &items);
        assert!(!view.is_my_turn());

        session.current_turn = Some("ann".into());
        session.revision += 1;
        let event = session_update(&session);
        assert!(view.apply(&event));
        assert!(view.is_my_turn());
    }

    #[test]
    fn other_sessions_and_kinds_are_ignored() {
        let (session, items) = attrition_session();
        let mut view = SessionView::new("ann", &session, &items);

        let mut foreign = items[0].clone();
        foreign.lives = 0;
        assert!(!view.apply(&item_update(Uuid::new_v4(), &foreign)));

        let mut created = item_update(session.id, &foreign);
        created.kind = ChangeKind::Create;
        assert!(!view.apply(&created));

        let mut status = item_update(session.id, &foreign);
        status.collection = Collection::Statuses;
        assert!(!view.apply(&status));
        assert_eq!(view.alive_count(), 3);
    }

    #[test]
    fn completion_prunes_pool_and_sets_winner() {
        let (mut session, items) = attrition_session();
        let mut view = SessionView::new("owner", &session, &items);

        session.phase = SessionPhase::Complete;
        session.item_refs = vec![items[2].id];
        session.winner_id = Some(items[2].id);
        session.revision += 1;
        assert!(view.apply(&session_update(&session)));
        assert_eq!(view.phase(), SessionPhase::Complete);
        assert_eq!(view.winner(), Some(items[2].id));
        assert_eq!(view.lives().len(), 1);
        assert!(!view.is_my_turn());
    }

    #[test]
    fn stale_session_events_are_dropped() {
        let (mut session, items) = attrition_session();
        let mut view = SessionView::new("ann", &session, &items);

        session.revision += 1;
        session.current_turn = Some("ann".into());
        let turn_passed = session_update(&session);

        session.revision += 1;
        session.phase = SessionPhase::Complete;
        session.item_refs = vec![items[2].id];
        session.winner_id = Some(items[2].id);
        let completed = session_update(&session);

        assert!(view.apply(&turn_passed));
        assert!(view.apply(&completed));
        assert!(!view.apply(&turn_passed));
        assert!(!view.apply(&completed));
        assert_eq!(view.phase(), SessionPhase::Complete);
        assert_eq!(view.winner(), Some(items[2].id));
        assert_eq!(view.lives().len(), 1);
    }

    #[test]
    fn out_of_order_delivery_keeps_the_newest_state() {
        let (mut session, items) = attrition_session();
        let mut view = SessionView::new("ann", &session, &items);

        session.revision += 1;
        session.current_turn = Some("ann".into());
        let older = session_update(&session);
        session.revision += 1;
        session.current_turn = Some("bob".into());
        let newer = session_update(&session);

        assert!(view.apply(&newer));
        assert!(!view.apply(&older));
        assert!(!view.is_my_turn());
    }
}
