use thiserror::Error;

/// Rounds a picking session moves through, strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionPhase {
    /// Guests are accepting the invitation and the pool is being filled.
    Invite,
    /// Every participant swipes every title.
    Swipe,
    /// Participants rank the survivors in groups of four.
    Rank,
    /// Participants take turns knocking lives off the finalists.
    Attrition,
    /// A single title remains.
    Complete,
}

impl SessionPhase {
    /// Ordinal stored alongside the session (0 to 4).
    pub fn ordinal(self) -> u8 {
        match self {
            SessionPhase::Invite => 0,
            SessionPhase::Swipe => 1,
            SessionPhase::Rank => 2,
            SessionPhase::Attrition => 3,
            SessionPhase::Complete => 4,
        }
    }

    /// Inverse of [`SessionPhase::ordinal`].
    pub fn from_ordinal(value: u8) -> Option<Self> {
        match value {
            0 => Some(SessionPhase::Invite),
            1 => Some(SessionPhase::Swipe),
            2 => Some(SessionPhase::Rank),
            3 => Some(SessionPhase::Attrition),
            4 => Some(SessionPhase::Complete),
            _ => None,
        }
    }

    /// Event that closes this phase, if it can be closed.
    pub fn closing_event(self) -> Option<SessionEvent> {
        match self {
            SessionPhase::Invite => Some(SessionEvent::InvitesAccepted),
            SessionPhase::Swipe => Some(SessionEvent::SwipeClosed),
            SessionPhase::Rank => Some(SessionEvent::RankClosed),
            SessionPhase::Attrition => Some(SessionEvent::WinnerFound),
            SessionPhase::Complete => None,
        }
    }
}

/// Events that move a session forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Every participant accepted the invitation.
    InvitesAccepted,
    /// Every participant finished swiping; the swipe cutoff ran.
    SwipeClosed,
    /// Every participant finished ranking; the rank cutoff and life assignment ran.
    RankClosed,
    /// Only one title has lives left.
    WinnerFound,
}

impl SessionEvent {
    /// Phase this event closes.
    pub fn source(self) -> SessionPhase {
        match self {
            SessionEvent::InvitesAccepted => SessionPhase::Invite,
            SessionEvent::SwipeClosed => SessionPhase::Swipe,
            SessionEvent::RankClosed => SessionPhase::Rank,
            SessionEvent::WinnerFound => SessionPhase::Attrition,
        }
    }
}

/// Event applied to a phase it cannot close.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// Phase the session was in.
    pub from: SessionPhase,
    /// Rejected event.
    pub event: SessionEvent,
}

/// A validated move from one phase to the next, tied to the session revision
/// it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Phase being closed.
    pub from: SessionPhase,
    /// Phase being opened.
    pub to: SessionPhase,
    /// Event that closes `from`.
    pub event: SessionEvent,
    /// Revision the session record was read at.
    pub revision: u64,
}

impl Transition {
    /// Validate `event` against `phase` as read at `revision`.
    pub fn plan(
        phase: SessionPhase,
        revision: u64,
        event: SessionEvent,
    ) -> Result<Self, InvalidTransition> {
        let to = match (phase, event) {
            (SessionPhase::Invite, SessionEvent::InvitesAccepted) => SessionPhase::Swipe,
            (SessionPhase::Swipe, SessionEvent::SwipeClosed) => SessionPhase::Rank,
            (SessionPhase::Rank, SessionEvent::RankClosed) => SessionPhase::Attrition,
            (SessionPhase::Attrition, SessionEvent::WinnerFound) => SessionPhase::Complete,
            (from, event) => return Err(InvalidTransition { from, event }),
        };
        Ok(Self {
            from: phase,
            to,
            event,
            revision,
        })
    }

    /// Revision the record carries once the transition is written.
    pub fn next_revision(&self) -> u64 {
        self.revision + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENTS: [SessionEvent; 4] = [
        SessionEvent::InvitesAccepted,
        SessionEvent::SwipeClosed,
        SessionEvent::RankClosed,
        SessionEvent::WinnerFound,
    ];

    #[test]
    fn full_forward_path() {
        let mut phase = SessionPhase::Invite;
        for (revision, event) in EVENTS.into_iter().enumerate() {
            let transition = Transition::plan(phase, revision as u64, event).unwrap();
            assert_eq!(transition.next_revision(), revision as u64 + 1);
            phase = transition.to;
        }
        assert_eq!(phase, SessionPhase::Complete);
    }

    #[test]
    fn skipping_a_phase_is_rejected() {
        let err = Transition::plan(SessionPhase::Invite, 0, SessionEvent::RankClosed).unwrap_err();
        assert_eq!(err.from, SessionPhase::Invite);
        assert_eq!(err.event, SessionEvent::RankClosed);
    }

    #[test]
    fn closing_event_matches_source() {
        for event in EVENTS {
            assert_eq!(event.source().closing_event(), Some(event));
        }
    }

    #[test]
    fn complete_has_no_way_out() {
        for event in EVENTS {
            assert!(Transition::plan(SessionPhase::Complete, 9, event).is_err());
        }
        assert_eq!(SessionPhase::Complete.closing_event(), None);
    }

    #[test]
    fn ordinals_round_trip() {
        for ordinal in 0..5 {
            let phase = SessionPhase::from_ordinal(ordinal).unwrap();
            assert_eq!(phase.ordinal(), ordinal);
        }
        assert_eq!(SessionPhase::from_ordinal(5), None);
    }
}
