//! Turn rotation for the attrition round.

use thiserror::Error;

/// Failures building a [`TurnOrder`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    /// The roster has no participants.
    #[error("turn order needs at least one participant")]
    EmptyRoster,
    /// The recorded turn holder is not part of the roster.
    #[error("turn holder `{0}` is not a participant")]
    NotInRoster(String),
}

/// Fixed participant order with a cursor on the current turn holder.
///
/// All index arithmetic for turn rotation lives here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOrder {
    participants: Vec<String>,
    cursor: usize,
}

impl TurnOrder {
    /// Start the rotation at the first participant.
    pub fn new(participants: Vec<String>) -> Result<Self, TurnError> {
        if participants.is_empty() {
            return Err(TurnError::EmptyRoster);
        }
        Ok(Self {
            participants,
            cursor: 0,
        })
    }

    /// Resume the rotation at `holder`.
    pub fn resume(participants: Vec<String>, holder: &str) -> Result<Self, TurnError> {
        if participants.is_empty() {
            return Err(TurnError::EmptyRoster);
        }
        let cursor = participants
            .iter()
            .position(|participant| participant == holder)
            .ok_or_else(|| TurnError::NotInRoster(holder.to_owned()))?;
        Ok(Self {
            participants,
            cursor,
        })
    }

    /// Participant whose turn it is.
    pub fn current(&self) -> &str {
        &self.participants[self.cursor]
    }

    /// Whether `participant` holds the turn.
    pub fn is_turn_of(&self, participant: &str) -> bool {
        self.current() == participant
    }

    /// Hand the turn to the next participant, wrapping around, and return them.
    pub fn advance(&mut self) -> &str {
        self.cursor = (self.cursor + 1) % self.participants.len();
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn rotation_is_cyclic() {
        for size in 1..=6 {
            let names: Vec<String> = (0..size).map(|i| format!("user-{i}")).collect();
            let mut order = TurnOrder::resume(names.clone(), &names[size / 2]).unwrap();
            let start = order.current().to_owned();
            for _ in 0..size {
                order.advance();
            }
            assert_eq!(order.current(), start);
        }
    }

    #[test]
    fn advance_wraps_to_the_owner() {
        let mut order = TurnOrder::resume(roster(&["owner", "ann", "bob"]), "bob").unwrap();
        assert_eq!(order.advance(), "owner");
        assert_eq!(order.advance(), "ann");
    }

    #[test]
    fn unknown_holder_is_rejected() {
        let err = TurnOrder::resume(roster(&["owner", "ann"]), "mallory").unwrap_err();
        assert_eq!(err, TurnError::NotInRoster("mallory".into()));
    }

    #[test]
    fn empty_roster_is_rejected() {
        assert_eq!(TurnOrder::new(Vec::new()), Err(TurnError::EmptyRoster));
        assert_eq!(
            TurnOrder::resume(Vec::new(), "owner"),
            Err(TurnError::EmptyRoster)
        );
    }

    #[test]
    fn new_starts_at_first_participant() {
        let order = TurnOrder::new(roster(&["owner", "ann"])).unwrap();
        assert!(order.is_turn_of("owner"));
        assert!(!order.is_turn_of("ann"));
    }
}
