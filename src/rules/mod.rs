/// Pool size reduction between rounds.
pub mod cutoff;
/// Life tiers for the attrition round.
pub mod lives;
/// Score deltas for swipe and rank actions.
pub mod scoring;
