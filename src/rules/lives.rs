//! Life tiers handed out to the finalists when the attrition round opens.

/// Lives given to the best-ranked finalists.
pub const TOP_TIER_LIVES: u8 = 3;
/// Lives given to the middle tier.
pub const MIDDLE_TIER_LIVES: u8 = 2;
/// Lives given to the remaining finalists.
pub const BOTTOM_TIER_LIVES: u8 = 1;

/// Exclusive rank bounds `(top, middle)` of the life tiers for a pool of `pool_size`.
///
/// Six finalists split 2/2/2 and ten finalists split 2/3/5. Pools that never reached
/// six titles use the six-title bounds truncated to their length.
fn tier_bounds(pool_size: usize) -> (usize, usize) {
    if pool_size >= 10 { (2, 5) } else { (2, 4) }
}

/// Lives for the finalist at `rank` (0-based, best score first) in a pool of `pool_size`.
pub fn lives_for_rank(pool_size: usize, rank: usize) -> u8 {
    let (top, middle) = tier_bounds(pool_size);
    if rank < top {
        TOP_TIER_LIVES
    } else if rank < middle {
        MIDDLE_TIER_LIVES
    } else {
        BOTTOM_TIER_LIVES
    }
}

/// Pair every finalist of an already score-sorted pool with its lives.
pub fn assign_lives<T: Copy>(ranked: &[T]) -> Vec<(T, u8)> {
    ranked
        .iter()
        .enumerate()
        .map(|(rank, id)| (*id, lives_for_rank(ranked.len(), rank)))
        .collect()
}
