//! Pool size reduction applied when the swipe and rank rounds close.

use std::cmp::Reverse;

/// Survivor count applied to the rank round pool when it holds fewer than 12 titles.
pub const RANK_KEEP_SMALL: usize = 6;
/// Survivor count applied to the rank round pool otherwise.
pub const RANK_KEEP_LARGE: usize = 10;

/// Number of titles kept once the swipe round closes over a pool of `pool_size` titles.
pub fn target_size(pool_size: usize) -> usize {
    match pool_size {
        0..=11 => pool_size,
        12..=15 => 8,
        16..=23 => 12,
        24..=30 => 16,
        31..=50 => 20,
        100 => 40,
        n => (n / 10) * 4 + 4,
    }
}

/// Number of titles kept once the rank round closes over a pool of `pool_size` titles.
///
/// Never exceeds the pool itself, so a pool that started below six titles is not cut.
pub fn rank_target_size(pool_size: usize) -> usize {
    let keep = if pool_size < 12 {
        RANK_KEEP_SMALL
    } else {
        RANK_KEEP_LARGE
    };
    keep.min(pool_size)
}

/// Split `items` into the `keep` best-scored survivors and the cut remainder.
///
/// Ordering is by descending score; equal scores keep their incoming order, so the
/// earliest inserted title wins a tie at the boundary.
pub fn select_survivors<T, F>(mut items: Vec<T>, keep: usize, score: F) -> (Vec<T>, Vec<T>)
where
    F: Fn(&T) -> i32,
{
    // `sort_by_key` is a stable merge sort.
    items.sort_by_key(|item| Reverse(score(item)));
    let cut = items.split_off(keep.min(items.len()));
    (items, cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_pools_are_not_cut() {
        for n in 0..12 {
            assert_eq!(target_size(n), n);
        }
    }

    #[test]
    fn band_boundaries_match_table() {
        assert_eq!(target_size(12), 8);
        assert_eq!(target_size(15), 8);
        assert_eq!(target_size(16), 12);
        assert_eq!(target_size(23), 12);
        assert_eq!(target_size(24), 16);
        assert_eq!(target_size(30), 16);
        assert_eq!(target_size(31), 20);
        assert_eq!(target_size(50), 20);
        assert_eq!(target_size(51), 24);
        assert_eq!(target_size(99), 40);
        assert_eq!(target_size(100), 40);
        assert_eq!(target_size(101), 44);
        assert_eq!(target_size(250), 104);
    }

    #[test]
    fn target_never_exceeds_pool_and_grows_within_bands() {
        let bands = [
            0..=11usize,
            12..=15,
            16..=23,
            24..=30,
            31..=50,
            51..=99,
            101..=400,
        ];
        for band in bands {
            let mut previous = None;
            for n in band {
                let keep = target_size(n);
                assert!(keep <= n, "target_size({n}) = {keep} exceeds pool");
                assert_eq!(keep, target_size(n));
                if let Some(prev) = previous {
                    assert!(keep >= prev, "target_size decreased at {n}");
                }
                previous = Some(keep);
            }
        }
    }

    #[test]
    fn rank_cutoff_keeps_six_or_ten() {
        assert_eq!(rank_target_size(8), 6);
        assert_eq!(rank_target_size(11), 6);
        assert_eq!(rank_target_size(12), 10);
        assert_eq!(rank_target_size(40), 10);
        assert_eq!(rank_target_size(4), 4);
    }

    #[test]
    fn ties_at_the_boundary_keep_earliest_inserted() {
        // 20 titles inserted in reverse score order: the seven titles ranked 8th to 14th
        // share a score, and the cut at 12 falls inside that block.
        let pool: Vec<(usize, i32)> = (0..20)
            .rev()
            .map(|label| {
                let score = match label {
                    13..=19 => label as i32,
                    6..=12 => 5,
                    _ => 0,
                };
                (label, score)
            })
            .collect();

        let (kept, cut) = select_survivors(pool, target_size(20), |(_, score)| *score);
        assert_eq!(kept.len(), 12);
        assert_eq!(cut.len(), 8);

        let kept_tied: Vec<usize> = kept
            .iter()
            .filter(|(_, score)| *score == 5)
            .map(|(label, _)| *label)
            .collect();
        // Insertion order of the tied block is 12, 11, 10, 9, 8, 7, 6.
        assert_eq!(kept_tied, vec![12, 11, 10, 9, 8]);

        let cut_tied: Vec<usize> = cut
            .iter()
            .filter(|(_, score)| *score == 5)
            .map(|(label, _)| *label)
            .collect();
        assert_eq!(cut_tied, vec![7, 6]);
    }

    #[test]
    fn tied_block_straddling_the_cut_keeps_first_ones() {
        let pool: Vec<(char, i32)> = vec![
            ('a', 3),
            ('b', 1),
            ('c', 1),
            ('d', 1),
            ('e', 2),
            ('f', 1),
        ];
        let (kept, cut) = select_survivors(pool, 4, |(_, score)| *score);
        let kept: Vec<char> = kept.into_iter().map(|(id, _)| id).collect();
        let cut: Vec<char> = cut.into_iter().map(|(id, _)| id).collect();
        assert_eq!(kept, vec!['a', 'e', 'b', 'c']);
        assert_eq!(cut, vec!['d', 'f']);
    }
}
