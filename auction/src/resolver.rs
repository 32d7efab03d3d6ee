//! Ranks bids and prices the winner.
//!
//! Second-price rule: the winner pays the runner-up's `total_score`. With a
//! single bid the winner pays its own score ("pay-your-bid" fallback).
//! Exact ties are ordered by an explicit, reproducible policy.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::model::Bid;

/// Ordering of bids whose `total_score` is exactly equal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TieBreakPolicy {
    /// Earlier-created candidate first, then smaller candidate id.
    #[default]
    CreatedThenId,
    /// Tied groups are shuffled by a ChaCha stream seeded from the seed and the
    /// request id. Same inputs, same order; spreads wins across equal bidders.
    Seeded(u64),
}

/// Output of [`resolve`].
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    /// All bids, best first.
    pub ranked: Vec<Bid>,
    pub clearing_price: f64,
}

impl Resolution {
    pub fn winner(&self) -> Option<&Bid> {
        self.ranked.first()
    }

    pub fn participant_count(&self) -> u32 {
        self.ranked.len() as u32
    }
}

/// Ranks bids (already floor-filtered) and computes the clearing price.
pub fn resolve(mut bids: Vec<Bid>, policy: TieBreakPolicy, request_id: &str) -> Resolution {
    match policy {
        TieBreakPolicy::CreatedThenId => {
            bids.sort_by(|a, b| {
                b.total_score
                    .total_cmp(&a.total_score)
                    .then(a.created_at_ms.cmp(&b.created_at_ms))
                    .then_with(|| a.candidate_id.cmp(&b.candidate_id))
            });
        }
        TieBreakPolicy::Seeded(seed) => {
            // Canonical order first so the shuffle never depends on input order.
            bids.sort_by(|a, b| {
                b.total_score
                    .total_cmp(&a.total_score)
                    .then_with(|| a.candidate_id.cmp(&b.candidate_id))
            });

            let mut rng = ChaCha8Rng::seed_from_u64(seed ^ fnv1a(request_id.as_bytes()));
            let mut start = 0;
            while start < bids.len() {
                let score = bids[start].total_score;
                let end = bids[start..]
                    .iter()
                    .position(|b| b.total_score != score)
                    .map_or(bids.len(), |off| start + off);
                if end - start > 1 {
                    bids[start..end].shuffle(&mut rng);
                }
                start = end;
            }
        }
    }

    let clearing_price = match bids.as_slice() {
        [] => 0.0,
        [only] => only.total_score,
        [_, runner_up, ..] => runner_up.total_score,
    };

    Resolution {
        ranked: bids,
        clearing_price,
    }
}

/// 64-bit FNV-1a; stable across builds, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        h ^= u64::from(*b);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(id: &str, total_score: f64, created_at_ms: u64) -> Bid {
        Bid {
            candidate_id: id.to_string(),
            campaign_id: format!("camp-{id}"),
            created_at_ms,
            bid_amount: total_score,
            quality_score: 0.0,
            targeting_score: 0.5,
            total_score,
        }
    }

    #[test]
    fn second_price_with_three_bids() {
        let bids = vec![bid("b", 4.8, 1), bid("c", 3.1, 1), bid("a", 5.2, 1)];
        let r = resolve(bids, TieBreakPolicy::CreatedThenId, "req");

        assert_eq!(r.winner().unwrap().candidate_id, "a");
        assert_eq!(r.clearing_price, 4.8);
        assert_eq!(r.participant_count(), 3);
    }

    #[test]
    fn single_bid_pays_its_own_score() {
        let r = resolve(vec![bid("a", 2.0, 1)], TieBreakPolicy::CreatedThenId, "req");
        assert_eq!(r.winner().unwrap().candidate_id, "a");
        assert_eq!(r.clearing_price, 2.0);
    }

    #[test]
    fn no_bids_no_winner() {
        let r = resolve(vec![], TieBreakPolicy::CreatedThenId, "req");
        assert!(r.winner().is_none());
        assert_eq!(r.clearing_price, 0.0);
        assert_eq!(r.participant_count(), 0);
    }

    #[test]
    fn ties_go_to_the_older_candidate_then_smaller_id() {
        for _ in 0..10 {
            let r = resolve(
                vec![bid("y", 4.0, 200), bid("x", 4.0, 100)],
                TieBreakPolicy::CreatedThenId,
                "req",
            );
            assert_eq!(r.winner().unwrap().candidate_id, "x");
            assert_eq!(r.clearing_price, 4.0);
        }

        let r = resolve(
            vec![bid("b", 4.0, 100), bid("a", 4.0, 100)],
            TieBreakPolicy::CreatedThenId,
            "req",
        );
        assert_eq!(r.winner().unwrap().candidate_id, "a");
    }

    #[test]
    fn seeded_ties_are_reproducible_and_input_order_independent() {
        let forward = vec![bid("a", 4.0, 1), bid("b", 4.0, 1), bid("c", 4.0, 1), bid("d", 1.0, 1)];
        let mut backward = forward.clone();
        backward.reverse();

        let r1 = resolve(forward, TieBreakPolicy::Seeded(42), "req-7");
        let r2 = resolve(backward, TieBreakPolicy::Seeded(42), "req-7");

        assert_eq!(r1, r2);
        assert_eq!(r1.ranked[3].candidate_id, "d");
        assert_eq!(r1.clearing_price, 4.0);
    }

    #[test]
    fn seeded_policy_spreads_wins_across_requests() {
        let winners: std::collections::HashSet<String> = (0..64)
            .map(|i| {
                let r = resolve(
                    vec![bid("a", 4.0, 1), bid("b", 4.0, 1)],
                    TieBreakPolicy::Seeded(7),
                    &format!("req-{i}"),
                );
                r.winner().unwrap().candidate_id.clone()
            })
            .collect();
        assert_eq!(winners.len(), 2);
    }
}
