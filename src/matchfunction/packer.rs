//! Capacity-bound packing of pool tickets into match proposals
//!
//! Every round takes the first `capacity` tickets from every pool and unions
//! them into one match, so a match holds `capacity * pools` tickets rather
//! than `capacity`. Leftovers that cannot fill a round wait for the next run.

use crate::error::{MatchmakingError, Result};
use crate::types::{Match, PoolTickets};
use crate::utils::unix_nanos;

/// Name stamped on every proposal produced here
pub const MATCH_FUNCTION_NAME: &str = "player_capacity_matchfunc";

/// Pack tickets into matches.
///
/// Errors are checked in order: capacity, profile, pools.
pub fn pack(capacity: i64, profile: Option<&str>, pools: Option<&PoolTickets>) -> Result<Vec<Match>> {
    if capacity <= 0 {
        return Err(MatchmakingError::InvalidCapacity { capacity }.into());
    }
    let profile = profile.ok_or(MatchmakingError::NilProfile)?;
    let pools = pools.ok_or(MatchmakingError::NilPools)?;

    let rounds = rounds(capacity, pools);
    if rounds == 0 {
        return Ok(Vec::new());
    }

    let capacity = capacity as usize;
    let run_nanos = unix_nanos();
    let mut matches = Vec::with_capacity(rounds);

    for round in 0..rounds {
        let start = round * capacity;
        let tickets = pools
            .values()
            .flat_map(|tickets| tickets[start..start + capacity].iter().cloned())
            .collect();

        matches.push(Match {
            match_id: match_id(profile, round, run_nanos),
            match_profile: profile.to_string(),
            match_function: MATCH_FUNCTION_NAME.to_string(),
            tickets,
            extensions: Default::default(),
        });
    }

    Ok(matches)
}

/// Number of full rounds every pool can supply; zero for an empty pool map
pub fn rounds(capacity: i64, pools: &PoolTickets) -> usize {
    if capacity <= 0 {
        return 0;
    }
    pools
        .values()
        .map(|tickets| tickets.len() / capacity as usize)
        .min()
        .unwrap_or(0)
}

fn match_id(profile: &str, round: usize, run_nanos: i64) -> String {
    format!("profile-{}-{}-{}", profile, round, run_nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Ticket;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn pools(sizes: &[(&str, usize)]) -> PoolTickets {
        sizes
            .iter()
            .map(|(name, size)| {
                let tickets = (0..*size)
                    .map(|i| Ticket::new(format!("{}-{}", name, i)))
                    .collect();
                (name.to_string(), tickets)
            })
            .collect()
    }

    #[test]
    fn test_three_pools_two_tickets_capacity_two() {
        let pools = pools(&[("a", 2), ("b", 2), ("c", 2)]);
        let matches = pack(2, Some("p"), Some(&pools)).unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].tickets.len(), 6);
        assert_eq!(matches[0].match_profile, "p");
        assert_eq!(matches[0].match_function, MATCH_FUNCTION_NAME);
    }

    #[test]
    fn test_two_pools_one_ticket_capacity_one() {
        let pools = pools(&[("a", 1), ("b", 1)]);
        let matches = pack(1, Some("p"), Some(&pools)).unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].tickets.len(), 2);
    }

    #[test]
    fn test_smallest_pool_bounds_rounds() {
        let pools = pools(&[("a", 10), ("b", 5)]);
        let matches = pack(2, Some("p"), Some(&pools)).unwrap();

        assert_eq!(matches.len(), 2);
        let first: Vec<_> = matches[0].tickets.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(first, vec!["a-0", "a-1", "b-0", "b-1"]);
        let second: Vec<_> = matches[1].tickets.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(second, vec!["a-2", "a-3", "b-2", "b-3"]);
    }

    #[test]
    fn test_capacity_checked_before_missing_inputs() {
        for capacity in [0, -1] {
            let err = pack(capacity, None, None).unwrap_err();
            assert!(matches!(
                MatchmakingError::find(&err),
                Some(MatchmakingError::InvalidCapacity { .. })
            ));
        }
    }

    #[test]
    fn test_missing_profile_then_pools() {
        let empty = PoolTickets::new();

        let err = pack(1, None, Some(&empty)).unwrap_err();
        assert!(matches!(
            MatchmakingError::find(&err),
            Some(MatchmakingError::NilProfile)
        ));

        let err = pack(1, Some("p"), None).unwrap_err();
        assert!(matches!(
            MatchmakingError::find(&err),
            Some(MatchmakingError::NilPools)
        ));
    }

    #[test]
    fn test_empty_pool_map_and_empty_profile_name() {
        let empty = PoolTickets::new();
        assert!(pack(3, Some(""), Some(&empty)).unwrap().is_empty());

        let one = pools(&[("a", 3)]);
        let matches = pack(3, Some(""), Some(&one)).unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].match_id.starts_with("profile--0-"));
    }

    #[test]
    fn test_pool_shorter_than_capacity_yields_nothing() {
        let pools = pools(&[("a", 9), ("b", 1)]);
        assert!(pack(2, Some("p"), Some(&pools)).unwrap().is_empty());
    }

    #[test]
    fn test_match_ids_unique_within_run() {
        let pools = pools(&[("a", 20)]);
        let matches = pack(2, Some("p"), Some(&pools)).unwrap();

        let ids: HashSet<_> = matches.iter().map(|m| m.match_id.clone()).collect();
        assert_eq!(ids.len(), matches.len());
    }

    proptest! {
        #[test]
        fn prop_match_arithmetic(
            capacity in 1i64..6,
            sizes in proptest::collection::vec(0usize..25, 0..5),
        ) {
            let named: Vec<(String, usize)> = sizes
                .iter()
                .enumerate()
                .map(|(i, s)| (format!("pool{}", i), *s))
                .collect();
            let refs: Vec<(&str, usize)> = named.iter().map(|(n, s)| (n.as_str(), *s)).collect();
            let pools = pools(&refs);

            let matches = pack(capacity, Some("p"), Some(&pools)).unwrap();
            let expected = sizes.iter().map(|s| s / capacity as usize).min().unwrap_or(0);

            prop_assert_eq!(matches.len(), expected);
            for m in &matches {
                prop_assert_eq!(m.tickets.len(), capacity as usize * pools.len());
            }

            let mut seen = HashSet::new();
            for t in matches.iter().flat_map(|m| m.tickets.iter()) {
                prop_assert!(seen.insert(t.id.clone()), "ticket packed twice");
            }
        }
    }
}
