//! Offerer election.
//!
//! Both peers run the election locally over the same member set and arrive at
//! the same answer without an extra round trip: the lexicographically smallest
//! identity initiates negotiation.

use crate::types::UserId;
use std::collections::BTreeSet;

/// Elect the offerer among `members`.
///
/// Duplicates are ignored and input order does not matter. Returns `None`
/// when fewer than two distinct identities are present.
#[must_use]
pub fn elect_offerer<'a, I>(members: I) -> Option<UserId>
where
    I: IntoIterator<Item = &'a UserId>,
{
    let distinct: BTreeSet<&UserId> = members.into_iter().collect();
    if distinct.len() < 2 {
        return None;
    }
    distinct.first().map(|id| (*id).clone())
}

/// Returns true when `local` is the elected offerer of `members`.
#[must_use]
pub fn is_offerer<'a, I>(local: &UserId, members: I) -> bool
where
    I: IntoIterator<Item = &'a UserId>,
{
    elect_offerer(members).is_some_and(|offerer| &offerer == local)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<UserId> {
        raw.iter().map(|s| UserId::from(*s)).collect()
    }

    #[test]
    fn test_smallest_identity_wins_regardless_of_order() {
        let forward = ids(&["A", "B"]);
        let reverse = ids(&["B", "A"]);
        assert_eq!(elect_offerer(&forward), Some(UserId::from("A")));
        assert_eq!(elect_offerer(&reverse), Some(UserId::from("A")));
    }

    #[test]
    fn test_both_peers_agree() {
        // Each peer sees the list in whatever order its update arrived
        let seen_by_a = ids(&["learner-7", "teacher-3"]);
        let seen_by_b = ids(&["teacher-3", "learner-7"]);
        let a = UserId::from("learner-7");
        let b = UserId::from("teacher-3");

        assert!(is_offerer(&a, &seen_by_a));
        assert!(!is_offerer(&b, &seen_by_b));
    }

    #[test]
    fn test_single_member_has_no_offerer() {
        assert_eq!(elect_offerer(&ids(&["A"])), None);
        assert_eq!(elect_offerer(&ids(&[])), None);
        assert!(!is_offerer(&UserId::from("A"), &ids(&["A"])));
    }

    #[test]
    fn test_duplicates_do_not_count_as_members() {
        assert_eq!(elect_offerer(&ids(&["A", "A"])), None);
        assert_eq!(elect_offerer(&ids(&["B", "A", "B"])), Some(UserId::from("A")));
    }

    #[test]
    fn test_reelection_after_membership_change() {
        // A and B connected, A leaves, C joins
        assert_eq!(elect_offerer(&ids(&["A", "B"])), Some(UserId::from("A")));
        assert_eq!(elect_offerer(&ids(&["B", "C"])), Some(UserId::from("B")));
    }
}
