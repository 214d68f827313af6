use super::identity::UserRef;
use super::ids::{GroupId, MembershipId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's seat in a group. `payout_order` is unique within the group and
/// the orders of a group always form 1..=N.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Membership {
    pub id: MembershipId,
    pub group_id: GroupId,
    pub user: UserRef,
    pub payout_order: u32,
    pub join_date: DateTime<Utc>,
}

impl Membership {
    pub fn new(group_id: GroupId, user: UserRef, payout_order: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: MembershipId::new(),
            group_id,
            user,
            payout_order,
            join_date: now,
        }
    }
}

/// Payout order that follows `current` in a rotation of `members` seats; wraps N -> 1.
pub fn next_payout_order(current: u32, members: u32) -> u32 {
    (current % members) + 1
}

/// Whether the given payout orders are exactly 1..=N without gaps or duplicates.
pub fn is_contiguous(orders: impl IntoIterator<Item = u32>) -> bool {
    let mut orders: Vec<u32> = orders.into_iter().collect();
    orders.sort_unstable();
    orders.iter().enumerate().all(|(i, order)| *order == i as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_payout_order_wraps() {
        assert_eq!(next_payout_order(1, 3), 2);
        assert_eq!(next_payout_order(2, 3), 3);
        assert_eq!(next_payout_order(3, 3), 1);
        assert_eq!(next_payout_order(1, 1), 1);
    }

    #[test]
    fn test_is_contiguous() {
        assert!(is_contiguous([2, 1, 3]));
        assert!(is_contiguous([]));
        assert!(!is_contiguous([1, 3]));
        assert!(!is_contiguous([1, 1, 2]));
        assert!(!is_contiguous([0, 1]));
    }
}
