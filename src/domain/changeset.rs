//! Unit of work handed to a repository.
//!
//! A `Changeset` is committed all-or-nothing. Before anything is written the
//! backend runs [`Changeset::validate`] against its current state while holding
//! its commit lock, which is where the uniqueness constraints of the model live.

use super::cycle::Cycle;
use super::group::Group;
use super::ids::{CycleId, GroupId, MembershipId, TransactionId, UserId};
use super::membership::Membership;
use super::transaction::{Transaction, TransactionStatus};
use crate::error::{EqubError, Result};
use std::collections::HashSet;

/// Expected state of a group's version at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionGuard {
    /// The group must not exist yet.
    Absent,
    /// The stored group must still be at this version.
    At(u64),
}

/// Point lookups a backend answers from its committed state.
pub trait Snapshot {
    fn group_version(&self, id: GroupId) -> Result<Option<u64>>;
    fn membership_for_user(&self, group: GroupId, user: UserId) -> Result<Option<MembershipId>>;
    fn membership_by_order(&self, group: GroupId, order: u32) -> Result<Option<MembershipId>>;
    fn active_cycle_id(&self, group: GroupId) -> Result<Option<CycleId>>;
    fn transaction(&self, cycle: CycleId, id: TransactionId) -> Result<Option<Transaction>>;
    fn success_transaction(
        &self,
        membership: MembershipId,
        cycle: CycleId,
    ) -> Result<Option<TransactionId>>;
}

#[derive(Debug, Default, Clone)]
pub struct Changeset {
    pub guard: Option<(GroupId, VersionGuard)>,
    pub groups: Vec<Group>,
    pub memberships: Vec<Membership>,
    pub cycles: Vec<Cycle>,
    pub transactions: Vec<Transaction>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guarded(mut self, group: GroupId, guard: VersionGuard) -> Self {
        self.guard = Some((group, guard));
        self
    }

    pub fn group(mut self, group: Group) -> Self {
        self.groups.push(group);
        self
    }

    pub fn membership(mut self, membership: Membership) -> Self {
        self.memberships.push(membership);
        self
    }

    pub fn cycle(mut self, cycle: Cycle) -> Self {
        self.cycles.push(cycle);
        self
    }

    pub fn transaction(mut self, tx: Transaction) -> Self {
        self.transactions.push(tx);
        self
    }

    fn completes_cycle(&self, id: CycleId) -> bool {
        self.cycles.iter().any(|c| c.id == id && !c.is_active())
    }

    /// Checks the changeset against committed state. Nothing is written here.
    pub fn validate(&self, snapshot: &impl Snapshot) -> Result<()> {
        if let Some((group, guard)) = self.guard {
            let current = snapshot.group_version(group)?;
            let holds = match guard {
                VersionGuard::Absent => current.is_none(),
                VersionGuard::At(expected) => current == Some(expected),
            };
            if !holds {
                return Err(EqubError::StaleWrite { group });
            }
        }

        let mut seats = HashSet::new();
        let mut orders = HashSet::new();
        for m in &self.memberships {
            if !seats.insert((m.group_id, m.user.id)) || !orders.insert((m.group_id, m.payout_order))
            {
                return Err(violation("duplicate membership within one commit"));
            }
            if let Some(existing) = snapshot.membership_for_user(m.group_id, m.user.id)?
                && existing != m.id
            {
                return Err(violation(format!(
                    "user {} already holds a membership in group {}",
                    m.user.id, m.group_id
                )));
            }
            if let Some(existing) = snapshot.membership_by_order(m.group_id, m.payout_order)?
                && existing != m.id
            {
                return Err(violation(format!(
                    "payout order {} is already taken in group {}",
                    m.payout_order, m.group_id
                )));
            }
        }

        let mut opened = HashSet::new();
        for cycle in self.cycles.iter().filter(|c| c.is_active()) {
            if !opened.insert(cycle.group_id) {
                return Err(violation("two active cycles within one commit"));
            }
            if let Some(existing) = snapshot.active_cycle_id(cycle.group_id)?
                && existing != cycle.id
                && !self.completes_cycle(existing)
            {
                return Err(violation(format!(
                    "group {} already has an active cycle",
                    cycle.group_id
                )));
            }
        }

        for tx in &self.transactions {
            if let Some(stored) = snapshot.transaction(tx.cycle_id, tx.id)?
                && stored.is_settled()
                && stored != *tx
            {
                return Err(violation(format!("transaction {} is already settled", tx.id)));
            }
            if tx.status == TransactionStatus::Success
                && let Some(existing) = snapshot.success_transaction(tx.membership_id, tx.cycle_id)?
                && existing != tx.id
            {
                return Err(violation(format!(
                    "membership {} already has a successful contribution for cycle {}",
                    tx.membership_id, tx.cycle_id
                )));
            }
        }

        Ok(())
    }
}

fn violation(msg: impl Into<String>) -> EqubError {
    EqubError::ConstraintViolation(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::UserRef;
    use crate::domain::money::Amount;
    use crate::domain::transaction::Settlement;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    /// Snapshot with nothing committed except what the fields say.
    #[derive(Default)]
    struct Fixed {
        version: Option<u64>,
        active: Option<CycleId>,
        success: Option<TransactionId>,
        seat: Option<MembershipId>,
    }

    impl Snapshot for Fixed {
        fn group_version(&self, _: GroupId) -> Result<Option<u64>> {
            Ok(self.version)
        }
        fn membership_for_user(&self, _: GroupId, _: UserId) -> Result<Option<MembershipId>> {
            Ok(self.seat)
        }
        fn membership_by_order(&self, _: GroupId, _: u32) -> Result<Option<MembershipId>> {
            Ok(None)
        }
        fn active_cycle_id(&self, _: GroupId) -> Result<Option<CycleId>> {
            Ok(self.active)
        }
        fn transaction(&self, _: CycleId, _: TransactionId) -> Result<Option<Transaction>> {
            Ok(None)
        }
        fn success_transaction(&self, _: MembershipId, _: CycleId) -> Result<Option<TransactionId>> {
            Ok(self.success)
        }
    }

    fn cycle(group: GroupId) -> Cycle {
        let now = Utc::now();
        Cycle::open(group, 1, now, now, UserRef::from_email("a@x.io"))
    }

    #[test]
    fn test_guard_mismatch_is_stale() {
        let group = GroupId::new();
        let snapshot = Fixed {
            version: Some(2),
            ..Default::default()
        };
        let stale = Changeset::new().guarded(group, VersionGuard::At(1));
        assert!(matches!(
            stale.validate(&snapshot),
            Err(EqubError::StaleWrite { .. })
        ));
        let fresh = Changeset::new().guarded(group, VersionGuard::At(2));
        assert!(fresh.validate(&snapshot).is_ok());
        let create = Changeset::new().guarded(group, VersionGuard::Absent);
        assert!(create.validate(&snapshot).is_err());
    }

    #[test]
    fn test_second_active_cycle_rejected_unless_previous_completed() {
        let group = GroupId::new();
        let mut previous = cycle(group);
        let snapshot = Fixed {
            active: Some(previous.id),
            ..Default::default()
        };

        let opening = Changeset::new().cycle(cycle(group));
        assert!(matches!(
            opening.validate(&snapshot),
            Err(EqubError::ConstraintViolation(_))
        ));

        previous.complete().unwrap();
        let rollover = Changeset::new().cycle(previous).cycle(cycle(group));
        assert!(rollover.validate(&snapshot).is_ok());
    }

    #[test]
    fn test_duplicate_success_rejected() {
        let mut tx = Transaction::pending(
            MembershipId::new(),
            CycleId::new(),
            Amount::new(dec!(10)).unwrap(),
            Utc::now(),
        );
        tx.settle(Settlement {
            success: true,
            gateway_reference: None,
            message: "ok".into(),
        })
        .unwrap();
        let snapshot = Fixed {
            success: Some(TransactionId::new()),
            ..Default::default()
        };
        assert!(matches!(
            Changeset::new().transaction(tx).validate(&snapshot),
            Err(EqubError::ConstraintViolation(_))
        ));
    }

    #[test]
    fn test_existing_seat_rejected() {
        let group = GroupId::new();
        let membership = Membership::new(group, UserRef::from_email("a@x.io"), 2, Utc::now());
        let snapshot = Fixed {
            seat: Some(MembershipId::new()),
            ..Default::default()
        };
        assert!(
            Changeset::new()
                .membership(membership)
                .validate(&snapshot)
                .is_err()
        );
    }
}
