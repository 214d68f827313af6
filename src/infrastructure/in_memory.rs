use crate::domain::changeset::{Changeset, Snapshot};
use crate::domain::cycle::Cycle;
use crate::domain::group::Group;
use crate::domain::ids::{CycleId, GroupId, MembershipId, TransactionId, UserId};
use crate::domain::membership::Membership;
use crate::domain::ports::EqubRepository;
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    groups: HashMap<GroupId, Group>,
    memberships: HashMap<MembershipId, Membership>,
    cycles: HashMap<CycleId, Cycle>,
    transactions: HashMap<TransactionId, Transaction>,
}

impl Snapshot for Tables {
    fn group_version(&self, id: GroupId) -> Result<Option<u64>> {
        Ok(self.groups.get(&id).map(|g| g.version))
    }

    fn membership_for_user(&self, group: GroupId, user: UserId) -> Result<Option<MembershipId>> {
        Ok(self
            .memberships
            .values()
            .find(|m| m.group_id == group && m.user.id == user)
            .map(|m| m.id))
    }

    fn membership_by_order(&self, group: GroupId, order: u32) -> Result<Option<MembershipId>> {
        Ok(self
            .memberships
            .values()
            .find(|m| m.group_id == group && m.payout_order == order)
            .map(|m| m.id))
    }

    fn active_cycle_id(&self, group: GroupId) -> Result<Option<CycleId>> {
        Ok(self
            .cycles
            .values()
            .find(|c| c.group_id == group && c.is_active())
            .map(|c| c.id))
    }

    fn transaction(&self, _cycle: CycleId, id: TransactionId) -> Result<Option<Transaction>> {
        Ok(self.transactions.get(&id).cloned())
    }

    fn success_transaction(
        &self,
        membership: MembershipId,
        cycle: CycleId,
    ) -> Result<Option<TransactionId>> {
        Ok(self
            .transactions
            .values()
            .find(|t| {
                t.membership_id == membership
                    && t.cycle_id == cycle
                    && t.status == TransactionStatus::Success
            })
            .map(|t| t.id))
    }
}

/// A thread-safe in-memory repository.
///
/// All record kinds sit behind a single `tokio::sync::RwLock` so a commit
/// validates and applies its changeset under one write guard.
#[derive(Default, Clone)]
pub struct InMemoryRepository {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRepository {
    /// Creates a new, empty in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EqubRepository for InMemoryRepository {
    async fn group(&self, id: GroupId) -> Result<Option<Group>> {
        let tables = self.tables.read().await;
        Ok(tables.groups.get(&id).cloned())
    }

    async fn groups(&self) -> Result<Vec<Group>> {
        let tables = self.tables.read().await;
        let mut groups: Vec<Group> = tables.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(groups)
    }

    async fn memberships(&self, group: GroupId) -> Result<Vec<Membership>> {
        let tables = self.tables.read().await;
        let mut members: Vec<Membership> = tables
            .memberships
            .values()
            .filter(|m| m.group_id == group)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.payout_order);
        Ok(members)
    }

    async fn membership_for_user(
        &self,
        group: GroupId,
        user: UserId,
    ) -> Result<Option<Membership>> {
        let tables = self.tables.read().await;
        let id = tables.membership_for_user(group, user)?;
        Ok(id.and_then(|id| tables.memberships.get(&id).cloned()))
    }

    async fn membership_by_order(&self, group: GroupId, order: u32) -> Result<Option<Membership>> {
        let tables = self.tables.read().await;
        let id = tables.membership_by_order(group, order)?;
        Ok(id.and_then(|id| tables.memberships.get(&id).cloned()))
    }

    async fn active_cycle(&self, group: GroupId) -> Result<Option<Cycle>> {
        let tables = self.tables.read().await;
        let id = tables.active_cycle_id(group)?;
        Ok(id.and_then(|id| tables.cycles.get(&id).cloned()))
    }

    async fn cycles(&self, group: GroupId) -> Result<Vec<Cycle>> {
        let tables = self.tables.read().await;
        let mut cycles: Vec<Cycle> = tables
            .cycles
            .values()
            .filter(|c| c.group_id == group)
            .cloned()
            .collect();
        cycles.sort_by_key(|c| c.cycle_number);
        Ok(cycles)
    }

    async fn transactions(&self, cycle: CycleId) -> Result<Vec<Transaction>> {
        let tables = self.tables.read().await;
        let mut txs: Vec<Transaction> = tables
            .transactions
            .values()
            .filter(|t| t.cycle_id == cycle)
            .cloned()
            .collect();
        txs.sort_by_key(|t| t.transaction_date);
        Ok(txs)
    }

    async fn pending_transactions(&self) -> Result<Vec<Transaction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .transactions
            .values()
            .filter(|t| t.status == TransactionStatus::Pending)
            .cloned()
            .collect())
    }

    async fn commit(&self, changes: Changeset) -> Result<()> {
        let mut tables = self.tables.write().await;
        changes.validate(&*tables)?;

        for group in changes.groups {
            tables.groups.insert(group.id, group);
        }
        for membership in changes.memberships {
            tables.memberships.insert(membership.id, membership);
        }
        for cycle in changes.cycles {
            tables.cycles.insert(cycle.id, cycle);
        }
        for tx in changes.transactions {
            tables.transactions.insert(tx.id, tx);
        }
        Ok(())
    }
}
