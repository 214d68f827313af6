use super::changeset::Changeset;
use super::cycle::Cycle;
use super::events::EqubEvent;
use super::group::Group;
use super::ids::{CycleId, GroupId, UserId};
use super::membership::Membership;
use super::money::Amount;
use super::transaction::Transaction;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Persistence for groups, memberships, cycles and transactions.
///
/// Reads are plain lookups; every write goes through [`EqubRepository::commit`],
/// which applies a whole [`Changeset`] or nothing.
#[async_trait]
pub trait EqubRepository: Send + Sync {
    async fn group(&self, id: GroupId) -> Result<Option<Group>>;
    async fn groups(&self) -> Result<Vec<Group>>;
    /// Memberships ordered by payout order.
    async fn memberships(&self, group: GroupId) -> Result<Vec<Membership>>;
    async fn membership_for_user(&self, group: GroupId, user: UserId)
    -> Result<Option<Membership>>;
    async fn membership_by_order(&self, group: GroupId, order: u32) -> Result<Option<Membership>>;
    async fn active_cycle(&self, group: GroupId) -> Result<Option<Cycle>>;
    /// Cycles ordered by cycle number.
    async fn cycles(&self, group: GroupId) -> Result<Vec<Cycle>>;
    async fn transactions(&self, cycle: CycleId) -> Result<Vec<Transaction>>;
    async fn pending_transactions(&self) -> Result<Vec<Transaction>>;
    async fn commit(&self, changes: Changeset) -> Result<()>;
}

/// Answer of the external payment gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayReceipt {
    pub success: bool,
    pub transaction_id: String,
    pub message: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn process_payment(&self, amount: Amount) -> Result<GatewayReceipt>;
}

/// Fire-and-forget delivery of group events (SMS, email, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn dispatch(&self, event: EqubEvent) -> Result<()>;
}

pub type RepositoryBox = Box<dyn EqubRepository>;
pub type GatewayBox = Box<dyn PaymentGateway>;
pub type NotifierHandle = Arc<dyn Notifier>;
