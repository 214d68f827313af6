use crate::domain::changeset::{Changeset, Snapshot};
use crate::domain::cycle::Cycle;
use crate::domain::group::Group;
use crate::domain::ids::{CycleId, GroupId, MembershipId, TransactionId, UserId};
use crate::domain::membership::Membership;
use crate::domain::ports::EqubRepository;
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::error::{EqubError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for group records, keyed by group id.
pub const CF_GROUPS: &str = "groups";
/// Column Family for memberships, keyed by group id ++ membership id.
pub const CF_MEMBERSHIPS: &str = "memberships";
/// Column Family for cycles, keyed by group id ++ big-endian cycle number.
pub const CF_CYCLES: &str = "cycles";
/// Column Family for transactions, keyed by cycle id ++ transaction id.
pub const CF_TRANSACTIONS: &str = "transactions";

/// A persistent repository backed by RocksDB.
///
/// Each record kind lives in its own Column Family with keys prefixed by the
/// owning record, so per-group and per-cycle lookups are prefix scans. Commits
/// are serialized by an async mutex and written as one `WriteBatch`.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBRepository {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
}

impl RocksDBRepository {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that all four column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_GROUPS, CF_MEMBERSHIPS, CF_CYCLES, CF_TRANSACTIONS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
        })
    }

    fn reader(&self) -> Reader<'_> {
        Reader { db: &self.db }
    }
}

fn cycle_key(cycle: &Cycle) -> Vec<u8> {
    let mut key = cycle.group_id.as_bytes().to_vec();
    key.extend_from_slice(&cycle.cycle_number.to_be_bytes());
    key
}

fn pair_key(first: &[u8; 16], second: &[u8; 16]) -> Vec<u8> {
    let mut key = first.to_vec();
    key.extend_from_slice(second);
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Synchronous read access shared by the async lookups and commit validation.
struct Reader<'a> {
    db: &'a DB,
}

impl Reader<'_> {
    fn cf(&self, name: &'static str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| EqubError::InternalError(format!("{name} column family not found")))
    }

    fn get<T: DeserializeOwned>(&self, family: &'static str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(family)?, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every record whose key starts with `prefix`, in key order.
    fn scan<T: DeserializeOwned>(&self, family: &'static str, prefix: &[u8]) -> Result<Vec<T>> {
        let iter = self.db.iterator_cf(
            self.cf(family)?,
            IteratorMode::From(prefix, Direction::Forward),
        );
        let mut out = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push(decode(&value)?);
        }
        Ok(out)
    }

    fn memberships(&self, group: GroupId) -> Result<Vec<Membership>> {
        let mut members: Vec<Membership> = self.scan(CF_MEMBERSHIPS, group.as_bytes())?;
        members.sort_by_key(|m| m.payout_order);
        Ok(members)
    }

    fn cycles(&self, group: GroupId) -> Result<Vec<Cycle>> {
        self.scan(CF_CYCLES, group.as_bytes())
    }

    fn transactions(&self, cycle: CycleId) -> Result<Vec<Transaction>> {
        self.scan(CF_TRANSACTIONS, cycle.as_bytes())
    }
}

impl Snapshot for Reader<'_> {
    fn group_version(&self, id: GroupId) -> Result<Option<u64>> {
        Ok(self
            .get::<Group>(CF_GROUPS, id.as_bytes())?
            .map(|g| g.version))
    }

    fn membership_for_user(&self, group: GroupId, user: UserId) -> Result<Option<MembershipId>> {
        Ok(self
            .memberships(group)?
            .into_iter()
            .find(|m| m.user.id == user)
            .map(|m| m.id))
    }

    fn membership_by_order(&self, group: GroupId, order: u32) -> Result<Option<MembershipId>> {
        Ok(self
            .memberships(group)?
            .into_iter()
            .find(|m| m.payout_order == order)
            .map(|m| m.id))
    }

    fn active_cycle_id(&self, group: GroupId) -> Result<Option<CycleId>> {
        Ok(self
            .cycles(group)?
            .into_iter()
            .find(|c| c.is_active())
            .map(|c| c.id))
    }

    fn transaction(&self, cycle: CycleId, id: TransactionId) -> Result<Option<Transaction>> {
        self.get(CF_TRANSACTIONS, &pair_key(cycle.as_bytes(), id.as_bytes()))
    }

    fn success_transaction(
        &self,
        membership: MembershipId,
        cycle: CycleId,
    ) -> Result<Option<TransactionId>> {
        Ok(self
            .transactions(cycle)?
            .into_iter()
            .find(|t| t.membership_id == membership && t.status == TransactionStatus::Success)
            .map(|t| t.id))
    }
}

#[async_trait]
impl EqubRepository for RocksDBRepository {
    async fn group(&self, id: GroupId) -> Result<Option<Group>> {
        self.reader().get(CF_GROUPS, id.as_bytes())
    }

    async fn groups(&self) -> Result<Vec<Group>> {
        let mut groups: Vec<Group> = self.reader().scan(CF_GROUPS, &[])?;
        groups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(groups)
    }

    async fn memberships(&self, group: GroupId) -> Result<Vec<Membership>> {
        self.reader().memberships(group)
    }

    async fn membership_for_user(
        &self,
        group: GroupId,
        user: UserId,
    ) -> Result<Option<Membership>> {
        Ok(self
            .reader()
            .memberships(group)?
            .into_iter()
            .find(|m| m.user.id == user))
    }

    async fn membership_by_order(&self, group: GroupId, order: u32) -> Result<Option<Membership>> {
        Ok(self
            .reader()
            .memberships(group)?
            .into_iter()
            .find(|m| m.payout_order == order))
    }

    async fn active_cycle(&self, group: GroupId) -> Result<Option<Cycle>> {
        Ok(self
            .reader()
            .cycles(group)?
            .into_iter()
            .find(|c| c.is_active()))
    }

    async fn cycles(&self, group: GroupId) -> Result<Vec<Cycle>> {
        self.reader().cycles(group)
    }

    async fn transactions(&self, cycle: CycleId) -> Result<Vec<Transaction>> {
        let mut txs = self.reader().transactions(cycle)?;
        txs.sort_by_key(|t| t.transaction_date);
        Ok(txs)
    }

    async fn pending_transactions(&self) -> Result<Vec<Transaction>> {
        let all: Vec<Transaction> = self.reader().scan(CF_TRANSACTIONS, &[])?;
        Ok(all
            .into_iter()
            .filter(|t| t.status == TransactionStatus::Pending)
            .collect())
    }

    async fn commit(&self, changes: Changeset) -> Result<()> {
        let _guard = self.commit_lock.lock().await;
        let reader = self.reader();
        changes.validate(&reader)?;

        let mut batch = WriteBatch::default();
        for group in &changes.groups {
            batch.put_cf(reader.cf(CF_GROUPS)?, group.id.as_bytes(), encode(group)?);
        }
        for membership in &changes.memberships {
            batch.put_cf(
                reader.cf(CF_MEMBERSHIPS)?,
                pair_key(membership.group_id.as_bytes(), membership.id.as_bytes()),
                encode(membership)?,
            );
        }
        for cycle in &changes.cycles {
            batch.put_cf(reader.cf(CF_CYCLES)?, cycle_key(cycle), encode(cycle)?);
        }
        for tx in &changes.transactions {
            batch.put_cf(
                reader.cf(CF_TRANSACTIONS)?,
                pair_key(tx.cycle_id.as_bytes(), tx.id.as_bytes()),
                encode(tx)?,
            );
        }

        self.db.write(batch)?;
        Ok(())
    }
}
