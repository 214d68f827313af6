use super::engine::EqubEngine;
use crate::domain::changeset::Changeset;
use crate::domain::group::GroupStatus;
use crate::domain::identity::UserRef;
use crate::domain::ids::GroupId;
use crate::domain::transaction::{Settlement, Transaction, TransactionStatus};
use crate::error::{EqubError, Result};
use chrono::Utc;

const ALREADY_PAID: &str = "You have already made your contribution for the current cycle.";

impl EqubEngine {
    /// Collects the caller's contribution for the group's active cycle.
    ///
    /// The attempt is persisted as `pending` before the gateway is called and
    /// settled afterwards, so a crash in between leaves an auditable record.
    /// No group-level guard is held across the gateway round trip. A declined,
    /// failed or timed-out payment is returned as a `failed` transaction, not
    /// as an error.
    pub async fn make_payment(&self, group_id: GroupId, user: &UserRef) -> Result<Transaction> {
        let membership = self
            .repository
            .membership_for_user(group_id, user.id)
            .await?
            .ok_or_else(|| {
                EqubError::Forbidden(
                    "You are not a member of this group and cannot make payments.".to_string(),
                )
            })?;

        let group = self.require_group(group_id).await?;
        if group.status() != GroupStatus::Active {
            return Err(EqubError::Conflict(
                "Payments can only be made to active groups.".to_string(),
            ));
        }

        let cycle = self.repository.active_cycle(group_id).await?.ok_or_else(|| {
            EqubError::NotFound("There is no active payment cycle for this group.".to_string())
        })?;

        let already_paid = self
            .repository
            .transactions(cycle.id)
            .await?
            .iter()
            .any(|t| t.membership_id == membership.id && t.status == TransactionStatus::Success);
        if already_paid {
            return Err(EqubError::Conflict(ALREADY_PAID.to_string()));
        }

        let mut tx = Transaction::pending(
            membership.id,
            cycle.id,
            group.contribution_amount(),
            Utc::now(),
        );
        self.repository
            .commit(Changeset::new().transaction(tx.clone()))
            .await?;
        tracing::info!(transaction = %tx.id, member = %user.email, cycle = cycle.cycle_number, "Transaction created with pending status");

        let settlement = self.charge(&tx).await;
        let pending_copy = tx.clone();
        tx.settle(settlement.clone())?;

        match self
            .repository
            .commit(Changeset::new().transaction(tx.clone()))
            .await
        {
            Ok(()) => {}
            Err(EqubError::ConstraintViolation(reason)) => {
                return self.resolve_settle_conflict(pending_copy, settlement, reason).await;
            }
            Err(e) => return Err(e),
        }

        match tx.status {
            TransactionStatus::Success => {
                tracing::info!(transaction = %tx.id, "Transaction updated to success")
            }
            _ => tracing::warn!(
                transaction = %tx.id,
                message = tx.message.as_deref().unwrap_or_default(),
                "Transaction updated to failed"
            ),
        }
        Ok(tx)
    }

    /// Handles a settle commit rejected by the repository.
    ///
    /// Either the pending record was expired while the gateway call was in
    /// flight, in which case the gateway outcome is kept on a fresh record, or
    /// another attempt already settled the member's contribution, in which case
    /// this one is recorded as failed.
    async fn resolve_settle_conflict(
        &self,
        pending: Transaction,
        settlement: Settlement,
        reason: String,
    ) -> Result<Transaction> {
        let stored = self
            .repository
            .transactions(pending.cycle_id)
            .await?
            .into_iter()
            .find(|t| t.id == pending.id);

        let mut loser = match stored {
            Some(stored) if stored.is_settled() => {
                tracing::warn!(
                    transaction = %pending.id,
                    stored = ?stored.status,
                    "Attempt settled during the gateway call, recording the gateway outcome separately"
                );
                let fresh = Transaction::pending(
                    pending.membership_id,
                    pending.cycle_id,
                    pending.amount,
                    Utc::now(),
                );
                let mut late = fresh.clone();
                late.settle(settlement.clone())?;
                match self
                    .repository
                    .commit(Changeset::new().transaction(late.clone()))
                    .await
                {
                    Ok(()) => return Ok(late),
                    Err(EqubError::ConstraintViolation(_)) if settlement.success => fresh,
                    Err(e) => return Err(e),
                }
            }
            _ if settlement.success => pending,
            _ => return Err(EqubError::ConstraintViolation(reason)),
        };

        // A concurrent attempt for the same obligation settled first.
        tracing::warn!(transaction = %loser.id, %reason, "Duplicate contribution settled as failed");
        loser.settle(Settlement {
            success: false,
            gateway_reference: settlement.gateway_reference,
            message: ALREADY_PAID.to_string(),
        })?;
        self.repository
            .commit(Changeset::new().transaction(loser))
            .await?;
        Err(EqubError::Conflict(ALREADY_PAID.to_string()))
    }

    /// Calls the gateway under the configured timeout and turns every outcome into a settlement.
    async fn charge(&self, tx: &Transaction) -> Settlement {
        match tokio::time::timeout(
            self.config.gateway_timeout,
            self.gateway.process_payment(tx.amount),
        )
        .await
        {
            Ok(Ok(receipt)) => Settlement {
                success: receipt.success,
                gateway_reference: Some(receipt.transaction_id),
                message: receipt.message,
            },
            Ok(Err(e)) => {
                tracing::warn!(transaction = %tx.id, error = %e, "Payment gateway error");
                Settlement::failed(format!("Payment gateway error: {e}"))
            }
            Err(_) => {
                tracing::warn!(transaction = %tx.id, timeout = ?self.config.gateway_timeout, "Payment gateway timed out");
                Settlement::failed("Payment gateway timed out.")
            }
        }
    }

    /// Marks pending transactions older than the configured expiry as failed.
    ///
    /// These are attempts whose gateway outcome was never recorded, typically
    /// because the process stopped mid-call. The members may simply pay again.
    pub async fn expire_stale_payments(&self) -> Result<Vec<Transaction>> {
        let expiry = chrono::Duration::from_std(self.config.pending_expiry)
            .map_err(|e| EqubError::ConfigError(format!("pending expiry out of range: {e}")))?;
        let cutoff = Utc::now() - expiry;

        let mut expired = Vec::new();
        for mut tx in self.repository.pending_transactions().await? {
            if tx.transaction_date > cutoff {
                continue;
            }
            tx.settle(Settlement::failed("Expired without a gateway outcome."))?;
            match self
                .repository
                .commit(Changeset::new().transaction(tx.clone()))
                .await
            {
                Ok(()) => expired.push(tx),
                // Settled by its own request in the meantime.
                Err(EqubError::ConstraintViolation(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        if !expired.is_empty() {
            tracing::warn!(count = expired.len(), "Expired stale pending transactions");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::super::engine::test_support::*;
    use super::*;
    use crate::config::{EngineConfig, GatewayConfig};
    use crate::domain::group::{Frequency, NewGroup};
    use crate::domain::money::Amount;
    use crate::domain::ports::EqubRepository;
    use crate::error::ErrorKind;
    use crate::infrastructure::gateway::SimulatedGateway;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;

    async fn started(engine: &EqubEngine) -> (GroupId, UserRef, UserRef) {
        let owner = user("owner@x.io");
        let bob = user("bob@x.io");
        let group = engine
            .create_group(
                NewGroup {
                    name: "Savings".into(),
                    description: None,
                    contribution_amount: Amount::new(dec!(100)).unwrap(),
                    frequency: Frequency::Weekly,
                },
                &owner,
            )
            .await
            .unwrap();
        engine.join_group(group.id, &bob).await.unwrap();
        engine.start_group(group.id, &owner).await.unwrap();
        (group.id, owner, bob)
    }

    #[tokio::test]
    async fn test_successful_payment() {
        let (engine, _) = engine();
        let (group, _, bob) = started(&engine).await;

        let tx = engine.make_payment(group, &bob).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Success);
        assert_eq!(tx.amount.value(), dec!(100));
        assert!(tx.gateway_reference.is_some());
    }

    #[tokio::test]
    async fn test_second_payment_rejected() {
        let (engine, repo) = engine();
        let (group, _, bob) = started(&engine).await;

        engine.make_payment(group, &bob).await.unwrap();
        let again = engine.make_payment(group, &bob).await.unwrap_err();
        assert_eq!(again.kind(), ErrorKind::Conflict);
        assert_eq!(again.to_string(), ALREADY_PAID);

        let cycle = repo.active_cycle(group).await.unwrap().unwrap();
        assert_eq!(repo.transactions(cycle.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_payment_preconditions() {
        let (engine, _) = engine();
        let owner = user("owner@x.io");
        let outsider = user("eve@x.io");
        let group = engine
            .create_group(
                NewGroup {
                    name: "Savings".into(),
                    description: None,
                    contribution_amount: Amount::new(dec!(5)).unwrap(),
                    frequency: Frequency::Monthly,
                },
                &owner,
            )
            .await
            .unwrap();

        let stranger = engine.make_payment(group.id, &outsider).await.unwrap_err();
        assert_eq!(stranger.kind(), ErrorKind::Forbidden);

        let pending = engine.make_payment(group.id, &owner).await.unwrap_err();
        assert_eq!(pending.to_string(), "Payments can only be made to active groups.");
    }

    #[tokio::test]
    async fn test_declined_payment_allows_retry() {
        let (engine, repo) = engine_with(
            Box::new(SimulatedGateway::new(GatewayConfig {
                latency: Duration::ZERO,
                success_rate: 0.0,
            })),
            EngineConfig::default(),
        );
        let (group, _, bob) = started(&engine).await;

        let first = engine.make_payment(group, &bob).await.unwrap();
        assert_eq!(first.status, TransactionStatus::Failed);
        let second = engine.make_payment(group, &bob).await.unwrap();
        assert_eq!(second.status, TransactionStatus::Failed);
        assert_ne!(first.id, second.id);

        let cycle = repo.active_cycle(group).await.unwrap().unwrap();
        assert_eq!(repo.transactions(cycle.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_gateway_timeout_records_failure() {
        let config = EngineConfig {
            gateway_timeout: Duration::from_millis(20),
            ..EngineConfig::default()
        };
        let (engine, _) = engine_with(
            Box::new(SimulatedGateway::new(GatewayConfig {
                latency: Duration::from_secs(30),
                success_rate: 1.0,
            })),
            config,
        );
        let (group, _, bob) = started(&engine).await;

        let tx = engine.make_payment(group, &bob).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Failed);
        assert_eq!(tx.message.as_deref(), Some("Payment gateway timed out."));
    }

    #[tokio::test]
    async fn test_concurrent_payments_settle_once() {
        let (engine, repo) = engine_with(
            Box::new(SimulatedGateway::new(GatewayConfig {
                latency: Duration::from_millis(30),
                success_rate: 1.0,
            })),
            EngineConfig::default(),
        );
        let engine = Arc::new(engine);
        let (group, _, bob) = started(&engine).await;

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let (engine, bob) = (engine.clone(), bob.clone());
                tokio::spawn(async move { engine.make_payment(group, &bob).await })
            })
            .collect();
        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(tx) if tx.status == TransactionStatus::Success => successes += 1,
                Ok(tx) => panic!("unexpected status {:?}", tx.status),
                Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict),
            }
        }
        assert_eq!(successes, 1);

        let cycle = repo.active_cycle(group).await.unwrap().unwrap();
        let settled_ok = repo
            .transactions(cycle.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.status == TransactionStatus::Success)
            .count();
        assert_eq!(settled_ok, 1);
    }

    #[tokio::test]
    async fn test_expire_stale_payments() {
        let config = EngineConfig {
            pending_expiry: Duration::ZERO,
            ..EngineConfig::default()
        };
        let (engine, repo) = engine_with(Box::new(SimulatedGateway::always_accepting()), config);
        let (group, _, bob) = started(&engine).await;

        // Simulate a crash after the pending write.
        let membership = repo
            .membership_for_user(group, bob.id)
            .await
            .unwrap()
            .unwrap();
        let cycle = repo.active_cycle(group).await.unwrap().unwrap();
        let stuck = Transaction::pending(
            membership.id,
            cycle.id,
            Amount::new(dec!(100)).unwrap(),
            Utc::now() - chrono::Duration::minutes(1),
        );
        repo.commit(Changeset::new().transaction(stuck.clone()))
            .await
            .unwrap();

        let expired = engine.expire_stale_payments().await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, stuck.id);
        assert_eq!(expired[0].status, TransactionStatus::Failed);
        assert!(repo.pending_transactions().await.unwrap().is_empty());

        // The member can still pay for the cycle.
        let tx = engine.make_payment(group, &bob).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Success);
    }

    #[tokio::test]
    async fn test_expiry_during_gateway_call_keeps_outcome() {
        let config = EngineConfig {
            pending_expiry: Duration::ZERO,
            ..EngineConfig::default()
        };
        let (engine, repo) = engine_with(
            Box::new(SimulatedGateway::new(GatewayConfig {
                latency: Duration::from_millis(200),
                success_rate: 1.0,
            })),
            config,
        );
        let engine = Arc::new(engine);
        let (group, _, bob) = started(&engine).await;

        let payment = {
            let (engine, bob) = (engine.clone(), bob.clone());
            tokio::spawn(async move { engine.make_payment(group, &bob).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let expired = engine.expire_stale_payments().await.unwrap();
        assert_eq!(expired.len(), 1);

        let tx = payment.await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Success);
        assert!(tx.gateway_reference.is_some());
        assert_ne!(tx.id, expired[0].id);

        let cycle = repo.active_cycle(group).await.unwrap().unwrap();
        let stored = repo.transactions(cycle.id).await.unwrap();
        assert_eq!(stored.len(), 2);
        let expired_row = stored.iter().find(|t| t.id == expired[0].id).unwrap();
        assert_eq!(expired_row.status, TransactionStatus::Failed);
        let success_row = stored.iter().find(|t| t.id == tx.id).unwrap();
        assert_eq!(success_row.gateway_reference, tx.gateway_reference);

        // The late outcome still counts towards the cycle.
        let again = engine.make_payment(group, &bob).await.unwrap_err();
        assert_eq!(again.to_string(), ALREADY_PAID);
    }
}
