use super::ids::{CycleId, MembershipId, TransactionId};
use super::money::Amount;
use crate::error::EqubError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

/// What the gateway (or its absence) decided about an attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub success: bool,
    pub gateway_reference: Option<String>,
    pub message: String,
}

impl Settlement {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            gateway_reference: None,
            message: message.into(),
        }
    }
}

/// A single member's contribution attempt toward a cycle.
///
/// Created `Pending`, then settled exactly once to `Success` or `Failed`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub membership_id: MembershipId,
    pub cycle_id: CycleId,
    pub amount: Amount,
    pub status: TransactionStatus,
    pub transaction_date: DateTime<Utc>,
    pub gateway_reference: Option<String>,
    pub message: Option<String>,
}

impl Transaction {
    pub fn pending(
        membership_id: MembershipId,
        cycle_id: CycleId,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            membership_id,
            cycle_id,
            amount,
            status: TransactionStatus::Pending,
            transaction_date: now,
            gateway_reference: None,
            message: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.status != TransactionStatus::Pending
    }

    pub fn settle(&mut self, settlement: Settlement) -> Result<(), EqubError> {
        if self.is_settled() {
            return Err(EqubError::Conflict(format!(
                "Transaction {} is already settled.",
                self.id
            )));
        }
        self.status = if settlement.success {
            TransactionStatus::Success
        } else {
            TransactionStatus::Failed
        };
        self.gateway_reference = settlement.gateway_reference;
        self.message = Some(settlement.message);
        Ok(())
    }
}
