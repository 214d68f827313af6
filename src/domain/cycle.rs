use super::identity::UserRef;
use super::ids::{CycleId, GroupId};
use crate::error::EqubError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Active,
    Completed,
}

/// One contribution-and-payout period of a group.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Cycle {
    pub id: CycleId,
    pub group_id: GroupId,
    pub cycle_number: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: CycleStatus,
    pub payout_recipient: UserRef,
}

impl Cycle {
    pub fn open(
        group_id: GroupId,
        cycle_number: u32,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        payout_recipient: UserRef,
    ) -> Self {
        Self {
            id: CycleId::new(),
            group_id,
            cycle_number,
            start_date,
            end_date,
            status: CycleStatus::Active,
            payout_recipient,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CycleStatus::Active
    }

    pub fn complete(&mut self) -> Result<(), EqubError> {
        if !self.is_active() {
            return Err(EqubError::Conflict(format!(
                "Cycle {} is already completed.",
                self.cycle_number
            )));
        }
        self.status = CycleStatus::Completed;
        Ok(())
    }
}
