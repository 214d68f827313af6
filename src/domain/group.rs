use super::identity::UserRef;
use super::ids::GroupId;
use super::money::Amount;
use crate::error::EqubError;
use chrono::{DateTime, Months, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 500;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub enum Frequency {
    Weekly,
    BiWeekly,
    Monthly,
}

impl Frequency {
    /// End of a period starting at `start` when the declared frequency is honored.
    pub fn period_end(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Frequency::Weekly => start.checked_add_signed(TimeDelta::weeks(1)),
            Frequency::BiWeekly => start.checked_add_signed(TimeDelta::weeks(2)),
            Frequency::Monthly => start.checked_add_months(Months::new(1)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Pending,
    Active,
    Completed,
}

impl GroupStatus {
    /// Only pending -> active -> completed is allowed.
    pub fn can_become(&self, next: GroupStatus) -> bool {
        matches!(
            (self, next),
            (GroupStatus::Pending, GroupStatus::Active)
                | (GroupStatus::Active, GroupStatus::Completed)
        )
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GroupStatus::Pending => "pending",
            GroupStatus::Active => "active",
            GroupStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Caller input for creating a group.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGroup {
    pub name: String,
    pub description: Option<String>,
    pub contribution_amount: Amount,
    pub frequency: Frequency,
}

impl NewGroup {
    pub fn validate(&self) -> Result<(), EqubError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(EqubError::ValidationError(
                "Group name must not be empty.".to_string(),
            ));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(EqubError::ValidationError(format!(
                "Group name must be at most {MAX_NAME_LEN} characters."
            )));
        }
        if let Some(description) = &self.description
            && description.chars().count() > MAX_DESCRIPTION_LEN
        {
            return Err(EqubError::ValidationError(format!(
                "Group description must be at most {MAX_DESCRIPTION_LEN} characters."
            )));
        }
        Ok(())
    }
}

/// A rotating-savings group.
///
/// `version` is bumped by every transition that must be serialized per group
/// (join, start, rollover) and checked by the repository at commit time.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    contribution_amount: Amount,
    pub frequency: Frequency,
    status: GroupStatus,
    pub owner: UserRef,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn create(input: NewGroup, owner: UserRef, now: DateTime<Utc>) -> Result<Self, EqubError> {
        input.validate()?;
        Ok(Self {
            id: GroupId::new(),
            name: input.name.trim().to_string(),
            description: input.description,
            contribution_amount: input.contribution_amount,
            frequency: input.frequency,
            status: GroupStatus::Pending,
            owner,
            version: 0,
            created_at: now,
        })
    }

    /// Fixed at creation; there is no setter.
    pub fn contribution_amount(&self) -> Amount {
        self.contribution_amount
    }

    pub fn status(&self) -> GroupStatus {
        self.status
    }

    pub fn is_owned_by(&self, user: &UserRef) -> bool {
        self.owner.id == user.id
    }

    /// Moves the group forward in its lifecycle.
    pub fn transition(&mut self, next: GroupStatus) -> Result<(), EqubError> {
        if !self.status.can_become(next) {
            return Err(EqubError::Conflict(format!(
                "Group cannot move from {} to {}.",
                self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Returns a copy carrying the next version, to be committed under the current one.
    pub fn next_version(&self) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next
    }
}
