use super::engine::EqubEngine;
use crate::domain::group::{Group, GroupStatus};
use crate::domain::transaction::TransactionStatus;
use crate::error::Result;
use serde::Serialize;
use std::collections::HashSet;

/// Flat view of a group's current state.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct GroupSummary {
    pub group: String,
    pub status: GroupStatus,
    pub members: usize,
    /// Number of the active cycle, if any.
    pub cycle: Option<u32>,
    /// Email of the active cycle's payout recipient.
    pub recipient: Option<String>,
    /// Members with a successful contribution to the active cycle.
    pub paid: usize,
}

impl EqubEngine {
    pub async fn find_group(&self, name: &str) -> Result<Option<Group>> {
        Ok(self
            .repository
            .groups()
            .await?
            .into_iter()
            .find(|g| g.name == name.trim()))
    }

    pub async fn group_summary(&self, group: &Group) -> Result<GroupSummary> {
        let members = self.repository.memberships(group.id).await?.len();
        let active = self.repository.active_cycle(group.id).await?;

        let paid = match &active {
            Some(cycle) => self
                .repository
                .transactions(cycle.id)
                .await?
                .into_iter()
                .filter(|t| t.status == TransactionStatus::Success)
                .map(|t| t.membership_id)
                .collect::<HashSet<_>>()
                .len(),
            None => 0,
        };

        Ok(GroupSummary {
            group: group.name.clone(),
            status: group.status(),
            members,
            cycle: active.as_ref().map(|c| c.cycle_number),
            recipient: active.map(|c| c.payout_recipient.email),
            paid,
        })
    }

    /// One summary per stored group, oldest first.
    pub async fn group_summaries(&self) -> Result<Vec<GroupSummary>> {
        let mut summaries = Vec::new();
        for group in self.repository.groups().await? {
            summaries.push(self.group_summary(&group).await?);
        }
        Ok(summaries)
    }
}
