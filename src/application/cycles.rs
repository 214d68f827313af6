use super::engine::EqubEngine;
use crate::config::RotationPolicy;
use crate::domain::changeset::{Changeset, VersionGuard};
use crate::domain::cycle::Cycle;
use crate::domain::events::EqubEvent;
use crate::domain::group::{Group, GroupStatus};
use crate::domain::identity::UserRef;
use crate::domain::ids::GroupId;
use crate::domain::membership::next_payout_order;
use crate::domain::transaction::TransactionStatus;
use crate::error::{EqubError, Result};
use chrono::Utc;
use std::collections::HashSet;

/// Result of a committed rollover.
struct Rollover {
    group: Group,
    completed: Cycle,
    next: Option<Cycle>,
    members: usize,
}

impl EqubEngine {
    /// Closes the active cycle once every member has paid and opens the next
    /// one for the following member in payout order.
    ///
    /// Returns the newly opened cycle, or the completed one when the rotation
    /// policy closed the group instead.
    pub async fn process_next_cycle(&self, group_id: GroupId, user: &UserRef) -> Result<Cycle> {
        let rollover = self
            .with_retry("rollover", move || self.try_rollover(group_id, user))
            .await?;

        let payout = rollover
            .group
            .contribution_amount()
            .pooled(rollover.members);
        tracing::info!(
            group = %group_id,
            cycle = rollover.completed.cycle_number,
            recipient = %rollover.completed.payout_recipient.email,
            %payout,
            "Cycle completed"
        );
        self.publish(EqubEvent::PayoutReleased {
            group: group_id,
            recipient: rollover.completed.payout_recipient.clone(),
            amount: payout,
            cycle_number: rollover.completed.cycle_number,
        });

        match rollover.next {
            Some(next) => {
                tracing::info!(
                    group = %group_id,
                    cycle = next.cycle_number,
                    recipient = %next.payout_recipient.email,
                    "Next cycle started"
                );
                Ok(next)
            }
            None => {
                tracing::info!(group = %group_id, "Rotation finished, group completed");
                self.publish(EqubEvent::GroupCompleted { group: group_id });
                Ok(rollover.completed)
            }
        }
    }

    async fn try_rollover(&self, group_id: GroupId, user: &UserRef) -> Result<Rollover> {
        let group = self.require_group(group_id).await?;
        if !group.is_owned_by(user) {
            return Err(EqubError::Forbidden(
                "Only the group owner can process cycles.".to_string(),
            ));
        }

        let mut completed = self.repository.active_cycle(group_id).await?.ok_or_else(|| {
            EqubError::NotFound("No active cycle found to process.".to_string())
        })?;

        let members = self.repository.memberships(group_id).await?;
        let paid: HashSet<_> = self
            .repository
            .transactions(completed.id)
            .await?
            .into_iter()
            .filter(|t| t.status == TransactionStatus::Success)
            .map(|t| t.membership_id)
            .collect();
        let unpaid = members.iter().filter(|m| !paid.contains(&m.id)).count();
        if unpaid > 0 {
            return Err(EqubError::Conflict(format!(
                "Cannot process cycle. {unpaid} member(s) have not paid yet."
            )));
        }

        let current = self
            .repository
            .membership_for_user(group_id, completed.payout_recipient.id)
            .await?
            .ok_or_else(|| {
                EqubError::Conflict("Current payout recipient membership not found.".to_string())
            })?;
        let next_order = next_payout_order(current.payout_order, members.len() as u32);
        let next_member = self
            .repository
            .membership_by_order(group_id, next_order)
            .await?
            .ok_or_else(|| {
                EqubError::Conflict(format!(
                    "Payout order is not set correctly. Member with order {next_order} not found."
                ))
            })?;

        completed.complete()?;
        let mut updated = group.next_version();
        let mut changes = Changeset::new()
            .guarded(group_id, VersionGuard::At(group.version))
            .cycle(completed.clone());

        let finishes_rotation = next_order == 1
            && self.config.rotation_policy == RotationPolicy::CompleteAfterFullRotation;
        let next = if finishes_rotation {
            updated.transition(GroupStatus::Completed)?;
            None
        } else {
            let now = Utc::now();
            let cycle = Cycle::open(
                group_id,
                completed.cycle_number + 1,
                now,
                self.cycle_end(&group, now)?,
                next_member.user,
            );
            changes = changes.cycle(cycle.clone());
            Some(cycle)
        };

        self.repository.commit(changes.group(updated.clone())).await?;
        Ok(Rollover {
            group: updated,
            completed,
            next,
            members: members.len(),
        })
    }
}
