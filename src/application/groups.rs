use super::engine::EqubEngine;
use crate::domain::changeset::{Changeset, VersionGuard};
use crate::domain::cycle::Cycle;
use crate::domain::events::EqubEvent;
use crate::domain::group::{Group, GroupStatus, NewGroup};
use crate::domain::identity::UserRef;
use crate::domain::ids::GroupId;
use crate::domain::membership::Membership;
use crate::error::{EqubError, Result};
use chrono::Utc;

/// Minimum number of members before a group may start.
pub const MIN_MEMBERS_TO_START: usize = 2;

impl EqubEngine {
    /// Creates a pending group together with the owner's membership (payout order 1).
    pub async fn create_group(&self, input: NewGroup, owner: &UserRef) -> Result<Group> {
        let now = Utc::now();
        let group = Group::create(input, owner.clone(), now)?;
        let membership = Membership::new(group.id, owner.clone(), 1, now);

        self.repository
            .commit(
                Changeset::new()
                    .guarded(group.id, VersionGuard::Absent)
                    .group(group.clone())
                    .membership(membership),
            )
            .await?;

        tracing::info!(group = %group.id, name = %group.name, owner = %owner.email, "Group created");
        Ok(group)
    }

    /// Adds `user` to a pending group at the next payout order.
    pub async fn join_group(&self, group_id: GroupId, user: &UserRef) -> Result<Membership> {
        let membership = self
            .with_retry("join", move || self.try_join(group_id, user))
            .await?;

        tracing::info!(
            group = %group_id,
            member = %user.email,
            payout_order = membership.payout_order,
            "Member joined"
        );
        self.publish(EqubEvent::MemberJoined {
            group: group_id,
            member: user.clone(),
            payout_order: membership.payout_order,
        });
        Ok(membership)
    }

    async fn try_join(&self, group_id: GroupId, user: &UserRef) -> Result<Membership> {
        let group = self.require_group(group_id).await?;
        if group.status() != GroupStatus::Pending {
            return Err(EqubError::Conflict(
                "This group is not accepting new members.".to_string(),
            ));
        }
        if self
            .repository
            .membership_for_user(group_id, user.id)
            .await?
            .is_some()
        {
            return Err(EqubError::Conflict(
                "You are already a member of this group.".to_string(),
            ));
        }

        let member_count = self.repository.memberships(group_id).await?.len() as u32;
        let membership = Membership::new(group_id, user.clone(), member_count + 1, Utc::now());

        self.repository
            .commit(
                Changeset::new()
                    .guarded(group_id, VersionGuard::At(group.version))
                    .group(group.next_version())
                    .membership(membership.clone()),
            )
            .await?;
        Ok(membership)
    }

    /// Opens cycle 1 for the member holding payout order 1 and activates the group.
    pub async fn start_group(&self, group_id: GroupId, user: &UserRef) -> Result<Group> {
        let (group, cycle) = self
            .with_retry("start", move || self.try_start(group_id, user))
            .await?;

        tracing::info!(
            group = %group.id,
            name = %group.name,
            owner = %user.email,
            recipient = %cycle.payout_recipient.email,
            "Group started, cycle 1 is active"
        );
        self.publish(EqubEvent::GroupStarted {
            group: group.id,
            first_recipient: cycle.payout_recipient,
        });
        Ok(group)
    }

    async fn try_start(&self, group_id: GroupId, user: &UserRef) -> Result<(Group, Cycle)> {
        let group = self.require_group(group_id).await?;
        if !group.is_owned_by(user) {
            return Err(EqubError::Forbidden(
                "Only the group owner can start the group.".to_string(),
            ));
        }
        if group.status() != GroupStatus::Pending {
            return Err(EqubError::Conflict(
                "This group has already been started.".to_string(),
            ));
        }

        let members = self.repository.memberships(group_id).await?;
        if members.len() < MIN_MEMBERS_TO_START {
            return Err(EqubError::Conflict(
                "A group needs at least two members to start.".to_string(),
            ));
        }

        let first = self
            .repository
            .membership_by_order(group_id, 1)
            .await?
            .ok_or_else(|| {
                EqubError::Conflict(
                    "Payout order is not set correctly. Member with order 1 not found.".to_string(),
                )
            })?;

        let now = Utc::now();
        let cycle = Cycle::open(group_id, 1, now, self.cycle_end(&group, now)?, first.user);
        let mut started = group.next_version();
        started.transition(GroupStatus::Active)?;

        self.repository
            .commit(
                Changeset::new()
                    .guarded(group_id, VersionGuard::At(group.version))
                    .group(started.clone())
                    .cycle(cycle.clone()),
            )
            .await?;
        Ok((started, cycle))
    }
}
