use crate::config::{EngineConfig, PeriodPolicy};
use crate::domain::events::EqubEvent;
use crate::domain::group::Group;
use crate::domain::ids::GroupId;
use crate::domain::ports::{GatewayBox, NotifierHandle, RepositoryBox};
use crate::error::{EqubError, Result};
use chrono::{DateTime, Months, Utc};
use std::future::Future;

/// The cycle and payout engine.
///
/// `EqubEngine` owns the repository, payment gateway and notifier. It holds no
/// locks of its own: multi-record transitions are committed as one changeset
/// guarded by the group's version, and a concurrent modification is answered
/// by re-reading and trying again.
pub struct EqubEngine {
    pub(crate) repository: RepositoryBox,
    pub(crate) gateway: GatewayBox,
    pub(crate) notifier: NotifierHandle,
    pub(crate) config: EngineConfig,
}

impl EqubEngine {
    /// Creates a new `EqubEngine`.
    ///
    /// # Arguments
    ///
    /// * `repository` - Storage for groups, memberships, cycles and transactions.
    /// * `gateway` - The external payment gateway.
    /// * `notifier` - Receives group events once they are committed.
    /// * `config` - Timeouts, retry budget and schedule policies.
    pub fn new(
        repository: RepositoryBox,
        gateway: GatewayBox,
        notifier: NotifierHandle,
        config: EngineConfig,
    ) -> Self {
        Self {
            repository,
            gateway,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) async fn require_group(&self, group_id: GroupId) -> Result<Group> {
        self.repository
            .group(group_id)
            .await?
            .ok_or_else(|| EqubError::NotFound(format!("Group with ID \"{group_id}\" not found.")))
    }

    /// End date of a cycle opened at `start` for `group`.
    pub(crate) fn cycle_end(&self, group: &Group, start: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let end = match self.config.period_policy {
            PeriodPolicy::FixedMonth => start.checked_add_months(Months::new(1)),
            PeriodPolicy::FollowFrequency => group.frequency.period_end(start),
        };
        end.ok_or_else(|| EqubError::InternalError(format!("cycle end date overflows from {start}")))
    }

    /// Runs `attempt` again while it loses optimistic races on a group.
    pub(crate) async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(EqubError::StaleWrite { group }) if retries < self.config.max_commit_retries => {
                    retries += 1;
                    tracing::debug!(%group, operation, retries, "Concurrent modification, retrying");
                }
                Err(EqubError::StaleWrite { group }) => {
                    tracing::warn!(%group, operation, "Gave up after concurrent modifications");
                    return Err(EqubError::Conflict(format!(
                        "Group {group} is busy; please try again."
                    )));
                }
                other => return other,
            }
        }
    }

    /// Hands the event to the notifier without waiting for it.
    pub(crate) fn publish(&self, event: EqubEvent) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let group = event.group();
            if let Err(e) = notifier.dispatch(event).await {
                tracing::warn!(%group, error = %e, "Notification dispatch failed");
            }
        });
    }
}
