use crate::domain::events::EqubEvent;
use crate::domain::ports::Notifier;
use crate::error::Result;
use async_trait::async_trait;

/// Writes every event to the log instead of delivering it.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn dispatch(&self, event: EqubEvent) -> Result<()> {
        match event {
            EqubEvent::MemberJoined {
                group,
                member,
                payout_order,
            } => tracing::info!(%group, member = %member.email, payout_order, "Member joined"),
            EqubEvent::GroupStarted {
                group,
                first_recipient,
            } => tracing::info!(%group, recipient = %first_recipient.email, "Group started"),
            EqubEvent::PayoutReleased {
                group,
                recipient,
                amount,
                cycle_number,
            } => tracing::info!(
                %group,
                recipient = %recipient.email,
                %amount,
                cycle_number,
                "Payout released"
            ),
            EqubEvent::GroupCompleted { group } => tracing::info!(%group, "Group completed"),
        }
        Ok(())
    }
}
