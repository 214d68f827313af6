use super::identity::UserRef;
use super::ids::GroupId;
use rust_decimal::Decimal;

/// Things that happened to a group, handed to the notifier after commit.
#[derive(Debug, Clone, PartialEq)]
pub enum EqubEvent {
    MemberJoined {
        group: GroupId,
        member: UserRef,
        payout_order: u32,
    },
    GroupStarted {
        group: GroupId,
        first_recipient: UserRef,
    },
    PayoutReleased {
        group: GroupId,
        recipient: UserRef,
        amount: Decimal,
        cycle_number: u32,
    },
    GroupCompleted {
        group: GroupId,
    },
}

impl EqubEvent {
    pub fn group(&self) -> GroupId {
        match self {
            EqubEvent::MemberJoined { group, .. }
            | EqubEvent::GroupStarted { group, .. }
            | EqubEvent::PayoutReleased { group, .. }
            | EqubEvent::GroupCompleted { group } => *group,
        }
    }
}
