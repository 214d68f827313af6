//! Strongly typed record identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

record_id!(
    /// Identifier of an equb group
    GroupId
);
record_id!(
    /// Identifier of a membership record
    MembershipId
);
record_id!(
    /// Identifier of a cycle record
    CycleId
);
record_id!(
    /// Identifier of a contribution transaction
    TransactionId
);
record_id!(
    /// Identifier of an authenticated user
    UserId
);

impl UserId {
    /// Stable identifier for an email address; the same email always maps to the same id.
    pub fn from_email(email: &str) -> Self {
        Self(Uuid::new_v5(
            &Uuid::NAMESPACE_OID,
            email.trim().to_lowercase().as_bytes(),
        ))
    }
}
