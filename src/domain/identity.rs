use super::ids::UserId;
use serde::{Deserialize, Serialize};

/// An already-authenticated caller, as handed to the engine by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: UserId,
    pub email: String,
}

impl UserRef {
    pub fn new(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
        }
    }

    /// Identity keyed on the email address alone.
    pub fn from_email(email: impl Into<String>) -> Self {
        let email = email.into();
        Self {
            id: UserId::from_email(&email),
            email,
        }
    }
}
