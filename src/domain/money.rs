use crate::error::EqubError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A strictly positive monetary amount.
///
/// Wraps `rust_decimal::Decimal` so a contribution can never be zero or negative
/// once it has been accepted into the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, EqubError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(EqubError::ValidationError(
                "Contribution amount must be a positive number.".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// The pooled amount collected when `members` contributions of this size settle.
    pub fn pooled(&self, members: usize) -> Decimal {
        self.0 * Decimal::from(members as u64)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = EqubError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(100.00)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(EqubError::ValidationError(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(EqubError::ValidationError(_))
        ));
    }

    #[test]
    fn test_pooled_amount() {
        let amount = Amount::new(dec!(100)).unwrap();
        assert_eq!(amount.pooled(3), dec!(300));
    }

    #[test]
    fn test_deserialize_rejects_non_positive() {
        assert!(serde_json::from_str::<Amount>("\"12.5\"").is_ok());
        assert!(serde_json::from_str::<Amount>("\"0\"").is_err());
    }
}
