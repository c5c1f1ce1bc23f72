//! Amount - Non-negative decimal wrapper for financial amounts
//!
//! Every amount Fisca handles (amounts due, penalties, spending limits,
//! reservations) MUST be non-negative. This is enforced at the type
//! level; debts are modeled as states, never as negative money.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Rejections from the `Amount` constructors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Amount cannot be negative: {0}")]
    NegativeAmount(Decimal),
}

/// A non-negative decimal amount of money.
///
/// # Invariant
/// The inner value is always >= 0; both constructors and the checked
/// arithmetic preserve it.
///
/// # Example
/// ```
/// use fisca_core::Amount;
/// use rust_decimal::Decimal;
///
/// let base = Amount::new(Decimal::new(1200, 0)).unwrap();
/// let penalty = Amount::new(Decimal::new(50, 0)).unwrap();
/// let total = base.checked_add(&penalty).unwrap();
/// assert_eq!(total.value(), Decimal::new(1250, 0));
///
/// // Negative amounts are rejected
/// assert!(Amount::new(Decimal::new(-1, 0)).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// Zero amount constant
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Validate a Decimal into an Amount.
    ///
    /// Rejects negative values.
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value < Decimal::ZERO {
            Err(AmountError::NegativeAmount(value))
        } else {
            Ok(Self(value))
        }
    }

    /// Build an Amount without validation.
    ///
    /// # Safety
    /// The caller MUST ensure the value is non-negative. Reserved for
    /// values read back from storage that were validated on the way in.
    #[inline]
    pub const fn new_unchecked(value: Decimal) -> Self {
        Self(value)
    }

    /// The inner Decimal value
    #[inline]
    pub const fn value(&self) -> Decimal {
        self.0
    }

    /// True for an exactly-zero amount
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checked addition - returns None on Decimal overflow
    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction - returns None if the result would be negative
    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        let result = self.0.checked_sub(other.0)?;
        if result < Decimal::ZERO {
            None
        } else {
            Some(Amount(result))
        }
    }

    /// Sum an iterator of amounts, saturating at Decimal::MAX
    pub fn sum<'a>(amounts: impl IntoIterator<Item = &'a Amount>) -> Amount {
        amounts.into_iter().fold(Amount::ZERO, |acc, a| {
            acc.checked_add(a).unwrap_or(Amount(Decimal::MAX))
        })
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self::ZERO
    }
}
