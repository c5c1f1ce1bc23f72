//! Spending limits on a delegation

use fisca_core::Amount;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimitError {
    #[error("Spending limit cannot be negative: {0}")]
    Negative(Decimal),
}

/// Cap on delegated spending.
///
/// Stored and exchanged as a plain decimal where `0` means "no limit";
/// inside the engine the two cases are distinct variants so unlimited
/// can never be confused with a zero cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub enum SpendingLimit {
    Unlimited,
    Capped(Amount),
}

impl SpendingLimit {
    /// True when `amount` fits under the cap
    pub fn allows(&self, amount: &Amount) -> bool {
        match self {
            SpendingLimit::Unlimited => true,
            SpendingLimit::Capped(cap) => amount <= cap,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, SpendingLimit::Unlimited)
    }
}

impl Default for SpendingLimit {
    fn default() -> Self {
        SpendingLimit::Unlimited
    }
}

impl TryFrom<Decimal> for SpendingLimit {
    type Error = LimitError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(LimitError::Negative(value));
        }
        if value.is_zero() {
            return Ok(SpendingLimit::Unlimited);
        }
        // Non-negative by the checks above
        Amount::new(value)
            .map(SpendingLimit::Capped)
            .map_err(|_| LimitError::Negative(value))
    }
}

impl From<SpendingLimit> for Decimal {
    fn from(limit: SpendingLimit) -> Self {
        match limit {
            SpendingLimit::Unlimited => Decimal::ZERO,
            SpendingLimit::Capped(cap) => cap.value(),
        }
    }
}

impl fmt::Display for SpendingLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpendingLimit::Unlimited => write!(f, "unlimited"),
            SpendingLimit::Capped(cap) => write!(f, "{}", cap),
        }
    }
}
