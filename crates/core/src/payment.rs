//! Payment-related coded enums shared across the workspace

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// How an obligation is (or will be) settled
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// SEPA direct debit (prélèvement)
    DirectDebit,
    /// Bank transfer (virement)
    BankTransfer,
    /// Paper check
    Check,
    /// Card payment
    Card,
}

/// Who executed (or will execute) the payment
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaidBy {
    /// The client pays directly
    Client,
    /// The accounting firm pays under an active delegation
    DelegatedAccountant,
}
