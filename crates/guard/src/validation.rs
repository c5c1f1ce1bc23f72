//! Client validation requests
//!
//! When a delegation keeps the client in the loop, the guard parks the
//! payment behind one of these until the client answers or the deadline
//! passes.

use chrono::{DateTime, Utc};
use fisca_core::{prefixed_id, Amount};
use serde::{Deserialize, Serialize};

/// Status of a validation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Awaiting the client's answer
    Pending,
    Approved,
    Declined,
    /// The deadline passed without an answer
    Expired,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Pending => "pending",
            ValidationStatus::Approved => "approved",
            ValidationStatus::Declined => "declined",
            ValidationStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ValidationStatus::Pending),
            "approved" => Some(ValidationStatus::Approved),
            "declined" => Some(ValidationStatus::Declined),
            "expired" => Some(ValidationStatus::Expired),
            _ => None,
        }
    }
}

/// A payment waiting on the client's explicit ok
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRequest {
    /// Unique id, `VAL-XXXXXXXX`; also keys the held reservation
    pub id: String,

    pub delegation_id: String,
    pub obligation_id: String,
    pub amount: Amount,

    pub requested_at: DateTime<Utc>,
    /// Unanswered past this instant, the request expires and the held
    /// amount is returned to the monthly budget
    pub deadline: DateTime<Utc>,

    pub status: ValidationStatus,
}

impl ValidationRequest {
    pub fn new(
        delegation_id: &str,
        obligation_id: &str,
        amount: Amount,
        requested_at: DateTime<Utc>,
        delay_hours: i64,
    ) -> Self {
        Self {
            id: prefixed_id("VAL"),
            delegation_id: delegation_id.to_string(),
            obligation_id: obligation_id.to_string(),
            amount,
            requested_at,
            deadline: requested_at + chrono::Duration::hours(delay_hours),
            status: ValidationStatus::Pending,
        }
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_request() {
        let now = Utc::now();
        let request = ValidationRequest::new(
            "DLG-1",
            "OBL-1",
            Amount::new(dec!(500)).unwrap(),
            now,
            48,
        );

        assert!(request.id.starts_with("VAL-"));
        assert_eq!(request.status, ValidationStatus::Pending);
        assert_eq!(request.deadline, now + chrono::Duration::hours(48));
        assert!(!request.is_past_deadline(now));
        assert!(request.is_past_deadline(now + chrono::Duration::hours(49)));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ValidationStatus::Pending.as_str(), "pending");
        assert_eq!(ValidationStatus::Expired.as_str(), "expired");
        assert_eq!(
            ValidationStatus::from_str("declined"),
            Some(ValidationStatus::Declined)
        );
        assert_eq!(ValidationStatus::from_str("bogus"), None);
    }
}
