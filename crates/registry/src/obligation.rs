//! Obligation entity and lifecycle states

use chrono::{DateTime, NaiveDate, Utc};
use fisca_alerts::AlertLevel;
use fisca_core::{prefixed_id, Amount, PaidBy, PaymentMethod};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Lifecycle state of an obligation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ObligationState {
    Draft,
    Todo,
    InProgress,
    Waiting,
    /// Terminal: the obligation has been settled
    Paid,
    /// Terminal: kept for audit, never deleted
    Cancelled,
}

impl ObligationState {
    /// Paid and cancelled rows are frozen; no transition leaves them
    pub fn is_terminal(&self) -> bool {
        matches!(self, ObligationState::Paid | ObligationState::Cancelled)
    }
}

/// Processing priority (does not affect alert levels)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// A fiscal obligation tracked by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obligation {
    /// Unique id, `OBL-XXXXXXXX`
    pub id: String,

    /// Obligation type code, resolved against the catalog
    pub type_code: String,

    /// Client the obligation belongs to
    pub client_id: String,

    /// Statutory due date; changes only via the correction flow
    pub due_date: NaiveDate,

    pub state: ObligationState,
    pub priority: Priority,

    /// Principal owed
    pub base_amount: Amount,

    /// Late penalties and surcharges accrued
    pub penalty_amount: Amount,

    pub payment_method: Option<PaymentMethod>,
    pub paid_by: Option<PaidBy>,

    /// Set only when the obligation reaches `paid`
    pub payment_date: Option<NaiveDate>,
    pub payment_reference: Option<String>,

    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Obligation {
    /// Total owed. Always derived, so `total == base + penalty` holds
    /// structurally.
    pub fn total_amount(&self) -> Amount {
        self.base_amount
            .checked_add(&self.penalty_amount)
            .unwrap_or(self.base_amount)
    }

    /// Paid or cancelled: excluded from overdue and escalation logic
    pub fn is_settled(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn days_until_due(&self, today: NaiveDate) -> i64 {
        fisca_alerts::days_until_due(self.due_date, today)
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        fisca_alerts::is_overdue(self.due_date, self.is_settled(), today)
    }

    pub fn alert_level(&self, today: NaiveDate) -> AlertLevel {
        fisca_alerts::alert_level(self.due_date, self.is_settled(), today)
    }

    /// True when the obligation was paid after its due date
    pub fn paid_late(&self) -> bool {
        match (self.state, self.payment_date) {
            (ObligationState::Paid, Some(paid)) => paid > self.due_date,
            _ => false,
        }
    }
}

/// Input for creating an obligation
///
/// `due_date` is an Option so a missing date surfaces as a field-level
/// validation error instead of a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewObligation {
    pub type_code: String,
    pub client_id: String,
    pub due_date: Option<NaiveDate>,
    pub state: Option<ObligationState>,
    pub priority: Option<Priority>,
    pub base_amount: Amount,
    pub penalty_amount: Amount,
    pub payment_method: Option<PaymentMethod>,
    pub paid_by: Option<PaidBy>,
    /// Accepted only when creating directly in `paid` (history imports)
    pub payment_date: Option<NaiveDate>,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
}

impl NewObligation {
    /// Materialize the entity; field validation happens in the registry
    pub fn into_obligation(self, due_date: NaiveDate, now: DateTime<Utc>) -> Obligation {
        Obligation {
            id: prefixed_id("OBL"),
            type_code: self.type_code.trim().to_lowercase(),
            client_id: self.client_id.trim().to_string(),
            due_date,
            state: self.state.unwrap_or(ObligationState::Todo),
            priority: self.priority.unwrap_or_default(),
            base_amount: self.base_amount,
            penalty_amount: self.penalty_amount,
            payment_method: self.payment_method,
            paid_by: self.paid_by,
            payment_date: self.payment_date,
            payment_reference: self.payment_reference,
            notes: self.notes,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; absent fields are left untouched.
///
/// `due_date` is deliberately not here: it only changes through
/// `correct_due_date`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObligationUpdate {
    pub state: Option<ObligationState>,
    pub priority: Option<Priority>,
    pub base_amount: Option<Amount>,
    pub penalty_amount: Option<Amount>,
    pub payment_method: Option<PaymentMethod>,
    pub paid_by: Option<PaidBy>,
    pub payment_date: Option<NaiveDate>,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
}

impl ObligationUpdate {
    /// True when the update changes money fields
    pub fn touches_amounts(&self) -> bool {
        self.base_amount.is_some() || self.penalty_amount.is_some()
    }

    /// True when the update carries payment execution details
    pub fn touches_payment_record(&self) -> bool {
        self.payment_date.is_some() || self.payment_reference.is_some()
    }

    /// True when nothing but notes would change
    pub fn is_notes_only(&self) -> bool {
        self.state.is_none()
            && self.priority.is_none()
            && !self.touches_amounts()
            && self.payment_method.is_none()
            && self.paid_by.is_none()
            && !self.touches_payment_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample(due: NaiveDate) -> Obligation {
        NewObligation {
            type_code: "tva".into(),
            client_id: "CL-001".into(),
            due_date: Some(due),
            base_amount: Amount::new(dec!(1200)).unwrap(),
            penalty_amount: Amount::new(dec!(50)).unwrap(),
            ..Default::default()
        }
        .into_obligation(due, Utc::now())
    }

    #[test]
    fn test_total_amount_is_derived() {
        let obligation = sample(date(2025, 4, 30));
        assert_eq!(obligation.total_amount().value(), dec!(1250));
    }

    #[test]
    fn test_id_prefix() {
        let obligation = sample(date(2025, 4, 30));
        assert!(obligation.id.starts_with("OBL-"));
    }

    #[test]
    fn test_type_code_normalized() {
        let new = NewObligation {
            type_code: " TVA ".into(),
            client_id: "CL-001".into(),
            due_date: Some(date(2025, 4, 30)),
            ..Default::default()
        };
        let obligation = new.into_obligation(date(2025, 4, 30), Utc::now());
        assert_eq!(obligation.type_code, "tva");
    }

    #[test]
    fn test_overdue_and_alert_level() {
        let mut obligation = sample(date(2025, 3, 9));
        let today = date(2025, 3, 10);

        assert!(obligation.is_overdue(today));
        assert_eq!(obligation.alert_level(today), AlertLevel::Critical);

        // Paying clears both, even though the date is past
        obligation.state = ObligationState::Paid;
        obligation.payment_date = Some(today);
        assert!(!obligation.is_overdue(today));
        assert_eq!(obligation.alert_level(today), AlertLevel::Info);
    }

    #[test]
    fn test_paid_late() {
        let mut obligation = sample(date(2025, 3, 9));
        obligation.state = ObligationState::Paid;

        obligation.payment_date = Some(date(2025, 3, 15));
        assert!(obligation.paid_late());

        obligation.payment_date = Some(date(2025, 3, 9));
        assert!(!obligation.paid_late());
    }

    #[test]
    fn test_terminal_states() {
        assert!(ObligationState::Paid.is_terminal());
        assert!(ObligationState::Cancelled.is_terminal());
        assert!(!ObligationState::Waiting.is_terminal());
        assert!(!ObligationState::Draft.is_terminal());
    }

    #[test]
    fn test_state_codes_roundtrip() {
        assert_eq!(ObligationState::InProgress.to_string(), "in_progress");
        assert_eq!(
            "waiting".parse::<ObligationState>().unwrap(),
            ObligationState::Waiting
        );
        assert_eq!(
            serde_json::to_string(&ObligationState::Paid).unwrap(),
            "\"paid\""
        );
    }

    #[test]
    fn test_update_helpers() {
        let notes_only = ObligationUpdate {
            notes: Some("call the client".into()),
            ..Default::default()
        };
        assert!(notes_only.is_notes_only());
        assert!(!notes_only.touches_amounts());

        let money = ObligationUpdate {
            penalty_amount: Some(Amount::new(Decimal::new(10, 0)).unwrap()),
            ..Default::default()
        };
        assert!(money.touches_amounts());
        assert!(!money.is_notes_only());
    }
}
