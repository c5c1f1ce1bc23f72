//! Payment delegation entity: a dual-signature mandate

use crate::limit::SpendingLimit;
use chrono::{DateTime, NaiveDate, Utc};
use fisca_core::{prefixed_id, PaymentMethod};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum_macros::{Display, EnumString};

/// Lifecycle state of a delegation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DelegationState {
    Draft,
    /// Submitted; terms are frozen, signatures being collected
    Pending,
    Active,
    /// Paused by an operator, reversible
    Suspended,
    /// Terminal: killed by the client or the firm
    Revoked,
    /// Terminal: ran past its end date
    Expired,
}

impl DelegationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DelegationState::Revoked | DelegationState::Expired)
    }
}

/// The two parties whose signatures activate a delegation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Client,
    Accountant,
}

/// Proof of consent: the fact of signing plus when it happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub signed_at: DateTime<Utc>,
}

/// A mandate letting the firm pay obligations on a client's behalf.
///
/// Activation requires both signatures and `today` inside
/// `[start_date, end_date]` (no end date means open-ended). The
/// economic terms are hashed at submit time; the hash never changes
/// afterwards, so what was signed is what is enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDelegation {
    /// Unique id, `DLG-XXXXXXXX`
    pub id: String,

    pub client_id: String,

    /// Obligation type codes the mandate covers; sorted, deduplicated
    pub delegated_types: Vec<String>,

    pub start_date: NaiveDate,
    /// None means no end date
    pub end_date: Option<NaiveDate>,

    pub max_amount_per_payment: SpendingLimit,
    pub max_amount_per_month: SpendingLimit,

    /// Method the firm will use when paying
    pub payment_method: Option<PaymentMethod>,

    /// When true, payments still pause for the client's explicit ok
    pub require_client_validation: bool,
    /// How long a validation request stays answerable
    pub validation_delay_hours: i64,

    pub state: DelegationState,

    pub signed_by_client: Option<SignatureRecord>,
    pub signed_by_accountant: Option<SignatureRecord>,

    /// SHA-256 over the economic terms, fixed at submit
    pub terms_hash: Option<String>,

    /// Optimistic concurrency counter; every committed write bumps it
    pub version: u64,

    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentDelegation {
    pub fn is_fully_signed(&self) -> bool {
        self.signed_by_client.is_some() && self.signed_by_accountant.is_some()
    }

    pub fn covers_type(&self, type_code: &str) -> bool {
        self.delegated_types.iter().any(|t| t == type_code)
    }

    /// True when `today` falls inside the delegation window
    pub fn window_contains(&self, today: NaiveDate) -> bool {
        today >= self.start_date && !self.window_closed(today)
    }

    /// True when the window has an end date and `today` is past it
    pub fn window_closed(&self, today: NaiveDate) -> bool {
        self.end_date.is_some_and(|end| today > end)
    }

    pub fn signature_of(&self, party: Party) -> Option<&SignatureRecord> {
        match party {
            Party::Client => self.signed_by_client.as_ref(),
            Party::Accountant => self.signed_by_accountant.as_ref(),
        }
    }

    pub(crate) fn record_signature(&mut self, party: Party, signed_at: DateTime<Utc>) {
        let record = SignatureRecord { signed_at };
        match party {
            Party::Client => self.signed_by_client = Some(record),
            Party::Accountant => self.signed_by_accountant = Some(record),
        }
    }

    /// Hash of the economic terms the parties sign. Stable across runs:
    /// field order is fixed and amounts serialize canonically.
    pub fn compute_terms_hash(&self) -> Result<String, serde_json::Error> {
        let terms = EconomicTerms {
            client_id: &self.client_id,
            delegated_types: &self.delegated_types,
            start_date: self.start_date,
            end_date: self.end_date,
            max_amount_per_payment: self.max_amount_per_payment,
            max_amount_per_month: self.max_amount_per_month,
            payment_method: self.payment_method,
            require_client_validation: self.require_client_validation,
            validation_delay_hours: self.validation_delay_hours,
        };

        let json = serde_json::to_string(&terms)?;
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Everything a signature commits to. Notes and lifecycle fields are
/// deliberately absent.
#[derive(Serialize)]
struct EconomicTerms<'a> {
    client_id: &'a str,
    delegated_types: &'a [String],
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    max_amount_per_payment: SpendingLimit,
    max_amount_per_month: SpendingLimit,
    payment_method: Option<PaymentMethod>,
    require_client_validation: bool,
    validation_delay_hours: i64,
}

/// Input for creating a delegation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDelegation {
    pub client_id: String,
    pub delegated_types: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub max_amount_per_payment: SpendingLimit,
    #[serde(default)]
    pub max_amount_per_month: SpendingLimit,
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub require_client_validation: bool,
    #[serde(default = "default_validation_delay_hours")]
    pub validation_delay_hours: i64,
    pub notes: Option<String>,
}

pub(crate) fn default_validation_delay_hours() -> i64 {
    72
}

impl NewDelegation {
    /// Materialize a draft; field validation happens in the engine
    pub(crate) fn into_delegation(
        self,
        start_date: NaiveDate,
        delegated_types: Vec<String>,
        now: DateTime<Utc>,
    ) -> PaymentDelegation {
        PaymentDelegation {
            id: prefixed_id("DLG"),
            client_id: self.client_id.trim().to_string(),
            delegated_types,
            start_date,
            end_date: self.end_date,
            max_amount_per_payment: self.max_amount_per_payment,
            max_amount_per_month: self.max_amount_per_month,
            payment_method: self.payment_method,
            require_client_validation: self.require_client_validation,
            validation_delay_hours: self.validation_delay_hours,
            state: DelegationState::Draft,
            signed_by_client: None,
            signed_by_accountant: None,
            terms_hash: None,
            version: 1,
            notes: self.notes,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; what is editable depends on the state (full edit in
/// draft, notes only once submitted).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelegationUpdate {
    pub delegated_types: Option<Vec<String>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub max_amount_per_payment: Option<SpendingLimit>,
    pub max_amount_per_month: Option<SpendingLimit>,
    pub payment_method: Option<PaymentMethod>,
    pub require_client_validation: Option<bool>,
    pub validation_delay_hours: Option<i64>,
    pub notes: Option<String>,
}

impl DelegationUpdate {
    /// True when nothing but notes would change
    pub fn is_notes_only(&self) -> bool {
        self.delegated_types.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.max_amount_per_payment.is_none()
            && self.max_amount_per_month.is_none()
            && self.payment_method.is_none()
            && self.require_client_validation.is_none()
            && self.validation_delay_hours.is_none()
    }
}
