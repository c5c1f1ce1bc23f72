//! Authorization decisions and their reason codes

use chrono::{DateTime, Utc};
use fisca_core::{prefixed_id, Amount};
use serde::{Deserialize, Serialize};

/// What the guard concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    /// Execution may proceed
    Allowed,
    /// Execution must not proceed
    Denied,
    /// Parked until the client answers the validation request
    PendingValidation,
}

/// Why the guard concluded what it concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    WithinLimits,
    DelegationNotActive,
    TypeNotDelegated,
    PerPaymentLimitExceeded,
    MonthlyLimitExceeded,
    AwaitingClientValidation,
    ClientValidationApproved,
    ClientValidationDeclined,
    ClientValidationExpired,
    /// Internal failure during evaluation; the guard fails closed
    EvaluationFailed,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::WithinLimits => "within_limits",
            DecisionReason::DelegationNotActive => "delegation_not_active",
            DecisionReason::TypeNotDelegated => "type_not_delegated",
            DecisionReason::PerPaymentLimitExceeded => "per_payment_limit_exceeded",
            DecisionReason::MonthlyLimitExceeded => "monthly_limit_exceeded",
            DecisionReason::AwaitingClientValidation => "awaiting_client_validation",
            DecisionReason::ClientValidationApproved => "client_validation_approved",
            DecisionReason::ClientValidationDeclined => "client_validation_declined",
            DecisionReason::ClientValidationExpired => "client_validation_expired",
            DecisionReason::EvaluationFailed => "evaluation_failed",
        }
    }
}

/// One rendered authorization decision.
///
/// The guard renders decisions; it never moves money. Every decision
/// lands in the append-only log, including denials and failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationDecision {
    /// Unique id, `DEC-XXXXXXXX`
    pub id: String,

    pub delegation_id: String,
    pub obligation_id: String,
    pub amount: Amount,

    pub outcome: DecisionOutcome,
    pub reason: DecisionReason,

    /// Set when the outcome is `PendingValidation`, and on decisions
    /// produced by resolving or expiring that request
    pub validation_request_id: Option<String>,

    pub decided_at: DateTime<Utc>,
}

impl AuthorizationDecision {
    pub fn allowed(
        delegation_id: &str,
        obligation_id: &str,
        amount: Amount,
        reason: DecisionReason,
        decided_at: DateTime<Utc>,
    ) -> Self {
        Self::render(
            delegation_id,
            obligation_id,
            amount,
            DecisionOutcome::Allowed,
            reason,
            decided_at,
        )
    }

    pub fn denied(
        delegation_id: &str,
        obligation_id: &str,
        amount: Amount,
        reason: DecisionReason,
        decided_at: DateTime<Utc>,
    ) -> Self {
        Self::render(
            delegation_id,
            obligation_id,
            amount,
            DecisionOutcome::Denied,
            reason,
            decided_at,
        )
    }

    pub fn pending(
        delegation_id: &str,
        obligation_id: &str,
        amount: Amount,
        validation_request_id: String,
        decided_at: DateTime<Utc>,
    ) -> Self {
        let mut decision = Self::render(
            delegation_id,
            obligation_id,
            amount,
            DecisionOutcome::PendingValidation,
            DecisionReason::AwaitingClientValidation,
            decided_at,
        );
        decision.validation_request_id = Some(validation_request_id);
        decision
    }

    fn render(
        delegation_id: &str,
        obligation_id: &str,
        amount: Amount,
        outcome: DecisionOutcome,
        reason: DecisionReason,
        decided_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: prefixed_id("DEC"),
            delegation_id: delegation_id.to_string(),
            obligation_id: obligation_id.to_string(),
            amount,
            outcome,
            reason,
            validation_request_id: None,
            decided_at,
        }
    }

    /// True only for a definitive green light
    pub fn allows_execution(&self) -> bool {
        self.outcome == DecisionOutcome::Allowed
    }
}
