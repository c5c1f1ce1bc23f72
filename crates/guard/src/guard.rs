//! Payment execution guard
//!
//! Gatekeeper between a delegation and an actual payment. The checks
//! run in a fixed order and the first failure decides:
//!
//! 1. the delegation is active
//! 2. the obligation type is covered by the mandate
//! 3. the amount fits the per-payment limit
//! 4. the amount fits what is left of the monthly budget
//! 5. client validation, when the mandate requires it
//!
//! Checks 4 and 5 reserve rather than inspect: passing them writes a
//! hold against the monthly budget in the same transaction, so two
//! racing payments cannot both slip under the cap. Any internal failure
//! denies the payment.

use chrono::{DateTime, Utc};
use fisca_core::Amount;
use fisca_delegation::{DelegationState, PaymentDelegation, SpendingLimit};
use fisca_registry::Obligation;
use std::path::Path;
use thiserror::Error;

use crate::config::GuardConfig;
use crate::decision::{AuthorizationDecision, DecisionReason};
use crate::log::{DecisionLog, LogError};
use crate::store::{month_key, GuardStore, Reservation, ReservationOutcome, StoreError};
use crate::validation::{ValidationRequest, ValidationStatus};

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Decision log error: {0}")]
    Log(#[from] LogError),

    #[error("Validation request not found: {0}")]
    NotFound(String),

    #[error("Validation request already resolved: {0}")]
    AlreadyResolved(String),
}

pub struct PaymentGuard {
    store: GuardStore,
    log: DecisionLog,
}

impl PaymentGuard {
    pub fn new(
        db_path: impl AsRef<Path>,
        log_path: impl AsRef<Path>,
        config: &GuardConfig,
    ) -> Result<Self, GuardError> {
        Ok(Self {
            store: GuardStore::new(db_path, config)?,
            log: DecisionLog::new(log_path)?,
        })
    }

    pub fn in_memory() -> Result<Self, GuardError> {
        Ok(Self {
            store: GuardStore::in_memory()?,
            log: DecisionLog::in_memory(),
        })
    }

    /// Decide whether a payment may be executed.
    ///
    /// Always returns a decision and always logs it. Internal failures
    /// are rendered as a denial, never as a green light; the only error
    /// this returns is a failure to write the audit log itself.
    pub fn authorize(
        &mut self,
        delegation: &PaymentDelegation,
        obligation: &Obligation,
        proposed_amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationDecision, GuardError> {
        let decision = match self.evaluate(delegation, obligation, proposed_amount, now) {
            Ok(decision) => decision,
            Err(error) => {
                tracing::error!(
                    delegation_id = %delegation.id,
                    obligation_id = %obligation.id,
                    error = %error,
                    "Guard evaluation failed, denying payment"
                );
                AuthorizationDecision::denied(
                    &delegation.id,
                    &obligation.id,
                    proposed_amount,
                    DecisionReason::EvaluationFailed,
                    now,
                )
            }
        };

        self.log.append(&decision)?;
        Ok(decision)
    }

    fn evaluate(
        &mut self,
        delegation: &PaymentDelegation,
        obligation: &Obligation,
        proposed_amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationDecision, GuardError> {
        if delegation.state != DelegationState::Active {
            return Ok(AuthorizationDecision::denied(
                &delegation.id,
                &obligation.id,
                proposed_amount,
                DecisionReason::DelegationNotActive,
                now,
            ));
        }

        if !delegation.covers_type(&obligation.type_code) {
            return Ok(AuthorizationDecision::denied(
                &delegation.id,
                &obligation.id,
                proposed_amount,
                DecisionReason::TypeNotDelegated,
                now,
            ));
        }

        if !delegation.max_amount_per_payment.allows(&proposed_amount) {
            return Ok(AuthorizationDecision::denied(
                &delegation.id,
                &obligation.id,
                proposed_amount,
                DecisionReason::PerPaymentLimitExceeded,
                now,
            ));
        }

        let month = month_key(now.date_naive());
        let monthly_cap = match delegation.max_amount_per_month {
            SpendingLimit::Unlimited => None,
            SpendingLimit::Capped(cap) => Some(cap),
        };

        if delegation.require_client_validation {
            let request = ValidationRequest::new(
                &delegation.id,
                &obligation.id,
                proposed_amount,
                now,
                delegation.validation_delay_hours,
            );
            let reservation = Reservation {
                ref_id: request.id.clone(),
                delegation_id: delegation.id.clone(),
                obligation_id: obligation.id.clone(),
                amount: proposed_amount,
                month,
                created_at: now,
            };

            let outcome = self
                .store
                .try_reserve(&reservation, monthly_cap, Some(&request))?;
            return Ok(match outcome {
                ReservationOutcome::Reserved => AuthorizationDecision::pending(
                    &delegation.id,
                    &obligation.id,
                    proposed_amount,
                    request.id,
                    now,
                ),
                ReservationOutcome::CapExceeded { .. } => AuthorizationDecision::denied(
                    &delegation.id,
                    &obligation.id,
                    proposed_amount,
                    DecisionReason::MonthlyLimitExceeded,
                    now,
                ),
            });
        }

        // The decision id doubles as the reservation ref, so the audit
        // line and the held amount point at each other
        let decision = AuthorizationDecision::allowed(
            &delegation.id,
            &obligation.id,
            proposed_amount,
            DecisionReason::WithinLimits,
            now,
        );
        let reservation = Reservation {
            ref_id: decision.id.clone(),
            delegation_id: delegation.id.clone(),
            obligation_id: obligation.id.clone(),
            amount: proposed_amount,
            month,
            created_at: now,
        };

        let outcome = self.store.try_reserve(&reservation, monthly_cap, None)?;
        Ok(match outcome {
            ReservationOutcome::Reserved => decision,
            ReservationOutcome::CapExceeded { .. } => AuthorizationDecision::denied(
                &delegation.id,
                &obligation.id,
                proposed_amount,
                DecisionReason::MonthlyLimitExceeded,
                now,
            ),
        })
    }

    /// Record the client's answer to a pending validation request.
    ///
    /// A decline or a late answer releases the held amount back to the
    /// monthly budget; an approval keeps it held. The rendered decision
    /// is logged like any other.
    pub fn resolve_validation(
        &mut self,
        request_id: &str,
        approved: bool,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationDecision, GuardError> {
        let request = match self.store.get_validation(request_id) {
            Ok(request) => request,
            Err(StoreError::NotFound(id)) => return Err(GuardError::NotFound(id)),
            Err(error) => return Err(error.into()),
        };
        if request.status != ValidationStatus::Pending {
            return Err(GuardError::AlreadyResolved(request_id.to_string()));
        }

        // A late answer cannot resurrect the payment
        let (target, mut decision) = if request.is_past_deadline(now) {
            (
                ValidationStatus::Expired,
                AuthorizationDecision::denied(
                    &request.delegation_id,
                    &request.obligation_id,
                    request.amount,
                    DecisionReason::ClientValidationExpired,
                    now,
                ),
            )
        } else if approved {
            (
                ValidationStatus::Approved,
                AuthorizationDecision::allowed(
                    &request.delegation_id,
                    &request.obligation_id,
                    request.amount,
                    DecisionReason::ClientValidationApproved,
                    now,
                ),
            )
        } else {
            (
                ValidationStatus::Declined,
                AuthorizationDecision::denied(
                    &request.delegation_id,
                    &request.obligation_id,
                    request.amount,
                    DecisionReason::ClientValidationDeclined,
                    now,
                ),
            )
        };

        if !self.store.resolve_validation(request_id, target)? {
            // Lost the race against another resolver or the expiry sweep
            return Err(GuardError::AlreadyResolved(request_id.to_string()));
        }

        decision.validation_request_id = Some(request.id.clone());
        self.log.append(&decision)?;
        tracing::info!(
            request_id = %request.id,
            outcome = ?decision.outcome,
            "Validation request resolved"
        );
        Ok(decision)
    }

    /// Expire every pending validation request whose deadline has
    /// passed, releasing the held amounts. Safe to run repeatedly.
    pub fn expire_validations(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AuthorizationDecision>, GuardError> {
        let pending = self
            .store
            .list_validations_by_status(ValidationStatus::Pending)?;

        let mut decisions = Vec::new();
        for request in pending {
            if !request.is_past_deadline(now) {
                continue;
            }
            if !self
                .store
                .resolve_validation(&request.id, ValidationStatus::Expired)?
            {
                continue;
            }

            let mut decision = AuthorizationDecision::denied(
                &request.delegation_id,
                &request.obligation_id,
                request.amount,
                DecisionReason::ClientValidationExpired,
                now,
            );
            decision.validation_request_id = Some(request.id);
            self.log.append(&decision)?;
            decisions.push(decision);
        }

        if !decisions.is_empty() {
            tracing::info!(count = decisions.len(), "Expired validation requests");
        }
        Ok(decisions)
    }

    pub fn pending_validations(&self) -> Result<Vec<ValidationRequest>, GuardError> {
        Ok(self
            .store
            .list_validations_by_status(ValidationStatus::Pending)?)
    }

    pub fn month_to_date(&self, delegation_id: &str, month: &str) -> Result<Amount, GuardError> {
        Ok(self.store.month_to_date(delegation_id, month)?)
    }

    pub fn log(&self) -> &DecisionLog {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionOutcome;
    use chrono::{NaiveDate, TimeZone};
    use fisca_registry::{ObligationState, Priority};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn amount(value: Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn delegation(state: DelegationState) -> PaymentDelegation {
        let now = at(2025, 1, 1);
        PaymentDelegation {
            id: "DLG-TEST0001".to_string(),
            client_id: "acme".to_string(),
            delegated_types: vec!["tva".to_string(), "urssaf".to_string()],
            start_date: date(2025, 1, 1),
            end_date: None,
            max_amount_per_payment: SpendingLimit::Capped(amount(dec!(1000))),
            max_amount_per_month: SpendingLimit::Capped(amount(dec!(1500))),
            payment_method: None,
            require_client_validation: false,
            validation_delay_hours: 72,
            state,
            signed_by_client: None,
            signed_by_accountant: None,
            terms_hash: None,
            version: 1,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn obligation(type_code: &str) -> Obligation {
        let now = at(2025, 1, 1);
        Obligation {
            id: "OBL-TEST0001".to_string(),
            type_code: type_code.to_string(),
            client_id: "acme".to_string(),
            due_date: date(2025, 3, 20),
            state: ObligationState::Todo,
            priority: Priority::Normal,
            base_amount: amount(dec!(800)),
            penalty_amount: Amount::ZERO,
            payment_method: None,
            paid_by: None,
            payment_date: None,
            payment_reference: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_allows_within_limits() {
        let mut guard = PaymentGuard::in_memory().unwrap();
        let decision = guard
            .authorize(
                &delegation(DelegationState::Active),
                &obligation("tva"),
                amount(dec!(800)),
                at(2025, 3, 10),
            )
            .unwrap();

        assert_eq!(decision.outcome, DecisionOutcome::Allowed);
        assert_eq!(decision.reason, DecisionReason::WithinLimits);
        assert!(decision.allows_execution());

        // The green light holds its amount against the month
        assert_eq!(
            guard.month_to_date("DLG-TEST0001", "2025-03").unwrap(),
            amount(dec!(800))
        );
    }

    #[test]
    fn test_denies_inactive_delegation() {
        let mut guard = PaymentGuard::in_memory().unwrap();
        for state in [
            DelegationState::Draft,
            DelegationState::Pending,
            DelegationState::Suspended,
            DelegationState::Revoked,
            DelegationState::Expired,
        ] {
            let decision = guard
                .authorize(
                    &delegation(state),
                    &obligation("tva"),
                    amount(dec!(100)),
                    at(2025, 3, 10),
                )
                .unwrap();
            assert_eq!(decision.reason, DecisionReason::DelegationNotActive);
        }
    }

    #[test]
    fn test_denies_uncovered_type() {
        let mut guard = PaymentGuard::in_memory().unwrap();
        let decision = guard
            .authorize(
                &delegation(DelegationState::Active),
                &obligation("cfe"),
                amount(dec!(100)),
                at(2025, 3, 10),
            )
            .unwrap();
        assert_eq!(decision.outcome, DecisionOutcome::Denied);
        assert_eq!(decision.reason, DecisionReason::TypeNotDelegated);
    }

    #[test]
    fn test_denies_per_payment_excess() {
        let mut guard = PaymentGuard::in_memory().unwrap();
        let decision = guard
            .authorize(
                &delegation(DelegationState::Active),
                &obligation("tva"),
                amount(dec!(1200)),
                at(2025, 3, 10),
            )
            .unwrap();
        assert_eq!(decision.reason, DecisionReason::PerPaymentLimitExceeded);

        // A denial holds nothing
        assert_eq!(
            guard.month_to_date("DLG-TEST0001", "2025-03").unwrap(),
            Amount::ZERO
        );
    }

    #[test]
    fn test_monthly_budget_accumulates() {
        let mut guard = PaymentGuard::in_memory().unwrap();
        let mandate = delegation(DelegationState::Active);

        // 900 + 500 fit under 1500; the third payment does not
        let first = guard
            .authorize(&mandate, &obligation("tva"), amount(dec!(900)), at(2025, 3, 5))
            .unwrap();
        assert_eq!(first.reason, DecisionReason::WithinLimits);

        let second = guard
            .authorize(&mandate, &obligation("tva"), amount(dec!(500)), at(2025, 3, 12))
            .unwrap();
        assert_eq!(second.reason, DecisionReason::WithinLimits);

        let third = guard
            .authorize(&mandate, &obligation("tva"), amount(dec!(200)), at(2025, 3, 20))
            .unwrap();
        assert_eq!(third.outcome, DecisionOutcome::Denied);
        assert_eq!(third.reason, DecisionReason::MonthlyLimitExceeded);

        // The budget resets with the calendar month
        let next_month = guard
            .authorize(&mandate, &obligation("tva"), amount(dec!(200)), at(2025, 4, 2))
            .unwrap();
        assert_eq!(next_month.reason, DecisionReason::WithinLimits);
    }

    #[test]
    fn test_check_order_active_before_type() {
        let mut guard = PaymentGuard::in_memory().unwrap();

        // Inactive and uncovered: the state check fires first
        let decision = guard
            .authorize(
                &delegation(DelegationState::Suspended),
                &obligation("cfe"),
                amount(dec!(5000)),
                at(2025, 3, 10),
            )
            .unwrap();
        assert_eq!(decision.reason, DecisionReason::DelegationNotActive);
    }

    #[test]
    fn test_validation_required_parks_payment() {
        let mut guard = PaymentGuard::in_memory().unwrap();
        let mut mandate = delegation(DelegationState::Active);
        mandate.require_client_validation = true;

        let decision = guard
            .authorize(&mandate, &obligation("tva"), amount(dec!(800)), at(2025, 3, 10))
            .unwrap();

        assert_eq!(decision.outcome, DecisionOutcome::PendingValidation);
        assert!(!decision.allows_execution());
        let request_id = decision.validation_request_id.clone().unwrap();

        // Parked, but the amount is already held
        assert_eq!(
            guard.month_to_date("DLG-TEST0001", "2025-03").unwrap(),
            amount(dec!(800))
        );
        assert_eq!(guard.pending_validations().unwrap().len(), 1);

        // Approval keeps the hold and finally allows execution
        let resolved = guard
            .resolve_validation(&request_id, true, at(2025, 3, 11))
            .unwrap();
        assert_eq!(resolved.outcome, DecisionOutcome::Allowed);
        assert_eq!(resolved.reason, DecisionReason::ClientValidationApproved);
        assert_eq!(resolved.validation_request_id.as_deref(), Some(request_id.as_str()));
        assert_eq!(
            guard.month_to_date("DLG-TEST0001", "2025-03").unwrap(),
            amount(dec!(800))
        );
    }

    #[test]
    fn test_declined_validation_releases_budget() {
        let mut guard = PaymentGuard::in_memory().unwrap();
        let mut mandate = delegation(DelegationState::Active);
        mandate.require_client_validation = true;

        let decision = guard
            .authorize(&mandate, &obligation("tva"), amount(dec!(800)), at(2025, 3, 10))
            .unwrap();
        let request_id = decision.validation_request_id.unwrap();

        let resolved = guard
            .resolve_validation(&request_id, false, at(2025, 3, 11))
            .unwrap();
        assert_eq!(resolved.outcome, DecisionOutcome::Denied);
        assert_eq!(resolved.reason, DecisionReason::ClientValidationDeclined);
        assert_eq!(
            guard.month_to_date("DLG-TEST0001", "2025-03").unwrap(),
            Amount::ZERO
        );

        // Second answer bounces
        assert!(matches!(
            guard.resolve_validation(&request_id, true, at(2025, 3, 11)),
            Err(GuardError::AlreadyResolved(_))
        ));
    }

    #[test]
    fn test_late_answer_expires_instead() {
        let mut guard = PaymentGuard::in_memory().unwrap();
        let mut mandate = delegation(DelegationState::Active);
        mandate.require_client_validation = true;
        mandate.validation_delay_hours = 24;

        let decision = guard
            .authorize(&mandate, &obligation("tva"), amount(dec!(800)), at(2025, 3, 10))
            .unwrap();
        let request_id = decision.validation_request_id.unwrap();

        // The client says yes two days later; too late
        let resolved = guard
            .resolve_validation(&request_id, true, at(2025, 3, 12))
            .unwrap();
        assert_eq!(resolved.outcome, DecisionOutcome::Denied);
        assert_eq!(resolved.reason, DecisionReason::ClientValidationExpired);
        assert_eq!(
            guard.month_to_date("DLG-TEST0001", "2025-03").unwrap(),
            Amount::ZERO
        );
    }

    #[test]
    fn test_expiry_sweep_is_idempotent() {
        let mut guard = PaymentGuard::in_memory().unwrap();
        let mut mandate = delegation(DelegationState::Active);
        mandate.require_client_validation = true;
        mandate.validation_delay_hours = 24;

        guard
            .authorize(&mandate, &obligation("tva"), amount(dec!(300)), at(2025, 3, 10))
            .unwrap();
        guard
            .authorize(&mandate, &obligation("urssaf"), amount(dec!(400)), at(2025, 3, 10))
            .unwrap();

        // Not yet due
        assert!(guard.expire_validations(at(2025, 3, 10)).unwrap().is_empty());

        let expired = guard.expire_validations(at(2025, 3, 20)).unwrap();
        assert_eq!(expired.len(), 2);
        assert!(expired
            .iter()
            .all(|d| d.reason == DecisionReason::ClientValidationExpired));
        assert_eq!(
            guard.month_to_date("DLG-TEST0001", "2025-03").unwrap(),
            Amount::ZERO
        );

        // Nothing left for a second pass
        assert!(guard.expire_validations(at(2025, 3, 21)).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_request_id() {
        let mut guard = PaymentGuard::in_memory().unwrap();
        assert!(matches!(
            guard.resolve_validation("VAL-missing", true, Utc::now()),
            Err(GuardError::NotFound(_))
        ));
    }

    #[test]
    fn test_every_decision_is_logged() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut guard = PaymentGuard::new(
            dir.path().join("guard.db"),
            dir.path().join("decisions.jsonl"),
            &GuardConfig::default(),
        )
        .unwrap();

        guard
            .authorize(
                &delegation(DelegationState::Active),
                &obligation("tva"),
                amount(dec!(800)),
                at(2025, 3, 10),
            )
            .unwrap();
        guard
            .authorize(
                &delegation(DelegationState::Revoked),
                &obligation("tva"),
                amount(dec!(100)),
                at(2025, 3, 11),
            )
            .unwrap();

        let logged = guard.log().read_all().unwrap();
        assert_eq!(logged.len(), 2);
        assert_eq!(logged[0].outcome, DecisionOutcome::Allowed);
        assert_eq!(logged[1].outcome, DecisionOutcome::Denied);
    }
}
