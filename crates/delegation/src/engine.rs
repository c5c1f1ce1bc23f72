//! Delegation engine: the dual-signature state machine
//!
//! All mutations go through here; the store never flips state on its
//! own. Every write is version-guarded, so concurrent operators racing
//! on the same delegation resolve to one winner and one retryable
//! conflict.

use crate::delegation::{
    DelegationState, DelegationUpdate, NewDelegation, Party, PaymentDelegation,
};
use crate::store::{DelegationStore, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use fisca_core::TypeCatalog;
use thiserror::Error;

/// Errors from delegation operations
#[derive(Debug, Error)]
pub enum DelegationError {
    // === Validation: the request itself is malformed ===
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Delegated types cannot be empty")]
    EmptyDelegatedTypes,

    #[error("Unknown obligation type: {0}")]
    UnknownType(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0} has already signed")]
    DuplicateSignature(Party),

    // === Conflict: the lifecycle or a concurrent writer forbids it ===
    #[error("Delegation {id} is {state}: cannot {action}")]
    StateConflict {
        id: String,
        state: DelegationState,
        action: &'static str,
    },

    #[error("Delegation {0} was modified concurrently, retry")]
    StaleVersion(String),

    // === Lookup and storage ===
    #[error("Delegation not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Store(#[source] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for DelegationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => DelegationError::NotFound(id),
            StoreError::VersionConflict(id) => DelegationError::StaleVersion(id),
            other => DelegationError::Store(other),
        }
    }
}

/// State machine over the delegation store
pub struct DelegationEngine {
    store: DelegationStore,
    catalog: TypeCatalog,
}

impl DelegationEngine {
    pub fn new(store: DelegationStore, catalog: TypeCatalog) -> Self {
        Self { store, catalog }
    }

    /// In-memory engine with the builtin type catalog (for testing)
    pub fn in_memory() -> Result<Self, DelegationError> {
        Ok(Self::new(DelegationStore::in_memory()?, TypeCatalog::builtin()))
    }

    /// Create a delegation in `draft`
    pub fn create(
        &self,
        new: NewDelegation,
        now: DateTime<Utc>,
    ) -> Result<PaymentDelegation, DelegationError> {
        if new.client_id.trim().is_empty() {
            return Err(DelegationError::MissingField("client_id"));
        }
        let start_date = new
            .start_date
            .ok_or(DelegationError::MissingField("start_date"))?;

        let delegated_types = self.normalize_types(&new.delegated_types)?;
        validate_window(start_date, new.end_date)?;
        validate_validation_policy(new.require_client_validation, new.validation_delay_hours)?;

        let delegation = new.into_delegation(start_date, delegated_types, now);
        self.store.insert(&delegation)?;

        tracing::info!(
            id = %delegation.id,
            client = %delegation.client_id,
            "Delegation drafted"
        );

        Ok(delegation)
    }

    pub fn get(&self, id: &str) -> Result<PaymentDelegation, DelegationError> {
        Ok(self.store.get(id)?)
    }

    /// All delegations, optionally restricted to one client
    pub fn list(&self, client_id: Option<&str>) -> Result<Vec<PaymentDelegation>, DelegationError> {
        match client_id {
            Some(client) => Ok(self.store.list_by_client(client)?),
            None => Ok(self.store.list_all()?),
        }
    }

    /// Submit a draft for signature. Freezes the economic terms by
    /// fixing `terms_hash`.
    pub fn submit(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentDelegation, DelegationError> {
        let mut delegation = self.store.get(id)?;

        match delegation.state {
            DelegationState::Draft => {}
            state if state.is_terminal() => {
                return Err(self.conflict(id, state, "submit"));
            }
            _ => {
                return Err(DelegationError::InvalidRequest(
                    "already submitted".into(),
                ));
            }
        }

        let expected = delegation.version;
        delegation.terms_hash = Some(delegation.compute_terms_hash()?);
        delegation.state = DelegationState::Pending;
        self.commit(&mut delegation, expected, now)?;

        tracing::info!(id = %id, "Delegation submitted for signature");

        Ok(delegation)
    }

    /// Record one party's signature. When both are present the
    /// delegation activates, provided today is inside the window; with
    /// the window already over it expires instead, and before the
    /// window it stays pending until a refresh.
    pub fn sign(
        &self,
        id: &str,
        party: Party,
        now: DateTime<Utc>,
    ) -> Result<PaymentDelegation, DelegationError> {
        let mut delegation = self.store.get(id)?;

        match delegation.state {
            DelegationState::Draft => {
                return Err(DelegationError::InvalidRequest(
                    "not submitted for signature".into(),
                ));
            }
            state if state.is_terminal() => {
                return Err(self.conflict(id, state, "sign"));
            }
            _ => {}
        }

        if delegation.signature_of(party).is_some() {
            return Err(DelegationError::DuplicateSignature(party));
        }

        let expected = delegation.version;
        delegation.record_signature(party, now);
        refresh_state(&mut delegation, now.date_naive());
        self.commit(&mut delegation, expected, now)?;

        tracing::info!(
            id = %id,
            party = %party,
            state = %delegation.state,
            "Delegation signed"
        );

        Ok(delegation)
    }

    /// Pause an active delegation. Idempotent from `suspended`.
    pub fn suspend(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentDelegation, DelegationError> {
        let mut delegation = self.store.get(id)?;

        match delegation.state {
            DelegationState::Active => {}
            DelegationState::Suspended => return Ok(delegation),
            state if state.is_terminal() => {
                return Err(self.conflict(id, state, "suspend"));
            }
            _ => {
                return Err(DelegationError::InvalidRequest("not active".into()));
            }
        }

        let expected = delegation.version;
        delegation.state = DelegationState::Suspended;
        self.commit(&mut delegation, expected, now)?;

        tracing::warn!(id = %id, "Delegation suspended");

        Ok(delegation)
    }

    /// Resume a suspended delegation, if its window is still open.
    /// Idempotent from `active`.
    pub fn reactivate(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentDelegation, DelegationError> {
        let mut delegation = self.store.get(id)?;
        let today = now.date_naive();

        // A suspension that outlived the window expires here
        if refresh_state(&mut delegation, today) {
            let expected = delegation.version;
            self.commit(&mut delegation, expected, now)?;
        }

        match delegation.state {
            DelegationState::Suspended => {}
            DelegationState::Active => return Ok(delegation),
            state if state.is_terminal() => {
                return Err(self.conflict(id, state, "reactivate"));
            }
            _ => {
                return Err(DelegationError::InvalidRequest("not suspended".into()));
            }
        }

        let expected = delegation.version;
        delegation.state = DelegationState::Active;
        self.commit(&mut delegation, expected, now)?;

        tracing::info!(id = %id, "Delegation reactivated");

        Ok(delegation)
    }

    /// Kill a delegation for good. Works from any non-terminal state.
    pub fn revoke(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentDelegation, DelegationError> {
        let mut delegation = self.store.get(id)?;

        if delegation.state.is_terminal() {
            return Err(self.conflict(id, delegation.state, "revoke"));
        }

        let expected = delegation.version;
        delegation.state = DelegationState::Revoked;
        self.commit(&mut delegation, expected, now)?;

        tracing::warn!(id = %id, "Delegation revoked");

        Ok(delegation)
    }

    /// Bring one delegation's state up to date with the calendar:
    /// lazy activation and lazy expiry. Idempotent.
    pub fn refresh(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentDelegation, DelegationError> {
        let mut delegation = self.store.get(id)?;

        if refresh_state(&mut delegation, now.date_naive()) {
            let expected = delegation.version;
            self.commit(&mut delegation, expected, now)?;
            tracing::info!(id = %id, state = %delegation.state, "Delegation refreshed");
        }

        Ok(delegation)
    }

    /// Walk every live delegation and apply calendar transitions.
    /// Returns how many rows changed. Safe to run concurrently: a
    /// delegation claimed by another writer is skipped and picked up
    /// by the next sweep.
    pub fn expire_sweep(&self, now: DateTime<Utc>) -> Result<usize, DelegationError> {
        let today = now.date_naive();
        let mut changed = 0;

        for state in [
            DelegationState::Pending,
            DelegationState::Active,
            DelegationState::Suspended,
        ] {
            for mut delegation in self.store.list_by_state(state)? {
                if !refresh_state(&mut delegation, today) {
                    continue;
                }

                let expected = delegation.version;
                match self.commit(&mut delegation, expected, now) {
                    Ok(()) => changed += 1,
                    Err(DelegationError::StaleVersion(_)) => continue,
                    Err(other) => return Err(other),
                }
            }
        }

        if changed > 0 {
            tracing::info!(changed, "Delegation sweep applied calendar transitions");
        }

        Ok(changed)
    }

    /// Edit a delegation. Drafts are fully editable (and re-validated);
    /// once submitted only notes may change, since the signed terms are
    /// frozen.
    pub fn update(
        &self,
        id: &str,
        update: DelegationUpdate,
        now: DateTime<Utc>,
    ) -> Result<PaymentDelegation, DelegationError> {
        let mut delegation = self.store.get(id)?;

        match delegation.state {
            state if state.is_terminal() => {
                return Err(self.conflict(id, state, "update"));
            }
            DelegationState::Draft => {}
            _ if !update.is_notes_only() => {
                return Err(DelegationError::InvalidRequest(
                    "signed terms are frozen, only notes may change".into(),
                ));
            }
            _ => {}
        }

        let expected = delegation.version;

        if delegation.state == DelegationState::Draft {
            if let Some(types) = &update.delegated_types {
                delegation.delegated_types = self.normalize_types(types)?;
            }
            if let Some(start) = update.start_date {
                delegation.start_date = start;
            }
            if let Some(end) = update.end_date {
                delegation.end_date = Some(end);
            }
            if let Some(limit) = update.max_amount_per_payment {
                delegation.max_amount_per_payment = limit;
            }
            if let Some(limit) = update.max_amount_per_month {
                delegation.max_amount_per_month = limit;
            }
            if let Some(method) = update.payment_method {
                delegation.payment_method = Some(method);
            }
            if let Some(required) = update.require_client_validation {
                delegation.require_client_validation = required;
            }
            if let Some(hours) = update.validation_delay_hours {
                delegation.validation_delay_hours = hours;
            }

            validate_window(delegation.start_date, delegation.end_date)?;
            validate_validation_policy(
                delegation.require_client_validation,
                delegation.validation_delay_hours,
            )?;
        }

        if let Some(notes) = update.notes {
            delegation.notes = Some(notes);
        }

        self.commit(&mut delegation, expected, now)?;

        Ok(delegation)
    }

    fn normalize_types(&self, types: &[String]) -> Result<Vec<String>, DelegationError> {
        let mut normalized: Vec<String> = types
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        normalized.sort();
        normalized.dedup();

        if normalized.is_empty() {
            return Err(DelegationError::EmptyDelegatedTypes);
        }
        for code in &normalized {
            if !self.catalog.contains(code) {
                return Err(DelegationError::UnknownType(code.clone()));
            }
        }

        Ok(normalized)
    }

    fn commit(
        &self,
        delegation: &mut PaymentDelegation,
        expected_version: u64,
        now: DateTime<Utc>,
    ) -> Result<(), DelegationError> {
        delegation.version = expected_version + 1;
        delegation.updated_at = now;
        self.store.update(delegation, expected_version)?;
        Ok(())
    }

    fn conflict(&self, id: &str, state: DelegationState, action: &'static str) -> DelegationError {
        DelegationError::StateConflict {
            id: id.to_string(),
            state,
            action,
        }
    }
}

/// Calendar-driven transitions, applied in place. Returns whether the
/// state moved.
///
/// - `pending`, fully signed: expires when the window is already over,
///   activates when the window is open, waits otherwise.
/// - `active`/`suspended`: expires once the window closes.
fn refresh_state(delegation: &mut PaymentDelegation, today: NaiveDate) -> bool {
    let next = match delegation.state {
        DelegationState::Pending if delegation.is_fully_signed() => {
            if delegation.window_closed(today) {
                Some(DelegationState::Expired)
            } else if delegation.window_contains(today) {
                Some(DelegationState::Active)
            } else {
                None
            }
        }
        DelegationState::Active | DelegationState::Suspended
            if delegation.window_closed(today) =>
        {
            Some(DelegationState::Expired)
        }
        _ => None,
    };

    match next {
        Some(state) => {
            delegation.state = state;
            true
        }
        None => false,
    }
}

fn validate_window(
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
) -> Result<(), DelegationError> {
    if let Some(end) = end_date {
        if end < start_date {
            return Err(DelegationError::InvalidRequest(format!(
                "end_date {} precedes start_date {}",
                end, start_date
            )));
        }
    }
    Ok(())
}

fn validate_validation_policy(required: bool, delay_hours: i64) -> Result<(), DelegationError> {
    if required && delay_hours <= 0 {
        return Err(DelegationError::InvalidRequest(
            "validation_delay_hours must be positive".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limit::SpendingLimit;
    use chrono::TimeZone;
    use fisca_core::Amount;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn new_delegation(client: &str) -> NewDelegation {
        NewDelegation {
            client_id: client.into(),
            delegated_types: vec!["tva".into(), "urssaf".into()],
            start_date: Some(date(2025, 1, 1)),
            end_date: Some(date(2025, 12, 31)),
            max_amount_per_payment: SpendingLimit::Capped(Amount::new(dec!(5000)).unwrap()),
            ..Default::default()
        }
    }

    fn engine() -> DelegationEngine {
        DelegationEngine::in_memory().unwrap()
    }

    /// Draft, submit, both signatures; returns the active delegation
    fn activated(engine: &DelegationEngine) -> PaymentDelegation {
        let d = engine.create(new_delegation("CL-001"), at(2025, 1, 10)).unwrap();
        engine.submit(&d.id, at(2025, 1, 10)).unwrap();
        engine.sign(&d.id, Party::Client, at(2025, 1, 11)).unwrap();
        engine.sign(&d.id, Party::Accountant, at(2025, 1, 12)).unwrap()
    }

    #[test]
    fn test_create_normalizes_types() {
        let engine = engine();
        let mut new = new_delegation("CL-001");
        new.delegated_types = vec![" TVA ".into(), "urssaf".into(), "tva".into()];

        let created = engine.create(new, at(2025, 1, 10)).unwrap();

        assert_eq!(created.delegated_types, vec!["tva", "urssaf"]);
        assert_eq!(created.state, DelegationState::Draft);
    }

    #[test]
    fn test_create_validations() {
        let engine = engine();

        let mut blank_client = new_delegation("  ");
        blank_client.client_id = "  ".into();
        assert!(matches!(
            engine.create(blank_client, at(2025, 1, 10)),
            Err(DelegationError::MissingField("client_id"))
        ));

        let mut no_start = new_delegation("CL-001");
        no_start.start_date = None;
        assert!(matches!(
            engine.create(no_start, at(2025, 1, 10)),
            Err(DelegationError::MissingField("start_date"))
        ));

        let mut no_types = new_delegation("CL-001");
        no_types.delegated_types = vec!["  ".into()];
        assert!(matches!(
            engine.create(no_types, at(2025, 1, 10)),
            Err(DelegationError::EmptyDelegatedTypes)
        ));

        let mut bad_type = new_delegation("CL-001");
        bad_type.delegated_types = vec!["octroi".into()];
        assert!(matches!(
            engine.create(bad_type, at(2025, 1, 10)),
            Err(DelegationError::UnknownType(_))
        ));

        let mut inverted = new_delegation("CL-001");
        inverted.end_date = Some(date(2024, 1, 1));
        assert!(matches!(
            engine.create(inverted, at(2025, 1, 10)),
            Err(DelegationError::InvalidRequest(_))
        ));

        let mut bad_delay = new_delegation("CL-001");
        bad_delay.require_client_validation = true;
        bad_delay.validation_delay_hours = 0;
        assert!(matches!(
            engine.create(bad_delay, at(2025, 1, 10)),
            Err(DelegationError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_submit_freezes_terms() {
        let engine = engine();
        let d = engine.create(new_delegation("CL-001"), at(2025, 1, 10)).unwrap();

        let submitted = engine.submit(&d.id, at(2025, 1, 10)).unwrap();
        assert_eq!(submitted.state, DelegationState::Pending);
        let hash = submitted.terms_hash.clone().unwrap();
        assert_eq!(hash.len(), 64);

        // Economic edits are refused from pending on
        let result = engine.update(
            &d.id,
            DelegationUpdate {
                max_amount_per_payment: Some(SpendingLimit::Unlimited),
                ..Default::default()
            },
            at(2025, 1, 11),
        );
        assert!(matches!(result, Err(DelegationError::InvalidRequest(_))));

        // Notes are not part of the signed terms
        let noted = engine
            .update(
                &d.id,
                DelegationUpdate {
                    notes: Some("client prefers monthly recap".into()),
                    ..Default::default()
                },
                at(2025, 1, 11),
            )
            .unwrap();
        assert_eq!(noted.terms_hash.as_deref(), Some(hash.as_str()));
    }

    #[test]
    fn test_submit_twice_rejected() {
        let engine = engine();
        let d = engine.create(new_delegation("CL-001"), at(2025, 1, 10)).unwrap();
        engine.submit(&d.id, at(2025, 1, 10)).unwrap();

        let result = engine.submit(&d.id, at(2025, 1, 11));
        assert!(matches!(result, Err(DelegationError::InvalidRequest(_))));
    }

    #[test]
    fn test_sign_draft_rejected() {
        let engine = engine();
        let d = engine.create(new_delegation("CL-001"), at(2025, 1, 10)).unwrap();

        let result = engine.sign(&d.id, Party::Client, at(2025, 1, 10));
        assert!(matches!(result, Err(DelegationError::InvalidRequest(_))));
    }

    #[test]
    fn test_one_signature_stays_pending() {
        let engine = engine();
        let d = engine.create(new_delegation("CL-001"), at(2025, 1, 10)).unwrap();
        engine.submit(&d.id, at(2025, 1, 10)).unwrap();

        let signed = engine.sign(&d.id, Party::Client, at(2025, 1, 11)).unwrap();
        assert_eq!(signed.state, DelegationState::Pending);
        assert!(signed.signed_by_client.is_some());
    }

    #[test]
    fn test_both_signatures_activate() {
        let engine = engine();
        let delegation = activated(&engine);

        assert_eq!(delegation.state, DelegationState::Active);
        assert!(delegation.is_fully_signed());
    }

    #[test]
    fn test_duplicate_signature_rejected() {
        let engine = engine();
        let d = engine.create(new_delegation("CL-001"), at(2025, 1, 10)).unwrap();
        engine.submit(&d.id, at(2025, 1, 10)).unwrap();
        engine.sign(&d.id, Party::Client, at(2025, 1, 11)).unwrap();

        let result = engine.sign(&d.id, Party::Client, at(2025, 1, 12));
        assert!(matches!(
            result,
            Err(DelegationError::DuplicateSignature(Party::Client))
        ));
    }

    #[test]
    fn test_signed_before_window_activates_lazily() {
        let engine = engine();
        let mut new = new_delegation("CL-001");
        new.start_date = Some(date(2025, 3, 1));

        let d = engine.create(new, at(2025, 1, 10)).unwrap();
        engine.submit(&d.id, at(2025, 1, 10)).unwrap();
        engine.sign(&d.id, Party::Client, at(2025, 1, 11)).unwrap();
        let signed = engine.sign(&d.id, Party::Accountant, at(2025, 1, 12)).unwrap();

        // Fully signed but the window has not opened yet
        assert_eq!(signed.state, DelegationState::Pending);

        let before = engine.refresh(&d.id, at(2025, 2, 1)).unwrap();
        assert_eq!(before.state, DelegationState::Pending);

        let after = engine.refresh(&d.id, at(2025, 3, 1)).unwrap();
        assert_eq!(after.state, DelegationState::Active);
    }

    #[test]
    fn test_signed_after_window_expires() {
        let engine = engine();
        let d = engine.create(new_delegation("CL-001"), at(2025, 1, 10)).unwrap();
        engine.submit(&d.id, at(2025, 1, 10)).unwrap();
        engine.sign(&d.id, Party::Client, at(2025, 1, 11)).unwrap();

        // Second signature arrives in 2026, after end_date
        let signed = engine
            .sign(&d.id, Party::Accountant, at(2026, 2, 1))
            .unwrap();
        assert_eq!(signed.state, DelegationState::Expired);
    }

    #[test]
    fn test_suspend_and_reactivate() {
        let engine = engine();
        let delegation = activated(&engine);

        let suspended = engine.suspend(&delegation.id, at(2025, 2, 1)).unwrap();
        assert_eq!(suspended.state, DelegationState::Suspended);

        // Idempotent
        let again = engine.suspend(&delegation.id, at(2025, 2, 2)).unwrap();
        assert_eq!(again.state, DelegationState::Suspended);

        let reactivated = engine.reactivate(&delegation.id, at(2025, 3, 1)).unwrap();
        assert_eq!(reactivated.state, DelegationState::Active);
    }

    #[test]
    fn test_suspend_pending_rejected() {
        let engine = engine();
        let d = engine.create(new_delegation("CL-001"), at(2025, 1, 10)).unwrap();
        engine.submit(&d.id, at(2025, 1, 10)).unwrap();

        let result = engine.suspend(&d.id, at(2025, 1, 11));
        assert!(matches!(result, Err(DelegationError::InvalidRequest(_))));
    }

    #[test]
    fn test_reactivate_past_window_expires() {
        let engine = engine();
        let delegation = activated(&engine);
        engine.suspend(&delegation.id, at(2025, 2, 1)).unwrap();

        // Window ends 2025-12-31; reactivation attempt in 2026
        let result = engine.reactivate(&delegation.id, at(2026, 1, 15));
        assert!(matches!(
            result,
            Err(DelegationError::StateConflict {
                state: DelegationState::Expired,
                ..
            })
        ));

        let loaded = engine.get(&delegation.id).unwrap();
        assert_eq!(loaded.state, DelegationState::Expired);
    }

    #[test]
    fn test_revoke_is_terminal() {
        let engine = engine();
        let delegation = activated(&engine);

        let revoked = engine.revoke(&delegation.id, at(2025, 2, 1)).unwrap();
        assert_eq!(revoked.state, DelegationState::Revoked);

        // Every later transition fails with a conflict
        assert!(matches!(
            engine.revoke(&delegation.id, at(2025, 2, 2)),
            Err(DelegationError::StateConflict { .. })
        ));
        assert!(matches!(
            engine.sign(&delegation.id, Party::Client, at(2025, 2, 2)),
            Err(DelegationError::StateConflict { .. })
        ));
        assert!(matches!(
            engine.suspend(&delegation.id, at(2025, 2, 2)),
            Err(DelegationError::StateConflict { .. })
        ));
        assert!(matches!(
            engine.update(
                &delegation.id,
                DelegationUpdate {
                    notes: Some("too late".into()),
                    ..Default::default()
                },
                at(2025, 2, 2)
            ),
            Err(DelegationError::StateConflict { .. })
        ));
    }

    #[test]
    fn test_revoke_draft_allowed() {
        let engine = engine();
        let d = engine.create(new_delegation("CL-001"), at(2025, 1, 10)).unwrap();

        let revoked = engine.revoke(&d.id, at(2025, 1, 11)).unwrap();
        assert_eq!(revoked.state, DelegationState::Revoked);
    }

    #[test]
    fn test_expire_sweep_is_idempotent() {
        let engine = engine();

        // One active (expires), one suspended (expires), one open-ended
        let a = activated(&engine);
        let b = activated(&engine);
        engine.suspend(&b.id, at(2025, 2, 1)).unwrap();
        let mut open_ended = new_delegation("CL-002");
        open_ended.end_date = None;
        let c = engine.create(open_ended, at(2025, 1, 10)).unwrap();
        engine.submit(&c.id, at(2025, 1, 10)).unwrap();
        engine.sign(&c.id, Party::Client, at(2025, 1, 11)).unwrap();
        engine.sign(&c.id, Party::Accountant, at(2025, 1, 12)).unwrap();

        let changed = engine.expire_sweep(at(2026, 1, 5)).unwrap();
        assert_eq!(changed, 2);

        assert_eq!(engine.get(&a.id).unwrap().state, DelegationState::Expired);
        assert_eq!(engine.get(&b.id).unwrap().state, DelegationState::Expired);
        assert_eq!(engine.get(&c.id).unwrap().state, DelegationState::Active);

        // Second pass finds nothing to do
        assert_eq!(engine.expire_sweep(at(2026, 1, 6)).unwrap(), 0);
    }

    #[test]
    fn test_sweep_activates_signed_pending() {
        let engine = engine();
        let mut new = new_delegation("CL-001");
        new.start_date = Some(date(2025, 3, 1));
        let d = engine.create(new, at(2025, 1, 10)).unwrap();
        engine.submit(&d.id, at(2025, 1, 10)).unwrap();
        engine.sign(&d.id, Party::Client, at(2025, 1, 11)).unwrap();
        engine.sign(&d.id, Party::Accountant, at(2025, 1, 12)).unwrap();

        let changed = engine.expire_sweep(at(2025, 3, 2)).unwrap();
        assert_eq!(changed, 1);
        assert_eq!(engine.get(&d.id).unwrap().state, DelegationState::Active);
    }

    #[test]
    fn test_update_draft_revalidates() {
        let engine = engine();
        let d = engine.create(new_delegation("CL-001"), at(2025, 1, 10)).unwrap();

        let updated = engine
            .update(
                &d.id,
                DelegationUpdate {
                    delegated_types: Some(vec!["is".into()]),
                    max_amount_per_month: Some(SpendingLimit::Capped(
                        Amount::new(dec!(10000)).unwrap(),
                    )),
                    ..Default::default()
                },
                at(2025, 1, 11),
            )
            .unwrap();
        assert_eq!(updated.delegated_types, vec!["is"]);
        assert_eq!(updated.version, 2);

        let result = engine.update(
            &d.id,
            DelegationUpdate {
                delegated_types: Some(vec!["octroi".into()]),
                ..Default::default()
            },
            at(2025, 1, 12),
        );
        assert!(matches!(result, Err(DelegationError::UnknownType(_))));
    }

    #[test]
    fn test_versions_bump_on_every_transition() {
        let engine = engine();
        let d = engine.create(new_delegation("CL-001"), at(2025, 1, 10)).unwrap();
        assert_eq!(d.version, 1);

        let submitted = engine.submit(&d.id, at(2025, 1, 10)).unwrap();
        assert_eq!(submitted.version, 2);

        let signed = engine.sign(&d.id, Party::Client, at(2025, 1, 11)).unwrap();
        assert_eq!(signed.version, 3);
    }

    #[test]
    fn test_unknown_id() {
        let engine = engine();
        assert!(matches!(
            engine.submit("DLG-MISSING1", at(2025, 1, 10)),
            Err(DelegationError::NotFound(_))
        ));
    }
}
