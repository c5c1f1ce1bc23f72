//! Registry engine: validation and lifecycle rules over the store

use crate::obligation::{NewObligation, Obligation, ObligationState, ObligationUpdate};
use crate::store::{ObligationStore, StoreError, StoreFilter};
use chrono::{DateTime, NaiveDate, Utc};
use fisca_alerts::{AlertLevel, AlertsSummary};
use fisca_core::{Periodicity, TypeCatalog};
use thiserror::Error;

/// Errors from registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    // === Validation: the request itself is malformed ===
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unknown obligation type: {0}")]
    UnknownType(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // === Conflict: the request is well-formed but the lifecycle forbids it ===
    #[error("Obligation {id} is {state}: cannot {action}")]
    StateConflict {
        id: String,
        state: ObligationState,
        action: &'static str,
    },

    // === Lookup and storage ===
    #[error("Obligation not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Store(#[source] StoreError),
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => RegistryError::NotFound(id),
            other => RegistryError::Store(other),
        }
    }
}

/// Listing criteria. Date-dependent filters (overdue, alert level) are
/// evaluated against the caller-supplied `today`.
#[derive(Debug, Clone, Default)]
pub struct ObligationFilter {
    pub client_id: Option<String>,
    pub type_code: Option<String>,
    pub periodicity: Option<Periodicity>,
    pub state: Option<ObligationState>,
    /// Keep only unsettled obligations past their due date
    pub overdue_only: bool,
    /// Keep only obligations at or above this alert level
    pub min_alert: Option<AlertLevel>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Source of truth for fiscal obligations
pub struct ObligationRegistry {
    store: ObligationStore,
    catalog: TypeCatalog,
}

impl ObligationRegistry {
    pub fn new(store: ObligationStore, catalog: TypeCatalog) -> Self {
        Self { store, catalog }
    }

    /// In-memory registry with the builtin type catalog (for testing)
    pub fn in_memory() -> Result<Self, RegistryError> {
        Ok(Self::new(ObligationStore::in_memory()?, TypeCatalog::builtin()))
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    /// Create an obligation after field-level validation
    pub fn create(
        &self,
        new: NewObligation,
        now: DateTime<Utc>,
    ) -> Result<Obligation, RegistryError> {
        if new.type_code.trim().is_empty() {
            return Err(RegistryError::MissingField("type_code"));
        }
        if new.client_id.trim().is_empty() {
            return Err(RegistryError::MissingField("client_id"));
        }
        let due_date = new.due_date.ok_or(RegistryError::MissingField("due_date"))?;

        let type_code = new.type_code.trim().to_lowercase();
        if !self.catalog.contains(&type_code) {
            return Err(RegistryError::UnknownType(type_code));
        }

        match new.state {
            Some(ObligationState::Cancelled) => {
                return Err(RegistryError::InvalidRequest(
                    "cannot create an obligation as cancelled".into(),
                ));
            }
            Some(ObligationState::Paid) => {
                // History imports must carry the actual payment date
                if new.payment_date.is_none() {
                    return Err(RegistryError::MissingField("payment_date"));
                }
            }
            _ => {
                if new.payment_date.is_some() || new.payment_reference.is_some() {
                    return Err(RegistryError::InvalidRequest(
                        "payment fields require the paid state".into(),
                    ));
                }
            }
        }

        let obligation = new.into_obligation(due_date, now);
        self.store.insert(&obligation)?;

        tracing::info!(
            id = %obligation.id,
            client = %obligation.client_id,
            due = %obligation.due_date,
            "Obligation created"
        );

        Ok(obligation)
    }

    pub fn get(&self, id: &str) -> Result<Obligation, RegistryError> {
        Ok(self.store.get(id)?)
    }

    /// Apply a partial update, enforcing lifecycle rules
    pub fn update(
        &self,
        id: &str,
        update: ObligationUpdate,
        now: DateTime<Utc>,
    ) -> Result<Obligation, RegistryError> {
        let mut obligation = self.store.get(id)?;

        match obligation.state {
            ObligationState::Cancelled => {
                return Err(RegistryError::StateConflict {
                    id: id.to_string(),
                    state: obligation.state,
                    action: "update",
                });
            }
            // Paid rows are financially closed; only notes stay editable
            ObligationState::Paid if !update.is_notes_only() => {
                return Err(RegistryError::StateConflict {
                    id: id.to_string(),
                    state: obligation.state,
                    action: "modify anything but notes",
                });
            }
            _ => {}
        }

        match update.state {
            Some(ObligationState::Cancelled) => {
                return Err(RegistryError::InvalidRequest(
                    "use cancel to close an obligation".into(),
                ));
            }
            Some(ObligationState::Paid) if update.payment_date.is_none() => {
                return Err(RegistryError::MissingField("payment_date"));
            }
            _ => {}
        }

        if update.touches_payment_record() && update.state != Some(ObligationState::Paid) {
            return Err(RegistryError::InvalidRequest(
                "payment fields require a transition to paid".into(),
            ));
        }

        let settling = update.state == Some(ObligationState::Paid);

        if let Some(state) = update.state {
            obligation.state = state;
        }
        if let Some(priority) = update.priority {
            obligation.priority = priority;
        }
        if let Some(amount) = update.base_amount {
            obligation.base_amount = amount;
        }
        if let Some(amount) = update.penalty_amount {
            obligation.penalty_amount = amount;
        }
        if let Some(method) = update.payment_method {
            obligation.payment_method = Some(method);
        }
        if let Some(paid_by) = update.paid_by {
            obligation.paid_by = Some(paid_by);
        }
        if let Some(date) = update.payment_date {
            obligation.payment_date = Some(date);
        }
        if let Some(reference) = update.payment_reference {
            obligation.payment_reference = Some(reference);
        }
        if let Some(notes) = update.notes {
            obligation.notes = Some(notes);
        }
        obligation.updated_at = now;

        self.store.update(&obligation)?;

        if settling {
            tracing::info!(
                id = %obligation.id,
                late = obligation.paid_late(),
                "Obligation settled"
            );
        }

        Ok(obligation)
    }

    /// Explicit due-date correction flow. Appends an audit note so the
    /// original date stays visible.
    pub fn correct_due_date(
        &self,
        id: &str,
        new_due_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Obligation, RegistryError> {
        let mut obligation = self.store.get(id)?;

        if obligation.state.is_terminal() {
            return Err(RegistryError::StateConflict {
                id: id.to_string(),
                state: obligation.state,
                action: "correct the due date",
            });
        }

        if obligation.due_date == new_due_date {
            return Ok(obligation);
        }

        let audit_line = format!(
            "due date corrected {} -> {}",
            obligation.due_date, new_due_date
        );
        obligation.due_date = new_due_date;
        obligation.notes = Some(match obligation.notes.take() {
            Some(notes) => format!("{}\n{}", notes, audit_line),
            None => audit_line,
        });
        obligation.updated_at = now;

        self.store.update(&obligation)?;

        tracing::info!(id = %id, due = %new_due_date, "Due date corrected");

        Ok(obligation)
    }

    /// Cancel an obligation. Idempotent: cancelling twice is a no-op.
    pub fn cancel(&self, id: &str, now: DateTime<Utc>) -> Result<Obligation, RegistryError> {
        let mut obligation = self.store.get(id)?;

        match obligation.state {
            ObligationState::Cancelled => return Ok(obligation),
            ObligationState::Paid => {
                return Err(RegistryError::StateConflict {
                    id: id.to_string(),
                    state: obligation.state,
                    action: "cancel",
                });
            }
            _ => {}
        }

        obligation.state = ObligationState::Cancelled;
        obligation.updated_at = now;
        self.store.update(&obligation)?;

        tracing::info!(id = %id, "Obligation cancelled");

        Ok(obligation)
    }

    /// List obligations matching the filter, ordered by (due_date, id)
    pub fn list(
        &self,
        filter: &ObligationFilter,
        today: NaiveDate,
    ) -> Result<Vec<Obligation>, RegistryError> {
        let type_codes = filter
            .periodicity
            .map(|p| self.catalog.codes_with_periodicity(p));

        let store_filter = StoreFilter {
            client_id: filter.client_id.clone(),
            type_code: filter.type_code.as_ref().map(|c| c.trim().to_lowercase()),
            type_codes,
            state: filter.state,
        };

        let mut rows = self.store.list(&store_filter)?;

        if filter.overdue_only {
            rows.retain(|o| o.is_overdue(today));
        }
        if let Some(min) = filter.min_alert {
            rows.retain(|o| o.alert_level(today) >= min);
        }

        Ok(rows
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect())
    }

    /// Aggregate open obligations into overdue / urgent / upcoming buckets
    pub fn alerts_summary(
        &self,
        client_id: Option<&str>,
        today: NaiveDate,
    ) -> Result<AlertsSummary, RegistryError> {
        let store_filter = StoreFilter {
            client_id: client_id.map(str::to_string),
            ..Default::default()
        };

        let mut summary = AlertsSummary::new();
        for obligation in self.store.list(&store_filter)? {
            summary.record(
                obligation.due_date,
                obligation.is_settled(),
                obligation.total_amount(),
                today,
            );
        }

        Ok(summary)
    }

    /// Full history for one client, any state (scoring input)
    pub fn client_obligations(&self, client_id: &str) -> Result<Vec<Obligation>, RegistryError> {
        let filter = StoreFilter {
            client_id: Some(client_id.to_string()),
            ..Default::default()
        };
        Ok(self.store.list(&filter)?)
    }

    /// Every client id with at least one obligation
    pub fn client_ids(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self.store.client_ids()?)
    }
}
