//! SQLite-backed reservation and validation-request storage
//!
//! Monthly spending is tracked as reservations: a row is written in the
//! same transaction that checks the cap, so two concurrent payments can
//! never both squeeze under the limit. Released reservations stay in the
//! table for audit but stop counting.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use fisca_core::Amount;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::config::GuardConfig;
use crate::validation::{ValidationRequest, ValidationStatus};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupted row {id}: bad {field}")]
    Corrupted { id: String, field: &'static str },
}

/// Budget key for a calendar month, `YYYY-MM`
pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// A slice of a delegation's monthly budget, held for one payment
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    /// Keyed by the decision or validation request that created it
    pub ref_id: String,
    pub delegation_id: String,
    pub obligation_id: String,
    pub amount: Amount,
    pub month: String,
    pub created_at: DateTime<Utc>,
}

/// What happened to a reservation attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ReservationOutcome {
    /// The amount is now held against the monthly budget
    Reserved,
    /// The cap would be breached; nothing was written
    CapExceeded { month_to_date: Amount },
}

pub struct GuardStore {
    conn: Connection,
}

impl GuardStore {
    pub fn new<P: AsRef<Path>>(path: P, config: &GuardConfig) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(config.busy_timeout())?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS reservations (
                ref_id        TEXT PRIMARY KEY,
                delegation_id TEXT NOT NULL,
                obligation_id TEXT NOT NULL,
                amount        TEXT NOT NULL,
                month         TEXT NOT NULL,
                status        TEXT NOT NULL,
                created_at    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reservations_month
                ON reservations(delegation_id, month, status);
            CREATE TABLE IF NOT EXISTS validation_requests (
                id            TEXT PRIMARY KEY,
                delegation_id TEXT NOT NULL,
                obligation_id TEXT NOT NULL,
                amount        TEXT NOT NULL,
                requested_at  TEXT NOT NULL,
                deadline      TEXT NOT NULL,
                status        TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_validation_requests_status
                ON validation_requests(status);",
        )?;
        Ok(())
    }

    /// Check the monthly cap and hold the amount in one atomic step.
    ///
    /// Runs as an immediate transaction: the write lock is taken before
    /// the month-to-date sum is read, so a concurrent reservation on the
    /// same delegation serializes behind it. If `validation` is given,
    /// the request row is written in the same transaction.
    pub fn try_reserve(
        &mut self,
        reservation: &Reservation,
        monthly_cap: Option<Amount>,
        validation: Option<&ValidationRequest>,
    ) -> Result<ReservationOutcome, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(cap) = monthly_cap {
            let spent = month_sum(&tx, &reservation.delegation_id, &reservation.month)?;
            let fits = spent
                .checked_add(&reservation.amount)
                .is_some_and(|projected| projected <= cap);
            if !fits {
                return Ok(ReservationOutcome::CapExceeded {
                    month_to_date: spent,
                });
            }
        }

        tx.execute(
            "INSERT INTO reservations
                (ref_id, delegation_id, obligation_id, amount, month, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'held', ?6)",
            params![
                reservation.ref_id,
                reservation.delegation_id,
                reservation.obligation_id,
                reservation.amount.value().to_string(),
                reservation.month,
                reservation.created_at.to_rfc3339(),
            ],
        )?;

        if let Some(request) = validation {
            tx.execute(
                "INSERT INTO validation_requests
                    (id, delegation_id, obligation_id, amount, requested_at, deadline, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    request.id,
                    request.delegation_id,
                    request.obligation_id,
                    request.amount.value().to_string(),
                    request.requested_at.to_rfc3339(),
                    request.deadline.to_rfc3339(),
                    request.status.as_str(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(ReservationOutcome::Reserved)
    }

    /// Return a held amount to the monthly budget. Idempotent.
    pub fn release(&self, ref_id: &str) -> Result<bool, StoreError> {
        let rows = self.conn.execute(
            "UPDATE reservations SET status = 'released'
             WHERE ref_id = ?1 AND status = 'held'",
            params![ref_id],
        )?;
        Ok(rows > 0)
    }

    /// Sum of held reservations for a delegation in a month
    pub fn month_to_date(&self, delegation_id: &str, month: &str) -> Result<Amount, StoreError> {
        month_sum(&self.conn, delegation_id, month)
    }

    pub fn get_validation(&self, id: &str) -> Result<ValidationRequest, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, delegation_id, obligation_id, amount, requested_at, deadline, status
                 FROM validation_requests WHERE id = ?1",
                params![id],
                read_validation_row,
            )
            .optional()?;
        row.map(parse_validation_row)
            .transpose()?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub fn list_validations_by_status(
        &self,
        status: ValidationStatus,
    ) -> Result<Vec<ValidationRequest>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, delegation_id, obligation_id, amount, requested_at, deadline, status
             FROM validation_requests WHERE status = ?1
             ORDER BY deadline, id",
        )?;
        let rows = stmt
            .query_map(params![status.as_str()], read_validation_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(parse_validation_row).collect()
    }

    /// Settle a pending request, releasing the held amount unless the
    /// client approved. Both writes land in one transaction.
    ///
    /// Returns false when the request was no longer pending, in which
    /// case nothing changed.
    pub fn resolve_validation(
        &mut self,
        id: &str,
        to: ValidationStatus,
    ) -> Result<bool, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let rows = tx.execute(
            "UPDATE validation_requests SET status = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![id, to.as_str()],
        )?;
        if rows == 0 {
            return Ok(false);
        }

        if to != ValidationStatus::Approved {
            tx.execute(
                "UPDATE reservations SET status = 'released'
                 WHERE ref_id = ?1 AND status = 'held'",
                params![id],
            )?;
        }

        tx.commit()?;
        Ok(true)
    }
}

fn month_sum(conn: &Connection, delegation_id: &str, month: &str) -> Result<Amount, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT ref_id, amount FROM reservations
         WHERE delegation_id = ?1 AND month = ?2 AND status = 'held'",
    )?;
    let rows = stmt
        .query_map(params![delegation_id, month], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut amounts = Vec::with_capacity(rows.len());
    for (ref_id, raw) in rows {
        amounts.push(parse_amount(&ref_id, "amount", &raw)?);
    }
    Ok(Amount::sum(&amounts))
}

type RawValidationRow = (String, String, String, String, String, String, String);

fn read_validation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawValidationRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn parse_validation_row(raw: RawValidationRow) -> Result<ValidationRequest, StoreError> {
    let (id, delegation_id, obligation_id, amount, requested_at, deadline, status) = raw;
    Ok(ValidationRequest {
        amount: parse_amount(&id, "amount", &amount)?,
        requested_at: parse_timestamp(&id, "requested_at", &requested_at)?,
        deadline: parse_timestamp(&id, "deadline", &deadline)?,
        status: ValidationStatus::from_str(&status).ok_or(StoreError::Corrupted {
            id: id.clone(),
            field: "status",
        })?,
        id,
        delegation_id,
        obligation_id,
    })
}

fn parse_amount(id: &str, field: &'static str, raw: &str) -> Result<Amount, StoreError> {
    let value = Decimal::from_str(raw).map_err(|_| StoreError::Corrupted {
        id: id.to_string(),
        field,
    })?;
    Amount::new(value).map_err(|_| StoreError::Corrupted {
        id: id.to_string(),
        field,
    })
}

fn parse_timestamp(id: &str, field: &'static str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupted {
            id: id.to_string(),
            field,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn amount(value: Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    fn reservation(ref_id: &str, value: Decimal) -> Reservation {
        Reservation {
            ref_id: ref_id.to_string(),
            delegation_id: "DLG-1".to_string(),
            obligation_id: "OBL-1".to_string(),
            amount: amount(value),
            month: "2025-03".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_reserve_and_sum() {
        let mut store = GuardStore::in_memory().unwrap();

        let outcome = store
            .try_reserve(&reservation("DEC-1", dec!(600)), None, None)
            .unwrap();
        assert_eq!(outcome, ReservationOutcome::Reserved);

        assert_eq!(
            store.month_to_date("DLG-1", "2025-03").unwrap(),
            amount(dec!(600))
        );
        assert_eq!(
            store.month_to_date("DLG-1", "2025-04").unwrap(),
            Amount::ZERO
        );
    }

    #[test]
    fn test_cap_blocks_second_reservation() {
        let mut store = GuardStore::in_memory().unwrap();
        let cap = Some(amount(dec!(1000)));

        let first = store
            .try_reserve(&reservation("DEC-1", dec!(600)), cap, None)
            .unwrap();
        assert_eq!(first, ReservationOutcome::Reserved);

        let second = store
            .try_reserve(&reservation("DEC-2", dec!(600)), cap, None)
            .unwrap();
        assert_eq!(
            second,
            ReservationOutcome::CapExceeded {
                month_to_date: amount(dec!(600))
            }
        );

        // Nothing was written for the rejected attempt
        assert_eq!(
            store.month_to_date("DLG-1", "2025-03").unwrap(),
            amount(dec!(600))
        );
    }

    #[test]
    fn test_exact_fit_allowed() {
        let mut store = GuardStore::in_memory().unwrap();
        let cap = Some(amount(dec!(1000)));

        store
            .try_reserve(&reservation("DEC-1", dec!(400)), cap, None)
            .unwrap();
        let outcome = store
            .try_reserve(&reservation("DEC-2", dec!(600)), cap, None)
            .unwrap();
        assert_eq!(outcome, ReservationOutcome::Reserved);
    }

    #[test]
    fn test_release_frees_budget() {
        let mut store = GuardStore::in_memory().unwrap();
        store
            .try_reserve(&reservation("DEC-1", dec!(600)), None, None)
            .unwrap();

        assert!(store.release("DEC-1").unwrap());
        assert_eq!(
            store.month_to_date("DLG-1", "2025-03").unwrap(),
            Amount::ZERO
        );

        // Idempotent
        assert!(!store.release("DEC-1").unwrap());
        assert!(!store.release("DEC-missing").unwrap());
    }

    #[test]
    fn test_reserve_with_validation_request() {
        let mut store = GuardStore::in_memory().unwrap();
        let request =
            ValidationRequest::new("DLG-1", "OBL-1", amount(dec!(500)), Utc::now(), 72);
        let held = reservation(&request.id, dec!(500));

        store.try_reserve(&held, None, Some(&request)).unwrap();

        let fetched = store.get_validation(&request.id).unwrap();
        assert_eq!(fetched, request);

        let pending = store
            .list_validations_by_status(ValidationStatus::Pending)
            .unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_resolve_validation_releases_unless_approved() {
        let mut store = GuardStore::in_memory().unwrap();
        let request =
            ValidationRequest::new("DLG-1", "OBL-1", amount(dec!(500)), Utc::now(), 72);
        store
            .try_reserve(&reservation(&request.id, dec!(500)), None, Some(&request))
            .unwrap();

        assert!(store
            .resolve_validation(&request.id, ValidationStatus::Declined)
            .unwrap());
        assert_eq!(
            store.get_validation(&request.id).unwrap().status,
            ValidationStatus::Declined
        );
        assert_eq!(
            store.month_to_date("DLG-1", "2025-03").unwrap(),
            Amount::ZERO
        );

        // Already settled, both the retry and a competing expiry are no-ops
        assert!(!store
            .resolve_validation(&request.id, ValidationStatus::Expired)
            .unwrap());
    }

    #[test]
    fn test_approval_keeps_reservation_held() {
        let mut store = GuardStore::in_memory().unwrap();
        let request =
            ValidationRequest::new("DLG-1", "OBL-1", amount(dec!(500)), Utc::now(), 72);
        store
            .try_reserve(&reservation(&request.id, dec!(500)), None, Some(&request))
            .unwrap();

        assert!(store
            .resolve_validation(&request.id, ValidationStatus::Approved)
            .unwrap());
        assert_eq!(
            store.month_to_date("DLG-1", "2025-03").unwrap(),
            amount(dec!(500))
        );
    }

    #[test]
    fn test_get_validation_not_found() {
        let store = GuardStore::in_memory().unwrap();
        assert!(matches!(
            store.get_validation("VAL-missing"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_concurrent_reservations_respect_cap() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("guard.db");
        let config = GuardConfig::default();

        // Create the schema before the race
        GuardStore::new(&path, &config).unwrap();

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let path = path.clone();
                let config = config.clone();
                std::thread::spawn(move || {
                    let mut store = GuardStore::new(&path, &config).unwrap();
                    store.try_reserve(
                        &reservation(&format!("DEC-{i}"), dec!(600)),
                        Some(amount(dec!(1000))),
                        None,
                    )
                })
            })
            .collect();

        let outcomes: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();

        let reserved = outcomes
            .iter()
            .filter(|o| **o == ReservationOutcome::Reserved)
            .count();
        assert_eq!(reserved, 1, "exactly one of two racing payments may hold");

        let store = GuardStore::new(&path, &config).unwrap();
        assert_eq!(
            store.month_to_date("DLG-1", "2025-03").unwrap(),
            amount(dec!(600))
        );
    }
}
