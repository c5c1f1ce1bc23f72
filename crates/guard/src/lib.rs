//! Payment execution guard for fisca
//!
//! Before the firm pays an obligation under a delegation, the guard
//! renders an authorization decision. Five checks run in order and the
//! first failure is the verdict:
//!
//! 1. delegation is active
//! 2. obligation type is covered
//! 3. per-payment limit
//! 4. monthly budget
//! 5. client validation, when required
//!
//! The monthly budget is enforced by reservation, not inspection: a
//! passing check writes its hold inside the same SQLite transaction, so
//! concurrent payments serialize on the cap. Decisions that cannot be
//! computed are denials (the guard fails closed), and every decision,
//! including denials, is appended to a JSONL audit log.
//!
//! The guard renders decisions; executing the payment is someone else's
//! job.

pub mod config;
pub mod decision;
pub mod guard;
pub mod log;
pub mod store;
pub mod validation;

pub use config::GuardConfig;
pub use decision::{AuthorizationDecision, DecisionOutcome, DecisionReason};
pub use guard::{GuardError, PaymentGuard};
pub use log::{DecisionLog, LogError};
pub use store::{month_key, GuardStore, Reservation, ReservationOutcome, StoreError};
pub use validation::{ValidationRequest, ValidationStatus};
