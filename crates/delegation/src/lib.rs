//! # Fisca Payment Delegations
//!
//! Mandates authorizing the firm to pay fiscal obligations on a
//! client's behalf.
//!
//! ## Lifecycle
//! ```text
//! draft ──submit──> pending ──both signatures + window──> active <──> suspended
//!   │                  │                                    │            │
//!   └──────────────────┴──────────── revoke ────────────────┴────────────┘──> revoked
//!                                                  active/suspended past end ──> expired
//! ```
//!
//! ## Rules
//! - Activation needs BOTH signatures and today inside the window
//! - Terms are hashed at submit; signed terms never change afterwards
//! - Revoked and expired are terminal
//! - Writes are version-guarded; stale writers get a retryable conflict

mod delegation;
mod engine;
mod limit;
mod store;

pub use delegation::{
    DelegationState, DelegationUpdate, NewDelegation, Party, PaymentDelegation, SignatureRecord,
};
pub use engine::{DelegationEngine, DelegationError};
pub use limit::{LimitError, SpendingLimit};
pub use store::{DelegationStore, StoreError};
