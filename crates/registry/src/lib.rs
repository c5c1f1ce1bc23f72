//! # Fisca Obligation Registry
//!
//! Source of truth for fiscal obligations and their lifecycle.
//!
//! ## Lifecycle
//! ```text
//! draft / todo ──> in_progress / waiting ──> paid       (terminal)
//!       │                                └─> cancelled  (terminal)
//!       └────────────────────────────────────^
//! ```
//!
//! ## Rules
//! - `total_amount` is derived (`base + penalty`), never stored
//! - Paid obligations are financially frozen (notes stay editable)
//! - Cancellation is a state, never a row deletion
//! - `due_date` changes only through the explicit correction flow

mod obligation;
mod registry;
mod store;

pub use obligation::{
    NewObligation, Obligation, ObligationState, ObligationUpdate, Priority,
};
pub use registry::{ObligationFilter, ObligationRegistry, RegistryError};
pub use store::{ObligationStore, StoreError, StoreFilter};
