//! Reconciliation of Registry agent records with a supplemental source.
//!
//! The Registry is authoritative. Supplemental records are matched by id or
//! alias, attached as on-chain metadata, and field-level disagreements are
//! recorded as [`ReconciliationConflict`]s resolved by a static
//! [`ResolutionPolicy`]. An unreachable source never fails a pass.

pub mod engine;
pub mod error;
pub mod policy;
pub mod record;
pub mod source;

pub use engine::{ReconcileConfig, ReconciliationEngine, ReconciliationResult};
pub use error::SourceError;
pub use policy::ResolutionPolicy;
pub use record::{ContestableField, ReconciliationConflict, Resolution, SupplementalRecord};
pub use source::{StaticSource, SupplementalSource};
