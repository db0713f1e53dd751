//! Election lifecycle logic: access control, tallying and reconciliation.

pub mod access;
pub mod aggregator;
pub mod reconciler;

pub use access::{authorize, Requester};
pub use aggregator::{Aggregator, Tally, TallyPolicy};
pub use reconciler::{PassReport, Reconciler};
