//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs are serialised as UUID strings, datetimes in MongoDB's own format.
//! - Soft-deleted records carry `deleted: true` and are invisible to every read.

mod candidate;
pub use candidate::Candidate;

mod contributor;
pub use contributor::Contributor;

mod election;
pub use election::Election;

mod results;
pub use results::{CandidateElectionResult, ElectionResults};

mod vote;
pub use vote::Vote;
