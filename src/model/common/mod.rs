mod candidate;
mod election;
mod vote;

pub use candidate::CandidateType;
pub use election::ElectionType;
pub use vote::Polarity;

use crate::model::mongodb::Id;

/// Elections are identified by UUID.
pub type ElectionId = Id;
/// Candidates are identified by UUID.
pub type CandidateId = Id;
/// People (creators, voters) are identified by UUID, resolved upstream.
pub type PersonId = Id;
