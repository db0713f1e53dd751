use serde::{Deserialize, Serialize};

use crate::model::common::{CandidateId, ElectionId, ElectionType, Polarity};
use crate::model::db::{Candidate, Election};
use crate::model::mongodb::Id;

/// A snapshot of an election's tally.
///
/// Stored with the election ID as its primary key, so recomputing the tally
/// replaces the previous snapshot instead of adding another.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ElectionResults {
    /// Fresh for every computation.
    #[serde(rename = "result_id")]
    pub id: Id,
    #[serde(rename = "_id")]
    pub election_id: ElectionId,
    pub title: String,
    #[serde(rename = "type")]
    pub election_type: ElectionType,
    /// Whether the election had ended when the snapshot was taken.
    pub has_ended: bool,
    /// One entry per candidate, in candidate order.
    pub results: Vec<CandidateElectionResult>,
}

impl ElectionResults {
    /// Build a snapshot of `election` from already-counted candidate results.
    pub fn new(election: &Election, results: Vec<CandidateElectionResult>) -> Self {
        Self {
            id: Id::new(),
            election_id: election.id,
            title: election.title.clone(),
            election_type: election.election_type,
            has_ended: election.has_ended,
            results,
        }
    }

    /// Do two snapshots hold the same tally? Ignores the result ID.
    pub fn same_tally(&self, other: &Self) -> bool {
        self.election_id == other.election_id
            && self.has_ended == other.has_ended
            && self.results == other.results
    }
}

/// Vote counts for a single candidate.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct CandidateElectionResult {
    pub candidate_id: CandidateId,
    pub candidate_name: String,
    pub positive_votes_count: u64,
    pub negative_votes_count: u64,
}

impl CandidateElectionResult {
    /// An entry with both counts still at zero.
    pub fn empty(candidate: &Candidate) -> Self {
        Self {
            candidate_id: candidate.id,
            candidate_name: candidate.name.clone(),
            positive_votes_count: 0,
            negative_votes_count: 0,
        }
    }

    /// Set the count for one polarity, leaving the other untouched.
    pub fn set_count(&mut self, polarity: Polarity, count: u64) {
        match polarity {
            Polarity::Positive => self.positive_votes_count = count,
            Polarity::Negative => self.negative_votes_count = count,
        }
    }
}
