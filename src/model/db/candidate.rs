use chrono::{DateTime, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::model::common::{CandidateId, CandidateType, ElectionId};
use crate::model::mongodb::Id;

/// A candidate standing in exactly one election.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: CandidateId,
    pub election_id: ElectionId,
    pub name: String,
    #[serde(rename = "type")]
    pub candidate_type: CandidateType,
    /// Candidates are listed in creation order.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<BsonDateTime>,
}

impl Candidate {
    pub fn new(election_id: ElectionId, name: String, candidate_type: CandidateType) -> Self {
        Self {
            id: Id::new(),
            election_id,
            name,
            candidate_type,
            created_at: Utc::now(),
            deleted: false,
            deleted_at: None,
        }
    }
}
