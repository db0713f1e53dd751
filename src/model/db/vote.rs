use chrono::{DateTime, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::model::common::{CandidateId, ElectionId, PersonId};
use crate::model::mongodb::Id;

/// A single vote for or against a candidate.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    pub candidate_id: CandidateId,
    pub election_id: ElectionId,
    pub contributor_id: PersonId,
    /// `true` for a positive vote. A missing value counts as negative.
    #[serde(default)]
    pub value: bool,
    /// Whether the voter asked to stay anonymous.
    #[serde(default)]
    pub private: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub vote_time: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<BsonDateTime>,
}

impl Vote {
    pub fn new(
        election_id: ElectionId,
        candidate_id: CandidateId,
        contributor_id: PersonId,
        value: bool,
    ) -> Self {
        Self {
            id: Id::new(),
            candidate_id,
            election_id,
            contributor_id,
            value,
            private: false,
            vote_time: Utc::now(),
            deleted: false,
            deleted_at: None,
        }
    }
}
