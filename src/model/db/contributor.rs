use chrono::{DateTime, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::model::common::{ElectionId, PersonId};
use crate::model::mongodb::Id;

/// A person's participation in an election.
///
/// At most one live contributor may exist per `(person_id, election_id)`;
/// the database enforces this with a partial unique index.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Contributor {
    #[serde(rename = "_id")]
    pub id: Id,
    pub person_id: PersonId,
    pub election_id: ElectionId,
    pub name: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub contribute_time: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<BsonDateTime>,
}

impl Contributor {
    pub fn new(person_id: PersonId, election_id: ElectionId, name: String) -> Self {
        Self {
            id: Id::new(),
            person_id,
            election_id,
            name,
            contribute_time: Utc::now(),
            deleted: false,
            deleted_at: None,
        }
    }
}
