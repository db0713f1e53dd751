use chrono::{DateTime, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::model::common::{ElectionId, ElectionType, PersonId};
use crate::model::mongodb::Id;

/// Core election data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Election {
    /// Unique ID.
    #[serde(rename = "_id")]
    pub id: ElectionId,
    /// Title chosen by the creator.
    pub title: String,
    /// Voting scheme.
    #[serde(rename = "type")]
    pub election_type: ElectionType,
    /// When the election was created.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub creation_time: DateTime<Utc>,
    /// When voting opens.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    /// When voting closes.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
    /// Set once, by the reconciler, after `end_time` has passed.
    #[serde(default)]
    pub has_ended: bool,
    /// The person who created the election.
    pub creator_id: PersonId,
    /// Maximum number of candidates.
    pub candidates_count_limit: u32,
    /// Soft-delete flag.
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<BsonDateTime>,
}

impl Election {
    /// Create a new, active election owned by `creator_id`.
    pub fn new(
        title: String,
        election_type: ElectionType,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        creator_id: PersonId,
        candidates_count_limit: u32,
    ) -> Self {
        Self {
            id: Id::new(),
            title,
            election_type,
            creation_time: Utc::now().min(start_time),
            start_time,
            end_time,
            has_ended: false,
            creator_id,
            candidates_count_limit,
            deleted: false,
            deleted_at: None,
        }
    }

    /// Has the voting window closed at the given instant?
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    impl Election {
        /// An election that opened an hour ago and closes at `end_time`.
        pub fn example_ending_at(end_time: DateTime<Utc>, creator_id: PersonId) -> Self {
            let start_time = end_time.min(Utc::now()) - Duration::hours(1);
            Self::new(
                "Board of directors".to_string(),
                ElectionType::PublicVoters,
                start_time,
                end_time,
                creator_id,
                10,
            )
        }
    }

    #[test]
    fn expiry_is_inclusive() {
        let end = Utc::now();
        let election = Election::example_ending_at(end, Id::new());
        assert!(!election.is_expired_at(end - Duration::seconds(1)));
        assert!(election.is_expired_at(end));
        assert!(election.is_expired_at(end + Duration::seconds(1)));
    }

    #[test]
    fn new_election_is_active_and_ordered() {
        let election = Election::example_ending_at(Utc::now() + Duration::days(1), Id::new());
        assert!(!election.has_ended);
        assert!(!election.deleted);
        assert!(election.creation_time <= election.start_time);
        assert!(election.start_time <= election.end_time);
    }
}
