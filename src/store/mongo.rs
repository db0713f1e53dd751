use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    options::{FindOptions, ReplaceOptions},
    Database,
};

use crate::model::{
    common::{CandidateId, ElectionId},
    db::{Candidate, Election, ElectionResults, Vote},
    mongodb::Coll,
};

use super::{CandidateStore, ElectionStore, SortOrder, StoreError, StoreResult, VoteStore};

/// Filter clause excluding soft-deleted records. Matches a missing flag too.
fn live() -> Document {
    doc! { "deleted": { "$ne": true } }
}

/// MongoDB implementation of all storage collaborators.
#[derive(Clone)]
pub struct MongoStore {
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
    votes: Coll<Vote>,
    results: Coll<ElectionResults>,
}

impl MongoStore {
    pub fn from_db(db: &Database) -> Self {
        Self {
            elections: Coll::from_db(db),
            candidates: Coll::from_db(db),
            votes: Coll::from_db(db),
            results: Coll::from_db(db),
        }
    }

    async fn count_votes(&self, candidate_id: CandidateId, positive: bool) -> StoreResult<u64> {
        let mut filter = live();
        filter.insert("candidate_id", candidate_id);
        // Votes without a value have always counted as negative.
        if positive {
            filter.insert("value", true);
        } else {
            filter.insert("value", doc! { "$ne": true });
        }
        Ok(self.votes.count_documents(filter, None).await?)
    }
}

#[async_trait]
impl ElectionStore for MongoStore {
    async fn exists(&self, id: ElectionId) -> StoreResult<bool> {
        let mut filter = live();
        filter.insert("_id", id);
        Ok(self.elections.count_documents(filter, None).await? > 0)
    }

    async fn fetch_election(&self, id: ElectionId) -> StoreResult<Election> {
        let mut filter = live();
        filter.insert("_id", id);
        self.elections
            .find_one(filter, None)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("election {id}")))
    }

    async fn list_not_ended(&self, order: SortOrder) -> StoreResult<Vec<Election>> {
        let mut filter = live();
        filter.insert("has_ended", doc! { "$ne": true });
        let options = FindOptions::builder()
            .sort(doc! { "creation_time": order.as_i32() })
            .build();
        let elections = self
            .elections
            .find(filter, options)
            .await?
            .try_collect()
            .await?;
        Ok(elections)
    }

    async fn set_termination_status(&self, id: ElectionId, has_ended: bool) -> StoreResult<()> {
        let mut filter = live();
        filter.insert("_id", id);
        let update = doc! { "$set": { "has_ended": has_ended } };
        let result = self.elections.update_one(filter, update, None).await?;
        if result.matched_count == 0 {
            return Err(StoreError::NotFound(format!("election {id}")));
        }
        Ok(())
    }

    async fn save_or_replace_result(&self, result: &ElectionResults) -> StoreResult<()> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.results
            .replace_one(result.election_id.as_doc(), result, options)
            .await?;
        Ok(())
    }

    async fn result_exists(&self, election_id: ElectionId) -> StoreResult<bool> {
        let count = self
            .results
            .count_documents(election_id.as_doc(), None)
            .await?;
        Ok(count > 0)
    }

    async fn fetch_result(&self, election_id: ElectionId) -> StoreResult<ElectionResults> {
        self.results
            .find_one(election_id.as_doc(), None)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("results of election {election_id}")))
    }
}

#[async_trait]
impl CandidateStore for MongoStore {
    async fn list_all_for_election(&self, election_id: ElectionId) -> StoreResult<Vec<Candidate>> {
        let mut filter = live();
        filter.insert("election_id", election_id);
        let options = FindOptions::builder()
            .sort(doc! { "created_at": SortOrder::Ascending.as_i32() })
            .build();
        let candidates = self
            .candidates
            .find(filter, options)
            .await?
            .try_collect()
            .await?;
        Ok(candidates)
    }

    async fn fetch_candidate(&self, id: CandidateId) -> StoreResult<Candidate> {
        let mut filter = live();
        filter.insert("_id", id);
        self.candidates
            .find_one(filter, None)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("candidate {id}")))
    }
}

#[async_trait]
impl VoteStore for MongoStore {
    async fn count_positive(&self, candidate_id: CandidateId) -> StoreResult<u64> {
        self.count_votes(candidate_id, true).await
    }

    async fn count_negative(&self, candidate_id: CandidateId) -> StoreResult<u64> {
        self.count_votes(candidate_id, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, Utc};
    use mongodb::Database;

    use crate::model::{
        common::CandidateType,
        db::{CandidateElectionResult, Contributor},
        mongodb::Id,
    };

    #[backend_test]
    async fn not_ended_listing_skips_ended_and_deleted(db: Database) {
        let store = MongoStore::from_db(&db);
        let creator = Id::new();

        let older = Election::example_ending_at(Utc::now() + Duration::hours(1), creator);
        let mut newer = Election::example_ending_at(Utc::now() + Duration::hours(2), creator);
        newer.creation_time = older.creation_time + Duration::seconds(10);
        let mut ended = Election::example_ending_at(Utc::now(), creator);
        ended.has_ended = true;
        let mut deleted = Election::example_ending_at(Utc::now(), creator);
        deleted.deleted = true;
        for election in [&older, &newer, &ended, &deleted] {
            store.elections.insert_one(election, None).await.unwrap();
        }

        let listed = store.list_not_ended(SortOrder::Descending).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);

        assert!(matches!(
            store.fetch_election(deleted.id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(!store.exists(deleted.id).await.unwrap());
        assert!(store.exists(older.id).await.unwrap());
    }

    #[backend_test]
    async fn termination_status_is_persisted(db: Database) {
        let store = MongoStore::from_db(&db);
        let election = Election::example_ending_at(Utc::now(), Id::new());
        store.elections.insert_one(&election, None).await.unwrap();

        store.set_termination_status(election.id, true).await.unwrap();
        assert!(store.fetch_election(election.id).await.unwrap().has_ended);

        assert!(matches!(
            store.set_termination_status(Id::new(), true).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[backend_test]
    async fn counts_and_candidate_order(db: Database) {
        let store = MongoStore::from_db(&db);
        let election = Election::example_ending_at(Utc::now(), Id::new());
        let first = Candidate::new(election.id, "First".to_string(), CandidateType::Person);
        let mut second = Candidate::new(election.id, "Second".to_string(), CandidateType::Problem);
        second.created_at = first.created_at + Duration::seconds(1);
        let mut gone = Candidate::new(election.id, "Gone".to_string(), CandidateType::Person);
        gone.deleted = true;
        for candidate in [&second, &gone, &first] {
            store.candidates.insert_one(candidate, None).await.unwrap();
        }

        let listed = store.list_all_for_election(election.id).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);

        let mut deleted_vote = Vote::new(election.id, first.id, Id::new(), true);
        deleted_vote.deleted = true;
        let votes = vec![
            Vote::new(election.id, first.id, Id::new(), true),
            Vote::new(election.id, first.id, Id::new(), true),
            Vote::new(election.id, first.id, Id::new(), false),
            Vote::new(election.id, second.id, Id::new(), false),
            deleted_vote,
        ];
        store.votes.insert_many(votes, None).await.unwrap();

        assert_eq!(store.count_positive(first.id).await.unwrap(), 2);
        assert_eq!(store.count_negative(first.id).await.unwrap(), 1);
        assert_eq!(store.count_positive(second.id).await.unwrap(), 0);
        assert_eq!(store.count_negative(second.id).await.unwrap(), 1);
    }

    #[backend_test]
    async fn results_are_replaced_not_duplicated(db: Database) {
        let store = MongoStore::from_db(&db);
        let election = Election::example_ending_at(Utc::now(), Id::new());
        let candidate = Candidate::new(election.id, "Only".to_string(), CandidateType::Person);

        assert!(!store.result_exists(election.id).await.unwrap());
        let first = ElectionResults::new(&election, vec![CandidateElectionResult::empty(&candidate)]);
        store.save_or_replace_result(&first).await.unwrap();

        let mut entry = CandidateElectionResult::empty(&candidate);
        entry.positive_votes_count = 4;
        let second = ElectionResults::new(&election, vec![entry]);
        store.save_or_replace_result(&second).await.unwrap();

        assert!(store.result_exists(election.id).await.unwrap());
        assert_eq!(store.results.count_documents(None, None).await.unwrap(), 1);
        assert_eq!(store.fetch_result(election.id).await.unwrap(), second);
    }

    #[backend_test]
    async fn one_live_contribution_per_election(db: Database) {
        let contributors = Coll::<Contributor>::from_db(&db);
        let person = Id::new();
        let election = Id::new();

        let mut withdrawn = Contributor::new(person, election, "Ada".to_string());
        withdrawn.deleted = true;
        contributors.insert_one(&withdrawn, None).await.unwrap();
        contributors
            .insert_one(Contributor::new(person, election, "Ada".to_string()), None)
            .await
            .unwrap();
        let duplicate = contributors
            .insert_one(Contributor::new(person, election, "Ada".to_string()), None)
            .await;
        assert!(duplicate.is_err());
    }
}
