//! An in-memory implementation of the storage collaborators.
//!
//! Besides backing the test suite, it can inject failures per operation and
//! counts the writes it receives, so callers can check what was persisted.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::model::{
    common::{CandidateId, ElectionId, Polarity},
    db::{Candidate, Election, ElectionResults, Vote},
};

use super::{CandidateStore, ElectionStore, SortOrder, StoreError, StoreResult, VoteStore};

#[derive(Default)]
struct Inner {
    elections: HashMap<ElectionId, Election>,
    /// Kept in insertion order, which doubles as creation order.
    candidates: Vec<Candidate>,
    votes: Vec<Vote>,
    results: HashMap<ElectionId, ElectionResults>,
    faults: Faults,
    termination_writes: usize,
    result_writes: usize,
}

#[derive(Default)]
struct Faults {
    listing: bool,
    counts: HashSet<(CandidateId, Polarity)>,
    candidates: HashSet<ElectionId>,
    termination: HashSet<ElectionId>,
    save_result: HashSet<ElectionId>,
    count_delay: Option<Duration>,
}

fn injected(what: &str) -> StoreError {
    StoreError::transient(format!("injected failure: {what}"))
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not hide the data from the others.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_election(&self, election: Election) {
        self.lock().elections.insert(election.id, election);
    }

    pub fn insert_candidate(&self, candidate: Candidate) {
        self.lock().candidates.push(candidate);
    }

    pub fn insert_vote(&self, vote: Vote) {
        self.lock().votes.push(vote);
    }

    /// Soft-delete a candidate.
    pub fn delete_candidate(&self, id: CandidateId) {
        let mut inner = self.lock();
        if let Some(candidate) = inner.candidates.iter_mut().find(|c| c.id == id) {
            candidate.deleted = true;
        }
    }

    /// Soft-delete an election.
    pub fn delete_election(&self, id: ElectionId) {
        if let Some(election) = self.lock().elections.get_mut(&id) {
            election.deleted = true;
        }
    }

    /// The stored election, deleted or not.
    pub fn election(&self, id: ElectionId) -> Option<Election> {
        self.lock().elections.get(&id).cloned()
    }

    /// The stored results snapshot, if any.
    pub fn results(&self, election_id: ElectionId) -> Option<ElectionResults> {
        self.lock().results.get(&election_id).cloned()
    }

    pub fn results_count(&self) -> usize {
        self.lock().results.len()
    }

    /// Number of successful `set_termination_status` calls so far.
    pub fn termination_writes(&self) -> usize {
        self.lock().termination_writes
    }

    /// Number of successful `save_or_replace_result` calls so far.
    pub fn result_writes(&self) -> usize {
        self.lock().result_writes
    }

    /// Make `list_not_ended` fail.
    pub fn fail_listing(&self, fail: bool) {
        self.lock().faults.listing = fail;
    }

    /// Make counting one polarity of one candidate fail.
    pub fn fail_count(&self, candidate_id: CandidateId, polarity: Polarity) {
        self.lock().faults.counts.insert((candidate_id, polarity));
    }

    /// Make listing the candidates of one election fail.
    pub fn fail_candidates(&self, election_id: ElectionId) {
        self.lock().faults.candidates.insert(election_id);
    }

    /// Make setting the termination status of one election fail.
    pub fn fail_termination(&self, election_id: ElectionId) {
        self.lock().faults.termination.insert(election_id);
    }

    /// Make saving the results of one election fail.
    pub fn fail_save_result(&self, election_id: ElectionId) {
        self.lock().faults.save_result.insert(election_id);
    }

    /// Slow down every count by the given duration.
    pub fn delay_counts(&self, delay: Duration) {
        self.lock().faults.count_delay = Some(delay);
    }

    pub fn clear_faults(&self) {
        self.lock().faults = Faults::default();
    }

    fn count_now(&self, candidate_id: CandidateId, polarity: Polarity) -> StoreResult<u64> {
        let inner = self.lock();
        if inner.faults.counts.contains(&(candidate_id, polarity)) {
            return Err(injected(&format!("{polarity} count of {candidate_id}")));
        }
        let count = inner
            .votes
            .iter()
            .filter(|v| !v.deleted && v.candidate_id == candidate_id)
            .filter(|v| v.value == polarity.vote_value())
            .count();
        Ok(count as u64)
    }

    async fn count_after_delay(
        &self,
        candidate_id: CandidateId,
        polarity: Polarity,
    ) -> StoreResult<u64> {
        let delay = self.lock().faults.count_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.count_now(candidate_id, polarity)
    }
}

#[async_trait]
impl ElectionStore for MemoryStore {
    async fn exists(&self, id: ElectionId) -> StoreResult<bool> {
        Ok(self
            .lock()
            .elections
            .get(&id)
            .map_or(false, |e| !e.deleted))
    }

    async fn fetch_election(&self, id: ElectionId) -> StoreResult<Election> {
        self.lock()
            .elections
            .get(&id)
            .filter(|e| !e.deleted)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("election {id}")))
    }

    async fn list_not_ended(&self, order: SortOrder) -> StoreResult<Vec<Election>> {
        let inner = self.lock();
        if inner.faults.listing {
            return Err(injected("election listing"));
        }
        let mut elections: Vec<_> = inner
            .elections
            .values()
            .filter(|e| !e.deleted && !e.has_ended)
            .cloned()
            .collect();
        elections.sort_by_key(|e| e.creation_time);
        if order == SortOrder::Descending {
            elections.reverse();
        }
        Ok(elections)
    }

    async fn set_termination_status(&self, id: ElectionId, has_ended: bool) -> StoreResult<()> {
        let mut inner = self.lock();
        if inner.faults.termination.contains(&id) {
            return Err(injected(&format!("termination of {id}")));
        }
        match inner.elections.get_mut(&id).filter(|e| !e.deleted) {
            Some(election) => election.has_ended = has_ended,
            None => return Err(StoreError::NotFound(format!("election {id}"))),
        }
        inner.termination_writes += 1;
        Ok(())
    }

    async fn save_or_replace_result(&self, result: &ElectionResults) -> StoreResult<()> {
        let mut inner = self.lock();
        if inner.faults.save_result.contains(&result.election_id) {
            return Err(injected(&format!("saving results of {}", result.election_id)));
        }
        inner.results.insert(result.election_id, result.clone());
        inner.result_writes += 1;
        Ok(())
    }

    async fn result_exists(&self, election_id: ElectionId) -> StoreResult<bool> {
        Ok(self.lock().results.contains_key(&election_id))
    }

    async fn fetch_result(&self, election_id: ElectionId) -> StoreResult<ElectionResults> {
        self.results(election_id)
            .ok_or_else(|| StoreError::NotFound(format!("results of election {election_id}")))
    }
}

#[async_trait]
impl CandidateStore for MemoryStore {
    async fn list_all_for_election(&self, election_id: ElectionId) -> StoreResult<Vec<Candidate>> {
        let inner = self.lock();
        if inner.faults.candidates.contains(&election_id) {
            return Err(injected(&format!("candidates of {election_id}")));
        }
        Ok(inner
            .candidates
            .iter()
            .filter(|c| !c.deleted && c.election_id == election_id)
            .cloned()
            .collect())
    }

    async fn fetch_candidate(&self, id: CandidateId) -> StoreResult<Candidate> {
        self.lock()
            .candidates
            .iter()
            .find(|c| !c.deleted && c.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("candidate {id}")))
    }
}

#[async_trait]
impl VoteStore for MemoryStore {
    async fn count_positive(&self, candidate_id: CandidateId) -> StoreResult<u64> {
        self.count_after_delay(candidate_id, Polarity::Positive).await
    }

    async fn count_negative(&self, candidate_id: CandidateId) -> StoreResult<u64> {
        self.count_after_delay(candidate_id, Polarity::Negative).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use chrono::Utc;

    use crate::model::{common::CandidateType, mongodb::Id};

    #[backend_test]
    async fn deleted_records_are_invisible(store: Arc<MemoryStore>) {
        let election = Election::example_ending_at(Utc::now(), Id::new());
        let candidate = Candidate::new(election.id, "A".to_string(), CandidateType::Person);
        store.insert_election(election.clone());
        store.insert_candidate(candidate.clone());
        let mut vote = Vote::new(election.id, candidate.id, Id::new(), true);
        vote.deleted = true;
        store.insert_vote(vote);

        assert_eq!(store.count_positive(candidate.id).await.unwrap(), 0);

        store.delete_candidate(candidate.id);
        assert!(store
            .list_all_for_election(election.id)
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            store.fetch_candidate(candidate.id).await,
            Err(StoreError::NotFound(_))
        ));

        store.delete_election(election.id);
        assert!(!store.exists(election.id).await.unwrap());
        assert!(matches!(
            store.set_termination_status(election.id, true).await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.termination_writes(), 0);
    }

    #[backend_test]
    async fn injected_faults_are_transient(store: Arc<MemoryStore>) {
        let election = Election::example_ending_at(Utc::now(), Id::new());
        let candidate = Candidate::new(election.id, "A".to_string(), CandidateType::Person);
        store.insert_election(election.clone());
        store.insert_candidate(candidate.clone());

        store.fail_count(candidate.id, Polarity::Negative);
        assert_eq!(store.count_positive(candidate.id).await.unwrap(), 0);
        assert!(matches!(
            store.count_negative(candidate.id).await,
            Err(StoreError::Transient(_))
        ));

        store.clear_faults();
        assert_eq!(store.count_negative(candidate.id).await.unwrap(), 0);
    }
}
