//! Storage collaborators consumed by the reconciliation logic.
//!
//! Every call either yields a value, a [`StoreError::NotFound`], or a
//! [`StoreError::Transient`] operational failure.

use std::sync::Arc;

use async_trait::async_trait;
use mongodb::error::Error as DbError;
use thiserror::Error;

use crate::model::{
    common::{CandidateId, ElectionId, Polarity},
    db::{Candidate, Election, ElectionResults},
};

pub mod memory;
pub mod mongo;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Box type for the underlying cause of a transient failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The record is absent or soft-deleted.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The store could not be reached or failed to answer.
    #[error("Transient store failure: {0}")]
    Transient(BoxError),
}

impl StoreError {
    pub fn transient(cause: impl Into<BoxError>) -> Self {
        Self::Transient(cause.into())
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        Self::Transient(Box::new(err))
    }
}

/// Sort direction for listings.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    /// The MongoDB sort key value.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

#[async_trait]
pub trait ElectionStore: Send + Sync {
    /// Does a live election with this ID exist?
    async fn exists(&self, id: ElectionId) -> StoreResult<bool>;

    /// Fetch a live election, or `NotFound`.
    async fn fetch_election(&self, id: ElectionId) -> StoreResult<Election>;

    /// All live elections that have not ended, ordered by creation time.
    async fn list_not_ended(&self, order: SortOrder) -> StoreResult<Vec<Election>>;

    /// Atomically set the `has_ended` flag of a live election.
    async fn set_termination_status(&self, id: ElectionId, has_ended: bool) -> StoreResult<()>;

    /// Insert the snapshot, or replace the existing one for the same election.
    async fn save_or_replace_result(&self, result: &ElectionResults) -> StoreResult<()>;

    /// Has a snapshot been stored for this election?
    async fn result_exists(&self, election_id: ElectionId) -> StoreResult<bool>;

    /// Fetch the stored snapshot for this election, or `NotFound`.
    async fn fetch_result(&self, election_id: ElectionId) -> StoreResult<ElectionResults>;
}

#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Every live candidate of the election, in creation order, unpaginated.
    async fn list_all_for_election(&self, election_id: ElectionId) -> StoreResult<Vec<Candidate>>;

    /// Fetch a live candidate, or `NotFound`.
    async fn fetch_candidate(&self, id: CandidateId) -> StoreResult<Candidate>;
}

#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Number of live positive votes for the candidate.
    async fn count_positive(&self, candidate_id: CandidateId) -> StoreResult<u64>;

    /// Number of live negative votes for the candidate.
    async fn count_negative(&self, candidate_id: CandidateId) -> StoreResult<u64>;

    async fn count(&self, candidate_id: CandidateId, polarity: Polarity) -> StoreResult<u64> {
        match polarity {
            Polarity::Positive => self.count_positive(candidate_id).await,
            Polarity::Negative => self.count_negative(candidate_id).await,
        }
    }
}

/// The set of storage collaborators, injected into the logic at construction.
#[derive(Clone)]
pub struct Stores {
    pub elections: Arc<dyn ElectionStore>,
    pub candidates: Arc<dyn CandidateStore>,
    pub votes: Arc<dyn VoteStore>,
}

impl Stores {
    /// Use a single backend for all three collaborators.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: ElectionStore + CandidateStore + VoteStore + 'static,
    {
        Self {
            elections: store.clone(),
            candidates: store.clone(),
            votes: store,
        }
    }
}
