use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::db::{Candidate, Contributor, Election, ElectionResults, Vote};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl MongoCollection for Election {
    const NAME: &'static str = "elections";
}

impl MongoCollection for Candidate {
    const NAME: &'static str = "candidates";
}

impl MongoCollection for Vote {
    const NAME: &'static str = "votes";
}

impl MongoCollection for Contributor {
    const NAME: &'static str = "contributors";
}

impl MongoCollection for ElectionResults {
    const NAME: &'static str = "election_results";
}

/// Ensure that all the required indexes exist on the given database.
///
/// Results are keyed by election ID through `_id`, so they need no extra index.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    // Election collection: the reconciler scans unfinished elections newest first.
    let election_index = IndexModel::builder()
        .keys(doc! {"has_ended": 1, "creation_time": -1})
        .build();
    Coll::<Election>::from_db(db)
        .create_index(election_index, None)
        .await?;

    // Candidate collection.
    let candidate_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "created_at": 1})
        .build();
    Coll::<Candidate>::from_db(db)
        .create_index(candidate_index, None)
        .await?;

    // Vote collection.
    let vote_index = IndexModel::builder()
        .keys(doc! {"candidate_id": 1, "value": 1})
        .build();
    Coll::<Vote>::from_db(db)
        .create_index(vote_index, None)
        .await?;

    // Contributor collection: one live participation per person per election.
    let live_only = IndexOptions::builder()
        .unique(true)
        .partial_filter_expression(doc! {"deleted": false})
        .build();
    let contributor_index = IndexModel::builder()
        .keys(doc! {"person_id": 1, "election_id": 1})
        .options(live_only)
        .build();
    Coll::<Contributor>::from_db(db)
        .create_index(contributor_index, None)
        .await?;

    Ok(())
}
