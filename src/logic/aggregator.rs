use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::task::JoinSet;

use crate::{
    error::{Error, Result, TallyErrors},
    model::{
        common::{CandidateId, ElectionId, Polarity},
        db::{Candidate, CandidateElectionResult, Election, ElectionResults},
    },
    shutdown::Context,
    store::{Stores, VoteStore},
};

use super::access::Requester;

/// How a tally treats failures of individual counts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TallyPolicy {
    /// Count sequentially; the first failure aborts and nothing is persisted.
    FailFast,
    /// Count concurrently; failures are reported but the snapshot is still
    /// built from every count that succeeded, and persisted.
    BestEffort,
}

/// A persisted snapshot together with any counting failures.
/// Failed counts are left at zero in the snapshot.
#[derive(Debug)]
pub struct Tally {
    pub results: ElectionResults,
    pub errors: TallyErrors,
}

impl Tally {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// The snapshot, or [`Error::PartialAggregation`] if any count failed.
    pub fn into_complete(self) -> Result<ElectionResults> {
        if self.errors.is_empty() {
            Ok(self.results)
        } else {
            Err(Error::PartialAggregation(self.errors))
        }
    }
}

/// Computes and persists [`ElectionResults`] snapshots.
pub struct Aggregator {
    stores: Stores,
}

impl Aggregator {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Tally the given election under the chosen policy.
    pub async fn tally(
        &self,
        ctx: &Context,
        election_id: ElectionId,
        requester: Requester,
        policy: TallyPolicy,
    ) -> Result<Tally> {
        match policy {
            TallyPolicy::FailFast => {
                let results = self.tally_fail_fast(ctx, election_id, requester).await?;
                Ok(Tally {
                    results,
                    errors: TallyErrors::new(),
                })
            }
            TallyPolicy::BestEffort => self.tally_best_effort(ctx, election_id, requester).await,
        }
    }

    pub async fn tally_fail_fast(
        &self,
        ctx: &Context,
        election_id: ElectionId,
        requester: Requester,
    ) -> Result<ElectionResults> {
        let (election, candidates) = self.prepare(ctx, election_id, requester).await?;
        debug!(
            "Tallying election {election_id} ({} candidates), fail-fast",
            candidates.len()
        );

        let mut results = Vec::with_capacity(candidates.len());
        for candidate in candidates.iter() {
            let mut entry = CandidateElectionResult::empty(candidate);
            for polarity in Polarity::ALL {
                let count = count_votes(&*self.stores.votes, ctx, candidate.id, polarity).await?;
                entry.set_count(polarity, count);
            }
            results.push(entry);
        }

        let snapshot = ElectionResults::new(&election, results);
        self.persist(ctx, &snapshot).await?;
        Ok(snapshot)
    }

    pub async fn tally_best_effort(
        &self,
        ctx: &Context,
        election_id: ElectionId,
        requester: Requester,
    ) -> Result<Tally> {
        let (election, candidates) = self.prepare(ctx, election_id, requester).await?;
        debug!(
            "Tallying election {election_id} ({} candidates), best-effort",
            candidates.len()
        );

        // One task per (candidate, polarity). Each task reports back the slot
        // it owns, and only this function writes the slots.
        let mut tasks = JoinSet::new();
        for (index, candidate) in candidates.iter().enumerate() {
            for polarity in Polarity::ALL {
                let votes = self.stores.votes.clone();
                let ctx = ctx.clone();
                let candidate_id = candidate.id;
                tasks.spawn(async move {
                    let counted =
                        AssertUnwindSafe(count_votes(&*votes, &ctx, candidate_id, polarity))
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|_| {
                                Err(Error::Internal("counting task panicked".to_string()))
                            });
                    (index, polarity, counted)
                });
            }
        }

        let mut slots: Vec<_> = candidates.iter().map(CandidateElectionResult::empty).collect();
        let mut reported = vec![[false; 2]; candidates.len()];
        let mut errors = TallyErrors::new();
        while let Some(joined) = tasks.join_next().await {
            let (index, polarity, counted) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Counting task for election {election_id} was lost: {e}");
                    continue;
                }
            };
            reported[index][polarity_slot(polarity)] = true;
            match counted {
                Ok(count) => slots[index].set_count(polarity, count),
                Err(e) => {
                    warn!(
                        "Counting {polarity} votes of candidate {} failed: {e}",
                        candidates[index].id
                    );
                    errors.insert(polarity, candidates[index].id, e);
                }
            }
        }
        record_lost_tasks(&candidates, &reported, &mut errors);

        let snapshot = ElectionResults::new(&election, slots);
        self.persist(ctx, &snapshot).await?;
        if !errors.is_empty() {
            warn!("Stored partial tally for election {election_id}: {errors}");
        }
        Ok(Tally {
            results: snapshot,
            errors,
        })
    }

    /// Whether a snapshot has been stored, for those allowed to see the election.
    pub async fn result_exists(
        &self,
        ctx: &Context,
        election_id: ElectionId,
        requester: Requester,
    ) -> Result<bool> {
        self.fetch_accessible(ctx, election_id, requester).await?;
        ctx.check()?;
        Ok(self.stores.elections.result_exists(election_id).await?)
    }

    /// The stored snapshot, for those allowed to see the election.
    pub async fn stored_results(
        &self,
        ctx: &Context,
        election_id: ElectionId,
        requester: Requester,
    ) -> Result<ElectionResults> {
        self.fetch_accessible(ctx, election_id, requester).await?;
        ctx.check()?;
        Ok(self.stores.elections.fetch_result(election_id).await?)
    }

    /// Fetch the election and check the requester may act on it.
    async fn fetch_accessible(
        &self,
        ctx: &Context,
        election_id: ElectionId,
        requester: Requester,
    ) -> Result<Election> {
        ctx.check()?;
        let election = self.stores.elections.fetch_election(election_id).await?;
        requester.ensure_access(election.creator_id, &format!("election {election_id}"))?;
        Ok(election)
    }

    /// Everything a tally needs before counting: the election and all its candidates.
    async fn prepare(
        &self,
        ctx: &Context,
        election_id: ElectionId,
        requester: Requester,
    ) -> Result<(Election, Vec<Candidate>)> {
        let election = self.fetch_accessible(ctx, election_id, requester).await?;
        ctx.check()?;
        let candidates = self
            .stores
            .candidates
            .list_all_for_election(election_id)
            .await?;
        Ok((election, candidates))
    }

    async fn persist(&self, ctx: &Context, snapshot: &ElectionResults) -> Result<()> {
        ctx.check()?;
        self.stores
            .elections
            .save_or_replace_result(snapshot)
            .await?;
        trace!("Stored results {} of election {}", snapshot.id, snapshot.election_id);
        Ok(())
    }
}

/// The counting step shared by both policies.
async fn count_votes(
    votes: &dyn VoteStore,
    ctx: &Context,
    candidate_id: CandidateId,
    polarity: Polarity,
) -> Result<u64> {
    ctx.check()?;
    let count = votes.count(candidate_id, polarity).await?;
    trace!("Candidate {candidate_id} has {count} {polarity} votes");
    Ok(count)
}

fn polarity_slot(polarity: Polarity) -> usize {
    match polarity {
        Polarity::Positive => 0,
        Polarity::Negative => 1,
    }
}

/// Any slot whose task never reported back counts as failed.
fn record_lost_tasks(candidates: &[Candidate], reported: &[[bool; 2]], errors: &mut TallyErrors) {
    for (candidate, reported) in candidates.iter().zip(reported) {
        for polarity in Polarity::ALL {
            if !reported[polarity_slot(polarity)] {
                errors.insert(
                    polarity,
                    candidate.id,
                    Error::Internal("counting task did not complete".to_string()),
                );
            }
        }
    }
}
