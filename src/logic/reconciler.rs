use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
    error::{Error, Result},
    model::{common::ElectionId, db::Election},
    shutdown::Context,
    store::{SortOrder, Stores},
};

use super::{
    access::Requester,
    aggregator::{Aggregator, TallyPolicy},
};

/// What a single reconciliation pass did.
#[derive(Debug, Default)]
pub struct PassReport {
    /// Number of not-ended elections listed at the start of the pass.
    pub examined: usize,
    /// Elections whose termination was persisted during this pass.
    pub ended: Vec<ElectionId>,
    /// Number of elections whose results snapshot was stored.
    pub tallied: usize,
    /// Per-election failures. A partially stored tally counts as one.
    pub failures: BTreeMap<ElectionId, Error>,
    /// Whether the pass stopped early because of shutdown.
    pub cancelled: bool,
}

impl PassReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// What happened to one election.
struct Outcome {
    ended: bool,
    tallied: bool,
    failure: Option<Error>,
}

/// Finds expired elections, ends them and refreshes every tally.
#[derive(Clone)]
pub struct Reconciler {
    stores: Stores,
    aggregator: Arc<Aggregator>,
    max_concurrent: usize,
}

impl Reconciler {
    pub fn new(stores: Stores, aggregator: Arc<Aggregator>, max_concurrent: usize) -> Self {
        Self {
            stores,
            aggregator,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Run one pass against the current time.
    pub async fn reconcile(&self, ctx: &Context) -> Result<PassReport> {
        self.reconcile_at(ctx, Utc::now()).await
    }

    /// Run one pass as if the current time were `now`.
    ///
    /// Only a failure to list the elections fails the pass as a whole; every
    /// other failure is recorded against its election in the report.
    pub async fn reconcile_at(&self, ctx: &Context, now: DateTime<Utc>) -> Result<PassReport> {
        let elections = match self.list_started_elections(ctx, Requester::system()).await {
            Ok(elections) => elections,
            Err(Error::Cancelled) => {
                return Ok(PassReport {
                    cancelled: true,
                    ..Default::default()
                })
            }
            Err(e) => return Err(e),
        };
        let mut report = PassReport {
            examined: elections.len(),
            ..Default::default()
        };
        debug!("Reconciling {} not-ended elections", report.examined);

        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        for election in elections {
            let this = self.clone();
            let ctx = ctx.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let id = election.id;
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => AssertUnwindSafe(this.reconcile_election(&ctx, election, now))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| Outcome {
                            ended: false,
                            tallied: false,
                            failure: Some(Error::Internal(
                                "reconciliation task panicked".to_string(),
                            )),
                        }),
                    Err(e) => Outcome {
                        ended: false,
                        tallied: false,
                        failure: Some(Error::Internal(e.to_string())),
                    },
                };
                (id, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (id, outcome) = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!("Reconciliation task was lost: {e}");
                    continue;
                }
            };
            if outcome.ended {
                report.ended.push(id);
            }
            if outcome.tallied {
                report.tallied += 1;
            }
            match outcome.failure {
                Some(Error::Cancelled) => report.cancelled = true,
                Some(e) => {
                    warn!("Reconciling election {id} failed: {e}");
                    report.failures.insert(id, e);
                }
                None => {}
            }
        }
        report.cancelled |= ctx.is_cancelled();
        Ok(report)
    }

    /// End the election if it has expired, then refresh its tally.
    ///
    /// The tally runs even if ending the election failed; the termination
    /// failure is the one reported, and the next pass retries it.
    async fn reconcile_election(
        &self,
        ctx: &Context,
        election: Election,
        now: DateTime<Utc>,
    ) -> Outcome {
        let mut outcome = Outcome {
            ended: false,
            tallied: false,
            failure: None,
        };

        if election.is_expired_at(now) {
            debug!("Election {} expired at {}, ending it", election.id, election.end_time);
            match self
                .change_termination_status(ctx, election.id, Requester::system(), true)
                .await
            {
                Err(e) => outcome.failure = Some(e),
                Ok(()) => outcome.ended = true,
            }
        }
        let terminated = outcome.failure.is_none();

        match self
            .aggregator
            .tally(ctx, election.id, Requester::system(), TallyPolicy::BestEffort)
            .await
        {
            Ok(tally) => {
                outcome.tallied = true;
                if terminated && !tally.is_complete() {
                    outcome.failure = Some(Error::PartialAggregation(tally.errors));
                } else if !tally.is_complete() {
                    warn!("Partial tally for election {}: {}", election.id, tally.errors);
                }
            }
            Err(e) if terminated => outcome.failure = Some(e),
            Err(e) => warn!("Tallying election {} failed: {e}", election.id),
        }
        outcome
    }

    /// Set whether an election has ended, on behalf of its owner or an admin.
    pub async fn change_termination_status(
        &self,
        ctx: &Context,
        election_id: ElectionId,
        requester: Requester,
        has_ended: bool,
    ) -> Result<()> {
        ctx.check()?;
        let election = self.stores.elections.fetch_election(election_id).await?;
        requester.ensure_access(election.creator_id, &format!("election {election_id}"))?;
        ctx.check()?;
        self.stores
            .elections
            .set_termination_status(election_id, has_ended)
            .await?;
        info!("Election {election_id} termination status set to {has_ended}");
        Ok(())
    }

    /// Every election that has not yet ended, newest first. Admins only.
    pub async fn list_started_elections(
        &self,
        ctx: &Context,
        requester: Requester,
    ) -> Result<Vec<Election>> {
        if !requester.admin {
            return Err(Error::AccessDenied(format!(
                "{} may not list started elections",
                requester.id
            )));
        }
        ctx.check()?;
        Ok(self
            .stores
            .elections
            .list_not_ended(SortOrder::Descending)
            .await?)
    }
}
