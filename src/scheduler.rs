use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use tokio::{
    sync::{Mutex, Notify},
    task::{JoinError, JoinHandle},
    time::{self, Duration, MissedTickBehavior},
};

use crate::{
    error::{Error, Result},
    logic::{PassReport, Reconciler},
    shutdown::{Context, ShutdownController},
};

/// Drives the [`Reconciler`] at a fixed period.
///
/// The first pass runs immediately. A pass is never started while another
/// is still in flight, and a pass that overruns the period delays the next
/// one rather than causing a burst.
pub struct Scheduler {
    reconciler: Reconciler,
    period: Duration,
    in_flight: Mutex<()>,
    trigger: Arc<Notify>,
}

impl Scheduler {
    /// The period must be at least one second.
    pub fn new(reconciler: Reconciler, period_secs: u64) -> Result<Self> {
        if period_secs == 0 {
            return Err(Error::Validation(
                "scheduler period must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            reconciler,
            period: Duration::from_secs(period_secs),
            in_flight: Mutex::new(()),
            trigger: Arc::new(Notify::new()),
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run passes until `ctx` is cancelled. A failed pass is logged and the
    /// loop carries on.
    pub async fn run(&self, ctx: Context) {
        info!("Scheduler started, running every {:?}", self.period);
        let mut interval = time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => break,
                _ = interval.tick() => {}
                _ = self.trigger.notified() => {
                    debug!("Pass triggered early");
                    interval.reset();
                }
            }
            self.run_pass(&ctx).await;
        }
        info!("Scheduler stopped");
    }

    /// Run a single pass, unless one is already in flight, in which case
    /// `None` is returned immediately.
    pub async fn run_pass(&self, ctx: &Context) -> Option<Result<PassReport>> {
        let _guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Skipping pass, previous pass still in flight");
                return None;
            }
        };

        info!("Starting reconciliation pass");
        let result = self.reconciler.reconcile(ctx).await;
        match &result {
            Ok(report) if report.cancelled => info!("Reconciliation pass cancelled"),
            Ok(report) => info!(
                "Reconciliation pass finished: {} examined, {} ended, {} tallied, {} failed",
                report.examined,
                report.ended.len(),
                report.tallied,
                report.failures.len()
            ),
            Err(e) => error!("Reconciliation pass failed: {e}"),
        }
        Some(result)
    }

    /// Start the next pass now instead of waiting for the period to elapse.
    /// If a pass is running, the next one starts as soon as it finishes.
    pub fn trigger_now(&self) {
        self.trigger.notify_one();
    }

    /// Run the scheduler in the background.
    pub fn spawn(self) -> SchedulerHandle {
        let controller = ShutdownController::new();
        let ctx = controller.subscribe();
        let trigger = self.trigger.clone();
        let task_handle = tokio::spawn(async move { self.run(ctx).await });
        SchedulerHandle {
            task_handle,
            trigger,
            controller,
        }
    }
}

/// A running scheduler. It can be triggered early or stopped.
pub struct SchedulerHandle {
    task_handle: JoinHandle<()>,
    trigger: Arc<Notify>,
    controller: ShutdownController,
}

impl SchedulerHandle {
    /// Start the next pass now.
    pub fn trigger_now(&self) {
        self.trigger.notify_one();
    }

    /// Stop the scheduler, letting any in-flight pass wind down, and wait
    /// for it to finish.
    pub async fn stop(self) -> std::result::Result<(), JoinError> {
        self.controller.shutdown();
        self.task_handle.await
    }
}

/// Implement `Future` for `SchedulerHandle` so we can directly `await` it.
impl Future for SchedulerHandle {
    type Output = std::result::Result<(), JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task_handle).poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;

    use crate::{
        logic::Aggregator,
        model::{
            common::CandidateType,
            db::{Candidate, Election, Vote},
            mongodb::Id,
        },
        store::{memory::MemoryStore, Stores},
    };

    fn scheduler(store: &Arc<MemoryStore>, period_secs: u64) -> Result<Scheduler> {
        let stores = Stores::shared(store.clone());
        let aggregator = Arc::new(Aggregator::new(stores.clone()));
        Scheduler::new(Reconciler::new(stores, aggregator, 2), period_secs)
    }

    fn seed(store: &MemoryStore) -> Election {
        let election = Election::example_ending_at(Utc::now(), Id::new());
        let candidate = Candidate::new(election.id, "A".to_string(), CandidateType::Person);
        store.insert_election(election.clone());
        store.insert_candidate(candidate.clone());
        store.insert_vote(Vote::new(election.id, candidate.id, Id::new(), true));
        election
    }

    /// Poll `condition` until it holds, failing after a few seconds.
    async fn eventually(condition: impl Fn() -> bool) {
        let waited = time::timeout(Duration::from_secs(5), async {
            while !condition() {
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "condition never held");
    }

    #[backend_test]
    async fn zero_period_is_rejected(store: Arc<MemoryStore>) {
        assert!(matches!(scheduler(&store, 0), Err(Error::Validation(_))));
        assert_eq!(
            scheduler(&store, 5).unwrap().period(),
            Duration::from_secs(5)
        );
    }

    #[backend_test]
    async fn first_pass_runs_immediately(store: Arc<MemoryStore>) {
        let election = seed(&store);
        let handle = scheduler(&store, 3600).unwrap().spawn();

        eventually(|| store.results(election.id).is_some()).await;
        assert!(store.election(election.id).unwrap().has_ended);
        handle.stop().await.unwrap();
    }

    #[backend_test]
    async fn trigger_runs_another_pass(store: Arc<MemoryStore>) {
        seed(&store);
        // Never ends, so every pass rewrites its tally.
        let running = Election::example_ending_at(Utc::now() + chrono::Duration::days(1), Id::new());
        store.insert_election(running);
        let handle = scheduler(&store, 3600).unwrap().spawn();

        eventually(|| store.result_writes() == 2).await;
        handle.trigger_now();
        eventually(|| store.result_writes() == 3).await;
        handle.stop().await.unwrap();
    }

    #[backend_test]
    async fn failed_pass_does_not_stop_the_loop(store: Arc<MemoryStore>) {
        let election = seed(&store);
        store.fail_listing(true);
        let handle = scheduler(&store, 1).unwrap().spawn();

        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.result_writes(), 0);

        store.fail_listing(false);
        eventually(|| store.results(election.id).is_some()).await;
        handle.stop().await.unwrap();
    }

    #[backend_test]
    async fn only_one_pass_in_flight(store: Arc<MemoryStore>) {
        seed(&store);
        store.delay_counts(Duration::from_millis(200));
        let scheduler = scheduler(&store, 3600).unwrap();
        let ctx = Context::background();

        let (first, second) = tokio::join!(scheduler.run_pass(&ctx), async {
            time::sleep(Duration::from_millis(50)).await;
            scheduler.run_pass(&ctx).await
        });
        assert!(first.unwrap().unwrap().is_clean());
        assert!(second.is_none());
        assert_eq!(store.result_writes(), 1);
    }

    #[backend_test]
    async fn stop_ends_the_loop(store: Arc<MemoryStore>) {
        let handle = scheduler(&store, 1).unwrap().spawn();
        time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .unwrap()
            .unwrap();
    }
}
