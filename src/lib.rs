#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod scheduler;
pub mod shutdown;
pub mod store;

use config::Config;
use error::Result;
use logic::{Aggregator, Reconciler};
use scheduler::Scheduler;
use store::Stores;

/// The wired-up service: one aggregator shared by the reconciler and any
/// direct tally requests.
pub struct Service {
    pub aggregator: Arc<Aggregator>,
    pub reconciler: Reconciler,
}

impl Service {
    /// A scheduler driving this service's reconciler.
    pub fn scheduler(&self, period_secs: u64) -> Result<Scheduler> {
        Scheduler::new(self.reconciler.clone(), period_secs)
    }
}

/// Wire the logic components to the given storage collaborators.
pub fn build(stores: Stores, config: &Config) -> Service {
    let aggregator = Arc::new(Aggregator::new(stores.clone()));
    let reconciler = Reconciler::new(
        stores,
        aggregator.clone(),
        config.max_concurrent_elections(),
    );
    Service {
        aggregator,
        reconciler,
    }
}
