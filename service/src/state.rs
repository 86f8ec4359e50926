//! Application state.

use std::sync::Arc;

use tally_ledger::{AccountBootstrap, CreditLedger, MonthlyDistribution, QuotaTracker};
use tally_store::RocksStore;

use crate::config::ServiceConfig;

/// Application state shared across handlers.
pub struct AppState {
    /// The storage backend.
    pub store: Arc<RocksStore>,

    /// Credit ledger service.
    pub ledger: CreditLedger<RocksStore>,

    /// Quota usage tracker.
    pub quota: QuotaTracker<RocksStore>,

    /// Signup bootstrap service.
    pub bootstrap: AccountBootstrap<RocksStore>,

    /// Monthly distribution job.
    pub distribution: MonthlyDistribution<RocksStore>,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<RocksStore>, config: ServiceConfig) -> Self {
        if config.admin_token.is_none() {
            tracing::warn!("ADMIN_TOKEN not set - admin endpoints are disabled");
        }

        let ledger = CreditLedger::new(Arc::clone(&store));
        let quota = QuotaTracker::new(Arc::clone(&store));
        let bootstrap = AccountBootstrap::new(Arc::clone(&store), config.plan.signup_bonus);
        let distribution = MonthlyDistribution::new(Arc::clone(&store));

        Self {
            store,
            ledger,
            quota,
            bootstrap,
            distribution,
            config,
        }
    }
}
