//! Wallet ledger and review-driven reputation for a bounty marketplace.
//!
//! The core lives in [`ledger`] and [`reputation`]; both talk to storage
//! only through the traits in [`db`]. [`routes`] exposes them over HTTP.

use std::sync::Arc;

use chrono::Duration;

pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod reputation;
pub mod routes;

use config::Config;
use db::{LedgerStore, ReviewStore, UserStore};
use ledger::{FeeSchedule, LedgerService, Settlement};
use reputation::{badge::default_catalogue, ReputationPolicy, ReputationService};
use routes::auth::AuthService;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub ledger: Arc<LedgerService>,
    pub reputation: Arc<ReputationService>,
}

/// Knobs for [`AppState::new`]; usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub jwt_secret: String,
    pub currency: String,
    pub fees: FeeSchedule,
    pub policy: ReputationPolicy,
    pub edit_window: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            jwt_secret: "your-jwt-secret".to_string(),
            currency: "CNY".to_string(),
            fees: FeeSchedule::none(),
            policy: ReputationPolicy::default(),
            edit_window: Duration::hours(24),
        }
    }
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            currency: config.default_currency.clone(),
            fees: config.fees.clone(),
            policy: config.reputation_policy,
            edit_window: config.review_edit_window(),
        }
    }
}

impl AppState {
    /// Wires the services over one store that backs users, the ledger and reviews.
    pub fn new<S>(store: Arc<S>, settlement: Arc<dyn Settlement>, settings: Settings) -> Self
    where
        S: UserStore + LedgerStore + ReviewStore + 'static,
    {
        let ledger = Arc::new(LedgerService::new(
            store.clone(),
            settlement,
            settings.fees,
            settings.currency,
        ));
        let reputation = Arc::new(ReputationService::new(
            store.clone(),
            settings.policy,
            default_catalogue(),
            settings.edit_window,
        ));
        let auth = Arc::new(AuthService::new(store, ledger.clone(), settings.jwt_secret));
        Self { auth, ledger, reputation }
    }
}
