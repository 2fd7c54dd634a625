//! Hedera Health ID core library
//!
//! Patient-record service for hospitals, doctors and patients: the record
//! store, authentication, dashboard statistics, the USSD menu and the
//! blockchain facade, exposed over an actix-web API.

use std::sync::Arc;

pub mod api;
pub mod auth;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod telemetry;

use crate::auth::TokenService;
use crate::config::Settings;
use crate::db::Store;
use crate::ledger::{Ledger, LedgerMirror, SimulatedLedger};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub store: Arc<dyn Store>,
    pub tokens: TokenService,
    pub ledger: Arc<dyn Ledger>,
    pub mirror: LedgerMirror,
}

impl AppState {
    /// State backed by the simulated ledger.
    pub fn new(config: Settings, store: Arc<dyn Store>) -> Self {
        let ledger: Arc<dyn Ledger> = Arc::new(SimulatedLedger::new(config.ledger.clone()));
        Self::with_ledger(config, store, ledger)
    }

    pub fn with_ledger(config: Settings, store: Arc<dyn Store>, ledger: Arc<dyn Ledger>) -> Self {
        let tokens = TokenService::from_config(&config.auth);
        let mirror = LedgerMirror::new(Arc::clone(&ledger), config.ledger.enabled);
        Self {
            config: Arc::new(config),
            store,
            tokens,
            ledger,
            mirror,
        }
    }
}
