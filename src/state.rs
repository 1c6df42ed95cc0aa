use std::{sync::Arc, time::Instant};

use axum::extract::FromRef;

use crate::{cache::FilterCache, config::Config, jobs::ServeLedger, store::Store, utils::jwt::TokenService};

/// Request-independent context handed to every handler and service.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Config,
    pub filters: FilterCache,
    pub ledger: ServeLedger,
    pub tokens: TokenService,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: Config, filters: FilterCache, ledger: ServeLedger) -> Self {
        let tokens = TokenService::new(&config);
        Self {
            store,
            config,
            filters,
            ledger,
            tokens,
            started_at: Instant::now(),
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for TokenService {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}
