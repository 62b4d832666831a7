use std::collections::BTreeMap;
use std::sync::Arc;

use rand::{rngs::StdRng, SeedableRng};
use tokio::sync::RwLock;

use crate::{config::Config, models::MusicAgent, services::recommendations::RecommenderManager};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<RwLock<AppStateInner>>,
    pub config: Arc<Config>,
}

/// Inner state that can be modified
pub struct AppStateInner {
    pub manager: RecommenderManager,
    pub agents: BTreeMap<String, MusicAgent>,
    /// Drives every agent decision taken through the API
    pub rng: StdRng,
}

impl AppState {
    /// Creates state around a loaded recommender with no registered agents
    pub fn new(manager: RecommenderManager, config: Config) -> Self {
        let rng = StdRng::seed_from_u64(config.simulation_seed);
        Self {
            inner: Arc::new(RwLock::new(AppStateInner {
                manager,
                agents: BTreeMap::new(),
                rng,
            })),
            config: Arc::new(config),
        }
    }
}
