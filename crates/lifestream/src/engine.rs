//! Wiring a configured evolver and driver together.

use std::sync::Arc;

use lifestream_core::{
    Algorithm, AlgorithmSource, AlgorithmSwitch, CellState, ConfigurableEvolver, HashLifeEvolver,
    NaiveEvolver, NodeStore,
};

use crate::config::{Config, EngineConfig};
use crate::driver::{DriverOptions, PacingDriver};
use crate::error::Result;

/// A configurable evolver plus the handles needed to steer and observe it.
#[derive(Clone)]
pub struct Engine {
    switch: AlgorithmSwitch,
    evolver: Arc<ConfigurableEvolver>,
    store: Arc<NodeStore>,
}

impl Engine {
    pub fn new(config: &EngineConfig) -> Self {
        let hash_life = match config.max_cache_nodes {
            Some(max) => {
                HashLifeEvolver::with_store(Arc::new(NodeStore::bounded(config.rule, max)))
            }
            None => HashLifeEvolver::with_rule(config.rule),
        };
        let store = Arc::clone(hash_life.store());
        let switch = AlgorithmSwitch::new(config.algorithm);
        let evolver = ConfigurableEvolver::new(
            switch.clone(),
            NaiveEvolver::with_rule(config.rule),
            hash_life,
        );
        tracing::debug!(
            algorithm = %config.algorithm,
            rule = %config.rule,
            max_cache_nodes = ?config.max_cache_nodes,
            "engine built"
        );
        Self {
            switch,
            evolver: Arc::new(evolver),
            store,
        }
    }

    pub fn evolver(&self) -> &Arc<ConfigurableEvolver> {
        &self.evolver
    }

    /// Takes effect on the next evolver call, including one already queued.
    pub fn set_algorithm(&self, algorithm: Algorithm) {
        self.switch.set(algorithm);
    }

    pub fn switch(&self) -> &AlgorithmSwitch {
        &self.switch
    }

    pub fn store(&self) -> &Arc<NodeStore> {
        &self.store
    }

    /// Spawn a paused driver on `seed` with the config's pacing.
    pub fn spawn_driver(&self, config: &Config, seed: CellState) -> Result<PacingDriver> {
        let pacing = config.pacing.pacing()?;
        let options = DriverOptions {
            subscriber_buffer: config.pacing.subscriber_buffer,
            start_running: false,
            node_store: Some(Arc::clone(&self.store)),
        };
        let driver = PacingDriver::spawn_with(self.evolver.clone(), seed, pacing, options)?;
        Ok(driver)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("algorithm", &self.switch.current())
            .field("rule", &self.store.rule())
            .field("store", &self.store)
            .finish()
    }
}
