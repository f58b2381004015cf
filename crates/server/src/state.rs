//! Application State
//!
//! Shared state across all handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use avatar_gateway_config::Settings;
use avatar_gateway_inference::Engines;
use avatar_gateway_pipeline::{DialogueHistory, TurnPipeline};
use avatar_gateway_store::{AssetStore, StoreError};

use crate::turns::TurnRegistry;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration
    pub settings: Arc<Settings>,
    /// Asset store
    pub store: Arc<AssetStore>,
    /// Turn pipeline
    pub pipeline: Arc<TurnPipeline>,
    /// Live turn registry
    pub turns: Arc<TurnRegistry>,
    /// Set once the engine health probe succeeds
    pub models_loaded: Arc<AtomicBool>,
}

impl AppState {
    /// Create application state around a prepared engine set.
    pub async fn build(settings: Settings, engines: Engines) -> Result<Self, StoreError> {
        let settings = Arc::new(settings);
        let store = Arc::new(
            AssetStore::open(
                &settings.asset_store.root_dir,
                Duration::from_millis(settings.asset_store.stable_size_poll_ms),
                Duration::from_millis(settings.asset_store.stable_size_budget_ms),
            )
            .await?,
        );
        let history = Arc::new(DialogueHistory::new(settings.llm.history_turns));
        let pipeline = Arc::new(TurnPipeline::new(
            engines,
            store.clone(),
            history,
            settings.clone(),
        ));

        Ok(Self {
            settings,
            store,
            pipeline,
            turns: Arc::new(TurnRegistry::new()),
            models_loaded: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn set_models_loaded(&self, loaded: bool) {
        self.models_loaded.store(loaded, Ordering::Release);
    }

    pub fn are_models_loaded(&self) -> bool {
        self.models_loaded.load(Ordering::Acquire)
    }
}
