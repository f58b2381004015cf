//! Configuration for the avatar gateway
//!
//! Layered settings: `config/default.yaml`, then `config/{env}.yaml`, then
//! `AVATAR_GATEWAY__`-prefixed environment variables.

mod settings;

pub use settings::{
    load_settings, AssetPathsConfig, AssetStoreConfig, ChunkerConfig, EngineBackend,
    EnginesConfig, LlmConfig, Mode, ObservabilityConfig, PipelineConfig, Protocol, RenderConfig,
    ServerConfig, Settings, TransportConfig,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
