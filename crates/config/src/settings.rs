//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Execution mode. Production tightens transport validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Local,
    Production,
}

impl Default for Mode {
    fn default() -> Self {
        Self::Local
    }
}

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Execution mode
    #[serde(default)]
    pub mode: Mode,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Utterance chunker configuration
    #[serde(default)]
    pub chunker: ChunkerConfig,

    /// Pipeline stage timeouts
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Asset store configuration
    #[serde(default)]
    pub asset_store: AssetStoreConfig,

    /// Inference engine selection
    #[serde(default)]
    pub engines: EnginesConfig,

    /// Language model behavior
    #[serde(default)]
    pub llm: LlmConfig,

    /// Lip-sync render options
    #[serde(default)]
    pub render: RenderConfig,

    /// Reference asset locations
    #[serde(default)]
    pub assets: AssetPathsConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunker.max_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chunker.max_chars".to_string(),
                message: "must be positive".to_string(),
            });
        }

        if self.chunker.first_chunk_hard_limit < self.chunker.max_chars {
            return Err(ConfigError::InvalidValue {
                field: "chunker.first_chunk_hard_limit".to_string(),
                message: format!(
                    "must be >= chunker.max_chars ({})",
                    self.chunker.max_chars
                ),
            });
        }

        // SSE holds one connection per turn open; the browser's per-origin
        // HTTP/1.1 connection limit then starves video requests.
        if self.mode == Mode::Production && self.transport.protocol == Protocol::Http1 {
            return Err(ConfigError::InvalidValue {
                field: "transport.protocol".to_string(),
                message: "http1 is not allowed in production; use h2 or h2c".to_string(),
            });
        }

        if self.transport.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "transport.workers".to_string(),
                message: "at least one worker is required".to_string(),
            });
        }

        if self.asset_store.stable_size_poll_ms == 0
            || self.asset_store.stable_size_budget_ms < self.asset_store.stable_size_poll_ms
        {
            return Err(ConfigError::InvalidValue {
                field: "asset_store.stable_size_budget_ms".to_string(),
                message: "budget must cover at least one poll interval".to_string(),
            });
        }

        for (field, value) in [
            ("pipeline.asr_timeout_ms", self.pipeline.asr_timeout_ms),
            ("pipeline.llm_timeout_ms", self.pipeline.llm_timeout_ms),
            ("pipeline.tts_timeout_ms", self.pipeline.tts_timeout_ms),
            ("pipeline.lipsync_timeout_ms", self.pipeline.lipsync_timeout_ms),
        ] {
            if value < 1000 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: "stage timeout below 1000 ms is unrealistic".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins (empty = any, for local development)
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Languages accepted as upload hints and passed to the engines
    #[serde(default = "default_supported_languages")]
    pub supported_languages: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_true() -> bool {
    true
}
fn default_max_upload_bytes() -> usize {
    // ~30 s of 48 kHz opus-in-webm with headroom
    8 * 1024 * 1024
}
fn default_supported_languages() -> Vec<String> {
    vec!["en".to_string(), "zh-cn".to_string(), "es".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
            supported_languages: default_supported_languages(),
        }
    }
}

/// Wire protocol the transport negotiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Clear-text HTTP/2 (prior knowledge), for internal deployments
    H2c,
    /// TLS-terminated HTTP/2 (termination in front of the gateway)
    H2,
    /// HTTP/1.1, local development only
    Http1,
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Negotiated protocol; must be h2 or h2c in production
    #[serde(default = "default_protocol")]
    pub protocol: Protocol,

    /// Request-handling worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_protocol() -> Protocol {
    Protocol::H2c
}
fn default_workers() -> usize {
    4
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            workers: default_workers(),
        }
    }
}

/// Utterance chunker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Hard cap for fragments at index >= 1
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Hard cap for fragment 0 after first-chunk buffering
    #[serde(default = "default_first_chunk_hard_limit")]
    pub first_chunk_hard_limit: usize,

    /// Abbreviations whose trailing period is not a sentence boundary
    #[serde(default = "default_abbreviations")]
    pub abbreviations: Vec<String>,
}

fn default_max_chars() -> usize {
    120
}
fn default_first_chunk_hard_limit() -> usize {
    125
}
fn default_abbreviations() -> Vec<String> {
    [
        "Mr.", "Mrs.", "Ms.", "Dr.", "Jr.", "Sr.", "D.C.", "U.S.", "U.K.", "e.g.", "i.e.",
        "etc.", "vs.",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            first_chunk_hard_limit: default_first_chunk_hard_limit(),
            abbreviations: default_abbreviations(),
        }
    }
}

/// Pipeline stage timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_asr_timeout_ms")]
    pub asr_timeout_ms: u64,

    #[serde(default = "default_llm_timeout_ms")]
    pub llm_timeout_ms: u64,

    /// Per chunk
    #[serde(default = "default_tts_timeout_ms")]
    pub tts_timeout_ms: u64,

    /// Per chunk
    #[serde(default = "default_lipsync_timeout_ms")]
    pub lipsync_timeout_ms: u64,
}

fn default_asr_timeout_ms() -> u64 {
    30_000
}
fn default_llm_timeout_ms() -> u64 {
    60_000
}
fn default_tts_timeout_ms() -> u64 {
    30_000
}
fn default_lipsync_timeout_ms() -> u64 {
    60_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            asr_timeout_ms: default_asr_timeout_ms(),
            llm_timeout_ms: default_llm_timeout_ms(),
            tts_timeout_ms: default_tts_timeout_ms(),
            lipsync_timeout_ms: default_lipsync_timeout_ms(),
        }
    }
}

/// Asset store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetStoreConfig {
    /// Directory artifacts are written to
    #[serde(default = "default_store_root")]
    pub root_dir: String,

    /// Size-stability poll interval
    #[serde(default = "default_stable_size_poll_ms")]
    pub stable_size_poll_ms: u64,

    /// Total budget for a stability check
    #[serde(default = "default_stable_size_budget_ms")]
    pub stable_size_budget_ms: u64,

    /// How long artifacts outlive their turn's completion
    #[serde(default = "default_eviction_grace_secs")]
    pub eviction_grace_secs: u64,

    /// Background eviction sweep interval
    #[serde(default = "default_eviction_sweep_secs")]
    pub eviction_sweep_secs: u64,
}

fn default_store_root() -> String {
    "/tmp/avatar-gateway-artifacts".to_string()
}
fn default_stable_size_poll_ms() -> u64 {
    100
}
fn default_stable_size_budget_ms() -> u64 {
    2_000
}
fn default_eviction_grace_secs() -> u64 {
    300
}
fn default_eviction_sweep_secs() -> u64 {
    60
}

impl Default for AssetStoreConfig {
    fn default() -> Self {
        Self {
            root_dir: default_store_root(),
            stable_size_poll_ms: default_stable_size_poll_ms(),
            stable_size_budget_ms: default_stable_size_budget_ms(),
            eviction_grace_secs: default_eviction_grace_secs(),
            eviction_sweep_secs: default_eviction_sweep_secs(),
        }
    }
}

/// Which engine implementations to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineBackend {
    /// Remote GPU sidecar service over HTTP
    Http,
    /// Deterministic fixtures for development and tests
    Canned,
}

/// Inference engine selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnginesConfig {
    #[serde(default = "default_engine_backend")]
    pub backend: EngineBackend,

    /// Base URL of the GPU sidecar service (http backend)
    #[serde(default = "default_service_url")]
    pub service_url: String,

    /// Budget for the startup health probe
    #[serde(default = "default_healthcheck_timeout_ms")]
    pub healthcheck_timeout_ms: u64,
}

fn default_engine_backend() -> EngineBackend {
    EngineBackend::Http
}
fn default_service_url() -> String {
    "http://localhost:8001".to_string()
}
fn default_healthcheck_timeout_ms() -> u64 {
    5_000
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            backend: default_engine_backend(),
            service_url: default_service_url(),
            healthcheck_timeout_ms: default_healthcheck_timeout_ms(),
        }
    }
}

/// Language model behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Recover LLM failures with the canned response below
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,

    /// Response used when the LLM fails and fallback is enabled
    #[serde(default = "default_fallback_text")]
    pub fallback_text: String,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Response length budget passed to the engine
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: u32,

    /// Dialogue turns retained per session
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

fn default_fallback_text() -> String {
    "Sorry, I could not come up with an answer just now. Could you say that again?".to_string()
}
fn default_system_prompt() -> String {
    "You are a helpful and friendly assistant. Keep your responses concise \
     (2-4 sentences) and conversational. Be natural, warm, and engaging."
        .to_string()
}
fn default_max_response_tokens() -> u32 {
    150
}
fn default_history_turns() -> usize {
    20
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            fallback_enabled: default_true(),
            fallback_text: default_fallback_text(),
            system_prompt: default_system_prompt(),
            max_response_tokens: default_max_response_tokens(),
            history_turns: default_history_turns(),
        }
    }
}

/// Lip-sync render options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Square output resolution in pixels
    #[serde(default = "default_resolution")]
    pub resolution: u32,

    #[serde(default = "default_diffusion_steps")]
    pub diffusion_steps: u32,
}

fn default_fps() -> u32 {
    25
}
fn default_resolution() -> u32 {
    360
}
fn default_diffusion_steps() -> u32 {
    10
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            resolution: default_resolution(),
            diffusion_steps: default_diffusion_steps(),
        }
    }
}

/// Reference asset locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetPathsConfig {
    /// Directory of reference portrait images
    #[serde(default = "default_portraits_dir")]
    pub portraits_dir: String,

    /// Directory of reference voice samples
    #[serde(default = "default_voices_dir")]
    pub voices_dir: String,

    /// Portrait used when the request names none
    #[serde(default = "default_portrait")]
    pub default_portrait: String,

    /// Voice sample used when the request names none
    #[serde(default = "default_voice")]
    pub default_voice: String,
}

fn default_portraits_dir() -> String {
    "assets/portraits".to_string()
}
fn default_voices_dir() -> String {
    "assets/voices".to_string()
}
fn default_portrait() -> String {
    "neutral.jpg".to_string()
}
fn default_voice() -> String {
    "reference_en.wav".to_string()
}

impl Default for AssetPathsConfig {
    fn default() -> Self {
        Self {
            portraits_dir: default_portraits_dir(),
            voices_dir: default_voices_dir(),
            default_portrait: default_portrait(),
            default_voice: default_voice(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Enable tracing
    #[serde(default = "default_true")]
    pub tracing_enabled: bool,

    /// OTLP endpoint for traces
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// Enable metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            tracing_enabled: true,
            otlp_endpoint: None,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (AVATAR_GATEWAY_ prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("AVATAR_GATEWAY")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
