//! Inference engine adapters
//!
//! Narrow capability interfaces over the external ASR, LLM, TTS, and
//! lip-sync engines. The gateway only ever sees these traits; concrete
//! engines are selected by configuration:
//! - `http`: a GPU sidecar service reached over HTTP
//! - `canned`: deterministic fixtures for development and tests

mod canned;
mod http;
mod traits;

pub use canned::{CannedAsr, CannedLipSync, CannedLlm, CannedTts};
pub use http::{HttpAsr, HttpLipSync, HttpLlm, HttpTts, SidecarClient};
pub use traits::{
    AnimationResult, AsrEngine, LipSyncEngine, LlmEngine, RenderOptions, SynthesisResult,
    TranscriptionResult, TtsEngine,
};

use std::sync::Arc;
use std::time::Duration;

use avatar_gateway_config::{EngineBackend, Settings};
use thiserror::Error;

/// Inference adapter errors
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),

    #[error("engine call timed out after {0} ms")]
    Timeout(u64),

    #[error("model error: {0}")]
    Model(String),

    #[error("engine transport error: {0}")]
    Transport(String),

    #[error("engine not ready")]
    NotReady,
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // The precise budget lives with the caller; reqwest only tells
            // us the deadline passed.
            Self::Timeout(0)
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// The four engines a turn needs, behind trait objects.
#[derive(Clone)]
pub struct Engines {
    pub asr: Arc<dyn AsrEngine>,
    pub llm: Arc<dyn LlmEngine>,
    pub tts: Arc<dyn TtsEngine>,
    pub lipsync: Arc<dyn LipSyncEngine>,
}

impl Engines {
    /// Build the engine set selected by configuration.
    pub fn from_settings(settings: &Settings) -> Result<Self, InferenceError> {
        match settings.engines.backend {
            EngineBackend::Http => {
                let base = settings.engines.service_url.clone();
                Ok(Self {
                    asr: Arc::new(HttpAsr::new(
                        &base,
                        Duration::from_millis(settings.pipeline.asr_timeout_ms),
                    )?),
                    llm: Arc::new(HttpLlm::new(
                        &base,
                        Duration::from_millis(settings.pipeline.llm_timeout_ms),
                        settings.llm.max_response_tokens,
                    )?),
                    tts: Arc::new(HttpTts::new(
                        &base,
                        Duration::from_millis(settings.pipeline.tts_timeout_ms),
                    )?),
                    lipsync: Arc::new(HttpLipSync::new(
                        &base,
                        Duration::from_millis(settings.pipeline.lipsync_timeout_ms),
                    )?),
                })
            }
            EngineBackend::Canned => Ok(Self::canned_default()),
        }
    }

    /// Deterministic fixture set used by tests and local development.
    pub fn canned_default() -> Self {
        Self {
            asr: Arc::new(CannedAsr::new("Say something interesting.", "en")),
            llm: Arc::new(CannedLlm::responding(
                "Hi there. I am glad you asked; let me tell you about it.",
            )),
            tts: Arc::new(CannedTts::new()),
            lipsync: Arc::new(CannedLipSync::new()),
        }
    }

    /// Probe every engine once; Ok means all report ready.
    pub async fn healthcheck(&self) -> Result<(), InferenceError> {
        self.asr.ready().await?;
        self.llm.ready().await?;
        self.tts.ready().await?;
        self.lipsync.ready().await?;
        Ok(())
    }
}
