//! Engine capability traits

use async_trait::async_trait;
use bytes::Bytes;

use avatar_gateway_core::DialogueTurn;

use crate::InferenceError;

/// ASR output.
#[derive(Debug, Clone)]
pub struct TranscriptionResult {
    pub text: String,
    pub detected_language: String,
    /// Language detection confidence, 0.0 - 1.0.
    pub confidence: f32,
}

/// TTS output.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub audio: Bytes,
    pub sample_rate: u32,
    pub duration_s: f64,
}

/// Lip-sync output. The video container is fast-start MP4 (`moov` before
/// `mdat`) so partial downloads are immediately playable.
#[derive(Debug, Clone)]
pub struct AnimationResult {
    pub video: Bytes,
    pub duration_s: f64,
    pub frame_count: u32,
}

/// Lip-sync render options.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub fps: u32,
    pub resolution: u32,
    pub diffusion_steps: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            fps: 25,
            resolution: 360,
            diffusion_steps: 10,
        }
    }
}

/// Speech recognition.
#[async_trait]
pub trait AsrEngine: Send + Sync {
    async fn transcribe(
        &self,
        audio: &[u8],
        language_hint: Option<&str>,
    ) -> Result<TranscriptionResult, InferenceError>;

    /// Readiness probe; the default assumes an always-ready local engine.
    async fn ready(&self) -> Result<(), InferenceError> {
        Ok(())
    }
}

/// Dialogue response generation.
#[async_trait]
pub trait LlmEngine: Send + Sync {
    async fn respond(
        &self,
        user_text: &str,
        history: &[DialogueTurn],
        system_prompt: &str,
    ) -> Result<String, InferenceError>;

    async fn ready(&self) -> Result<(), InferenceError> {
        Ok(())
    }
}

/// Voice-cloned speech synthesis.
#[async_trait]
pub trait TtsEngine: Send + Sync {
    /// `voice_ref` names a short reference sample for voice cloning.
    async fn synthesize(
        &self,
        text: &str,
        voice_ref: &str,
        language: &str,
    ) -> Result<SynthesisResult, InferenceError>;

    async fn ready(&self) -> Result<(), InferenceError> {
        Ok(())
    }
}

/// Lip-synced portrait animation.
#[async_trait]
pub trait LipSyncEngine: Send + Sync {
    async fn animate(
        &self,
        audio: &[u8],
        portrait_ref: &str,
        options: &RenderOptions,
    ) -> Result<AnimationResult, InferenceError>;

    async fn ready(&self) -> Result<(), InferenceError> {
        Ok(())
    }
}
