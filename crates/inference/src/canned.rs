//! Canned engines
//!
//! Deterministic fixtures standing in for the real inference engines.
//! Used by the test suites and by local development without a GPU sidecar.
//! Delays and scripted failures make pipeline timing and failure policy
//! testable.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use avatar_gateway_core::DialogueTurn;

use crate::traits::{
    AnimationResult, AsrEngine, LipSyncEngine, LlmEngine, RenderOptions, SynthesisResult,
    TranscriptionResult, TtsEngine,
};
use crate::InferenceError;

const CANNED_SAMPLE_RATE: u32 = 8_000;
const SECONDS_PER_CHAR: f64 = 0.06;

/// ASR fixture returning a fixed transcript.
pub struct CannedAsr {
    text: String,
    language: String,
    delay: Duration,
    fail: bool,
}

impl CannedAsr {
    pub fn new(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
            delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fixture that always fails with a model error.
    pub fn failing() -> Self {
        Self {
            text: String::new(),
            language: "en".into(),
            delay: Duration::ZERO,
            fail: true,
        }
    }
}

#[async_trait]
impl AsrEngine for CannedAsr {
    async fn transcribe(
        &self,
        audio: &[u8],
        language_hint: Option<&str>,
    ) -> Result<TranscriptionResult, InferenceError> {
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(InferenceError::Model("canned asr failure".into()));
        }
        if audio.is_empty() {
            return Err(InferenceError::UnsupportedFormat("empty audio".into()));
        }
        Ok(TranscriptionResult {
            text: self.text.clone(),
            detected_language: language_hint.unwrap_or(&self.language).to_string(),
            confidence: 0.97,
        })
    }
}

/// LLM fixture returning a fixed response, or always failing.
pub struct CannedLlm {
    response: Option<String>,
    delay: Duration,
}

impl CannedLlm {
    pub fn responding(text: impl Into<String>) -> Self {
        Self {
            response: Some(text.into()),
            delay: Duration::ZERO,
        }
    }

    pub fn failing() -> Self {
        Self {
            response: None,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl LlmEngine for CannedLlm {
    async fn respond(
        &self,
        _user_text: &str,
        _history: &[DialogueTurn],
        _system_prompt: &str,
    ) -> Result<String, InferenceError> {
        tokio::time::sleep(self.delay).await;
        match &self.response {
            Some(text) => Ok(text.clone()),
            None => Err(InferenceError::Model("canned llm failure".into())),
        }
    }
}

/// TTS fixture producing silent WAV audio sized to the input text.
pub struct CannedTts {
    delay: Duration,
}

impl CannedTts {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for CannedTts {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TtsEngine for CannedTts {
    async fn synthesize(
        &self,
        text: &str,
        _voice_ref: &str,
        _language: &str,
    ) -> Result<SynthesisResult, InferenceError> {
        tokio::time::sleep(self.delay).await;
        let duration_s = (text.chars().count() as f64 * SECONDS_PER_CHAR).max(0.2);
        Ok(SynthesisResult {
            audio: Bytes::from(silent_wav(duration_s)),
            sample_rate: CANNED_SAMPLE_RATE,
            duration_s,
        })
    }
}

/// Lip-sync fixture producing fast-start-shaped MP4 bytes.
pub struct CannedLipSync {
    delay: Duration,
    /// 0-based call index that fails, for failure-policy tests.
    fail_on_call: Option<u32>,
    calls: AtomicU32,
}

impl CannedLipSync {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            fail_on_call: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the `index`-th animate call (0-based); earlier calls succeed.
    pub fn failing_on_call(mut self, index: u32) -> Self {
        self.fail_on_call = Some(index);
        self
    }
}

impl Default for CannedLipSync {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LipSyncEngine for CannedLipSync {
    async fn animate(
        &self,
        audio: &[u8],
        _portrait_ref: &str,
        options: &RenderOptions,
    ) -> Result<AnimationResult, InferenceError> {
        tokio::time::sleep(self.delay).await;

        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_call == Some(call) {
            return Err(InferenceError::Model(format!(
                "canned lipsync failure on call {call}"
            )));
        }

        let duration_s = wav_duration_s(audio);
        let frame_count = (duration_s * options.fps as f64).round() as u32;
        Ok(AnimationResult {
            video: Bytes::from(fast_start_mp4(duration_s)),
            duration_s,
            frame_count,
        })
    }
}

/// A minimal RIFF/WAVE container holding silence.
fn silent_wav(duration_s: f64) -> Vec<u8> {
    let data_len = (duration_s * CANNED_SAMPLE_RATE as f64) as u32 * 2;
    let mut wav = Vec::with_capacity(44 + data_len as usize);

    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&CANNED_SAMPLE_RATE.to_le_bytes());
    wav.extend_from_slice(&(CANNED_SAMPLE_RATE * 2).to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.resize(44 + data_len as usize, 0);
    wav
}

/// Duration of a canned WAV; falls back to a byte-rate guess for anything
/// that is not one.
fn wav_duration_s(audio: &[u8]) -> f64 {
    if audio.len() > 44 && audio.starts_with(b"RIFF") {
        (audio.len() - 44) as f64 / (CANNED_SAMPLE_RATE as f64 * 2.0)
    } else {
        (audio.len() as f64 / 16_000.0).max(0.2)
    }
}

/// Bytes shaped like a fast-start MP4: `ftyp`, then `moov`, then `mdat`.
/// Not decodable video, but box order and sizes are structurally valid so
/// range and progressive-download behavior can be exercised.
fn fast_start_mp4(duration_s: f64) -> Vec<u8> {
    let mdat_payload = ((duration_s * 24_000.0) as usize).max(256);
    let mut mp4 = Vec::with_capacity(mdat_payload + 64);

    // ftyp box
    mp4.extend_from_slice(&20u32.to_be_bytes());
    mp4.extend_from_slice(b"ftyp");
    mp4.extend_from_slice(b"isom");
    mp4.extend_from_slice(&0u32.to_be_bytes());
    mp4.extend_from_slice(b"mp41");

    // moov box (stub metadata before the media data)
    mp4.extend_from_slice(&16u32.to_be_bytes());
    mp4.extend_from_slice(b"moov");
    mp4.extend_from_slice(&(duration_s.to_bits()).to_be_bytes());

    // mdat box
    mp4.extend_from_slice(&(8 + mdat_payload as u32).to_be_bytes());
    mp4.extend_from_slice(b"mdat");
    mp4.extend(std::iter::repeat(0xA5).take(mdat_payload));
    mp4
}
