//! HTTP engines backed by a GPU sidecar service
//!
//! The sidecar exposes one endpoint per capability plus `/health`. Audio
//! uploads travel as multipart form data; media responses come back as raw
//! bytes with duration metadata in response headers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, StatusCode};
use serde::{Deserialize, Serialize};

use avatar_gateway_core::DialogueTurn;

use crate::traits::{
    AnimationResult, AsrEngine, LipSyncEngine, LlmEngine, RenderOptions, SynthesisResult,
    TranscriptionResult, TtsEngine,
};
use crate::InferenceError;

const HEADER_DURATION: &str = "x-duration-seconds";
const HEADER_SAMPLE_RATE: &str = "x-sample-rate";
const HEADER_FRAME_COUNT: &str = "x-frame-count";

/// Shared plumbing for one sidecar endpoint family.
#[derive(Clone)]
pub struct SidecarClient {
    base_url: String,
    client: Client,
    timeout_ms: u64,
}

impl SidecarClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, InferenceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn classify(&self, err: reqwest::Error) -> InferenceError {
        if err.is_timeout() {
            InferenceError::Timeout(self.timeout_ms)
        } else {
            InferenceError::Transport(err.to_string())
        }
    }

    async fn check_status(
        &self,
        resp: reqwest::Response,
    ) -> Result<reqwest::Response, InferenceError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        match status {
            StatusCode::UNSUPPORTED_MEDIA_TYPE | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(InferenceError::UnsupportedFormat(body))
            }
            StatusCode::SERVICE_UNAVAILABLE => Err(InferenceError::NotReady),
            _ => Err(InferenceError::Model(format!("{status}: {body}"))),
        }
    }

    /// Probe `/health` and verify the named model is loaded.
    pub async fn probe(&self, model: &str) -> Result<(), InferenceError> {
        let resp = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        let resp = self.check_status(resp).await?;

        let health: SidecarHealth = resp.json().await.map_err(|e| self.classify(e))?;
        if health.models.get(model).copied().unwrap_or(false) {
            Ok(())
        } else {
            tracing::warn!(model, status = %health.status, "sidecar model not loaded");
            Err(InferenceError::NotReady)
        }
    }
}

#[derive(Debug, Deserialize)]
struct SidecarHealth {
    status: String,
    #[serde(default)]
    models: std::collections::HashMap<String, bool>,
}

fn header_f64(resp: &reqwest::Response, name: &str) -> Result<f64, InferenceError> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| InferenceError::Model(format!("sidecar response missing {name}")))
}

fn header_u32(resp: &reqwest::Response, name: &str) -> Result<u32, InferenceError> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| InferenceError::Model(format!("sidecar response missing {name}")))
}

/// Remote speech recognition.
pub struct HttpAsr {
    sidecar: SidecarClient,
}

impl HttpAsr {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, InferenceError> {
        Ok(Self {
            sidecar: SidecarClient::new(base_url, timeout)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: String,
    language: String,
    #[serde(default)]
    confidence: f32,
}

#[async_trait]
impl AsrEngine for HttpAsr {
    async fn transcribe(
        &self,
        audio: &[u8],
        language_hint: Option<&str>,
    ) -> Result<TranscriptionResult, InferenceError> {
        let part = multipart::Part::bytes(audio.to_vec())
            .file_name("clip.webm")
            .mime_str("application/octet-stream")
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        let mut form = multipart::Form::new().part("file", part);
        if let Some(lang) = language_hint {
            form = form.text("language", lang.to_string());
        }

        let resp = self
            .sidecar
            .client
            .post(self.sidecar.url("/asr/transcribe"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.sidecar.classify(e))?;
        let resp = self.sidecar.check_status(resp).await?;

        let body: TranscribeResponse = resp.json().await.map_err(|e| self.sidecar.classify(e))?;
        Ok(TranscriptionResult {
            text: body.text,
            detected_language: body.language,
            confidence: body.confidence,
        })
    }

    async fn ready(&self) -> Result<(), InferenceError> {
        self.sidecar.probe("asr").await
    }
}

/// Remote dialogue model.
pub struct HttpLlm {
    sidecar: SidecarClient,
    max_tokens: u32,
}

impl HttpLlm {
    pub fn new(base_url: &str, timeout: Duration, max_tokens: u32) -> Result<Self, InferenceError> {
        Ok(Self {
            sidecar: SidecarClient::new(base_url, timeout)?,
            max_tokens,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    text: String,
}

#[async_trait]
impl LlmEngine for HttpLlm {
    async fn respond(
        &self,
        user_text: &str,
        history: &[DialogueTurn],
        system_prompt: &str,
    ) -> Result<String, InferenceError> {
        let mut messages: Vec<ChatMessage> = history
            .iter()
            .map(|t| ChatMessage {
                role: match t.role {
                    avatar_gateway_core::DialogueRole::User => "user",
                    avatar_gateway_core::DialogueRole::Assistant => "assistant",
                },
                content: &t.text,
            })
            .collect();
        messages.push(ChatMessage {
            role: "user",
            content: user_text,
        });

        let req = ChatRequest {
            system: system_prompt,
            messages,
            max_tokens: self.max_tokens,
            stream: false,
        };

        let resp = self
            .sidecar
            .client
            .post(self.sidecar.url("/llm/chat"))
            .json(&req)
            .send()
            .await
            .map_err(|e| self.sidecar.classify(e))?;
        let resp = self.sidecar.check_status(resp).await?;

        let body: ChatResponse = resp.json().await.map_err(|e| self.sidecar.classify(e))?;
        Ok(body.text)
    }

    async fn ready(&self) -> Result<(), InferenceError> {
        self.sidecar.probe("llm").await
    }
}

/// Remote voice-cloned synthesis.
pub struct HttpTts {
    sidecar: SidecarClient,
}

impl HttpTts {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, InferenceError> {
        Ok(Self {
            sidecar: SidecarClient::new(base_url, timeout)?,
        })
    }
}

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    language: &'a str,
    speaker_ref: &'a str,
}

#[async_trait]
impl TtsEngine for HttpTts {
    async fn synthesize(
        &self,
        text: &str,
        voice_ref: &str,
        language: &str,
    ) -> Result<SynthesisResult, InferenceError> {
        let req = SynthesizeRequest {
            text,
            language,
            speaker_ref: voice_ref,
        };

        let resp = self
            .sidecar
            .client
            .post(self.sidecar.url("/tts/synthesize"))
            .json(&req)
            .send()
            .await
            .map_err(|e| self.sidecar.classify(e))?;
        let resp = self.sidecar.check_status(resp).await?;

        let duration_s = header_f64(&resp, HEADER_DURATION)?;
        let sample_rate = header_u32(&resp, HEADER_SAMPLE_RATE)?;
        let audio = resp.bytes().await.map_err(|e| self.sidecar.classify(e))?;

        Ok(SynthesisResult {
            audio,
            sample_rate,
            duration_s,
        })
    }

    async fn ready(&self) -> Result<(), InferenceError> {
        self.sidecar.probe("tts").await
    }
}

/// Remote lip-sync renderer.
pub struct HttpLipSync {
    sidecar: SidecarClient,
}

impl HttpLipSync {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, InferenceError> {
        Ok(Self {
            sidecar: SidecarClient::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl LipSyncEngine for HttpLipSync {
    async fn animate(
        &self,
        audio: &[u8],
        portrait_ref: &str,
        options: &RenderOptions,
    ) -> Result<AnimationResult, InferenceError> {
        let part = multipart::Part::bytes(audio.to_vec())
            .file_name("speech.wav")
            .mime_str("audio/wav")
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        let form = multipart::Form::new()
            .part("audio", part)
            .text("portrait", portrait_ref.to_string())
            .text("fps", options.fps.to_string())
            .text("resolution", options.resolution.to_string())
            .text("diffusion_steps", options.diffusion_steps.to_string());

        let resp = self
            .sidecar
            .client
            .post(self.sidecar.url("/lipsync/animate"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.sidecar.classify(e))?;
        let resp = self.sidecar.check_status(resp).await?;

        let duration_s = header_f64(&resp, HEADER_DURATION)?;
        let frame_count = header_u32(&resp, HEADER_FRAME_COUNT)?;
        let video = resp.bytes().await.map_err(|e| self.sidecar.classify(e))?;

        Ok(AnimationResult {
            video,
            duration_s,
            frame_count,
        })
    }

    async fn ready(&self) -> Result<(), InferenceError> {
        self.sidecar.probe("lipsync").await
    }
}
