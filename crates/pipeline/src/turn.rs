//! Turn execution
//!
//! One `run_turn` call drives a whole user turn: transcription, dialogue
//! response, then the strictly sequential per-chunk synthesis loop. Events
//! go out through the sink in emission order; the lip-sync stage is
//! GPU-bound, so chunk `i + 1` never starts before chunk `i` has been
//! published.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::time::timeout;

use avatar_gateway_config::Settings;
use avatar_gateway_core::{
    ArtifactId, ArtifactKind, ChunkRecord, Complete, ErrorEvent, GatewayError, LlmResponse,
    Stage, Transcription, TurnEvent, TurnId, TurnPhase, VideoChunk,
};
use avatar_gateway_inference::{Engines, InferenceError, RenderOptions};
use avatar_gateway_store::{AssetStore, StoreError};

use crate::chunker;
use crate::history::DialogueHistory;
use crate::EventSink;

/// One accepted voice upload.
pub struct TurnRequest {
    pub turn_id: TurnId,
    pub audio: Bytes,
    pub language_hint: Option<String>,
    pub portrait_ref: String,
    pub voice_ref: String,
}

/// What a finished turn left behind.
pub struct TurnOutcome {
    pub turn_id: TurnId,
    pub phase: TurnPhase,
    pub transcript: Option<String>,
    pub response: Option<String>,
    pub chunks: Vec<ChunkRecord>,
    pub elapsed: Duration,
}

/// A synthesized clip: stored audio plus stored, stability-confirmed video.
pub struct Clip {
    pub audio_id: ArtifactId,
    pub video_id: ArtifactId,
    pub audio_duration_s: f64,
    pub video_duration_s: f64,
}

struct TurnContext {
    transcript: Option<String>,
    response: Option<String>,
    chunks: Vec<ChunkRecord>,
    artifacts: Vec<ArtifactId>,
}

/// Executes turns against one engine set and one asset store.
pub struct TurnPipeline {
    engines: Engines,
    store: Arc<AssetStore>,
    history: Arc<DialogueHistory>,
    settings: Arc<Settings>,
}

impl TurnPipeline {
    pub fn new(
        engines: Engines,
        store: Arc<AssetStore>,
        history: Arc<DialogueHistory>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            engines,
            store,
            history,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<AssetStore> {
        &self.store
    }

    /// Run one turn to a terminal phase, emitting events through `sink`.
    ///
    /// Never panics and never leaves the stream without a terminal event
    /// unless the client is already gone.
    pub async fn run_turn(&self, request: TurnRequest, sink: &mut dyn EventSink) -> TurnOutcome {
        let started = Instant::now();
        let mut ctx = TurnContext {
            transcript: None,
            response: None,
            chunks: Vec::new(),
            artifacts: Vec::new(),
        };

        let phase = match self.drive(&request, sink, started, &mut ctx).await {
            Ok(()) => TurnPhase::Complete,
            Err(GatewayError::ClientDisconnect) => {
                tracing::info!(turn = %request.turn_id, "client disconnected, turn aborted");
                TurnPhase::Aborted
            }
            Err(err) => {
                tracing::error!(turn = %request.turn_id, %err, "turn failed");
                let event = TurnEvent::Error(ErrorEvent {
                    error: err.to_string(),
                    kind: err.kind().as_str().to_string(),
                });
                if let Err(emit_err) = sink.emit(event).await {
                    tracing::warn!(turn = %request.turn_id, %emit_err, "error event not delivered");
                }
                TurnPhase::Failed
            }
        };

        // Published artifacts outlive the turn by the configured grace so
        // the client can finish fetching them.
        let grace = Duration::from_secs(self.settings.asset_store.eviction_grace_secs);
        for id in &ctx.artifacts {
            self.store.mark_expendable(id, grace);
        }

        tracing::info!(
            turn = %request.turn_id,
            phase = %phase,
            chunks = ctx.chunks.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "turn finished"
        );

        TurnOutcome {
            turn_id: request.turn_id.clone(),
            phase,
            transcript: ctx.transcript,
            response: ctx.response,
            chunks: ctx.chunks,
            elapsed: started.elapsed(),
        }
    }

    async fn drive(
        &self,
        request: &TurnRequest,
        sink: &mut dyn EventSink,
        started: Instant,
        ctx: &mut TurnContext,
    ) -> Result<(), GatewayError> {
        let turn_id = &request.turn_id;
        ensure_open(sink)?;

        // ASR
        tracing::debug!(turn = %turn_id, phase = %TurnPhase::Transcribing, "phase transition");
        let asr_started = Instant::now();
        let asr_budget = Duration::from_millis(self.settings.pipeline.asr_timeout_ms);
        let transcription = timed(
            Stage::Asr,
            asr_budget,
            self.engines
                .asr
                .transcribe(&request.audio, request.language_hint.as_deref()),
        )
        .await?;
        let language = transcription.detected_language.clone();
        ctx.transcript = Some(transcription.text.clone());

        sink.emit(TurnEvent::Transcription(Transcription {
            text: transcription.text.clone(),
            language: language.clone(),
            time: asr_started.elapsed().as_secs_f64(),
        }))
        .await?;

        // LLM; the one recoverable stage
        ensure_open(sink)?;
        tracing::debug!(turn = %turn_id, phase = %TurnPhase::Reasoning, "phase transition");
        let history = self.history.snapshot();
        let llm_budget = Duration::from_millis(self.settings.pipeline.llm_timeout_ms);
        let response = match timed(
            Stage::Llm,
            llm_budget,
            self.engines.llm.respond(
                &transcription.text,
                &history,
                &self.settings.llm.system_prompt,
            ),
        )
        .await
        {
            Ok(text) => text,
            Err(err) if self.settings.llm.fallback_enabled => {
                tracing::warn!(turn = %turn_id, %err, "llm failed, using fallback response");
                self.settings.llm.fallback_text.clone()
            }
            Err(err) => return Err(err),
        };
        ctx.response = Some(response.clone());

        sink.emit(TurnEvent::LlmResponse(LlmResponse {
            text: response.clone(),
        }))
        .await?;

        // Chunk loop
        tracing::debug!(turn = %turn_id, phase = %TurnPhase::Streaming, "phase transition");
        let fragments = chunker::split(&response, &self.settings.chunker);
        tracing::info!(turn = %turn_id, fragments = fragments.len(), "response chunked");

        for (index, fragment) in fragments.iter().enumerate() {
            ensure_open(sink)?;
            let chunk_started = Instant::now();
            let generation_start_s = started.elapsed().as_secs_f64();

            let clip = self
                .generate_clip(fragment, &language, &request.portrait_ref, &request.voice_ref)
                .await?;
            ctx.artifacts.push(clip.audio_id.clone());
            ctx.artifacts.push(clip.video_id.clone());

            let chunk_time = chunk_started.elapsed().as_secs_f64();
            sink.emit(TurnEvent::VideoChunk(VideoChunk {
                chunk_index: index as u32,
                video_url: format!("/videos/{}", clip.video_id),
                text_chunk: fragment.clone(),
                chunk_time,
                audio_duration_s: clip.audio_duration_s,
                video_duration_s: clip.video_duration_s,
            }))
            .await?;

            ctx.chunks.push(ChunkRecord {
                turn_id: turn_id.clone(),
                index: index as u32,
                text: fragment.clone(),
                audio_artifact: clip.audio_id,
                video_artifact: clip.video_id,
                generation_start_s,
                generation_end_s: started.elapsed().as_secs_f64(),
                audio_duration_s: clip.audio_duration_s,
                video_duration_s: clip.video_duration_s,
            });
        }

        sink.emit(TurnEvent::Complete(Complete {
            total_time: started.elapsed().as_secs_f64(),
            chunk_count: fragments.len() as u32,
        }))
        .await?;

        // History is written only on completion.
        if let (Some(user), Some(assistant)) = (&ctx.transcript, &ctx.response) {
            self.history.record_exchange(user, assistant);
        }

        Ok(())
    }

    /// Synthesize one utterance: TTS, store audio, lip-sync, store video,
    /// confirm the video stable. The returned clip is publishable.
    pub async fn generate_clip(
        &self,
        text: &str,
        language: &str,
        portrait_ref: &str,
        voice_ref: &str,
    ) -> Result<Clip, GatewayError> {
        let tts_budget = Duration::from_millis(self.settings.pipeline.tts_timeout_ms);
        let synthesis = timed(
            Stage::Tts,
            tts_budget,
            self.engines.tts.synthesize(text, voice_ref, language),
        )
        .await?;

        let audio_artifact = self
            .store
            .put(&synthesis.audio, ArtifactKind::Audio)
            .await
            .map_err(storage_error)?;

        let render = RenderOptions {
            fps: self.settings.render.fps,
            resolution: self.settings.render.resolution,
            diffusion_steps: self.settings.render.diffusion_steps,
        };
        let lipsync_budget = Duration::from_millis(self.settings.pipeline.lipsync_timeout_ms);
        let animation = timed(
            Stage::LipSync,
            lipsync_budget,
            self.engines
                .lipsync
                .animate(&synthesis.audio, portrait_ref, &render),
        )
        .await?;

        let video_artifact = self
            .store
            .put(&animation.video, ArtifactKind::Video)
            .await
            .map_err(storage_error)?;
        self.store
            .confirm_stable_default(&video_artifact.id)
            .await
            .map_err(storage_error)?;

        Ok(Clip {
            audio_id: audio_artifact.id.clone(),
            video_id: video_artifact.id.clone(),
            audio_duration_s: synthesis.duration_s,
            video_duration_s: animation.duration_s,
        })
    }

    /// Single-shot synthesis for the non-streaming endpoint: one clip from
    /// text, already scheduled for eviction after the grace period.
    pub async fn render_utterance(
        &self,
        text: &str,
        language: &str,
        portrait_ref: &str,
        voice_ref: &str,
    ) -> Result<Clip, GatewayError> {
        let clip = self
            .generate_clip(text, language, portrait_ref, voice_ref)
            .await?;
        let grace = Duration::from_secs(self.settings.asset_store.eviction_grace_secs);
        self.store.mark_expendable(&clip.audio_id, grace);
        self.store.mark_expendable(&clip.video_id, grace);
        Ok(clip)
    }
}

fn ensure_open(sink: &dyn EventSink) -> Result<(), GatewayError> {
    if sink.is_open() {
        Ok(())
    } else {
        Err(GatewayError::ClientDisconnect)
    }
}

/// Apply the stage budget and map adapter errors onto the taxonomy.
async fn timed<T>(
    stage: Stage,
    budget: Duration,
    call: impl Future<Output = Result<T, InferenceError>>,
) -> Result<T, GatewayError> {
    match timeout(budget, call).await {
        Err(_) => Err(GatewayError::AdapterTimeout {
            stage,
            timeout_ms: budget.as_millis() as u64,
        }),
        Ok(Err(InferenceError::Timeout(ms))) => Err(GatewayError::AdapterTimeout {
            stage,
            timeout_ms: if ms > 0 {
                ms
            } else {
                budget.as_millis() as u64
            },
        }),
        Ok(Err(err)) => Err(GatewayError::AdapterFailure {
            stage,
            message: err.to_string(),
        }),
        Ok(Ok(value)) => Ok(value),
    }
}

fn storage_error(err: StoreError) -> GatewayError {
    GatewayError::Storage(err.to_string())
}
