//! Pipeline orchestrator: transcript -> task -> code.
//!
//! Sequences the two stages, short-circuiting on terminal failure: stage 2
//! is never invoked unless stage 1 produced a valid task. Each `run` call
//! uses only request-scoped state, so a shared `Pipeline` can serve
//! concurrent runs without interleaving retry bookkeeping; the configuration
//! is immutable and shared behind an `Arc`.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use crate::clarify::{TaskClarifier, TaskDescription};
use crate::config::PipelineConfig;
use crate::diagnostics::FailureRecorder;
use crate::error::{PipelineError, StageError};
use crate::generate::{tidy_artifact, CodeGenerator};
use crate::llm::client::{HttpClient, TransportError};
use crate::llm::{response, strip, GenerationRequest, TextGen};
use crate::transcript;

/// Per-stage wall-clock timings for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Timings {
    pub clarify_ms: u64,
    pub generate_ms: u64,
    pub total_ms: u64,
}

/// Result of a successful run. `task` is absent in single-stage mode.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskDescription>,
    pub code: String,
    pub timings: Timings,
}

/// The dual-stage generation pipeline.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    client: Arc<dyn TextGen>,
    recorder: FailureRecorder,
}

impl Pipeline {
    /// Build a pipeline talking HTTP to the configured endpoint.
    pub fn new(config: Arc<PipelineConfig>) -> Result<Self, TransportError> {
        let client = Arc::new(HttpClient::new(&config)?);
        Ok(Self::with_client(config, client))
    }

    /// Build a pipeline over an explicit backend (mock backends in tests).
    pub fn with_client(config: Arc<PipelineConfig>, client: Arc<dyn TextGen>) -> Self {
        let recorder = FailureRecorder::new(config.log_dir.clone());
        Self {
            config,
            client,
            recorder,
        }
    }

    /// Run one transcript through the pipeline.
    ///
    /// Runs are independent: no state survives between calls.
    pub async fn run(&self, transcript_text: &str) -> Result<PipelineOutput, PipelineError> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();

        if !transcript::is_usable(transcript_text) {
            tracing::info!(%run_id, "transcript rejected before generation");
            return Err(PipelineError::NoAudio);
        }

        if !self.config.dual_stage {
            return self.run_single_stage(run_id, transcript_text, started).await;
        }

        tracing::info!(%run_id, transcript = transcript_text, "starting dual-stage run");

        let clarify_start = Instant::now();
        let task = TaskClarifier::new(self.client.as_ref(), &self.config, &self.recorder)
            .clarify(transcript_text)
            .await?;
        let clarify_ms = clarify_start.elapsed().as_millis() as u64;
        tracing::debug!(%run_id, clarify_ms, summary = %task.summary, "task clarified");

        let generate_start = Instant::now();
        let code = CodeGenerator::new(self.client.as_ref(), &self.config, &self.recorder)
            .generate(task.clone())
            .await?;
        let generate_ms = generate_start.elapsed().as_millis() as u64;

        let total_ms = started.elapsed().as_millis() as u64;
        tracing::info!(%run_id, clarify_ms, generate_ms, total_ms, "run complete");

        Ok(PipelineOutput {
            task: Some(task),
            code,
            timings: Timings {
                clarify_ms,
                generate_ms,
                total_ms,
            },
        })
    }

    /// Single-stage mode: one exchange with the master prompt, no task
    /// object.
    async fn run_single_stage(
        &self,
        run_id: Uuid,
        transcript_text: &str,
        started: Instant,
    ) -> Result<PipelineOutput, PipelineError> {
        tracing::info!(%run_id, "starting single-stage run");

        let request = GenerationRequest {
            model: self.config.coder_model.clone(),
            system: None,
            prompt: format!("{}\n\n{}", self.config.master_prompt, transcript_text),
            temperature: self.config.temperature,
            max_tokens: self.config.coder_max_tokens,
            timeout: self.config.timeout(),
        };

        let generate_start = Instant::now();
        let body = match self.client.generate(&request).await {
            Ok(body) => body,
            Err(err) => {
                let record_id = self.recorder.record(
                    transcript_text,
                    "",
                    "transport failure in single-stage mode",
                );
                return Err(StageError::Transport {
                    source: err,
                    record_id,
                }
                .into());
            }
        };

        let text = match response::normalize(&body) {
            Some(text) => text,
            None => {
                let record_id = self
                    .recorder
                    .record(transcript_text, "", "empty model output");
                return Err(StageError::Schema {
                    attempts: 1,
                    detail: "empty model output".into(),
                    raw_prefix: String::new(),
                    record_id,
                }
                .into());
            }
        };

        let code = tidy_artifact(&strip::strip(&text));
        let generate_ms = generate_start.elapsed().as_millis() as u64;
        let total_ms = started.elapsed().as_millis() as u64;
        tracing::info!(%run_id, generate_ms, total_ms, "single-stage run complete");

        Ok(PipelineOutput {
            task: None,
            code,
            timings: Timings {
                clarify_ms: 0,
                generate_ms,
                total_ms,
            },
        })
    }
}
