//! Stage 2 — code generation.
//!
//! Serializes the task object into a single user message and asks for raw
//! source text. One semantic attempt only: a bad artifact is a generator
//! quality issue, not a prompt-shape issue, so there is no corrective loop
//! here — just full transport retry underneath, then deterministic
//! post-processing.

use crate::clarify::TaskDescription;
use crate::config::PipelineConfig;
use crate::diagnostics::FailureRecorder;
use crate::error::StageError;
use crate::llm::{response, strip, GenerationRequest, TextGen};

/// Token the model emits (alone, on one line) when it cannot satisfy the
/// output contract.
pub const REFUSAL_SENTINEL: &str = "UNSUPPORTED_REQUEST";

/// System instruction for the code generator.
pub const CODER_SYSTEM_PROMPT: &str = "\
You are a precise software engineer. You receive a JSON task object describing a coding task. \
Produce only the raw source code that completes the task. DO NOT use markdown fences, backticks, \
syntax highlighting tags, or commentary. If the task cannot be completed as specified, output \
exactly UNSUPPORTED_REQUEST on a single line and nothing else.";

/// Stage 2 driver.
pub struct CodeGenerator<'a> {
    client: &'a dyn TextGen,
    config: &'a PipelineConfig,
    recorder: &'a FailureRecorder,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(
        client: &'a dyn TextGen,
        config: &'a PipelineConfig,
        recorder: &'a FailureRecorder,
    ) -> Self {
        Self {
            client,
            config,
            recorder,
        }
    }

    /// Produce the final code artifact for a validated task.
    ///
    /// The task is taken by value; stage 2 never mutates it.
    pub async fn generate(&self, task: TaskDescription) -> Result<String, StageError> {
        let task_json =
            serde_json::to_string(&task).expect("a TaskDescription always serializes");

        let request = GenerationRequest {
            model: self.config.coder_model.clone(),
            system: Some(CODER_SYSTEM_PROMPT.to_string()),
            prompt: task_json.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.coder_max_tokens,
            timeout: self.config.timeout(),
        };

        let body = match self.client.generate(&request).await {
            Ok(body) => body,
            Err(err) => {
                tracing::error!(error = %err, "code generation transport failed");
                let record_id =
                    self.recorder
                        .record(&task_json, "", "transport failure during code generation");
                return Err(StageError::Transport {
                    source: err,
                    record_id,
                });
            }
        };

        let text = match response::normalize(&body) {
            Some(text) => text,
            None => {
                let record_id = self.recorder.record(&task_json, "", "empty model output");
                return Err(StageError::Schema {
                    attempts: 1,
                    detail: "empty model output".into(),
                    raw_prefix: String::new(),
                    record_id,
                });
            }
        };

        let cleaned = strip::strip(&text);
        if cleaned.trim() == REFUSAL_SENTINEL {
            tracing::warn!("model declined the task");
            let record_id = self
                .recorder
                .record(&task_json, &text, "model emitted the refusal sentinel");
            return Err(StageError::Refusal { record_id });
        }

        Ok(tidy_artifact(&repair_legacy_print(&cleaned)))
    }
}

/// Rewrite legacy print-statement lines into call form.
///
/// Line-oriented on purpose: a line whose first token is `print` followed by
/// an argument (and not already a call) becomes `print(<rest>)`, indentation
/// preserved. Multi-line statements are left alone.
pub(crate) fn repair_legacy_print(code: &str) -> String {
    code.lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let indent = &line[..line.len() - trimmed.len()];
            if let Some(rest) = trimmed.strip_prefix("print ") {
                let rest = rest.trim();
                if !rest.is_empty() && !rest.starts_with('(') {
                    return format!("{indent}print({rest})");
                }
            }
            line.to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Normalize the artifact's framing: no leading or trailing blank lines and
/// exactly one trailing line break.
pub(crate) fn tidy_artifact(code: &str) -> String {
    let body = code.trim_start_matches(['\n', '\r']).trim_end();
    format!("{body}\n")
}
