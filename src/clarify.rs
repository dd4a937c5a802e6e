//! Stage 1 — task clarification.
//!
//! Turns a raw transcript into a validated [`TaskDescription`] via a
//! semantic retry loop: the first attempt uses the full instruction with a
//! worked example, every later attempt swaps in a stricter corrective
//! instruction. This loop sits on top of the transport client's own retry
//! loop, so worst case the network sees semantic_attempts x
//! transport_attempts exchanges.

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::diagnostics::FailureRecorder;
use crate::error::StageError;
use crate::llm::{response, strip, GenerationRequest, TextGen};

/// Upper bound on task requirements.
pub const MAX_REQUIREMENTS: usize = 7;

/// Characters of raw model output kept in a `StageError::Schema`.
const RAW_PREFIX_CHARS: usize = 100;

/// Primary system instruction: describes the required JSON shape with one
/// worked example.
pub const CLARIFIER_SYSTEM_PROMPT: &str = "\
You are an assistant that converts raw transcribed user speech into a clear, unambiguous JSON \
task object for a code generator. Output EXACTLY one JSON object with keys: summary, \
requirements, constraints, example_io (optional). Do not produce any additional text.

Example Input: \"make a function that downloads s3 files and unzip them\"

Example Output: {\"summary\": \"Downloads files from S3 and unzips them.\", \"requirements\": \
[\"Create a function that takes a bucket name and a list of file keys as input.\", \
\"Download the files from S3.\", \"Unzip the downloaded files.\"], \"constraints\": \
[\"Handle errors gracefully.\"]}";

/// Corrective instruction for every semantic retry.
pub const CORRECTIVE_SYSTEM_PROMPT: &str = "Output EXACTLY one JSON object and nothing else.";

/// The structured contract between the two stages. Produced and owned by
/// stage 1, handed to stage 2 by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescription {
    pub summary: String,
    pub requirements: Vec<String>,
    pub constraints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_io: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, thiserror::Error)]
pub enum TaskValidationError {
    #[error("requirements must contain 1 to 7 entries, got {0}")]
    RequirementsOutOfRange(usize),
}

impl TaskDescription {
    /// Enforce the invariants deserialization alone cannot express.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        let count = self.requirements.len();
        if count == 0 || count > MAX_REQUIREMENTS {
            return Err(TaskValidationError::RequirementsOutOfRange(count));
        }
        Ok(())
    }
}

/// Stage 1 driver.
pub struct TaskClarifier<'a> {
    client: &'a dyn TextGen,
    config: &'a PipelineConfig,
    recorder: &'a FailureRecorder,
}

impl<'a> TaskClarifier<'a> {
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

    /// Convert a transcript into a validated task object, or a terminal
    /// stage failure with its diagnostic record id.
    pub async fn clarify(&self, transcript: &str) -> Result<TaskDescription, StageError> {
        let attempts = self.config.semantic_attempts.max(1);
        let mut last_raw = String::new();
        let mut last_detail = String::new();
        let mut last_transport = None;

        for attempt in 1..=attempts {
            let system = if attempt == 1 {
                CLARIFIER_SYSTEM_PROMPT
            } else {
                CORRECTIVE_SYSTEM_PROMPT
            };

            let request = GenerationRequest {
                model: self.config.clarifier_model.clone(),
                system: Some(system.to_string()),
                prompt: transcript.to_string(),
                temperature: self.config.temperature,
                max_tokens: self.config.clarifier_max_tokens,
                timeout: self.config.timeout(),
            };

            match self.client.generate(&request).await {
                Err(err) => {
                    tracing::warn!(attempt, attempts, error = %err, "clarifier exchange failed");
                    last_detail = err.to_string();
                    last_raw.clear();
                    last_transport = Some(err);
                }
                Ok(body) => {
                    last_transport = None;
                    let text = response::normalize(&body).unwrap_or_default();
                    last_raw = text.clone();

                    match parse_task(&strip::strip(&text)) {
                        Ok(task) => {
                            tracing::debug!(attempt, "clarifier produced a valid task");
                            return Ok(task);
                        }
                        Err(detail) => {
                            tracing::warn!(attempt, attempts, %detail, "clarifier output rejected");
                            last_detail = detail;
                        }
                    }
                }
            }
        }

        let record_id = self.recorder.record(transcript, &last_raw, &last_detail);
        match last_transport {
            Some(source) => Err(StageError::Transport { source, record_id }),
            None => Err(StageError::Schema {
                attempts,
                detail: last_detail,
                raw_prefix: truncate_chars(&last_raw, RAW_PREFIX_CHARS),
                record_id,
            }),
        }
    }
}

/// Parse cleaned model output into a task, then validate it. The error is a
/// human-readable detail for the failure record.
fn parse_task(cleaned: &str) -> Result<TaskDescription, String> {
    let task: TaskDescription = serde_json::from_str(cleaned)
        .map_err(|e| format!("output is not a valid task object: {e}"))?;
    task.validate().map_err(|e| e.to_string())?;
    Ok(task)
}

/// Char-boundary-safe prefix.
fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::TransportError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Backend that replays a script of responses and records the requests
    /// it saw.
    struct ScriptedGen {
        script: Mutex<VecDeque<Result<String, TransportError>>>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedGen {
        fn new(script: Vec<Result<String, TransportError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request(&self, index: usize) -> GenerationRequest {
            self.requests.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl TextGen for ScriptedGen {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, TransportError> {
            self.requests.lock().unwrap().push(request.clone());
            self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
                Err(TransportError::Api {
                    status: 500,
                    message: "script exhausted".into(),
                })
            })
        }
    }

    fn valid_task_body() -> String {
        r#"{"response": "{\"summary\": \"Adds two numbers.\", \"requirements\": [\"Take two parameters.\"], \"constraints\": []}"}"#
            .to_string()
    }

    fn fixture(dir: &TempDir) -> (PipelineConfig, FailureRecorder) {
        let config = PipelineConfig::default();
        let recorder = FailureRecorder::new(dir.path().join("logs"));
        (config, recorder)
    }

    #[test]
    fn one_requirement_is_valid() {
        let task = TaskDescription {
            summary: "s".into(),
            requirements: vec!["r".into()],
            constraints: vec![],
            example_io: None,
        };
        assert!(task.validate().is_ok());
    }

    #[test]
    fn seven_requirements_is_valid_eight_is_not() {
        let mut task = TaskDescription {
            summary: "s".into(),
            requirements: (0..7).map(|i| format!("r{i}")).collect(),
            constraints: vec![],
            example_io: None,
        };
        assert!(task.validate().is_ok());

        task.requirements.push("r7".into());
        assert!(task.validate().is_err());
    }

    #[test]
    fn zero_requirements_is_invalid() {
        let task = TaskDescription {
            summary: "s".into(),
            requirements: vec![],
            constraints: vec![],
            example_io: None,
        };
        assert!(task.validate().is_err());
    }

    #[test]
    fn missing_required_keys_fail_to_parse() {
        assert!(parse_task(r#"{"summary": "s", "constraints": []}"#).is_err());
        assert!(parse_task(r#"{"summary": "s", "requirements": ["r"]}"#).is_err());
        assert!(parse_task("not json").is_err());
    }

    #[test]
    fn example_io_is_optional() {
        let task =
            parse_task(r#"{"summary": "s", "requirements": ["r"], "constraints": []}"#).unwrap();
        assert!(task.example_io.is_none());

        let task = parse_task(
            r#"{"summary": "s", "requirements": ["r"], "constraints": [], "example_io": {"input": "1 2", "output": "3"}}"#,
        )
        .unwrap();
        assert!(task.example_io.is_some());
    }

    #[test]
    fn truncate_is_char_boundary_safe() {
        let text = "é".repeat(200);
        let prefix = truncate_chars(&text, 100);
        assert_eq!(prefix.chars().count(), 100);
    }

    #[test]
    fn prompts_are_distinct() {
        assert!(CLARIFIER_SYSTEM_PROMPT.contains("Example Input"));
        assert_ne!(CLARIFIER_SYSTEM_PROMPT, CORRECTIVE_SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn clarify_succeeds_first_attempt() {
        let dir = TempDir::new().unwrap();
        let (config, recorder) = fixture(&dir);
        let gen = ScriptedGen::new(vec![Ok(valid_task_body())]);

        let task = TaskClarifier::new(&gen, &config, &recorder)
            .clarify("make a function that adds two numbers")
            .await
            .unwrap();

        assert_eq!(task.summary, "Adds two numbers.");
        assert_eq!(gen.calls(), 1);
        assert_eq!(
            gen.request(0).system.as_deref(),
            Some(CLARIFIER_SYSTEM_PROMPT)
        );
    }

    #[tokio::test]
    async fn retry_uses_corrective_prompt() {
        let dir = TempDir::new().unwrap();
        let (config, recorder) = fixture(&dir);
        let gen = ScriptedGen::new(vec![
            Ok(r#"{"response": "sure! here you go"}"#.into()),
            Ok(valid_task_body()),
        ]);

        let task = TaskClarifier::new(&gen, &config, &recorder)
            .clarify("add two numbers")
            .await
            .unwrap();

        assert_eq!(task.requirements.len(), 1);
        assert_eq!(gen.calls(), 2);
        assert_eq!(
            gen.request(1).system.as_deref(),
            Some(CORRECTIVE_SYSTEM_PROMPT)
        );
    }

    #[tokio::test]
    async fn fenced_task_json_is_accepted() {
        let dir = TempDir::new().unwrap();
        let (config, recorder) = fixture(&dir);
        let inner = r#"{\"summary\": \"s\", \"requirements\": [\"r\"], \"constraints\": []}"#;
        let body = format!(r#"{{"response": "```json\n{inner}\n```"}}"#);
        let gen = ScriptedGen::new(vec![Ok(body)]);

        let task = TaskClarifier::new(&gen, &config, &recorder)
            .clarify("whatever")
            .await
            .unwrap();
        assert_eq!(task.summary, "s");
    }

    #[tokio::test]
    async fn exhaustion_writes_record_and_bounds_prefix() {
        let dir = TempDir::new().unwrap();
        let (config, recorder) = fixture(&dir);
        let long_garbage = "x".repeat(500);
        let gen = ScriptedGen::new(vec![
            Ok(format!(r#"{{"response": "{long_garbage}"}}"#)),
            Ok(format!(r#"{{"response": "{long_garbage}"}}"#)),
        ]);

        let err = TaskClarifier::new(&gen, &config, &recorder)
            .clarify("do something")
            .await
            .unwrap_err();

        assert_eq!(gen.calls(), 2);
        match err {
            StageError::Schema {
                attempts,
                raw_prefix,
                record_id,
                ..
            } => {
                assert_eq!(attempts, 2);
                assert_eq!(raw_prefix.chars().count(), 100);
                assert!(dir.path().join("logs").join(&record_id).exists());
            }
            other => panic!("expected schema failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_failure_consumes_semantic_attempts() {
        let dir = TempDir::new().unwrap();
        let (config, recorder) = fixture(&dir);
        let gen = ScriptedGen::new(vec![]); // script exhausted -> every call errors

        let err = TaskClarifier::new(&gen, &config, &recorder)
            .clarify("do something")
            .await
            .unwrap_err();

        assert_eq!(gen.calls(), 2);
        assert_eq!(err.error_type(), "transport");
    }

    #[tokio::test]
    async fn transport_failure_then_recovery() {
        let dir = TempDir::new().unwrap();
        let (config, recorder) = fixture(&dir);
        let gen = ScriptedGen::new(vec![
            Err(TransportError::Api {
                status: 503,
                message: "unavailable".into(),
            }),
            Ok(valid_task_body()),
        ]);

        let task = TaskClarifier::new(&gen, &config, &recorder)
            .clarify("add numbers")
            .await
            .unwrap();
        assert_eq!(task.summary, "Adds two numbers.");
    }
}
