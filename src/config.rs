//! Pipeline configuration.
//!
//! Resolution order: hardcoded defaults, then a JSON settings file (if
//! present), then environment variables. The resolved value is immutable for
//! the life of the process and shared across concurrent runs behind an `Arc`.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Default generation endpoint (Ollama-compatible `/api/generate`).
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:11434/api/generate";

/// Fallback prompt for single-stage mode when none is configured.
const DEFAULT_MASTER_PROMPT: &str =
    "You are an expert programmer. Please generate the code for the following command:";

/// Process-wide pipeline settings, read once at start-up.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Text-generation endpoint URL.
    pub endpoint: String,
    /// Model used by the task clarifier (stage 1).
    pub clarifier_model: String,
    /// Model used by the code generator (stage 2).
    pub coder_model: String,
    /// Sampling temperature for both stages.
    pub temperature: f32,
    /// Per-exchange network timeout in seconds.
    pub timeout_secs: u64,
    /// Transport-level retries per exchange (total attempts = retries + 1).
    pub transport_retries: u32,
    /// Base delay before the first transport retry; doubles each retry.
    pub retry_base_delay_ms: u64,
    /// Semantic attempts for the clarifier (ceiling, not a guarantee).
    pub semantic_attempts: u32,
    /// Token budget for clarifier output.
    pub clarifier_max_tokens: u32,
    /// Token budget for generated code.
    pub coder_max_tokens: u32,
    /// Structured task mode; when false, a single exchange with the master
    /// prompt produces the code directly.
    pub dual_stage: bool,
    /// Prompt prefix for single-stage mode.
    pub master_prompt: String,
    /// Directory for failure records.
    pub log_dir: PathBuf,
    /// Path to the whisper-cli executable (external transcription).
    pub whisper_executable: Option<PathBuf>,
    /// Path to the whisper model file.
    pub whisper_model: Option<PathBuf>,
    /// Transcription language hint.
    pub language: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            clarifier_model: "codellama".to_string(),
            coder_model: "codellama".to_string(),
            temperature: 0.2,
            timeout_secs: 60,
            transport_retries: 2,
            retry_base_delay_ms: 1000,
            semantic_attempts: 2,
            clarifier_max_tokens: 512,
            coder_max_tokens: 1600,
            dual_stage: true,
            master_prompt: DEFAULT_MASTER_PROMPT.to_string(),
            log_dir: PathBuf::from("logs"),
            whisper_executable: None,
            whisper_model: None,
            language: "en".to_string(),
        }
    }
}

/// Optional overrides read from the settings file. Every field is optional so
/// a partial file only overrides what it names.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    ollama_endpoint: Option<String>,
    ollama_model: Option<String>,
    clarifier_model: Option<String>,
    coder_model: Option<String>,
    temperature: Option<f32>,
    timeout_seconds: Option<u64>,
    transport_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    llm_retry_count: Option<u32>,
    improver_max_tokens: Option<u32>,
    coder_max_tokens: Option<u32>,
    use_dual_stage: Option<bool>,
    master_prompt: Option<String>,
    log_dir: Option<PathBuf>,
    whisper_cpp_path: Option<PathBuf>,
    whisper_model_path: Option<PathBuf>,
    language: Option<String>,
}

impl PipelineConfig {
    /// Load configuration from `path` (or defaults when `None` / missing),
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = path {
            if path.exists() {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read settings from {}", path.display()))?;
                let file: FileSettings = serde_json::from_str(&contents)
                    .with_context(|| format!("failed to parse settings from {}", path.display()))?;
                config.apply_file(file);
                tracing::info!(path = %path.display(), "loaded settings file");
            } else {
                tracing::warn!(path = %path.display(), "settings file not found, using defaults");
            }
        }

        config.apply_env();
        Ok(config)
    }

    fn apply_file(&mut self, file: FileSettings) {
        if let Some(v) = file.ollama_endpoint {
            self.endpoint = v;
        }
        // A bare `ollama_model` sets both stages; stage-specific keys win.
        if let Some(v) = file.ollama_model {
            self.clarifier_model = v.clone();
            self.coder_model = v;
        }
        if let Some(v) = file.clarifier_model {
            self.clarifier_model = v;
        }
        if let Some(v) = file.coder_model {
            self.coder_model = v;
        }
        if let Some(v) = file.temperature {
            self.temperature = v;
        }
        if let Some(v) = file.timeout_seconds {
            self.timeout_secs = v;
        }
        if let Some(v) = file.transport_retries {
            self.transport_retries = v;
        }
        if let Some(v) = file.retry_base_delay_ms {
            self.retry_base_delay_ms = v;
        }
        if let Some(v) = file.llm_retry_count {
            self.semantic_attempts = v;
        }
        if let Some(v) = file.improver_max_tokens {
            self.clarifier_max_tokens = v;
        }
        if let Some(v) = file.coder_max_tokens {
            self.coder_max_tokens = v;
        }
        if let Some(v) = file.use_dual_stage {
            self.dual_stage = v;
        }
        if let Some(v) = file.master_prompt {
            self.master_prompt = v;
        }
        if let Some(v) = file.log_dir {
            self.log_dir = v;
        }
        if let Some(v) = file.whisper_cpp_path {
            self.whisper_executable = Some(v);
        }
        if let Some(v) = file.whisper_model_path {
            self.whisper_model = Some(v);
        }
        if let Some(v) = file.language {
            self.language = v;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = env::var("OLLAMA_ENDPOINT") {
            if !v.is_empty() {
                self.endpoint = v;
            }
        }
        if let Ok(v) = env::var("OLLAMA_MODEL") {
            if !v.is_empty() {
                self.clarifier_model = v.clone();
                self.coder_model = v;
            }
        }
        self.timeout_secs = env_parsed("OLLAMA_TIMEOUT_SECONDS", self.timeout_secs);
        self.transport_retries = env_parsed("LLM_TRANSPORT_RETRIES", self.transport_retries);
        self.semantic_attempts = env_parsed("LLM_RETRY_COUNT", self.semantic_attempts);
        self.clarifier_max_tokens = env_parsed("IMPROVER_MAX_TOKENS", self.clarifier_max_tokens);
        self.coder_max_tokens = env_parsed("CODER_MAX_TOKENS", self.coder_max_tokens);
        self.dual_stage = env_parsed("USE_DUAL_STAGE", self.dual_stage);
        if let Ok(v) = env::var("VOXCODER_LOG_DIR") {
            if !v.is_empty() {
                self.log_dir = PathBuf::from(v);
            }
        }
    }

    /// Network timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Base delay for the transport retry backoff.
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Parse an environment variable, falling back to `default` when unset or
/// unparseable.
fn env_parsed<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
