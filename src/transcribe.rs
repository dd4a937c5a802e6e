//! External speech-to-text collaborator.
//!
//! Transcription is an opaque synchronous exchange with a whisper.cpp style
//! command-line binary: it writes a `<audio>.json` sidecar next to the input
//! file, we read the segments out of it and clean up. Failures surface as
//! errors here; the pipeline's transcript gate handles the empty-text case.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::config::PipelineConfig;

/// Anything that can turn an audio file into text.
pub trait Transcriber {
    fn transcribe(&self, audio: &Path) -> Result<String>;
}

/// Transcription via an external `whisper-cli` executable.
#[derive(Debug, Clone)]
pub struct WhisperCli {
    executable: PathBuf,
    model: PathBuf,
    language: String,
}

impl WhisperCli {
    pub fn new(executable: PathBuf, model: PathBuf, language: String) -> Self {
        Self {
            executable,
            model,
            language,
        }
    }

    /// Build from configuration; `None` when no executable is configured.
    pub fn from_config(config: &PipelineConfig) -> Option<Self> {
        let executable = config.whisper_executable.clone()?;
        let model = config.whisper_model.clone()?;
        Some(Self::new(executable, model, config.language.clone()))
    }
}

impl Transcriber for WhisperCli {
    fn transcribe(&self, audio: &Path) -> Result<String> {
        tracing::info!(
            executable = %self.executable.display(),
            audio = %audio.display(),
            "running whisper transcription"
        );

        let output = Command::new(&self.executable)
            .arg("--model")
            .arg(&self.model)
            .arg("--file")
            .arg(audio)
            .arg("--output-json")
            .arg("--language")
            .arg(&self.language)
            .output()
            .with_context(|| format!("failed to run {}", self.executable.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "whisper-cli exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }

        // The executable writes its result to a sidecar JSON file.
        let sidecar = sidecar_path(audio);
        let contents = std::fs::read_to_string(&sidecar)
            .with_context(|| format!("missing transcription output {}", sidecar.display()))?;
        let text = parse_sidecar(&contents)
            .with_context(|| format!("malformed transcription output {}", sidecar.display()))?;

        if let Err(err) = std::fs::remove_file(&sidecar) {
            tracing::warn!(path = %sidecar.display(), error = %err, "failed to remove sidecar");
        }

        Ok(text)
    }
}

fn sidecar_path(audio: &Path) -> PathBuf {
    let mut os = audio.as_os_str().to_os_string();
    os.push(".json");
    PathBuf::from(os)
}

#[derive(Debug, Deserialize)]
struct Sidecar {
    #[serde(default)]
    transcription: Vec<Segment>,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Segment {
    text: String,
}

/// Join segment texts; fall back to a top-level `text` field for engines
/// that emit the flat shape.
fn parse_sidecar(contents: &str) -> Result<String> {
    let sidecar: Sidecar = serde_json::from_str(contents)?;

    let joined = sidecar
        .transcription
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if !joined.is_empty() {
        return Ok(joined);
    }
    Ok(sidecar.text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_joined_in_order() {
        let json = r#"{"transcription": [
            {"text": " make a function "},
            {"text": "that adds "},
            {"text": "two numbers"}
        ]}"#;
        assert_eq!(
            parse_sidecar(json).unwrap(),
            "make a function that adds two numbers"
        );
    }

    #[test]
    fn flat_text_field_fallback() {
        let json = r#"{"text": "  sort a list  "}"#;
        assert_eq!(parse_sidecar(json).unwrap(), "sort a list");
    }

    #[test]
    fn empty_transcription_yields_empty_text() {
        assert_eq!(parse_sidecar(r#"{"transcription": []}"#).unwrap(), "");
        assert_eq!(parse_sidecar("{}").unwrap(), "");
    }

    #[test]
    fn malformed_sidecar_is_an_error() {
        assert!(parse_sidecar("{not json").is_err());
    }

    #[test]
    fn sidecar_path_appends_json() {
        assert_eq!(
            sidecar_path(Path::new("/tmp/clip.wav")),
            PathBuf::from("/tmp/clip.wav.json")
        );
    }

    #[test]
    fn from_config_requires_both_paths() {
        let mut config = PipelineConfig::default();
        assert!(WhisperCli::from_config(&config).is_none());

        config.whisper_executable = Some(PathBuf::from("/opt/whisper/whisper-cli"));
        assert!(WhisperCli::from_config(&config).is_none());

        config.whisper_model = Some(PathBuf::from("/opt/whisper/ggml-base.bin"));
        let cli = WhisperCli::from_config(&config).unwrap();
        assert_eq!(cli.language, "en");
    }
}
