//! Failure types crossing stage boundaries.
//!
//! Stages return these as values; nothing unwinds across a stage's public
//! contract. Every variant carries the id of the failure record written for
//! it (the literal `unpersisted` when the record itself could not be saved)
//! and maps to a stable `error_type` tag callers can branch on without
//! string matching.

use crate::llm::client::TransportError;

/// Terminal failure of a single pipeline stage.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The transport client exhausted its attempts.
    #[error("text generation failed: {source}")]
    Transport {
        #[source]
        source: TransportError,
        record_id: String,
    },

    /// The model's output never satisfied the task schema.
    #[error("task output failed validation after {attempts} attempts: {detail}")]
    Schema {
        attempts: u32,
        detail: String,
        /// Bounded prefix of the last raw model output.
        raw_prefix: String,
        record_id: String,
    },

    /// The model explicitly declined via the refusal sentinel.
    #[error("model declined to generate code")]
    Refusal { record_id: String },
}

impl StageError {
    /// Stable category tag, distinct from the display message.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Schema { .. } => "schema",
            Self::Refusal { .. } => "refusal",
        }
    }

    /// Id of the diagnostic record written for this failure.
    pub fn record_id(&self) -> &str {
        match self {
            Self::Transport { record_id, .. }
            | Self::Schema { record_id, .. }
            | Self::Refusal { record_id } => record_id,
        }
    }
}

/// Failure of a whole pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The transcript was empty, a blank-audio sentinel, or otherwise unusable.
    /// Rejected before any network call.
    #[error("no usable audio in transcript")]
    NoAudio,

    #[error(transparent)]
    Stage(#[from] StageError),
}

impl PipelineError {
    /// Stable category tag for callers.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NoAudio => "no_audio",
            Self::Stage(e) => e.error_type(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_type_tags_are_stable() {
        let err = StageError::Refusal {
            record_id: "r1".into(),
        };
        assert_eq!(err.error_type(), "refusal");
        assert_eq!(err.record_id(), "r1");

        let err = StageError::Schema {
            attempts: 2,
            detail: "missing summary".into(),
            raw_prefix: "not json".into(),
            record_id: "r2".into(),
        };
        assert_eq!(err.error_type(), "schema");

        assert_eq!(PipelineError::NoAudio.error_type(), "no_audio");
        assert_eq!(
            PipelineError::Stage(StageError::Refusal {
                record_id: "r3".into()
            })
            .error_type(),
            "refusal"
        );
    }

    #[test]
    fn display_includes_attempts() {
        let err = StageError::Schema {
            attempts: 2,
            detail: "requirements out of range".into(),
            raw_prefix: String::new(),
            record_id: "r".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2 attempts"));
        assert!(msg.contains("requirements out of range"));
    }
}
