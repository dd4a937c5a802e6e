//! Failure records for offline inspection.
//!
//! When a stage exhausts its attempts, the input and raw model output are
//! persisted to a write-once text record in the diagnostics directory. The
//! directory is created on demand. Recording never propagates an error: if
//! the write fails, the stage still gets an id — the literal `unpersisted` —
//! and the failure is logged.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Record id returned when the record itself could not be written.
pub const UNPERSISTED: &str = "unpersisted";

/// Appends failure records to a diagnostics directory.
#[derive(Debug, Clone)]
pub struct FailureRecorder {
    dir: PathBuf,
}

impl FailureRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Persist a failure record and return its id.
    ///
    /// The id combines a time component with a content-derived hash so
    /// concurrent failures do not overwrite each other.
    pub fn record(&self, input: &str, raw_output: &str, condition: &str) -> String {
        let id = record_id(input, raw_output, condition);
        match self.persist(&id, input, raw_output, condition) {
            Ok(()) => {
                tracing::info!(record_id = %id, "wrote failure record");
                id
            }
            Err(err) => {
                tracing::error!(record_id = %id, error = %err, "failed to persist failure record");
                UNPERSISTED.to_string()
            }
        }
    }

    fn persist(
        &self,
        id: &str,
        input: &str,
        raw_output: &str,
        condition: &str,
    ) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let contents =
            format!("Input: {input}\nRaw Output: {raw_output}\nCondition: {condition}\n");
        std::fs::write(self.dir.join(id), contents)
    }
}

fn record_id(input: &str, raw_output: &str, condition: &str) -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(input.as_bytes());
    hasher.update(raw_output.as_bytes());
    hasher.update(condition.as_bytes());
    let hash = hasher.finalize();

    format!("llm_fail_{secs}_{hash:08x}.log")
}
