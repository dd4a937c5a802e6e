//! voxcoder CLI — speak a request, get code.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use voxcoder::config::PipelineConfig;
use voxcoder::pipeline::Pipeline;
use voxcoder::transcribe::{Transcriber, WhisperCli};

#[derive(Parser)]
#[command(name = "voxcoder")]
#[command(version)]
#[command(about = "Generate source code from spoken requests", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate code from an already-transcribed request
    Run {
        /// The transcribed request text
        transcript: String,
    },

    /// Transcribe an audio file, then generate code from it
    Audio {
        /// Path to the audio file (WAV)
        path: PathBuf,
    },

    /// Show the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .init();

    let config = Arc::new(PipelineConfig::load(cli.config.as_deref())?);

    match cli.command {
        Commands::Run { transcript } => generate(config, &transcript).await,

        Commands::Audio { path } => {
            let whisper = WhisperCli::from_config(&config).ok_or_else(|| {
                anyhow::anyhow!(
                    "audio input needs whisper_cpp_path and whisper_model_path in the settings file"
                )
            })?;
            let transcript = whisper.transcribe(&path)?;
            generate(config, &transcript).await
        }

        Commands::Config => {
            println!("{config:#?}");
            Ok(())
        }
    }
}

/// Run the pipeline and print the JSON result. Failures print
/// `{error, error_type}` and exit non-zero.
async fn generate(config: Arc<PipelineConfig>, transcript: &str) -> Result<()> {
    let pipeline = Pipeline::new(config)?;

    match pipeline.run(transcript).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(err) => {
            let payload = serde_json::json!({
                "error": err.to_string(),
                "error_type": err.error_type(),
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
            std::process::exit(1);
        }
    }
}
