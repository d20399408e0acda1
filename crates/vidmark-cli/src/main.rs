mod cmd_export;
mod cmd_replay;
mod cmd_status;
mod cmd_validate;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vidmark_core::ExportFormat;

#[derive(Parser)]
#[command(name = "vidmark", version, about = "Click-to-annotate video sessions")]
struct Cli {
    /// Debug logging on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load and validate a questionnaire config
    Validate {
        /// Config file (.yaml, .yml or .json)
        config: PathBuf,
    },
    /// Replay a JSONL event script against a simulated playback clock
    Replay {
        /// Config file (.yaml, .yml or .json)
        config: PathBuf,
        /// Event script, one JSON object per line
        script: PathBuf,
        /// Prior export to audit (CSV, or JSON by extension)
        #[arg(long)]
        audit: Option<PathBuf>,
        /// Continue from a saved session state
        #[arg(long)]
        resume: Option<PathBuf>,
        /// Write the session state here when the script ends
        #[arg(long)]
        state: Option<PathBuf>,
        /// Write the export here when the script ends
        #[arg(long)]
        export: Option<PathBuf>,
        /// Export format (defaults to the --export extension, else csv)
        #[arg(long)]
        format: Option<ExportFormat>,
        /// Print rendered indicators for every tick as JSON lines
        #[arg(long)]
        frames: bool,
        /// Video length in seconds for the simulated clock
        #[arg(long, default_value_t = 3600.0)]
        duration: f64,
        /// Time of day at playback position 1s (HH:MM:SS)
        #[arg(long)]
        start_time: Option<String>,
        /// Setup field in key=value format (repeatable)
        #[arg(long = "set")]
        fields: Vec<String>,
    },
    /// Export a saved session
    Export {
        /// Session state file
        state: PathBuf,
        /// Export format (defaults to the --out extension, else csv)
        #[arg(long)]
        format: Option<ExportFormat>,
        /// Output file (stdout if omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Summarize a saved session
    Status {
        /// Session state file
        state: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG overrides; --verbose => debug; else warn
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "warn" }));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match cli.cmd {
        Command::Validate { config } => cmd_validate::execute(&config),
        Command::Replay {
            config,
            script,
            audit,
            resume,
            state,
            export,
            format,
            frames,
            duration,
            start_time,
            fields,
        } => cmd_replay::execute(&cmd_replay::ReplayOptions {
            config,
            script,
            audit,
            resume,
            state,
            export,
            format,
            frames,
            duration,
            start_time,
            fields,
        }),
        Command::Export { state, format, out } => {
            cmd_export::execute(&state, format, out.as_deref())
        }
        Command::Status { state } => cmd_status::execute(&state),
    }
}
