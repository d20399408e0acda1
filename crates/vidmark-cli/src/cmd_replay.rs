use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use vidmark_core::config::SetupMetadata;
use vidmark_core::{load_config, EntryId, ExportFormat, SessionStore};
use vidmark_session::{
    Click, DraftProgress, KeyCommand, ManualClock, ManualInput, NoticeLevel, PlaybackClock,
    SessionEngine,
};
use vidmark_store::{format_for_path, read_prior, write_export, JsonSessionStore};

type Engine = SessionEngine<ManualClock, ManualInput>;

pub struct ReplayOptions {
    pub config: PathBuf,
    pub script: PathBuf,
    pub audit: Option<PathBuf>,
    pub resume: Option<PathBuf>,
    pub state: Option<PathBuf>,
    pub export: Option<PathBuf>,
    pub format: Option<ExportFormat>,
    pub frames: bool,
    pub duration: f64,
    pub start_time: Option<String>,
    pub fields: Vec<String>,
}

/// One line of a replay script.
#[derive(Debug, Deserialize)]
struct ScriptLine {
    /// Wall-clock seconds since the script started.
    at: f64,
    #[serde(flatten)]
    event: ScriptEvent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ScriptEvent {
    Source {
        src: String,
        #[serde(default)]
        duration: Option<f64>,
    },
    Tick,
    Click(Click),
    Answer {
        step: String,
        value: String,
    },
    Back,
    Undo,
    Redo,
    Delete {
        id: u64,
    },
    Recap,
    ExitRecap,
    Toggle,
    Seek {
        seconds: f64,
    },
    Rate {
        rate: f64,
    },
    Key {
        key: KeyCommand,
    },
}

/// Drives an engine from a script, advancing the simulated clock between
/// events by the elapsed wall time.
pub(crate) struct Replay {
    engine: Engine,
    wall: f64,
    events: usize,
}

impl Replay {
    pub(crate) fn new(engine: Engine) -> Self {
        Self {
            engine,
            wall: 0.0,
            events: 0,
        }
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Runs every script line. Each tick writes one JSON frame to `frames`.
    pub(crate) fn run(&mut self, script: &str, frames: &mut impl Write) -> Result<()> {
        for (i, raw) in script.lines().enumerate() {
            let raw = raw.trim();
            if raw.is_empty() || raw.starts_with("//") {
                continue;
            }
            let line: ScriptLine =
                serde_json::from_str(raw).with_context(|| format!("script line {}", i + 1))?;
            self.step(line, frames)
                .with_context(|| format!("script line {}", i + 1))?;
        }
        Ok(())
    }

    fn step(&mut self, line: ScriptLine, frames: &mut impl Write) -> Result<()> {
        if !line.at.is_finite() || line.at < self.wall {
            bail!("\"at\" must not go backwards ({} after {})", line.at, self.wall);
        }
        self.engine.clock_mut().advance(line.at - self.wall);
        self.wall = line.at;
        self.events += 1;
        let now = Duration::from_secs_f64(self.wall);

        match line.event {
            ScriptEvent::Source { src, duration } => {
                if let Some(d) = duration {
                    self.engine.clock_mut().set_duration(d);
                }
                self.engine.on_source_ready(&src);
            }
            ScriptEvent::Tick => {
                let position = self.engine.clock().position();
                let indicators = self.engine.on_position(now, position);
                let frame = serde_json::json!({
                    "at": self.wall,
                    "position": position,
                    "recap": self.engine.recap_state(),
                    "indicators": indicators,
                });
                writeln!(frames, "{frame}")?;
            }
            ScriptEvent::Click(click) => {
                let progress = self.engine.on_click(now, click);
                log_progress(progress.as_ref());
            }
            ScriptEvent::Answer { step, value } => {
                let progress = self.engine.answer(now, &step, &value);
                log_progress(progress.as_ref());
            }
            ScriptEvent::Back => {
                let progress = self.engine.go_back();
                log_progress(progress.as_ref());
            }
            ScriptEvent::Undo => {
                self.engine.undo(now);
            }
            ScriptEvent::Redo => {
                self.engine.redo();
            }
            ScriptEvent::Delete { id } => {
                self.engine.delete_entry(EntryId(id));
            }
            ScriptEvent::Recap => {
                self.engine.start_recap();
            }
            ScriptEvent::ExitRecap => {
                self.engine.exit_recap();
            }
            ScriptEvent::Toggle => self.engine.toggle_playback(),
            ScriptEvent::Seek { seconds } => self.engine.seek(seconds),
            ScriptEvent::Rate { rate } => self.engine.set_rate(rate),
            ScriptEvent::Key { key } => self.engine.on_key(now, key),
        }

        for position in self.engine.clock_mut().take_completed_seeks() {
            self.engine.on_seek_completed(position);
        }
        for notice in self.engine.take_notices() {
            let tag = match notice.level {
                NoticeLevel::Info => "info",
                NoticeLevel::Warning => "warning",
                NoticeLevel::Error => "error",
            };
            eprintln!("[{:>8.3}s] {tag}: {}", self.wall, notice.message);
        }
        Ok(())
    }
}

fn log_progress(progress: Option<&DraftProgress>) {
    match progress {
        Some(DraftProgress::Asking { step_index }) => info!(step_index, "asking"),
        Some(DraftProgress::Committed(entry)) => {
            info!(entry = %entry.id, time = entry.playback_time_seconds, "committed")
        }
        Some(DraftProgress::Cancelled(id)) => info!(entry = %id, "draft cancelled"),
        None => {}
    }
}

fn setup_from(start_time: Option<&str>, fields: &[String]) -> Result<SetupMetadata> {
    let mut setup = SetupMetadata {
        video_start_time: start_time.map(str::to_string),
        ..Default::default()
    };
    for field in fields {
        let Some((key, value)) = field.split_once('=') else {
            bail!("setup field must be key=value: \"{field}\"");
        };
        setup.fields.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(setup)
}

fn open_engine(opts: &ReplayOptions) -> Result<Engine> {
    let config = load_config(&opts.config)?;
    let clock = ManualClock::new(opts.duration);
    let input = ManualInput::new();

    let Some(resume) = &opts.resume else {
        let setup = setup_from(opts.start_time.as_deref(), &opts.fields)?;
        return Ok(SessionEngine::open(config, setup, clock, input)?);
    };
    let snapshot = JsonSessionStore::new(resume)
        .load()?
        .with_context(|| format!("no saved session at {}", resume.display()))?;
    if snapshot.config != config {
        bail!(
            "{} does not match the config saved in {}",
            opts.config.display(),
            resume.display()
        );
    }
    Ok(SessionEngine::resume(snapshot, clock, input)?)
}

/// Execute `vidmark replay <config> <script>`
pub fn execute(opts: &ReplayOptions) -> Result<()> {
    let mut engine = open_engine(opts)?;

    if let Some(prior) = &opts.audit {
        let rows = read_prior(engine.context().config(), prior)?;
        if engine.load_prior(rows).is_none() {
            let reasons: Vec<String> = engine
                .take_notices()
                .into_iter()
                .map(|n| n.message)
                .collect();
            bail!("cannot audit {}: {}", prior.display(), reasons.join("; "));
        }
    }

    let script = std::fs::read_to_string(&opts.script)
        .with_context(|| format!("reading script: {}", opts.script.display()))?;
    let mut replay = Replay::new(engine);
    if opts.frames {
        replay.run(&script, &mut std::io::stdout().lock())?;
    } else {
        replay.run(&script, &mut std::io::sink())?;
    }

    let Replay { mut engine, events, .. } = replay;
    if let Some(path) = &opts.state {
        engine.checkpoint(&mut JsonSessionStore::new(path))?;
    }
    let table = engine.export_table();
    if let Some(path) = &opts.export {
        let format = opts.format.unwrap_or_else(|| format_for_path(path));
        write_export(path, &table, format)?;
    }
    engine.close();

    if !opts.frames {
        println!(
            "Replayed {events} events: {} entries in log, {} exported",
            engine.context().log().len(),
            table.rows.len()
        );
    }
    Ok(())
}
