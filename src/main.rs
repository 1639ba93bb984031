use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use predex_experiment::{ExperimentConfig, PresentationSurface, TrialController};
use predex_io::{load_stimuli, output_path, ResultSink};
use predex_render::load_font;
use predex_timing::HighPrecisionTimer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod display;
use display::DisplayFrontend;

const DEFAULT_PARTICIPANT: &str = "P001";

/// Korean sentence prediction experiment
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Participant ID; asked for on the terminal when omitted
    #[arg(short, long)]
    participant: Option<String>,

    /// Stimulus workbook (xlsx/xls/ods) or csv
    #[arg(short, long, default_value = "data/stimuli.xlsx")]
    stimuli: PathBuf,

    /// TOML file overriding timings, keys and on-screen text
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for results files
    #[arg(long, default_value = "data")]
    output_dir: PathBuf,

    /// Hangul-capable TTF/OTF/TTC font
    #[arg(long)]
    font: Option<PathBuf>,

    /// Run in a normal window instead of exclusive full screen
    #[arg(long)]
    windowed: bool,
}

fn ask_participant() -> Result<String> {
    print!("Participant ID [{DEFAULT_PARTICIPANT}]: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let id = line.trim();
    Ok(if id.is_empty() {
        DEFAULT_PARTICIPANT.to_owned()
    } else {
        id.to_owned()
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!(
        platform = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        "sentence prediction experiment"
    );

    let config = match &args.config {
        Some(path) => ExperimentConfig::from_path(path)?,
        None => ExperimentConfig::default(),
    };
    config.validate()?;

    let participant = match args.participant.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_owned(),
        _ => ask_participant().context("reading participant ID")?,
    };

    // Fail before any window opens
    let stimuli = load_stimuli(&args.stimuli)?;
    let font = load_font(args.font.as_deref())?;

    let mut frontend = DisplayFrontend::new(font, args.windowed, config.poll_interval())
        .context("opening display")?;
    let report = TrialController::new(
        &mut frontend,
        HighPrecisionTimer::new(),
        config.clone(),
        participant.as_str(),
    )
    .run(&stimuli);

    let saved = if report.should_persist(&config) {
        let path = output_path(&args.output_dir, &participant, Local::now());
        Some(ResultSink::stdout().persist(&path, &report.records))
    } else {
        info!(
            records = report.records.len(),
            "session cancelled, results discarded"
        );
        None
    };
    frontend.close();

    if let Some(saved) = saved {
        let saved = saved.context("saving results")?;
        println!("Saved results to: {}", saved.path.display());
    }
    Ok(())
}
