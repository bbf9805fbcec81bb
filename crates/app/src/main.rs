mod sink;

use std::path::{Path, PathBuf};

use beat_visualiser_core::{
    record::ExportProgress, scene::BackgroundConfig, AppConfig, AudioSource, BeatVizError,
    ExportOptions, ExportResolution, ManualClock, PlaybackState, Recorder, Result, Visualiser,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::sink::PngSequenceSink;

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyse {
            input,
            output,
            fps,
            config,
        } => run_analyse(&input, output.as_deref(), fps, config.as_deref()).map(|_| ()),
        Commands::Render {
            input,
            out_dir,
            resolution,
            fps,
            config,
        } => run_render(&input, &out_dir, resolution, fps, config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading configuration");
            AppConfig::load(path)
        }
        None => Ok(AppConfig::default()),
    }
}

#[derive(Debug, Clone, Serialize)]
struct BeatMark {
    time: f64,
    intensity: f32,
    bass: f32,
}

#[derive(Debug, Clone, Serialize)]
struct BeatTimeline {
    source: String,
    duration: f64,
    fps: u32,
    frames: u64,
    tempo_bpm: Option<f64>,
    beats: Vec<BeatMark>,
}

/// Plays the loaded track on the simulated clock and records every beat.
fn collect_beats(
    visualiser: &mut Visualiser,
    clock: &ManualClock,
    fps: u32,
) -> (u64, Vec<BeatMark>) {
    let frame_ms = 1000.0 / f64::from(fps.max(1));
    let max_frames = (visualiser.engine().duration() * f64::from(fps.max(1))).ceil() as u64 + 2;
    let mut beats = Vec::new();
    let mut frames = 0;

    visualiser.seek(0.0);
    visualiser.play();
    while frames < max_frames {
        let outcome = visualiser.frame();
        if outcome.state != PlaybackState::Playing {
            break;
        }
        frames += 1;
        if outcome.beat.is_beat {
            tracing::debug!(time = outcome.position, intensity = outcome.beat.intensity, "beat");
            beats.push(BeatMark {
                time: outcome.position,
                intensity: outcome.beat.intensity,
                bass: outcome.bands.bass,
            });
        }
        clock.advance_ms(frame_ms);
    }
    visualiser.pause();
    (frames, beats)
}

/// Median inter-beat interval as beats per minute.
fn estimate_tempo(beats: &[BeatMark]) -> Option<f64> {
    let mut intervals: Vec<f64> =
        beats.windows(2).map(|pair| pair[1].time - pair[0].time).collect();
    if intervals.is_empty() {
        return None;
    }
    intervals.sort_by(f64::total_cmp);
    let median = intervals[intervals.len() / 2];
    (median > 0.0).then(|| 60.0 / median)
}

fn run_analyse(
    input: &Path,
    output: Option<&Path>,
    fps: u32,
    config: Option<&Path>,
) -> Result<BeatTimeline> {
    tracing::info!(input = %input.display(), fps, "analysing track");
    let config = load_config(config)?;
    let clock = ManualClock::new();
    let mut visualiser = Visualiser::new(&config, clock.clone())?;
    visualiser.load(AudioSource::from_path(input)?)?;

    let (frames, beats) = collect_beats(&mut visualiser, &clock, fps);
    let timeline = BeatTimeline {
        source: input.display().to_string(),
        duration: visualiser.engine().duration(),
        fps,
        frames,
        tempo_bpm: estimate_tempo(&beats),
        beats,
    };
    visualiser.dispose();

    tracing::info!(
        beats = timeline.beats.len(),
        frames = timeline.frames,
        tempo_bpm = timeline.tempo_bpm,
        "analysis complete"
    );
    if let Some(output) = output {
        std::fs::write(output, serde_json::to_vec_pretty(&timeline)?)?;
        tracing::info!(output = %output.display(), "beat timeline written");
    }
    Ok(timeline)
}

fn run_render(
    input: &Path,
    out_dir: &Path,
    resolution: ExportResolution,
    fps: u32,
    config: Option<&Path>,
) -> Result<()> {
    tracing::info!(
        input = %input.display(),
        out_dir = %out_dir.display(),
        ?resolution,
        fps,
        "rendering track"
    );
    let mut config = load_config(config)?;
    config.export = ExportOptions {
        resolution,
        frame_rate: fps,
    };

    let clock = ManualClock::new();
    let mut visualiser = Visualiser::new(&config, clock.clone())?;
    if let BackgroundConfig::Image { src, .. } = &config.background {
        match sink::load_image(Path::new(src)) {
            Ok(image) => visualiser.set_background_image(Some(image)),
            Err(err) => tracing::warn!(error = %err, "background image unavailable, drawing black"),
        }
    }
    load_font(&mut visualiser, &config);
    visualiser.load(AudioSource::from_path(input)?)?;

    let mut recorder = Recorder::new(config.export);
    let mut last_decile = 0;
    let _progress = recorder.on_progress(move |progress: &ExportProgress| {
        let decile = (progress.progress * 10.0).floor() as u32;
        if decile > last_decile {
            last_decile = decile;
            tracing::info!(state = ?progress.state, percent = decile * 10, "export progress");
        }
    });

    let mut sink = PngSequenceSink::new(out_dir);
    let summary = recorder.record(&mut visualiser, &clock, &mut sink)?;
    visualiser.dispose();
    tracing::info!(
        frames = summary.frames,
        duration = summary.duration,
        audio = %sink.audio_path().display(),
        "render complete"
    );
    Ok(())
}

/// Hands the configured font to the text overlay. Text layers stay blank
/// when the font is missing or unreadable.
fn load_font(visualiser: &mut Visualiser, config: &AppConfig) -> bool {
    let Some(path) = &config.text.font else {
        if !config.text.layers.is_empty() {
            tracing::warn!("text layers configured without text.font, skipping text");
        }
        return false;
    };
    let loaded = std::fs::read(path)
        .map_err(BeatVizError::from)
        .and_then(|bytes| visualiser.set_font(&bytes));
    match loaded {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "font loaded");
            true
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "font unavailable, skipping text");
            false
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Beat-reactive audio visualiser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect beats in an audio file and print a summary.
    Analyse {
        /// MP3 or WAV file to analyse.
        input: PathBuf,
        /// Where to write the beat timeline as JSON.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Simulated frames per second.
        #[arg(long, default_value_t = 60)]
        fps: u32,
        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Render an audio file to a PNG frame sequence plus a WAV of the output.
    Render {
        /// MP3 or WAV file to render.
        input: PathBuf,
        /// Directory that receives the frames and audio.
        out_dir: PathBuf,
        #[arg(long, default_value = "720p")]
        resolution: ExportResolution,
        #[arg(long, default_value_t = 30)]
        fps: u32,
        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
