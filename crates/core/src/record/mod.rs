//! Deterministic full-track export. The recorder steps a simulated clock one
//! frame at a time and hands pixels and audio to a [`FrameSink`], which
//! stands in for the platform encoder.

use serde::{Deserialize, Serialize};

use crate::{
    audio::PlaybackState,
    events::{Listeners, Subscription},
    pipeline::Visualiser,
    timeline::ManualClock,
    BeatVizError, Result,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportResolution {
    #[default]
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "1080p")]
    Hd1080,
}

impl ExportResolution {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Hd720 => (1280, 720),
            Self::Hd1080 => (1920, 1080),
        }
    }
}

impl std::str::FromStr for ExportResolution {
    type Err = BeatVizError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "720p" => Ok(Self::Hd720),
            "1080p" => Ok(Self::Hd1080),
            other => Err(BeatVizError::InvalidConfig(format!(
                "unknown resolution `{other}`, expected 720p or 1080p"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub resolution: ExportResolution,
    pub frame_rate: u32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            resolution: ExportResolution::Hd720,
            frame_rate: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportState {
    #[default]
    Idle,
    Preparing,
    Recording,
    Encoding,
    Complete,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportProgress {
    pub state: ExportState,
    /// 0-1.
    pub progress: f64,
    pub error: Option<String>,
}

/// Stream parameters announced to the sink before the first frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub sample_rate: u32,
    pub channels: usize,
}

/// Consumer of the exported pixel and audio streams.
pub trait FrameSink {
    fn begin(&mut self, info: &StreamInfo) -> Result<()>;

    /// Row-major RGBA frame at `timestamp` seconds.
    fn push_frame(&mut self, pixels: &[u8], timestamp: f64) -> Result<()>;

    /// Interleaved post-gain samples following the previous block.
    fn push_audio(&mut self, samples: &[f32]) -> Result<()>;

    fn finish(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExportSummary {
    pub frames: u64,
    pub duration: f64,
    pub audio_samples: usize,
}

pub struct Recorder {
    options: ExportOptions,
    progress: ExportProgress,
    listeners: Listeners<ExportProgress>,
}

impl Recorder {
    pub fn new(options: ExportOptions) -> Self {
        Self {
            options,
            progress: ExportProgress::default(),
            listeners: Listeners::new(),
        }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    pub fn progress(&self) -> &ExportProgress {
        &self.progress
    }

    pub fn on_progress(&mut self, callback: impl FnMut(&ExportProgress) + 'static) -> Subscription {
        self.listeners.subscribe(callback)
    }

    /// Records the loaded track from the start. `clock` must be the clock the
    /// visualiser was built with.
    pub fn record(
        &mut self,
        visualiser: &mut Visualiser,
        clock: &ManualClock,
        sink: &mut dyn FrameSink,
    ) -> Result<ExportSummary> {
        match self.run(visualiser, clock, sink) {
            Ok(summary) => Ok(summary),
            Err(err) => {
                tracing::warn!(error = %err, "export failed");
                visualiser.renderer_mut().stop();
                self.progress.error = Some(err.to_string());
                self.report(ExportState::Error, self.progress.progress);
                Err(err)
            }
        }
    }

    fn run(
        &mut self,
        visualiser: &mut Visualiser,
        clock: &ManualClock,
        sink: &mut dyn FrameSink,
    ) -> Result<ExportSummary> {
        self.progress.error = None;
        self.report(ExportState::Preparing, 0.0);

        if self.options.frame_rate == 0 {
            return Err(BeatVizError::InvalidConfig("export frame rate must be positive".into()));
        }
        let (sample_rate, channels, duration) = match visualiser.engine().buffer() {
            Some(buffer) => (buffer.sample_rate(), buffer.channels(), buffer.duration()),
            None => return Err(BeatVizError::GraphUnavailable),
        };

        let (width, height) = self.options.resolution.dimensions();
        visualiser.renderer_mut().resize_with_ratio(width, height, 1.0)?;
        sink.begin(&StreamInfo {
            width,
            height,
            frame_rate: self.options.frame_rate,
            sample_rate,
            channels,
        })?;

        visualiser.seek(0.0);
        visualiser.play();
        self.report(ExportState::Recording, 0.0);

        let frame_ms = 1000.0 / f64::from(self.options.frame_rate);
        let max_frames = (duration * f64::from(self.options.frame_rate)).ceil() as u64 + 2;
        let mut summary = ExportSummary {
            duration,
            ..Default::default()
        };
        let mut audio_cursor = 0.0;

        while summary.frames < max_frames {
            let outcome = visualiser.frame();
            if outcome.state != PlaybackState::Playing {
                break;
            }
            let frame = visualiser.renderer().canvas().to_rgba();
            sink.push_frame(&frame, outcome.position)?;
            summary.frames += 1;

            let samples = visualiser.engine().output_samples(audio_cursor, outcome.position)?;
            summary.audio_samples += samples.len();
            sink.push_audio(&samples)?;
            audio_cursor = outcome.position;

            self.report(ExportState::Recording, (outcome.position / duration).min(1.0));
            clock.advance_ms(frame_ms);
        }

        let tail = visualiser.engine().output_samples(audio_cursor, duration)?;
        summary.audio_samples += tail.len();
        sink.push_audio(&tail)?;
        visualiser.pause();
        visualiser.renderer_mut().stop();

        self.report(ExportState::Encoding, 1.0);
        sink.finish()?;
        self.report(ExportState::Complete, 1.0);
        tracing::info!(frames = summary.frames, duration, "export complete");
        Ok(summary)
    }

    fn report(&mut self, state: ExportState, progress: f64) {
        self.progress.state = state;
        self.progress.progress = progress;
        self.listeners.emit(&self.progress);
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("options", &self.options)
            .field("progress", &self.progress)
            .finish()
    }
}
