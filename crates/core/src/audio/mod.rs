//! Playback engine: owns the decoded track, the playback clock and the
//! analyser graph, and reports state changes to subscribers.

mod decode;
mod graph;

use crossbeam_channel::{Receiver, TryRecvError};
use serde::Serialize;

pub use decode::{decode, AudioSource, SampleBuffer, SUPPORTED_EXTENSIONS, SUPPORTED_MIME_TYPES};
pub use graph::{AudioGraph, FrequencySnapshot};

#[cfg(test)]
pub(crate) use decode::tests::wav_bytes;

use crate::{
    config::AudioConfig,
    events::{Listeners, Subscription},
    timeline::{PlaybackClock, TimeSource},
    BeatVizError, Result,
};

/// Playback stops this many seconds short of the decoded duration.
pub const END_OF_TRACK_TOLERANCE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
}

impl PlaybackState {
    /// Whether a decoded track is attached in this state.
    pub fn has_track(self) -> bool {
        matches!(self, Self::Ready | Self::Playing | Self::Paused)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    StateChanged(PlaybackState),
    /// Current position in seconds.
    TimeUpdate(f64),
    /// A seek landed at this position; downstream analysis should forget
    /// what it heard before.
    Seeked(f64),
    Error(String),
}

/// Single-track audio player driven by a [`TimeSource`].
///
/// The host calls [`PlaybackEngine::tick`] once per frame. Decoding started
/// with [`PlaybackEngine::begin_load`] runs on a worker thread and is picked
/// up on the next tick.
pub struct PlaybackEngine {
    config: AudioConfig,
    time: Box<dyn TimeSource>,
    state: PlaybackState,
    clock: PlaybackClock,
    graph: Option<AudioGraph>,
    buffer: Option<SampleBuffer>,
    previous: Option<SampleBuffer>,
    pending: Option<Receiver<Result<SampleBuffer>>>,
    listeners: Listeners<PlaybackEvent>,
}

impl PlaybackEngine {
    pub fn new(config: AudioConfig, time: impl TimeSource + 'static) -> Self {
        Self {
            config,
            time: Box::new(time),
            state: PlaybackState::Idle,
            clock: PlaybackClock::default(),
            graph: None,
            buffer: None,
            previous: None,
            pending: None,
            listeners: Listeners::new(),
        }
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&PlaybackEvent) + 'static) -> Subscription {
        self.listeners.subscribe(callback)
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// The graph is created lazily by the first load.
    pub fn is_initialized(&self) -> bool {
        self.graph.is_some()
    }

    pub fn graph(&self) -> Option<&AudioGraph> {
        self.graph.as_ref()
    }

    pub fn require_graph(&self) -> Result<&AudioGraph> {
        self.graph.as_ref().ok_or(BeatVizError::GraphUnavailable)
    }

    pub fn buffer(&self) -> Option<&SampleBuffer> {
        self.buffer.as_ref()
    }

    /// Whether the track that was attached before a failed load is still
    /// held. It is never played again and is released by [`Self::dispose`].
    pub fn has_retained_track(&self) -> bool {
        self.previous.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Validates and decodes `source` on the calling thread.
    pub fn load(&mut self, source: AudioSource) -> Result<()> {
        self.enter_loading();
        if let Err(err) = source.validate() {
            return self.fail_load(err);
        }
        let decoded = decode(&source);
        self.finish_load(decoded)
    }

    /// Validates `source` and decodes it on a worker thread. The engine stays
    /// in `Loading` until a later [`Self::tick`] receives the result.
    pub fn begin_load(&mut self, source: AudioSource) -> Result<()> {
        self.enter_loading();
        if let Err(err) = source.validate() {
            return self.fail_load(err);
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        let spawned = std::thread::Builder::new()
            .name("audio-decode".into())
            .spawn(move || {
                // The receiver is gone if another load superseded this one.
                let _ = tx.send(decode(&source));
            });
        match spawned {
            Ok(_) => {
                self.pending = Some(rx);
                Ok(())
            }
            Err(err) => self.fail_load(err.into()),
        }
    }

    /// Attaches an already decoded track.
    pub fn load_samples(&mut self, buffer: SampleBuffer) -> Result<()> {
        self.enter_loading();
        self.finish_load(Ok(buffer))
    }

    pub fn play(&mut self) {
        let resumable = matches!(self.state, PlaybackState::Ready | PlaybackState::Paused);
        if !resumable || self.buffer.is_none() {
            tracing::debug!(state = ?self.state, "play ignored");
            return;
        }
        self.clock.start(self.time.now_ms());
        self.set_state(PlaybackState::Playing);
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        let position = self.current_time();
        self.clock.set_offset(position);
        self.set_state(PlaybackState::Paused);
    }

    /// Moves the playback position, clamped to the track. Playing tracks keep
    /// playing from the new position; otherwise the new time is reported
    /// immediately.
    pub fn seek(&mut self, seconds: f64) {
        if self.buffer.is_none() || seconds.is_nan() {
            tracing::debug!(seconds, "seek ignored");
            return;
        }
        let target = seconds.clamp(0.0, self.duration());
        self.clock.set_offset(target);
        self.listeners.emit(&PlaybackEvent::Seeked(target));
        if self.state == PlaybackState::Playing {
            self.clock.start(self.time.now_ms());
        } else {
            self.listeners.emit(&PlaybackEvent::TimeUpdate(target));
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.config.volume = volume;
        if let Some(graph) = self.graph.as_mut() {
            graph.set_volume(volume);
        }
    }

    pub fn volume(&self) -> f32 {
        self.config.volume
    }

    /// Position in seconds, always within `[0, duration]`.
    pub fn current_time(&self) -> f64 {
        match &self.buffer {
            Some(buffer) => self.clock.elapsed(
                self.state == PlaybackState::Playing,
                self.time.now_ms(),
                buffer.duration(),
            ),
            None => 0.0,
        }
    }

    pub fn duration(&self) -> f64 {
        self.buffer.as_ref().map(SampleBuffer::duration).unwrap_or(0.0)
    }

    /// Per-frame update: applies a finished background decode, reports the
    /// position while playing and stops at the end of the track.
    pub fn tick(&mut self) {
        self.poll_pending();
        if self.state != PlaybackState::Playing {
            return;
        }

        let position = self.current_time();
        if position >= self.duration() - END_OF_TRACK_TOLERANCE {
            tracing::info!(duration = self.duration(), "track ended");
            self.clock.set_offset(0.0);
            self.set_state(PlaybackState::Ready);
            self.listeners.emit(&PlaybackEvent::TimeUpdate(0.0));
        } else {
            self.listeners.emit(&PlaybackEvent::TimeUpdate(position));
        }
    }

    /// Refreshes and returns the analyser snapshot for the current position.
    /// Returns `None` before the first load.
    pub fn analyse(&mut self) -> Option<&FrequencySnapshot> {
        let position = self.current_time();
        let playing = self.state == PlaybackState::Playing;
        let graph = self.graph.as_mut()?;
        Some(graph.analyse(self.buffer.as_ref(), position, playing))
    }

    /// Post-gain output samples (interleaved) between two positions.
    pub fn output_samples(&self, from: f64, to: f64) -> Result<Vec<f32>> {
        let graph = self.require_graph()?;
        let buffer = self.buffer.as_ref().ok_or(BeatVizError::GraphUnavailable)?;
        Ok(graph.apply_gain(buffer.slice_seconds(from, to)))
    }

    /// Releases the track, the graph and any pending decode. Safe to call
    /// more than once.
    pub fn dispose(&mut self) {
        self.pending = None;
        self.buffer = None;
        self.previous = None;
        self.graph = None;
        self.clock.reset();
        if self.state != PlaybackState::Idle {
            self.set_state(PlaybackState::Idle);
        }
    }

    fn enter_loading(&mut self) {
        if self.graph.is_none() {
            self.graph = Some(AudioGraph::new(&self.config));
        }
        if let Some(buffer) = self.buffer.take() {
            self.previous = Some(buffer);
        }
        self.pending = None;
        self.clock.reset();
        self.set_state(PlaybackState::Loading);
    }

    fn finish_load(&mut self, decoded: Result<SampleBuffer>) -> Result<()> {
        match decoded {
            Ok(buffer) => {
                tracing::info!(
                    duration = buffer.duration(),
                    sample_rate = buffer.sample_rate(),
                    channels = buffer.channels(),
                    "track loaded"
                );
                self.buffer = Some(buffer);
                self.previous = None;
                if let Some(graph) = self.graph.as_mut() {
                    graph.reset_smoothing();
                }
                self.set_state(PlaybackState::Ready);
                Ok(())
            }
            Err(err) => self.fail_load(err),
        }
    }

    fn fail_load(&mut self, err: BeatVizError) -> Result<()> {
        tracing::warn!(error = %err, "load failed");
        self.pending = None;
        self.set_state(PlaybackState::Idle);
        self.listeners.emit(&PlaybackEvent::Error(err.to_string()));
        Err(err)
    }

    fn poll_pending(&mut self) {
        let Some(pending) = &self.pending else {
            return;
        };
        match pending.try_recv() {
            Ok(decoded) => {
                self.pending = None;
                let _ = self.finish_load(decoded);
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                let _ = self.fail_load(BeatVizError::Decode("decoder thread exited".into()));
            }
        }
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state == state {
            return;
        }
        tracing::debug!(from = ?self.state, to = ?state, "playback state");
        self.state = state;
        self.listeners.emit(&PlaybackEvent::StateChanged(state));
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("state", &self.state)
            .field("duration", &self.duration())
            .field("volume", &self.config.volume)
            .field("initialized", &self.is_initialized())
            .field("loading", &self.is_loading())
            .finish()
    }
}
