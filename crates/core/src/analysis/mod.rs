use std::{collections::VecDeque, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    audio::FrequencySnapshot,
    config::DetectorConfig,
    events::{Listeners, Subscription},
    timeline::TimeSource,
};

/// Banded energies of one snapshot, each normalised to `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBands {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    /// Mean of the three bands.
    pub overall: f32,
}

impl FrequencyBands {
    /// Averages the byte bins `[0, bass_end)`, `[bass_end, mid_end)` and
    /// `[mid_end, len)`. Ranges that fall outside a short snapshot count as
    /// silent.
    pub fn from_frequency(data: &[u8], bass_end: usize, mid_end: usize) -> Self {
        let bass = band_energy(data, 0, bass_end);
        let mid = band_energy(data, bass_end, mid_end);
        let treble = band_energy(data, mid_end, data.len());
        Self {
            bass,
            mid,
            treble,
            overall: (bass + mid + treble) / 3.0,
        }
    }
}

fn band_energy(data: &[u8], start: usize, end: usize) -> f32 {
    let end = end.min(data.len());
    if start >= end {
        return 0.0;
    }
    let sum: u32 = data[start..end].iter().map(|value| u32::from(*value)).sum();
    sum as f32 / ((end - start) as f32 * 255.0)
}

/// Result of one detector step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BeatEvent {
    pub is_beat: bool,
    /// `0..=1`, zero when `is_beat` is false.
    pub intensity: f32,
    /// Zero on the beat itself; infinite before the first beat.
    pub time_since_last_beat_ms: f64,
}

impl BeatEvent {
    pub fn silent(time_since_last_beat_ms: f64) -> Self {
        Self {
            is_beat: false,
            intensity: 0.0,
            time_since_last_beat_ms,
        }
    }
}

/// Bounded FIFO of recent bass energies.
#[derive(Debug, Clone)]
pub struct BeatHistory {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl BeatHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `energy`, evicting the oldest sample when full.
    pub fn push(&mut self, energy: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(energy);
    }

    /// Arithmetic mean, zero when empty.
    pub fn average(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f32>() / self.samples.len() as f32
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// The beat rule on its own: returns the intensity when `bass` counts as a
/// beat against `average`, `None` otherwise.
pub fn beat_gate(
    bass: f32,
    average: f32,
    time_since_last_beat_ms: f64,
    config: &DetectorConfig,
) -> Option<f32> {
    let is_beat = bass > average * config.threshold_ratio
        && time_since_last_beat_ms > config.cooldown_ms
        && average > config.energy_floor;
    is_beat.then(|| ((bass - average) / average).clamp(0.0, 1.0))
}

/// Copy-on-read view of the latest analyser snapshot.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    bass_end: usize,
    mid_end: usize,
    generation: Option<u64>,
    frequency: Vec<u8>,
    time_domain: Vec<u8>,
    bands: FrequencyBands,
}

impl FeatureExtractor {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            bass_end: config.bass_end,
            mid_end: config.mid_end,
            generation: None,
            frequency: Vec::new(),
            time_domain: Vec::new(),
            bands: FrequencyBands::default(),
        }
    }

    /// Copies `snapshot` and recomputes the bands. `None` means no audio
    /// graph exists yet and resets everything to silence.
    pub fn refresh(&mut self, snapshot: Option<&FrequencySnapshot>) {
        match snapshot {
            Some(snapshot) => {
                self.generation = Some(snapshot.generation());
                self.frequency.clear();
                self.frequency.extend_from_slice(snapshot.frequency());
                self.time_domain.clear();
                self.time_domain.extend_from_slice(snapshot.time_domain());
                self.bands =
                    FrequencyBands::from_frequency(&self.frequency, self.bass_end, self.mid_end);
            }
            None => {
                self.generation = None;
                self.frequency.clear();
                self.time_domain.clear();
                self.bands = FrequencyBands::default();
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.generation.is_some()
    }

    /// Generation of the snapshot last copied in.
    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    pub fn bands(&self) -> FrequencyBands {
        self.bands
    }

    /// Bin magnitudes scaled to `[0, 1]`.
    pub fn frequency_data(&self) -> Vec<f32> {
        self.frequency.iter().map(|value| f32::from(*value) / 255.0).collect()
    }

    /// Waveform scaled to `[-1, 1]`.
    pub fn time_domain_data(&self) -> Vec<f32> {
        self.time_domain
            .iter()
            .map(|value| (f32::from(*value) - 128.0) / 128.0)
            .collect()
    }
}

/// Energy beat detector over the bass band.
///
/// Each new snapshot generation is evaluated once; asking again before the
/// next refresh returns the same event.
pub struct BeatDetector {
    config: DetectorConfig,
    extractor: FeatureExtractor,
    history: BeatHistory,
    time: Box<dyn TimeSource>,
    last_beat_ms: Option<f64>,
    evaluated: Option<(u64, BeatEvent)>,
    listeners: Listeners<BeatEvent>,
}

impl BeatDetector {
    pub fn new(config: DetectorConfig, time: impl TimeSource + 'static) -> Self {
        Self {
            extractor: FeatureExtractor::new(&config),
            history: BeatHistory::new(config.history_size),
            config,
            time: Box::new(time),
            last_beat_ms: None,
            evaluated: None,
            listeners: Listeners::new(),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn history(&self) -> &BeatHistory {
        &self.history
    }

    pub fn refresh(&mut self, snapshot: Option<&FrequencySnapshot>) {
        self.extractor.refresh(snapshot);
    }

    pub fn bands(&self) -> FrequencyBands {
        self.extractor.bands()
    }

    /// Registers a callback fired synchronously on every detected beat.
    pub fn on_beat(&mut self, callback: impl FnMut(&BeatEvent) + 'static) -> Subscription {
        self.listeners.subscribe(callback)
    }

    /// Advances the history with the current bass energy and reports whether
    /// it is a beat.
    pub fn beat_info(&mut self) -> BeatEvent {
        let now = self.time.now_ms();
        let since = self.last_beat_ms.map_or(f64::INFINITY, |last| now - last);

        let Some(generation) = self.extractor.generation() else {
            return BeatEvent::silent(since);
        };
        if let Some((seen, event)) = self.evaluated {
            if seen == generation {
                return event;
            }
        }

        let bass = self.extractor.bands().bass;
        self.history.push(bass);
        let average = self.history.average();

        let event = match beat_gate(bass, average, since, &self.config) {
            Some(intensity) => {
                self.last_beat_ms = Some(now);
                tracing::trace!(bass, average, intensity, "beat");
                BeatEvent {
                    is_beat: true,
                    intensity,
                    time_since_last_beat_ms: 0.0,
                }
            }
            None => BeatEvent::silent(since),
        };
        self.evaluated = Some((generation, event));
        if event.is_beat {
            self.listeners.emit(&event);
        }
        event
    }

    /// Forgets the trailing average and the cooldown.
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_beat_ms = None;
        self.evaluated = None;
    }
}

impl fmt::Debug for BeatDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeatDetector")
            .field("config", &self.config)
            .field("history", &self.history.len())
            .field("last_beat_ms", &self.last_beat_ms)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
