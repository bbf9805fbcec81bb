use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use super::SampleBuffer;
use crate::config::AudioConfig;

/// One frame of analyser output. Consumers receive it by reference and copy
/// what they need; `generation` increases on every refresh so a stale copy
/// can be told apart from the current one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrequencySnapshot {
    generation: u64,
    frequency: Vec<u8>,
    time_domain: Vec<u8>,
}

impl FrequencySnapshot {
    pub fn new(generation: u64, frequency: Vec<u8>, time_domain: Vec<u8>) -> Self {
        Self {
            generation,
            frequency,
            time_domain,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Byte magnitudes per bin, 0-255.
    pub fn frequency(&self) -> &[u8] {
        &self.frequency
    }

    /// Byte waveform, 128 is silence.
    pub fn time_domain(&self) -> &[u8] {
        &self.time_domain
    }
}

/// Per-engine audio graph: the analyser tap the detector reads from and the
/// gain stage applied to the output.
pub struct AudioGraph {
    fft_size: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
    gain: f32,
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    window: Vec<f32>,
    samples: Vec<f32>,
    smoothed: Vec<f32>,
    snapshot: FrequencySnapshot,
}

impl AudioGraph {
    pub fn new(config: &AudioConfig) -> Self {
        let fft_size = config.fft_size;
        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(fft_size);
        let bins = fft_size / 2;
        Self {
            fft_size,
            smoothing: config.smoothing_time_constant,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            gain: config.volume.clamp(0.0, 1.0),
            input: plan.make_input_vec(),
            spectrum: plan.make_output_vec(),
            scratch: plan.make_scratch_vec(),
            plan,
            window: (0..fft_size).map(|i| blackman_value(i, fft_size)).collect(),
            samples: vec![0.0; fft_size],
            smoothed: vec![0.0; bins],
            snapshot: FrequencySnapshot::new(0, vec![0; bins], vec![128; bins]),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn volume(&self) -> f32 {
        self.gain
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.gain = volume.clamp(0.0, 1.0);
    }

    pub fn snapshot(&self) -> &FrequencySnapshot {
        &self.snapshot
    }

    /// Forgets the smoothed spectrum, e.g. when a new track is loaded.
    pub fn reset_smoothing(&mut self) {
        self.smoothed.iter_mut().for_each(|bin| *bin = 0.0);
    }

    /// Refreshes the snapshot from the window of `fft_size` frames ending at
    /// `position` seconds. When nothing is playing the analyser hears silence
    /// and the smoothed spectrum falls away.
    pub fn analyse(
        &mut self,
        buffer: Option<&SampleBuffer>,
        position: f64,
        playing: bool,
    ) -> &FrequencySnapshot {
        match buffer {
            Some(buffer) if playing => {
                let end = (position.max(0.0) * buffer.sample_rate() as f64).round() as usize;
                buffer.mono_window(end, &mut self.samples);
            }
            _ => self.samples.iter_mut().for_each(|sample| *sample = 0.0),
        }

        let windowed = self.input.iter_mut().zip(&self.samples).zip(&self.window);
        for ((input, sample), weight) in windowed {
            *input = sample * weight;
        }

        let transformed = self
            .plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
            .is_ok();

        let scale = 1.0 / self.fft_size as f32;
        let range = self.max_decibels - self.min_decibels;
        let bins = self.smoothed.len();
        let generation = self.snapshot.generation + 1;
        let mut frequency = std::mem::take(&mut self.snapshot.frequency);
        let mut time_domain = std::mem::take(&mut self.snapshot.time_domain);
        frequency.resize(bins, 0);
        time_domain.resize(bins, 128);

        for (k, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = if transformed {
                self.spectrum[k].norm() * scale
            } else {
                0.0
            };
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;
            frequency[k] = if *smoothed <= f32::MIN_POSITIVE {
                0
            } else {
                let db = 20.0 * smoothed.log10();
                (255.0 * (db - self.min_decibels) / range).clamp(0.0, 255.0) as u8
            };
        }

        let recent = &self.samples[self.fft_size - bins..];
        for (byte, sample) in time_domain.iter_mut().zip(recent) {
            *byte = (128.0 * (1.0 + sample)).clamp(0.0, 255.0) as u8;
        }

        self.snapshot = FrequencySnapshot::new(generation, frequency, time_domain);
        &self.snapshot
    }

    /// Applies the gain stage to a block of output samples.
    pub fn apply_gain(&self, samples: &[f32]) -> Vec<f32> {
        samples.iter().map(|sample| sample * self.gain).collect()
    }
}

impl fmt::Debug for AudioGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioGraph")
            .field("fft_size", &self.fft_size)
            .field("smoothing", &self.smoothing)
            .field("gain", &self.gain)
            .field("generation", &self.snapshot.generation)
            .finish()
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    let phase = 2.0 * PI * index as f32 / len as f32;
    0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
}
