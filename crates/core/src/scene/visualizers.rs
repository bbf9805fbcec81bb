use std::collections::VecDeque;

use super::{
    CircularSettings, ClubSettings, EnergySpread, EqualizerSettings, VisualizerConfig,
    WaveformSettings,
};
use crate::render::{Canvas, Color};

/// Fades columns toward the left edge so the newest data reads brightest.
const OLDEST_FADE: f32 = 0.3;
/// Columns nearest the right edge brightened on a beat.
const BEAT_COLUMNS: usize = 5;
const CELL_GAP: f32 = 1.0;
const GLOW_WIDTH: f32 = 20.0;

/// Scrolling grid of band energies: each column is one snapshot of the
/// spectrum, newest on the right, bass at the bottom.
#[derive(Debug, Clone)]
pub struct EqualizerHistory {
    settings: EqualizerSettings,
    columns: VecDeque<Vec<f32>>,
    since_update_ms: f64,
}

impl EqualizerHistory {
    pub fn new(settings: EqualizerSettings) -> Self {
        let bands = settings.bands.max(1);
        let columns = (0..settings.history.max(1)).map(|_| vec![0.0; bands]).collect();
        Self {
            settings,
            columns,
            since_update_ms: f64::INFINITY,
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &[f32]> {
        self.columns.iter().map(Vec::as_slice)
    }

    /// Shifts in a new column once every `1 / update_hz` seconds. Returns
    /// whether a column was added.
    pub fn update(&mut self, frequency: &[f32], delta_ms: f64) -> bool {
        self.since_update_ms += delta_ms;
        if frequency.is_empty() || self.since_update_ms < 1000.0 / self.settings.update_hz {
            return false;
        }
        self.since_update_ms = 0.0;

        let bands = self.settings.bands.max(1);
        let stride = frequency.len() / bands;
        let column = (0..bands)
            .map(|band| frequency.get(band * stride).copied().unwrap_or(0.0))
            .collect();
        self.columns.pop_front();
        self.columns.push_back(column);
        true
    }

    pub fn draw(&self, canvas: &mut Canvas, beat: bool) {
        let w = canvas.logical_width() as f32;
        let h = canvas.logical_height() as f32;
        let history = self.columns.len();
        let bands = self.settings.bands.max(1);
        let cell_width = w / history as f32;
        let cell_height = h / bands as f32;

        for (t, column) in self.columns.iter().enumerate() {
            let recency = (t + 1) as f32 / history as f32;
            let fade = OLDEST_FADE + recency * (1.0 - OLDEST_FADE);
            let brightness = if beat && t + BEAT_COLUMNS >= history { 1.2 } else { 1.0 };
            for (band, intensity) in column.iter().enumerate() {
                if *intensity < 0.02 {
                    continue;
                }
                let hue = band as f32 / bands as f32 * 240.0;
                let saturation = (70.0 + intensity * 30.0) / 100.0;
                let lightness = (30.0 + intensity * 40.0).min(60.0) * brightness * fade / 100.0;
                canvas.set_fill(Color::from_hsl(hue, saturation, lightness));
                let x = t as f32 * cell_width;
                let y = h - (band + 1) as f32 * cell_height;
                canvas.fill_rect(
                    x + CELL_GAP / 2.0,
                    y + CELL_GAP / 2.0,
                    cell_width - CELL_GAP,
                    cell_height - CELL_GAP,
                );
            }
        }

        // Soft glow on the "now" edge.
        let strips = 4;
        let strip_width = GLOW_WIDTH / strips as f32;
        for strip in 0..strips {
            canvas.set_fill(Color::WHITE.with_alpha(0.025 * (strip + 1) as f32));
            canvas.fill_rect(w - GLOW_WIDTH + strip as f32 * strip_width, 0.0, strip_width, h);
        }
    }
}

/// Bars in the low end that get the bass boost.
const BASS_BARS: usize = 12;
const BASS_BOOST: f32 = 2.5;

/// Frequency bars with attack/release smoothing and peak markers.
#[derive(Debug, Clone)]
pub struct ClubEqualizer {
    settings: ClubSettings,
    heights: Vec<f32>,
    peaks: Vec<f32>,
    peak_fall: Vec<f32>,
}

impl ClubEqualizer {
    pub fn new(settings: ClubSettings) -> Self {
        let count = settings.bar_count.max(1);
        Self {
            settings,
            heights: vec![0.0; count],
            peaks: vec![0.0; count],
            peak_fall: vec![0.0; count],
        }
    }

    /// Smoothed heights, 0-1.
    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    pub fn peaks(&self) -> &[f32] {
        &self.peaks
    }

    /// Advances the bars one frame. `frequency` is the normalised spectrum;
    /// `reaction` is the bar-height decay value and lifts the bass bars.
    pub fn update(&mut self, frequency: &[f32], reaction: f32) {
        let ClubSettings {
            bass_gain,
            sensitivity,
            decay,
            ..
        } = self.settings;
        let count = self.heights.len();
        let stride = (frequency.len() / 2 / count).max(1);
        let attack = 0.3 + decay * 0.4;
        let release = 0.05 + decay * 0.2;
        let peak_fall_speed = 0.01 + decay * 0.02;

        for i in 0..count {
            let mut target = 0.0;
            if let Some(last) = frequency.len().checked_sub(1) {
                target = frequency[(i * stride).min(last)] * (0.5 + sensitivity);
                if i < BASS_BARS {
                    let falloff = 1.0 - i as f32 / BASS_BARS as f32;
                    target = (target * (1.0 + BASS_BOOST * bass_gain * falloff)).min(1.0);
                    target = (target + reaction * 0.2 * bass_gain * falloff).min(1.0);
                }
            }

            let current = self.heights[i];
            let speed = if target > current { attack } else { release };
            self.heights[i] = current + (target - current) * speed;

            if self.heights[i] > self.peaks[i] {
                self.peaks[i] = self.heights[i];
                self.peak_fall[i] = 0.0;
            } else {
                self.peaks[i] = (self.peaks[i] - self.peak_fall[i] * 0.02).max(0.0);
                self.peak_fall[i] += peak_fall_speed;
            }
        }
    }

    pub fn draw(&self, canvas: &mut Canvas, reaction: f32) {
        let w = canvas.logical_width() as f32;
        let h = canvas.logical_height() as f32;
        let count = self.heights.len();
        let gap = self.settings.gap;
        let bar_width = ((w - gap * (count as f32 - 1.0)) / count as f32).max(1.0);

        for (i, (height, peak)) in self.heights.iter().zip(&self.peaks).enumerate() {
            let bar_height = height * h * self.settings.vertical_scale;
            let x = i as f32 * (bar_width + gap);
            if bar_height >= 2.0 {
                let hue = i as f32 / count as f32 * 280.0;
                let lightness = (40.0 + height * 35.0 + reaction * 25.0).min(80.0);
                let saturation = (80.0 + height * 20.0) / 100.0;
                canvas.set_fill(Color::from_hsl(hue, saturation, lightness / 100.0));
                canvas.fill_rect(x, h - bar_height, bar_width, bar_height);
            }

            let peak_y = h - peak * h * self.settings.vertical_scale;
            if peak_y < h - 4.0 {
                canvas.set_fill(Color::WHITE.with_alpha(0.5 + reaction * 0.3));
                canvas.fill_rect(x, peak_y - 2.0, bar_width, 2.0);
            }
        }
    }
}

/// Oscilloscope line of the time-domain signal.
#[derive(Debug, Clone)]
pub struct WaveformView {
    settings: WaveformSettings,
    points: Vec<f32>,
}

impl WaveformView {
    pub fn new(settings: WaveformSettings) -> Self {
        Self {
            settings,
            points: Vec::new(),
        }
    }

    pub fn points(&self) -> &[f32] {
        &self.points
    }

    /// Resamples the waveform (`-1..=1`) to the configured point count.
    pub fn update(&mut self, time_domain: &[f32]) {
        self.points.clear();
        if time_domain.is_empty() {
            return;
        }
        let count = self.settings.samples.max(2);
        let step = (time_domain.len() / count).max(1);
        self.points
            .extend(time_domain.iter().step_by(step).take(count).copied());
    }

    pub fn draw(&self, canvas: &mut Canvas, beat: bool) {
        if self.points.is_empty() {
            return;
        }
        let w = canvas.logical_width() as f32;
        let h = canvas.logical_height() as f32;
        let amplitude = h * 0.4;
        let line = if beat {
            self.settings.line_width * 1.4
        } else {
            self.settings.line_width
        };
        let spacing = w / (self.points.len() - 1).max(1) as f32;

        let line_points: Vec<(f32, f32)> = self
            .points
            .iter()
            .enumerate()
            .map(|(i, value)| (i as f32 * spacing, h / 2.0 + value * amplitude))
            .collect();
        canvas.set_fill(self.settings.color);
        canvas.stroke_polyline(&line_points, line);
    }
}

/// Degrees per second at a rotation speed of 1.
const BASE_SPIN_DEG_PER_SEC: f64 = 12.0;

/// Spectrum bars radiating from a ring around the centre.
#[derive(Debug, Clone)]
pub struct CircularSpectrum {
    settings: CircularSettings,
    spin_deg: f64,
}

impl CircularSpectrum {
    pub fn new(settings: CircularSettings) -> Self {
        Self {
            settings,
            spin_deg: 0.0,
        }
    }

    /// Current spin, in `[0, 360)` degrees.
    pub fn spin(&self) -> f64 {
        self.spin_deg
    }

    pub fn update(&mut self, delta_ms: f64) {
        let speed = f64::from(self.settings.rotation_speed);
        let step = BASE_SPIN_DEG_PER_SEC * speed * delta_ms / 1000.0;
        self.spin_deg = (self.spin_deg + step).rem_euclid(360.0);
    }

    /// Spectrum bin drawn by bar `index` of `count` over `bins` bins.
    pub fn bin_for(&self, index: usize, count: usize, bins: usize) -> usize {
        if bins == 0 || count == 0 {
            return 0;
        }
        let last = bins - 1;
        match self.settings.energy_spread {
            EnergySpread::Linear => (index * (bins / count)).min(last),
            EnergySpread::Log => {
                let exponent = index as f32 / count as f32;
                ((bins as f32).powf(exponent) as usize).saturating_sub(1).min(last)
            }
        }
    }

    pub fn draw(&self, canvas: &mut Canvas, frequency: &[f32], beat: bool, intensity: f32) {
        if frequency.is_empty() {
            return;
        }
        let w = canvas.logical_width() as f32;
        let h = canvas.logical_height() as f32;
        let min_dimension = w.min(h);
        let pulse = if beat { intensity * 15.0 } else { 0.0 };
        let radius = min_dimension * 0.15 + pulse;
        let max_bar = min_dimension * 0.3 * (0.5 + self.settings.sensitivity);
        let arc = 360.0 * (1.0 - 0.5 * self.settings.ring_gap.clamp(0.0, 1.0));
        let count = self.settings.sample_count.max(1);
        let line_width = (if beat { 3.0 } else { 2.0 }) * self.settings.bar_spread;

        canvas.translate(w / 2.0, h / 2.0);
        canvas.rotate(self.settings.start_angle + self.spin_deg as f32);

        canvas.set_fill(Color::WHITE.with_alpha(0.15));
        canvas.stroke_circle(0.0, 0.0, radius, 1.0);

        for i in 0..count {
            let value = frequency[self.bin_for(i, count, frequency.len())];
            // Zero degrees points up; bars advance clockwise.
            let angle = (i as f32 / count as f32 * arc - 90.0).to_radians();
            let (sin, cos) = angle.sin_cos();
            let outer = radius + value * max_bar;
            canvas.set_fill(Color::from_hsl(i as f32 / count as f32 * 360.0, 0.85, 0.55));
            let spoke = [(cos * radius, sin * radius), (cos * outer, sin * outer)];
            canvas.stroke_polyline(&spoke, line_width);
        }
    }
}

/// Everything a visualiser reads from one frame.
#[derive(Debug, Clone, Copy)]
pub struct VisualizerFrame<'a> {
    /// Normalised spectrum, 0-1.
    pub frequency: &'a [f32],
    /// Normalised waveform, -1-1.
    pub time_domain: &'a [f32],
    pub is_beat: bool,
    pub intensity: f32,
    /// Bar-height reaction value.
    pub bar_reaction: f32,
    pub delta_ms: f64,
}

/// The configured visualiser as one value the frame loop can drive.
#[derive(Debug, Clone)]
pub enum Visualizer {
    Equalizer(EqualizerHistory),
    Club(ClubEqualizer),
    Waveform(WaveformView),
    Circular(CircularSpectrum),
}

impl Visualizer {
    pub fn from_config(config: &VisualizerConfig) -> Self {
        match config {
            VisualizerConfig::Equalizer(settings) => {
                Self::Equalizer(EqualizerHistory::new(settings.clone()))
            }
            VisualizerConfig::Club(settings) => Self::Club(ClubEqualizer::new(settings.clone())),
            VisualizerConfig::Waveform(settings) => {
                Self::Waveform(WaveformView::new(settings.clone()))
            }
            VisualizerConfig::Circular(settings) => {
                Self::Circular(CircularSpectrum::new(settings.clone()))
            }
        }
    }

    /// Updates from this frame's features and draws.
    pub fn render(&mut self, canvas: &mut Canvas, frame: &VisualizerFrame<'_>) {
        canvas.save();
        match self {
            Self::Equalizer(history) => {
                history.update(frame.frequency, frame.delta_ms);
                history.draw(canvas, frame.is_beat);
            }
            Self::Club(bars) => {
                bars.update(frame.frequency, frame.bar_reaction);
                bars.draw(canvas, frame.bar_reaction);
            }
            Self::Waveform(view) => {
                view.update(frame.time_domain);
                view.draw(canvas, frame.is_beat);
            }
            Self::Circular(ring) => {
                ring.update(frame.delta_ms);
                ring.draw(canvas, frame.frequency, frame.is_beat, frame.intensity);
            }
        }
        canvas.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bars_attack_fast_and_release_slowly() {
        let mut bars = ClubEqualizer::new(ClubSettings::default());
        let loud = vec![0.5; 1024];
        bars.update(&loud, 0.0);
        let risen = bars.heights()[40];
        assert!((risen - 0.25).abs() < 1e-6);

        bars.update(&[0.0; 1024], 0.0);
        let fallen = bars.heights()[40];
        assert!(fallen < risen && fallen > risen * 0.8);
        assert!(bars.peaks()[40] >= risen);
    }

    #[test]
    fn reaction_lifts_bass_bars_only() {
        let mut calm = ClubEqualizer::new(ClubSettings::default());
        let mut pulsed = ClubEqualizer::new(ClubSettings::default());
        let spectrum = vec![0.1; 1024];
        calm.update(&spectrum, 0.0);
        pulsed.update(&spectrum, 1.0);

        assert!(pulsed.heights()[0] > calm.heights()[0]);
        assert_eq!(pulsed.heights()[30], calm.heights()[30]);
    }

    #[test]
    fn bars_survive_empty_spectrum() {
        let mut bars = ClubEqualizer::new(ClubSettings::default());
        bars.update(&[], 1.0);
        assert!(bars.heights().iter().all(|h| *h == 0.0));
    }

    #[test]
    fn equalizer_history_scrolls_at_its_own_rate() {
        let mut history = EqualizerHistory::new(EqualizerSettings::default());
        let loud: Vec<f32> = (0..1024).map(|i| i as f32 / 1024.0).collect();

        assert!(history.update(&loud, 16.0));
        assert!(!history.update(&loud, 16.0));
        assert!(history.update(&loud, 20.0));
        assert_eq!(history.columns().count(), 80);

        let newest = history.columns().last().unwrap();
        assert_eq!(newest.len(), 32);
        assert_eq!(newest[1], 32.0 / 1024.0);
        assert!(history.columns().next().unwrap().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn equalizer_draws_newest_column_on_the_right() {
        let mut history = EqualizerHistory::new(EqualizerSettings {
            bands: 4,
            history: 10,
            ..Default::default()
        });
        history.update(&[1.0; 64], 100.0);
        let mut canvas = Canvas::new(100, 40, 1.0).unwrap();
        canvas.clear(Color::BLACK);
        history.draw(&mut canvas, false);

        // Bass cell of the newest column, left of the glow strip.
        let newest = canvas.pixel(91, 35).unwrap();
        assert!(newest.r > 0 || newest.g > 0);
        assert_eq!(canvas.pixel(5, 35), Some(Color::BLACK));
    }

    #[test]
    fn circular_spin_wraps_and_reverses() {
        let mut ring = CircularSpectrum::new(CircularSettings::default());
        ring.update(1000.0);
        assert!((ring.spin() - 12.0).abs() < 1e-9);
        ring.update(30_000.0);
        assert!((ring.spin() - 12.0).abs() < 1e-9);

        let mut reverse = CircularSpectrum::new(CircularSettings {
            rotation_speed: -1.0,
            ..Default::default()
        });
        reverse.update(1000.0);
        assert!((reverse.spin() - 348.0).abs() < 1e-9);
    }

    #[test]
    fn log_spread_favours_low_bins() {
        let linear = CircularSpectrum::new(CircularSettings::default());
        let log = CircularSpectrum::new(CircularSettings {
            energy_spread: EnergySpread::Log,
            ..Default::default()
        });
        assert_eq!(linear.bin_for(64, 128, 1024), 512);
        assert!(log.bin_for(64, 128, 1024) < 64);
        assert_eq!(log.bin_for(0, 128, 1024), 0);
        assert!(log.bin_for(127, 128, 1024) <= 1023);
        let bins: Vec<usize> = (0..128).map(|i| log.bin_for(i, 128, 1024)).collect();
        assert!(bins.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn circular_bars_start_at_the_top() {
        let ring = CircularSpectrum::new(CircularSettings::default());
        let mut canvas = Canvas::new(100, 100, 1.0).unwrap();
        canvas.clear(Color::BLACK);
        ring.draw(&mut canvas, &[1.0; 1024], false, 0.0);

        // Base radius 15, full bars reach 45 above the centre.
        assert_ne!(canvas.pixel(50, 20), Some(Color::BLACK));
        assert_eq!(canvas.pixel(50, 50), Some(Color::BLACK));
        assert_eq!(canvas.pixel(50, 2), Some(Color::BLACK));
    }

    #[test]
    fn waveform_resamples_points() {
        let mut view = WaveformView::new(WaveformSettings {
            samples: 4,
            ..Default::default()
        });
        view.update(&[0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7]);
        assert_eq!(view.points(), &[0.0, 0.2, 0.4, 0.6]);
    }

    #[test]
    fn render_restores_canvas_state() {
        let mut canvas = Canvas::new(64, 32, 1.0).unwrap();
        let frame = VisualizerFrame {
            frequency: &[0.8; 1024],
            time_domain: &[0.0; 1024],
            is_beat: true,
            intensity: 0.7,
            bar_reaction: 0.5,
            delta_ms: 16.0,
        };
        for config in [
            VisualizerConfig::default(),
            VisualizerConfig::Equalizer(Default::default()),
            VisualizerConfig::Waveform(Default::default()),
            VisualizerConfig::Circular(Default::default()),
        ] {
            let mut visualizer = Visualizer::from_config(&config);
            visualizer.render(&mut canvas, &frame);
            assert_eq!(canvas.state(), canvas.base_state());
            assert_eq!(canvas.depth(), 0);
        }
    }
}
