use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    effects::{EffectsConfig, ParticleConfig},
    reaction::ReactionConfig,
    record::ExportOptions,
    render::Color,
    scene::{BackgroundConfig, VisualizerConfig},
    text::TextConfig,
    BeatVizError, Result,
};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub detector: DetectorConfig,
    pub renderer: RendererConfig,
    pub reactions: ReactionsConfig,
    pub effects: EffectsConfig,
    pub particles: ParticleConfig,
    pub background: BackgroundConfig,
    pub visualizer: VisualizerConfig,
    pub text: TextConfig,
    pub export: ExportOptions,
}

impl AppConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        tracing::debug!(?path, "loaded configuration file");
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;
        self.detector.validate()?;
        self.renderer.validate()?;
        for (name, reaction) in self.reactions.iter() {
            reaction
                .validate()
                .map_err(|err| BeatVizError::InvalidConfig(format!("reactions.{name}: {err}")))?;
        }
        self.effects.validate()?;
        self.particles.validate()?;
        self.background.validate()?;
        self.visualizer.validate()?;
        self.text.validate()?;
        if self.export.frame_rate == 0 {
            return Err(BeatVizError::InvalidConfig(
                "export.frame_rate must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration of the audio graph's analyser and gain stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub fft_size: usize,
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
    pub volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
            volume: 1.0,
        }
    }
}

impl AudioConfig {
    /// Number of frequency bins in a snapshot.
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    fn validate(&self) -> Result<()> {
        if !self.fft_size.is_power_of_two() || !(32..=32_768).contains(&self.fft_size) {
            return Err(BeatVizError::InvalidConfig(format!(
                "audio.fft_size must be a power of two in [32, 32768], got {}",
                self.fft_size
            )));
        }
        if !(0.0..1.0).contains(&self.smoothing_time_constant) {
            return Err(BeatVizError::InvalidConfig(
                "audio.smoothing_time_constant must be in [0, 1)".into(),
            ));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(BeatVizError::InvalidConfig(
                "audio.min_decibels must be below audio.max_decibels".into(),
            ));
        }
        Ok(())
    }
}

/// Tuning of the energy beat detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Bass samples kept for the trailing average (~700 ms at 60 fps).
    pub history_size: usize,
    /// Bass must exceed `average * threshold_ratio`.
    pub threshold_ratio: f32,
    pub cooldown_ms: f64,
    /// Averages at or below this are treated as silence.
    pub energy_floor: f32,
    pub bass_end: usize,
    pub mid_end: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            history_size: 43,
            threshold_ratio: 1.3,
            cooldown_ms: 100.0,
            energy_floor: 0.01,
            bass_end: 10,
            mid_end: 93,
        }
    }
}

impl DetectorConfig {
    fn validate(&self) -> Result<()> {
        if self.history_size == 0 {
            return Err(BeatVizError::InvalidConfig(
                "detector.history_size must be at least 1".into(),
            ));
        }
        if self.bass_end == 0 || self.bass_end >= self.mid_end {
            return Err(BeatVizError::InvalidConfig(format!(
                "detector band edges must satisfy 0 < bass_end < mid_end, got {} and {}",
                self.bass_end, self.mid_end
            )));
        }
        if !self.cooldown_ms.is_finite() || self.cooldown_ms < 0.0 {
            return Err(BeatVizError::InvalidConfig(
                "detector.cooldown_ms must be a non-negative number".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Logical width before device pixel scaling.
    pub width: u32,
    pub height: u32,
    pub device_pixel_ratio: f32,
    pub background: Color,
    /// Drop a callback after it panics instead of retrying it next frame.
    pub auto_unregister_faulty: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            device_pixel_ratio: 1.0,
            background: Color::rgb(0x1a, 0x1a, 0x1a),
            auto_unregister_faulty: false,
        }
    }
}

impl RendererConfig {
    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(BeatVizError::InvalidConfig(
                "renderer dimensions must be non-zero".into(),
            ));
        }
        if !self.device_pixel_ratio.is_finite() || self.device_pixel_ratio <= 0.0 {
            return Err(BeatVizError::InvalidConfig(
                "renderer.device_pixel_ratio must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Decay settings of every reaction channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionsConfig {
    pub camera_shake: ReactionConfig,
    pub text_pulse: ReactionConfig,
    pub bar_height: ReactionConfig,
    pub particles: ReactionConfig,
}

impl Default for ReactionsConfig {
    fn default() -> Self {
        Self {
            camera_shake: ReactionConfig::new(100.0, 0.6),
            text_pulse: ReactionConfig::new(150.0, 0.1),
            bar_height: ReactionConfig::new(200.0, 0.05),
            particles: ReactionConfig::new(150.0, 0.0),
        }
    }
}

impl ReactionsConfig {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ReactionConfig)> {
        [
            ("camera_shake", &self.camera_shake),
            ("text_pulse", &self.text_pulse),
            ("bar_height", &self.bar_height),
            ("particles", &self.particles),
        ]
        .into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = AppConfig::from_json_str(
            r##"{ "detector": { "cooldown_ms": 150 }, "renderer": { "background": "#000000" } }"##,
        )
        .unwrap();

        assert_eq!(config.detector.cooldown_ms, 150.0);
        assert_eq!(config.detector.history_size, 43);
        assert_eq!(config.renderer.background, Color::rgb(0, 0, 0));
        assert_eq!(config.audio.frequency_bin_count(), 1024);
    }

    #[test]
    fn text_layers_are_part_of_the_config() {
        let config = AppConfig::from_json_str(
            r#"{ "text": { "layers": [ { "content": "DROP", "animation": "slide-up" } ] } }"#,
        )
        .unwrap();
        assert_eq!(config.text.layers.len(), 1);
        assert_eq!(config.text.layers[0].content, "DROP");
        assert!(config.text.font.is_none());

        let err = AppConfig::from_json_str(
            r#"{ "text": { "layers": [ { "content": "x", "style": { "font_size": 0 } } ] } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, BeatVizError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_non_power_of_two_fft() {
        let err = AppConfig::from_json_str(r#"{ "audio": { "fft_size": 1000 } }"#).unwrap_err();
        assert!(matches!(err, BeatVizError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_inverted_band_edges() {
        let mut config = AppConfig::default();
        config.detector.bass_end = 120;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_decay_duration() {
        let mut config = AppConfig::default();
        config.reactions.text_pulse.decay_ms = 0.0;
        let err = config.validate().unwrap_err();
        assert!(format!("{err}").contains("text_pulse"));
    }
}
