//! Scene description: what goes behind the visualiser and which visualiser
//! draws the spectrum.

mod visualizers;

use serde::{Deserialize, Serialize};

pub use visualizers::{
    CircularSpectrum, ClubEqualizer, EqualizerHistory, Visualizer, VisualizerFrame, WaveformView,
};

use crate::{
    render::{Canvas, Color, ImageData},
    BeatVizError, Result,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackgroundConfig {
    Solid {
        color: Color,
    },
    Gradient {
        kind: GradientKind,
        stops: Vec<GradientStop>,
    },
    Image {
        /// Path or URL the host resolves into pixels.
        src: String,
        #[serde(default)]
        fit: ImageFit,
        #[serde(default = "full_opacity")]
        opacity: f32,
    },
}

fn full_opacity() -> f32 {
    1.0
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self::Solid {
            color: Color::rgb(0x1a, 0x1a, 0x1a),
        }
    }
}

impl BackgroundConfig {
    /// Linear dark gradient offered when switching to gradient mode.
    pub fn default_gradient() -> Self {
        Self::Gradient {
            kind: GradientKind::Linear { angle: 180.0 },
            stops: vec![
                GradientStop {
                    color: Color::rgb(0x1a, 0x1a, 0x1a),
                    position: 0.0,
                },
                GradientStop {
                    color: Color::rgb(0x2d, 0x2d, 0x2d),
                    position: 1.0,
                },
            ],
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Solid { .. } => Ok(()),
            Self::Gradient { stops, .. } => {
                if stops.is_empty() {
                    return Err(BeatVizError::InvalidConfig(
                        "background gradient needs at least one stop".into(),
                    ));
                }
                if stops.iter().any(|stop| !(0.0..=1.0).contains(&stop.position)) {
                    return Err(BeatVizError::InvalidConfig(
                        "gradient stop positions must be in [0, 1]".into(),
                    ));
                }
                Ok(())
            }
            Self::Image { opacity, .. } => {
                if !(0.0..=1.0).contains(opacity) {
                    return Err(BeatVizError::InvalidConfig(
                        "background image opacity must be in [0, 1]".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum GradientKind {
    /// Degrees; 0 runs top to bottom.
    Linear { angle: f32 },
    Radial,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    pub color: Color,
    pub position: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFit {
    #[default]
    Cover,
    Contain,
    Stretch,
}

impl ImageFit {
    /// Destination rectangle `(x, y, width, height)` for an image of
    /// `image` size drawn into `target`.
    pub fn place(self, image: (f32, f32), target: (f32, f32)) -> (f32, f32, f32, f32) {
        let (iw, ih) = image;
        let (tw, th) = target;
        if self == Self::Stretch || iw <= 0.0 || ih <= 0.0 {
            return (0.0, 0.0, tw, th);
        }
        let scale = match self {
            Self::Cover => (tw / iw).max(th / ih),
            _ => (tw / iw).min(th / ih),
        };
        let (w, h) = (iw * scale, ih * scale);
        ((tw - w) / 2.0, (th - h) / 2.0, w, h)
    }
}

/// Paints the background layer. Image backgrounds fall back to black until
/// the host supplies pixels.
pub fn render_background(
    canvas: &mut Canvas,
    config: &BackgroundConfig,
    image: Option<&ImageData>,
) {
    let w = canvas.logical_width() as f32;
    let h = canvas.logical_height() as f32;
    canvas.save();
    match config {
        BackgroundConfig::Solid { color } => {
            canvas.set_fill(*color);
            canvas.fill_rect(0.0, 0.0, w, h);
        }
        BackgroundConfig::Gradient { kind, stops } => {
            let mut stops: Vec<(f32, Color)> =
                stops.iter().map(|stop| (stop.position, stop.color)).collect();
            stops.sort_by(|a, b| a.0.total_cmp(&b.0));
            match kind {
                GradientKind::Linear { angle } => canvas.fill_linear(*angle, &stops),
                GradientKind::Radial => {
                    canvas.fill_radial(w / 2.0, h / 2.0, w.max(h) / 2.0, &stops)
                }
            }
        }
        BackgroundConfig::Image { fit, opacity, .. } => {
            canvas.set_fill(Color::BLACK);
            canvas.fill_rect(0.0, 0.0, w, h);
            if let Some(image) = image {
                let size = (image.width() as f32, image.height() as f32);
                let (x, y, dw, dh) = fit.place(size, (w, h));
                canvas.set_alpha(*opacity);
                canvas.draw_image(image, x, y, dw, dh);
            }
        }
    }
    canvas.restore();
}

/// Which visualiser draws the spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VisualizerConfig {
    /// Scrolling band history; time flows right to left.
    Equalizer(EqualizerSettings),
    /// Club-style bar wall.
    #[serde(rename = "equalizer_v2", alias = "club")]
    Club(ClubSettings),
    Waveform(WaveformSettings),
    Circular(CircularSettings),
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self::Club(ClubSettings::default())
    }
}

impl VisualizerConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Equalizer(settings) => {
                if settings.bands == 0 || settings.history == 0 {
                    return Err(BeatVizError::InvalidConfig(
                        "equalizer needs at least one band and one history column".into(),
                    ));
                }
                if settings.update_hz.is_nan() || settings.update_hz <= 0.0 {
                    return Err(BeatVizError::InvalidConfig(
                        "equalizer update_hz must be positive".into(),
                    ));
                }
            }
            Self::Club(settings) => {
                if settings.bar_count == 0 {
                    return Err(BeatVizError::InvalidConfig(
                        "club bar_count must be positive".into(),
                    ));
                }
            }
            Self::Waveform(_) => {}
            Self::Circular(settings) => {
                if !(0.0..=1.0).contains(&settings.ring_gap) {
                    return Err(BeatVizError::InvalidConfig(
                        "circular ring_gap must be in [0, 1]".into(),
                    ));
                }
                if !(0.5..=2.0).contains(&settings.bar_spread) {
                    return Err(BeatVizError::InvalidConfig(
                        "circular bar_spread must be in [0.5, 2]".into(),
                    ));
                }
                if !(-2.0..=2.0).contains(&settings.rotation_speed) {
                    return Err(BeatVizError::InvalidConfig(
                        "circular rotation_speed must be in [-2, 2]".into(),
                    ));
                }
                if settings.sample_count == 0 {
                    return Err(BeatVizError::InvalidConfig(
                        "circular sample_count must be positive".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqualizerSettings {
    /// Frequency rows, bass at the bottom.
    pub bands: usize,
    /// Time columns kept on screen.
    pub history: usize,
    /// Columns appended per second, independent of the frame rate.
    pub update_hz: f64,
}

impl Default for EqualizerSettings {
    fn default() -> Self {
        Self {
            bands: 32,
            history: 80,
            update_hz: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClubSettings {
    pub bar_count: usize,
    pub gap: f32,
    /// Low-frequency boost, 0-2.
    pub bass_gain: f32,
    /// 0-1.
    pub sensitivity: f32,
    pub vertical_scale: f32,
    /// How fast bars fall, 0-1.
    pub decay: f32,
}

impl Default for ClubSettings {
    fn default() -> Self {
        Self {
            bar_count: 48,
            gap: 2.0,
            bass_gain: 1.0,
            sensitivity: 0.5,
            vertical_scale: 1.0,
            decay: 0.5,
        }
    }
}

/// How the ring's bars map onto spectrum bins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergySpread {
    #[default]
    Linear,
    /// More bars for the low end.
    Log,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircularSettings {
    /// 0 closes the ring, 1 leaves half of it open.
    pub ring_gap: f32,
    /// Bar thickness multiplier, 0.5-2.
    pub bar_spread: f32,
    /// 0-1.
    pub sensitivity: f32,
    /// Multiplier on the base spin, -2 to 2. Negative spins anticlockwise.
    pub rotation_speed: f32,
    /// Degrees clockwise from the top.
    pub start_angle: f32,
    pub energy_spread: EnergySpread,
    pub sample_count: usize,
}

impl Default for CircularSettings {
    fn default() -> Self {
        Self {
            ring_gap: 0.0,
            bar_spread: 1.0,
            sensitivity: 0.5,
            rotation_speed: 1.0,
            start_angle: 0.0,
            energy_spread: EnergySpread::Linear,
            sample_count: 128,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveformSettings {
    pub color: Color,
    pub samples: usize,
    pub line_width: f32,
}

impl Default for WaveformSettings {
    fn default() -> Self {
        Self {
            color: Color::rgb(0x00, 0xff, 0xff),
            samples: 256,
            line_width: 2.5,
        }
    }
}
