//! Post-processing and beat-driven effects drawn on top of the visualiser.

mod particles;
mod shake;
mod vignette;

use serde::{Deserialize, Serialize};

pub use particles::{Particle, ParticleConfig, ParticleSystem};
pub use shake::{shake_offset, CameraShake, ShakeOffset};
pub use vignette::render_vignette;

use crate::{BeatVizError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    pub camera_shake: CameraShakeConfig,
    pub vignette: VignetteConfig,
}

impl EffectsConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.camera_shake.max_offset.is_finite() || self.camera_shake.max_offset < 0.0 {
            return Err(BeatVizError::InvalidConfig(
                "effects.camera_shake.max_offset must be a non-negative number".into(),
            ));
        }
        let unit = 0.0..=1.0;
        if !unit.contains(&self.vignette.intensity) || !unit.contains(&self.vignette.softness) {
            return Err(BeatVizError::InvalidConfig(
                "effects.vignette intensity and softness must be in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Magnitude of the camera shake. Its timing comes from the
/// `camera_shake` reaction channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraShakeConfig {
    pub enabled: bool,
    /// Pixel offset at full reaction.
    pub max_offset: f32,
}

impl Default for CameraShakeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_offset: 8.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct VignetteConfig {
    pub enabled: bool,
    /// Edge darkness, 0-1.
    pub intensity: f32,
    /// Fraction of the radius that stays clear.
    pub softness: f32,
}

impl Default for VignetteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            intensity: 0.35,
            softness: 0.5,
        }
    }
}
