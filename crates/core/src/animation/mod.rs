//! Easing curves for beat-reactive visuals.
//!
//! Every curve maps progress 0 to 0 and 1 to 1. "Ease out" curves are fast at
//! the start and slow at the end, which reads well for decays. `OutBack` and
//! `OutElastic` overshoot past 1 before settling.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

pub type EasingFn = fn(f64) -> f64;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    Linear,
    /// `1 - (1 - t)^2`
    OutQuad,
    /// `1 - (1 - t)^3`
    OutCubic,
    /// `1 - 2^(-10 t)`: punchy attack with a long tail.
    #[default]
    OutExpo,
    /// `-(cos(PI t) - 1) / 2`
    InOutSine,
    /// Overshoots by about 10% then settles.
    OutBack,
    /// Damped spring.
    OutElastic,
    #[serde(skip)]
    Custom(EasingFn),
}

impl Easing {
    pub fn apply(self, t: f64) -> f64 {
        match self {
            Easing::Linear => t,
            Easing::OutQuad => ease_out_quad(t),
            Easing::OutCubic => ease_out_cubic(t),
            Easing::OutExpo => ease_out_expo(t),
            Easing::InOutSine => ease_in_out_sine(t),
            Easing::OutBack => ease_out_back(t),
            Easing::OutElastic => ease_out_elastic(t),
            Easing::Custom(curve) => curve(t),
        }
    }
}

pub fn ease_out_quad(t: f64) -> f64 {
    1.0 - (1.0 - t) * (1.0 - t)
}

pub fn ease_out_cubic(t: f64) -> f64 {
    1.0 - (1.0 - t).powi(3)
}

pub fn ease_out_expo(t: f64) -> f64 {
    if t >= 1.0 {
        1.0
    } else {
        1.0 - 2f64.powf(-10.0 * t)
    }
}

pub fn ease_in_out_sine(t: f64) -> f64 {
    -((PI * t).cos() - 1.0) / 2.0
}

pub fn ease_out_back(t: f64) -> f64 {
    const C1: f64 = 1.70158;
    const C3: f64 = C1 + 1.0;
    1.0 + C3 * (t - 1.0).powi(3) + C1 * (t - 1.0).powi(2)
}

pub fn ease_out_elastic(t: f64) -> f64 {
    if t <= 0.0 || t >= 1.0 {
        return t.clamp(0.0, 1.0);
    }
    2f64.powf(-10.0 * t) * ((t * 10.0 - 0.75) * (2.0 * PI / 3.0)).sin() + 1.0
}

/// Decay factor after `elapsed_ms` of a `duration_ms` decay: 1 at the start,
/// 0 once the duration has passed, `1 - easing(progress)` in between.
pub fn decay(elapsed_ms: f64, duration_ms: f64, easing: Easing) -> f64 {
    if elapsed_ms >= duration_ms {
        return 0.0;
    }
    if elapsed_ms <= 0.0 {
        return 1.0;
    }

    let progress = elapsed_ms / duration_ms;
    (1.0 - easing.apply(progress)).clamp(0.0, 1.0)
}
