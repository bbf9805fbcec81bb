//! Decay channels: turn discrete beat events into a value that peaks on the
//! beat and eases back to zero.

use serde::{Deserialize, Serialize};

use crate::{animation, animation::Easing, BeatVizError, Result};

/// Values at or below this floor end the decay.
pub const ACTIVE_FLOOR: f64 = 0.01;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionConfig {
    pub decay_ms: f64,
    pub easing: Easing,
    /// Minimum beat intensity that (re)starts the decay.
    pub threshold: f64,
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self {
            decay_ms: 150.0,
            easing: Easing::OutExpo,
            threshold: 0.0,
        }
    }
}

impl ReactionConfig {
    pub fn new(decay_ms: f64, threshold: f64) -> Self {
        Self {
            decay_ms,
            threshold,
            ..Self::default()
        }
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.decay_ms.is_finite() || self.decay_ms <= 0.0 {
            return Err(BeatVizError::InvalidConfig(format!(
                "decay_ms must be positive, got {}",
                self.decay_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(BeatVizError::InvalidConfig(format!(
                "threshold must be in [0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// One effect's decay state.
#[derive(Debug, Clone)]
pub struct ReactionChannel {
    config: ReactionConfig,
    start_ms: Option<f64>,
    captured_intensity: f64,
}

impl ReactionChannel {
    pub fn new(config: ReactionConfig) -> Self {
        Self {
            config,
            start_ms: None,
            captured_intensity: 0.0,
        }
    }

    pub fn config(&self) -> &ReactionConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ReactionConfig) {
        self.config = config;
    }

    /// Feeds this frame's beat tuple. Returns `true` when the beat was strong
    /// enough to restart the decay.
    pub fn on_beat(&mut self, is_beat: bool, intensity: f64, now_ms: f64) -> bool {
        if !is_beat || intensity < self.config.threshold {
            return false;
        }
        self.start_ms = Some(now_ms);
        self.captured_intensity = intensity.clamp(0.0, 1.0);
        true
    }

    /// Decayed value at `now_ms` without touching the channel state.
    pub fn value_at(&self, now_ms: f64) -> f64 {
        match self.start_ms {
            Some(start) => {
                let elapsed = now_ms - start;
                self.captured_intensity
                    * animation::decay(elapsed, self.config.decay_ms, self.config.easing)
            }
            None => 0.0,
        }
    }

    /// Decayed value at `now_ms`. Once the value reaches the floor the
    /// channel goes inactive and reports zero until the next accepted beat.
    pub fn value(&mut self, now_ms: f64) -> f64 {
        if self.start_ms.is_none() {
            return 0.0;
        }
        let value = self.value_at(now_ms);
        if value <= ACTIVE_FLOOR {
            self.reset();
            return 0.0;
        }
        value
    }

    /// Whether the decayed value at `now_ms` is still above the floor.
    pub fn is_active(&self, now_ms: f64) -> bool {
        self.value_at(now_ms) > ACTIVE_FLOOR
    }

    pub fn captured_intensity(&self) -> f64 {
        self.captured_intensity
    }

    pub fn reset(&mut self) {
        self.start_ms = None;
        self.captured_intensity = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn channel(decay_ms: f64, threshold: f64) -> ReactionChannel {
        ReactionChannel::new(ReactionConfig::new(decay_ms, threshold))
    }

    #[test]
    fn peaks_at_captured_intensity_and_ends_at_zero() {
        let mut shake = channel(100.0, 0.0);
        assert!(shake.on_beat(true, 0.8, 1_000.0));

        assert!((shake.value_at(1_000.0) - 0.8).abs() < 1e-12);
        assert_eq!(shake.value_at(1_100.0), 0.0);
        assert_eq!(shake.value_at(5_000.0), 0.0);
    }

    #[test]
    fn weak_beats_are_ignored() {
        let mut shake = channel(100.0, 0.6);
        assert!(!shake.on_beat(true, 0.59, 0.0));
        assert!(!shake.on_beat(false, 1.0, 0.0));
        assert!(!shake.is_active(0.0));
        assert!(shake.on_beat(true, 0.6, 0.0));
        assert!(shake.is_active(0.0));
    }

    #[test]
    fn new_beat_restarts_decay() {
        let mut pulse = channel(150.0, 0.1);
        pulse.on_beat(true, 0.9, 0.0);
        let _ = pulse.value(100.0);
        pulse.on_beat(true, 0.4, 120.0);

        assert!((pulse.value(120.0) - 0.4).abs() < 1e-12);
        assert_eq!(pulse.captured_intensity(), 0.4);
    }

    #[test]
    fn channel_goes_inactive_at_floor() {
        let mut bars = channel(100.0, 0.0);
        bars.on_beat(true, 1.0, 0.0);
        assert!(bars.value(10.0) > ACTIVE_FLOOR);
        assert!(bars.is_active(10.0));

        // 2^-7 of the peak remains, under the floor.
        assert_eq!(bars.value(70.0), 0.0);
        assert!(!bars.is_active(70.0));
        assert_eq!(bars.value(75.0), 0.0);
    }

    #[test]
    fn channels_decay_independently() {
        let mut shake = channel(100.0, 0.6);
        let mut pulse = channel(150.0, 0.1);
        for ch in [&mut shake, &mut pulse] {
            ch.on_beat(true, 0.4, 0.0);
        }
        assert!(!shake.is_active(0.0));
        assert!(pulse.is_active(0.0));
    }

    #[test]
    fn activity_follows_the_clock_without_sampling() {
        let mut bars = channel(100.0, 0.0);
        bars.on_beat(true, 1.0, 0.0);
        assert!(bars.is_active(10.0));
        // Never sampled through `value`, yet long decayed.
        assert!(!bars.is_active(500.0));
        assert!(!bars.is_active(70.0));
        assert!(bars.is_active(5.0));
    }

    proptest! {
        #[test]
        fn decay_is_monotonically_non_increasing(
            intensity in 0.0f64..=1.0,
            decay_ms in 1.0f64..2_000.0,
            a in 0.0f64..4_000.0,
            b in 0.0f64..4_000.0,
            curve in 0usize..5,
        ) {
            let easing = [
                Easing::Linear,
                Easing::OutQuad,
                Easing::OutCubic,
                Easing::OutExpo,
                Easing::InOutSine,
            ][curve];
            let config = ReactionConfig::new(decay_ms, 0.0).with_easing(easing);
            let mut ch = ReactionChannel::new(config);
            ch.on_beat(true, intensity, 0.0);
            let (early, late) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(ch.value_at(early) + 1e-12 >= ch.value_at(late));
            prop_assert!(ch.value_at(late) >= 0.0);
            prop_assert!(ch.value_at(early) <= intensity + 1e-12);
        }
    }
}
