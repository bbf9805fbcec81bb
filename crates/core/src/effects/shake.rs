use std::f64::consts::TAU;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::reaction::ACTIVE_FLOOR;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShakeOffset {
    pub x: f32,
    pub y: f32,
}

/// Offset for a reaction value: the direction rotates with time and the
/// magnitude is jittered by a random factor in `[0.5, 1]`.
pub fn shake_offset(
    reaction: f64,
    max_offset: f32,
    now_ms: f64,
    rng: &mut impl Rng,
) -> ShakeOffset {
    if reaction <= ACTIVE_FLOOR {
        return ShakeOffset::default();
    }
    let angle = (now_ms / 50.0) % TAU;
    let magnitude = reaction * f64::from(max_offset) * rng.gen_range(0.5..=1.0);
    ShakeOffset {
        x: (angle.cos() * magnitude) as f32,
        y: (angle.sin() * magnitude) as f32,
    }
}

/// Stateful wrapper that owns its random source.
#[derive(Debug, Clone)]
pub struct CameraShake {
    max_offset: f32,
    rng: StdRng,
}

impl CameraShake {
    pub fn new(max_offset: f32, seed: u64) -> Self {
        Self {
            max_offset,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn offset(&mut self, reaction: f64, now_ms: f64) -> ShakeOffset {
        shake_offset(reaction, self.max_offset, now_ms, &mut self.rng)
    }
}
