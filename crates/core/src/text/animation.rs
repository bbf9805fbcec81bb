use super::{BeatEffectSettings, TextAnimation};
use crate::{
    animation::{ease_out_back, ease_out_cubic, ease_out_elastic, ease_out_quad},
    render::Color,
};

/// Length of the entrance animation.
pub const INTRO_MS: f64 = 1200.0;
const SLIDE_DISTANCE: f64 = 150.0;
const MAX_SHAKE: f64 = 25.0;
/// About 15 degrees.
const MAX_WOBBLE: f64 = 0.26;
const MAX_PULSE_SCALE: f64 = 0.5;
const MAX_GLOW: f64 = 40.0;

/// Transform and glow applied to one text layer for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextAnimationState {
    pub opacity: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub scale: f64,
    /// Radians, clockwise.
    pub rotation: f64,
    /// Glow blur radius in logical pixels.
    pub glow_blur: f64,
    pub glow_color: Color,
}

impl Default for TextAnimationState {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            scale: 1.0,
            rotation: 0.0,
            glow_blur: 0.0,
            glow_color: Color::TRANSPARENT,
        }
    }
}

/// Cheap deterministic jitter in `[-1, 1)`.
fn noise(seed: f64, time_ms: f64) -> f64 {
    let x = (seed * 12.9898 + time_ms * 0.001).sin() * 43758.5453;
    (x - x.floor()) * 2.0 - 1.0
}

fn oscillate(time_ms: f64, frequency: f64, phase: f64) -> f64 {
    (time_ms * frequency * 0.001 + phase).sin()
}

/// Three stacked sines; reads as drifting rather than periodic.
fn organic(time_ms: f64, seed: f64) -> f64 {
    oscillate(time_ms, 2.0, seed) * 0.5
        + oscillate(time_ms, 5.0, seed + 1.0) * 0.3
        + oscillate(time_ms, 11.0, seed + 2.0) * 0.2
}

fn glow(alpha: f64, color: Color) -> Color {
    color.with_alpha(alpha as f32)
}

/// Beat reaction scaled by how eagerly the layer responds.
pub fn effective_beat(beat_reaction: f64, settings: &BeatEffectSettings) -> f64 {
    beat_reaction * (0.5 + settings.sensitivity) * (0.5 + settings.beat_strength)
}

/// Animation state `since_shown_ms` after the layer appeared, with the
/// text-pulse reaction at `beat_reaction` and the wall clock at `time_ms`
/// driving the ambient motion.
pub fn animate(
    animation: TextAnimation,
    since_shown_ms: f64,
    beat_reaction: f64,
    settings: &BeatEffectSettings,
    time_ms: f64,
) -> TextAnimationState {
    let progress = (since_shown_ms / INTRO_MS).clamp(0.0, 1.0);
    let beat = effective_beat(beat_reaction, settings);
    let seed = animation.seed();
    let quick_fade = ease_out_quad((progress * 2.0).min(1.0));
    let back_intro = if progress < 1.0 { ease_out_back(progress) } else { 1.0 };

    match animation {
        TextAnimation::None => TextAnimationState::default(),
        TextAnimation::Fade => TextAnimationState {
            opacity: ease_out_cubic(progress),
            scale: 1.0 + beat * 0.1,
            glow_blur: beat * settings.glow_intensity * MAX_GLOW * 0.5,
            glow_color: glow(beat * settings.glow_intensity * 0.6, Color::WHITE),
            ..Default::default()
        },
        TextAnimation::SlideUp
        | TextAnimation::SlideDown
        | TextAnimation::SlideLeft
        | TextAnimation::SlideRight => {
            let (dir_x, dir_y) = animation.slide_direction();
            let travel = (1.0 - ease_out_back(progress)) * SLIDE_DISTANCE + beat * 10.0;
            TextAnimationState {
                opacity: quick_fade,
                offset_x: dir_x * travel,
                offset_y: dir_y * travel,
                scale: 1.0 + beat * 0.08,
                glow_blur: beat * settings.glow_intensity * MAX_GLOW * 0.4,
                glow_color: glow(beat * settings.glow_intensity * 0.5, Color::WHITE),
                ..Default::default()
            }
        }
        TextAnimation::Scale => TextAnimationState {
            opacity: ease_out_quad((progress * 3.0).min(1.0)),
            scale: ease_out_elastic(progress) + beat * 0.25,
            glow_blur: beat * settings.glow_intensity * MAX_GLOW * 0.5,
            glow_color: glow(beat * settings.glow_intensity * 0.6, Color::WHITE),
            ..Default::default()
        },
        TextAnimation::Pulse => {
            let pulse = beat * MAX_PULSE_SCALE * (0.5 + settings.beat_strength);
            let ambient = (time_ms * 0.003).sin() * 0.02;
            let glow_amount = beat * settings.glow_intensity;
            TextAnimationState {
                opacity: quick_fade,
                scale: back_intro + pulse + ambient,
                glow_blur: 5.0 + glow_amount * MAX_GLOW,
                glow_color: glow(0.2 + glow_amount * 0.8, Color::rgb(255, 200, 100)),
                ..Default::default()
            }
        }
        TextAnimation::Shake => {
            let shake = beat * MAX_SHAKE * (0.5 + settings.shake_intensity);
            TextAnimationState {
                opacity: quick_fade,
                offset_x: noise(seed, time_ms * 50.0) * shake + noise(seed, time_ms * 10.0) * 2.0,
                offset_y: noise(seed + 100.0, time_ms * 50.0) * shake
                    + noise(seed + 100.0, time_ms * 10.0) * 2.0,
                scale: back_intro + beat * 0.2 * (0.5 + settings.shake_intensity),
                rotation: noise(seed + 200.0, time_ms * 30.0) * beat * 0.1,
                glow_blur: beat * settings.glow_intensity * MAX_GLOW * 0.6,
                glow_color: glow(beat * settings.glow_intensity * 0.7, Color::rgb(255, 100, 50)),
            }
        }
        TextAnimation::Wobble => {
            let sway = 0.5 + settings.shake_intensity;
            let intro = if progress < 1.0 { ease_out_elastic(progress) } else { 1.0 };
            TextAnimationState {
                opacity: quick_fade,
                offset_x: organic(time_ms, seed) * 8.0 * sway
                    + beat * organic(time_ms * 3.0, seed) * 15.0,
                offset_y: organic(time_ms + 1000.0, seed + 50.0) * 5.0 * sway
                    + beat * organic(time_ms * 3.0, seed + 50.0) * 10.0,
                scale: intro + beat * 0.15,
                rotation: oscillate(time_ms, 1.5, seed) * MAX_WOBBLE * 0.3 * sway
                    + beat * oscillate(time_ms, 8.0, seed) * MAX_WOBBLE,
                glow_blur: 3.0 + beat * settings.glow_intensity * MAX_GLOW * 0.5,
                glow_color: glow(
                    0.1 + beat * settings.glow_intensity * 0.6,
                    Color::rgb(150, 100, 255),
                ),
            }
        }
        TextAnimation::Glow => {
            let ambient_blur = 8.0 + (time_ms * 0.002).sin() * 4.0;
            let ambient_alpha = 0.3 + (time_ms * 0.003).sin() * 0.1;
            // Warmer as the beat lands.
            let warm = Color::rgb(
                255,
                (200.0 - beat * 100.0).round().clamp(0.0, 255.0) as u8,
                (100.0 - beat * 50.0).round().clamp(0.0, 255.0) as u8,
            );
            TextAnimationState {
                opacity: ease_out_cubic(progress),
                scale: back_intro + beat * 0.12,
                glow_blur: ambient_blur + beat * MAX_GLOW * (0.5 + settings.glow_intensity),
                glow_color: glow(ambient_alpha + beat * settings.glow_intensity, warm),
                ..Default::default()
            }
        }
    }
}

/// Layers on a scale pulse, a shake and a white glow for animations that do
/// not react to the beat themselves.
pub fn apply_beat_effects(
    state: TextAnimationState,
    beat_reaction: f64,
    settings: &BeatEffectSettings,
    time_ms: f64,
) -> TextAnimationState {
    if beat_reaction <= 0.01 {
        return state;
    }
    let beat = effective_beat(beat_reaction, settings);
    let shake = beat * MAX_SHAKE * 0.5 * settings.shake_intensity;
    let glow_alpha = beat * 0.6 * settings.glow_intensity;
    TextAnimationState {
        offset_x: state.offset_x + noise(42.0, time_ms * 40.0) * shake,
        offset_y: state.offset_y + noise(142.0, time_ms * 40.0) * shake,
        scale: state.scale * (1.0 + beat * 0.2),
        glow_blur: state.glow_blur.max(beat * MAX_GLOW * 0.6 * settings.glow_intensity),
        glow_color: if glow_alpha > 0.1 {
            glow(glow_alpha, Color::WHITE)
        } else {
            state.glow_color
        },
        ..state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BeatEffectSettings {
        BeatEffectSettings::default()
    }

    #[test]
    fn pulse_scales_with_the_beat() {
        let time = 0.0;
        let calm = animate(TextAnimation::Pulse, INTRO_MS, 0.0, &settings(), time);
        assert!((calm.scale - 1.0).abs() < 1e-9);
        assert!((calm.glow_blur - 5.0).abs() < 1e-9);

        let hit = animate(TextAnimation::Pulse, INTRO_MS, 1.0, &settings(), time);
        // 1.2 * 1.2 effective beat, times 0.5 max scale, times 1.2 strength.
        assert!((hit.scale - (1.0 + 1.44 * 0.5 * 1.2)).abs() < 1e-9);
        assert!((hit.glow_blur - (5.0 + 1.44 * 0.7 * 40.0)).abs() < 1e-9);
        assert_eq!(hit.glow_color.a, 255);
        assert_eq!((hit.glow_color.r, hit.glow_color.g, hit.glow_color.b), (255, 200, 100));
    }

    #[test]
    fn glow_warms_and_widens_on_beat() {
        let calm = animate(TextAnimation::Glow, INTRO_MS, 0.0, &settings(), 0.0);
        assert!((calm.glow_blur - 8.0).abs() < 1e-9);
        assert_eq!(calm.glow_color, Color::rgb(255, 200, 100).with_alpha(0.3));

        let half = animate(TextAnimation::Glow, INTRO_MS, 0.5 / 1.44, &settings(), 0.0);
        assert!((half.glow_blur - (8.0 + 0.5 * 40.0 * 1.2)).abs() < 1e-6);
        assert_eq!((half.glow_color.g, half.glow_color.b), (150, 75));
        assert!((half.scale - 1.06).abs() < 1e-6);
    }

    #[test]
    fn intros_fade_in_over_the_intro() {
        let entrances = [
            TextAnimation::Fade,
            TextAnimation::Pulse,
            TextAnimation::SlideUp,
            TextAnimation::Glow,
        ];
        for animation in entrances {
            let start = animate(animation, 0.0, 0.0, &settings(), 0.0);
            let settled = animate(animation, INTRO_MS * 2.0, 0.0, &settings(), 0.0);
            assert!(start.opacity < 0.01, "{animation:?} starts visible");
            assert!((settled.opacity - 1.0).abs() < 1e-9, "{animation:?} never settles");
        }
    }

    #[test]
    fn slides_start_off_position_and_land() {
        let start = animate(TextAnimation::SlideLeft, 0.0, 0.0, &settings(), 0.0);
        assert!((start.offset_x + SLIDE_DISTANCE).abs() < 1e-9);
        assert_eq!(start.offset_y, 0.0);
        let landed = animate(TextAnimation::SlideDown, INTRO_MS, 0.0, &settings(), 0.0);
        assert!(landed.offset_y.abs() < 1e-9);
    }

    #[test]
    fn shake_stays_within_bounds() {
        let limit = 1.44 * MAX_SHAKE * 1.1 + 2.0;
        for step in 0..200 {
            let time = step as f64 * 16.0;
            let state = animate(TextAnimation::Shake, INTRO_MS, 1.0, &settings(), time);
            assert!(state.offset_x.abs() <= limit && state.offset_y.abs() <= limit);
        }
    }

    #[test]
    fn beat_effects_only_above_floor() {
        let base = TextAnimationState::default();
        assert_eq!(apply_beat_effects(base, 0.005, &settings(), 0.0), base);
        let boosted = apply_beat_effects(base, 1.0, &settings(), 0.0);
        assert!(boosted.scale > 1.2);
        assert!(boosted.glow_blur > 0.0);
        assert_eq!((boosted.glow_color.r, boosted.glow_color.g), (255, 255));
    }
}
