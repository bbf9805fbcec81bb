//! Beat-reactive text overlays drawn on the text layer.
//!
//! Each [`TextLayerConfig`] is placed in normalised coordinates, styled, and
//! animated by [`animate`] from the text-pulse reaction value. Glyphs come
//! from a host-supplied font rasterised with `fontdue`; without a font the
//! overlay draws nothing.

mod animation;
mod glyphs;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use animation::{animate, apply_beat_effects, effective_beat, TextAnimationState, INTRO_MS};
pub use glyphs::{GlyphMask, TextRasterizer};

use crate::{
    render::{Canvas, Color},
    BeatVizError, Result,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    Left,
    #[default]
    Center,
    Right,
}

/// Where the text sits, 0-1 across and down the canvas. The anchor picks
/// which edge of the text lands on `x`; text is always centred on `y`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextPosition {
    pub x: f32,
    pub y: f32,
    pub anchor: Anchor,
}

impl Default for TextPosition {
    fn default() -> Self {
        Self {
            x: 0.5,
            y: 0.5,
            anchor: Anchor::Center,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextShadow {
    pub color: Color,
    pub blur: f32,
    #[serde(default)]
    pub offset_x: f32,
    #[serde(default)]
    pub offset_y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    /// Pixels per em.
    pub font_size: f32,
    pub color: Color,
    pub stroke_color: Option<Color>,
    pub stroke_width: f32,
    pub shadow: Option<TextShadow>,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 32.0,
            color: Color::WHITE,
            stroke_color: None,
            stroke_width: 0.0,
            shadow: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextAnimation {
    None,
    Fade,
    SlideUp,
    SlideDown,
    SlideLeft,
    SlideRight,
    Scale,
    #[default]
    Pulse,
    Shake,
    Wobble,
    Glow,
}

impl TextAnimation {
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Fade => "fade",
            Self::SlideUp => "slide-up",
            Self::SlideDown => "slide-down",
            Self::SlideLeft => "slide-left",
            Self::SlideRight => "slide-right",
            Self::Scale => "scale",
            Self::Pulse => "pulse",
            Self::Shake => "shake",
            Self::Wobble => "wobble",
            Self::Glow => "glow",
        }
    }

    /// Whether the animation already responds to the beat.
    pub fn is_beat_driven(self) -> bool {
        self != Self::None
    }

    fn seed(self) -> f64 {
        self.name().chars().next().map(|c| f64::from(u32::from(c))).unwrap_or(1.0)
    }

    /// Unit vector the text slides along, in screen coordinates.
    fn slide_direction(self) -> (f64, f64) {
        match self {
            Self::SlideUp => (0.0, -1.0),
            Self::SlideDown => (0.0, 1.0),
            Self::SlideLeft => (-1.0, 0.0),
            Self::SlideRight => (1.0, 0.0),
            _ => (0.0, 0.0),
        }
    }
}

/// Per-layer beat response, every field 0-1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatEffectSettings {
    pub sensitivity: f64,
    pub beat_strength: f64,
    pub smoothness: f64,
    pub shake_intensity: f64,
    pub glow_intensity: f64,
}

impl Default for BeatEffectSettings {
    fn default() -> Self {
        Self {
            sensitivity: 0.7,
            beat_strength: 0.7,
            smoothness: 0.5,
            shake_intensity: 0.6,
            glow_intensity: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextLayerConfig {
    pub content: String,
    pub position: TextPosition,
    pub style: TextStyle,
    pub animation: TextAnimation,
    /// Feed the text-pulse reaction into the animation.
    pub beat_reactive: bool,
    pub visible: bool,
    pub beat_effects: BeatEffectSettings,
}

impl Default for TextLayerConfig {
    fn default() -> Self {
        Self {
            content: String::new(),
            position: TextPosition::default(),
            style: TextStyle::default(),
            animation: TextAnimation::default(),
            beat_reactive: true,
            visible: true,
            beat_effects: BeatEffectSettings::default(),
        }
    }
}

impl TextLayerConfig {
    pub fn validate(&self) -> Result<()> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.position.x) || !unit.contains(&self.position.y) {
            return Err(BeatVizError::InvalidConfig("text position must be in [0, 1]".into()));
        }
        if self.style.font_size.is_nan() || self.style.font_size <= 0.0 {
            return Err(BeatVizError::InvalidConfig("text font_size must be positive".into()));
        }
        let effects = &self.beat_effects;
        if [
            effects.sensitivity,
            effects.beat_strength,
            effects.smoothness,
            effects.shake_intensity,
            effects.glow_intensity,
        ]
        .iter()
        .any(|value| !(0.0..=1.0).contains(value))
        {
            return Err(BeatVizError::InvalidConfig("text beat effects must be in [0, 1]".into()));
        }
        Ok(())
    }

    /// Animation state for this layer, including the extra beat effects for
    /// layers whose animation ignores the beat.
    pub fn animation_state(
        &self,
        since_shown_ms: f64,
        text_pulse: f64,
        time_ms: f64,
    ) -> TextAnimationState {
        let beat = if self.beat_reactive { text_pulse } else { 0.0 };
        let state = animate(self.animation, since_shown_ms, beat, &self.beat_effects, time_ms);
        if self.beat_reactive && !self.animation.is_beat_driven() {
            apply_beat_effects(state, beat, &self.beat_effects, time_ms)
        } else {
            state
        }
    }
}

/// Text overlay section of the configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Font file the host loads and hands to the overlay.
    pub font: Option<PathBuf>,
    pub layers: Vec<TextLayerConfig>,
}

impl TextConfig {
    pub fn validate(&self) -> Result<()> {
        for (i, layer) in self.layers.iter().enumerate() {
            layer
                .validate()
                .map_err(|err| BeatVizError::InvalidConfig(format!("text.layers[{i}]: {err}")))?;
        }
        Ok(())
    }
}

/// Left and top of a `width × height` block of text placed at `(x, y)`,
/// relative to that point.
pub fn anchor_offset(anchor: Anchor, width: f32, height: f32) -> (f32, f32) {
    let left = match anchor {
        Anchor::Left => 0.0,
        Anchor::Center => -width / 2.0,
        Anchor::Right => -width,
    };
    (left, -height / 2.0)
}

/// Draws one laid-out text layer: shadow, glow, outline, then fill.
pub fn draw_text_mask(
    canvas: &mut Canvas,
    mask: &GlyphMask,
    layer: &TextLayerConfig,
    state: &TextAnimationState,
) {
    if !layer.visible || state.opacity <= 0.0 {
        return;
    }
    let x = layer.position.x * canvas.logical_width() as f32 + state.offset_x as f32;
    let y = layer.position.y * canvas.logical_height() as f32 + state.offset_y as f32;
    let (width, height) = (mask.width() as f32, mask.height() as f32);
    let (left, top) = anchor_offset(layer.position.anchor, width, height);

    canvas.save();
    canvas.translate(x, y);
    canvas.rotate(state.rotation.to_degrees() as f32);
    canvas.scale(state.scale as f32, state.scale as f32);
    canvas.set_alpha(state.opacity as f32);

    if let Some(shadow) = layer.style.shadow {
        let (x, y) = (left + shadow.offset_x, top + shadow.offset_y);
        draw_soft(canvas, mask, shadow.blur, shadow.color, x, y);
    }
    if state.glow_blur > 0.0 && state.glow_color.a > 0 {
        draw_soft(canvas, mask, state.glow_blur as f32, state.glow_color, left, top);
    }
    if let Some(stroke) = layer.style.stroke_color {
        let grow = (layer.style.stroke_width / 2.0).ceil() as usize;
        if grow > 0 {
            let outline = mask.padded(grow).dilated(grow);
            draw_tinted(canvas, &outline, stroke, left - grow as f32, top - grow as f32);
        }
    }
    draw_tinted(canvas, mask, layer.style.color, left, top);
    canvas.restore();
}

fn draw_soft(canvas: &mut Canvas, mask: &GlyphMask, blur: f32, color: Color, left: f32, top: f32) {
    // Canvas-style blur radii are about twice the deviation.
    let radius = (blur / 2.0).ceil().max(0.0) as usize;
    let pad = radius * 2;
    let soft = mask.padded(pad).blurred(radius);
    draw_tinted(canvas, &soft, color, left - pad as f32, top - pad as f32);
}

fn draw_tinted(canvas: &mut Canvas, mask: &GlyphMask, color: Color, left: f32, top: f32) {
    match mask.to_image(color) {
        Ok(image) => {
            let (width, height) = (mask.width() as f32, mask.height() as f32);
            canvas.draw_image(&image, left, top, width, height);
        }
        Err(err) => tracing::warn!(error = %err, "text mask could not be tinted"),
    }
}

/// Owns the text layers, the font and the rasterised masks.
#[derive(Debug, Default)]
pub struct TextOverlay {
    layers: Vec<TextLayerConfig>,
    rasterizer: Option<TextRasterizer>,
    masks: Vec<Option<GlyphMask>>,
    shown_at_ms: f64,
}

impl TextOverlay {
    pub fn new(layers: Vec<TextLayerConfig>, shown_at_ms: f64) -> Self {
        let masks = vec![None; layers.len()];
        Self {
            layers,
            rasterizer: None,
            masks,
            shown_at_ms,
        }
    }

    pub fn layers(&self) -> &[TextLayerConfig] {
        &self.layers
    }

    /// Replaces the layers and restarts their entrance animations.
    pub fn set_layers(&mut self, layers: Vec<TextLayerConfig>, now_ms: f64) {
        self.masks = vec![None; layers.len()];
        self.layers = layers;
        self.shown_at_ms = now_ms;
    }

    pub fn set_font(&mut self, rasterizer: Option<TextRasterizer>) {
        self.rasterizer = rasterizer;
        self.masks.iter_mut().for_each(|mask| *mask = None);
    }

    pub fn has_font(&self) -> bool {
        self.rasterizer.is_some()
    }

    /// Animation state of every layer at `now_ms`.
    pub fn states(&self, now_ms: f64, text_pulse: f64) -> Vec<TextAnimationState> {
        let since = now_ms - self.shown_at_ms;
        self.layers
            .iter()
            .map(|layer| layer.animation_state(since, text_pulse, now_ms))
            .collect()
    }

    pub fn render(&mut self, canvas: &mut Canvas, now_ms: f64, text_pulse: f64) {
        let Some(rasterizer) = &self.rasterizer else {
            return;
        };
        let states = self.states(now_ms, text_pulse);
        for ((layer, mask), state) in self.layers.iter().zip(self.masks.iter_mut()).zip(&states) {
            if !layer.visible || layer.content.trim().is_empty() {
                continue;
            }
            if mask.is_none() {
                *mask = rasterizer.rasterize(&layer.content, layer.style.font_size);
            }
            if let Some(mask) = mask {
                draw_text_mask(canvas, mask, layer, state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar_mask() -> GlyphMask {
        GlyphMask::new(10, 4, vec![255; 40]).unwrap()
    }

    #[test]
    fn layer_json_uses_kebab_animations() {
        let config: TextConfig = serde_json::from_str(
            r##"{ "font": "fonts/display.ttf",
                  "layers": [{ "content": "DROP", "animation": "slide-up",
                               "position": { "x": 0.2, "y": 0.8, "anchor": "left" },
                               "style": { "font_size": 48, "color": "#ff0000" } }] }"##,
        )
        .unwrap();
        let layer = &config.layers[0];
        assert_eq!(layer.animation, TextAnimation::SlideUp);
        assert_eq!(layer.position.anchor, Anchor::Left);
        assert_eq!(layer.style.color, Color::rgb(255, 0, 0));
        assert!(layer.beat_reactive && layer.visible);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_layers_are_named() {
        let config = TextConfig {
            layers: vec![
                TextLayerConfig::default(),
                TextLayerConfig {
                    position: TextPosition {
                        x: 1.5,
                        ..Default::default()
                    },
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(format!("{err}").contains("text.layers[1]"));
    }

    #[test]
    fn anchors_shift_the_block() {
        assert_eq!(anchor_offset(Anchor::Left, 10.0, 4.0), (0.0, -2.0));
        assert_eq!(anchor_offset(Anchor::Center, 10.0, 4.0), (-5.0, -2.0));
        assert_eq!(anchor_offset(Anchor::Right, 10.0, 4.0), (-10.0, -2.0));
    }

    #[test]
    fn pulse_layer_reads_the_text_pulse() {
        let layer = TextLayerConfig::default();
        let calm = layer.animation_state(INTRO_MS, 0.0, 0.0);
        let hit = layer.animation_state(INTRO_MS, 1.0, 0.0);
        assert!(hit.scale > calm.scale + 0.5);

        let deaf = TextLayerConfig {
            beat_reactive: false,
            ..Default::default()
        };
        assert_eq!(deaf.animation_state(INTRO_MS, 1.0, 0.0), calm);
    }

    #[test]
    fn static_layers_get_beat_effects() {
        let layer = TextLayerConfig {
            animation: TextAnimation::None,
            ..Default::default()
        };
        assert_eq!(layer.animation_state(0.0, 0.0, 0.0), TextAnimationState::default());
        assert!(layer.animation_state(0.0, 1.0, 0.0).scale > 1.2);
    }

    #[test]
    fn mask_is_drawn_at_its_anchor() {
        let mut canvas = Canvas::new(40, 20, 1.0).unwrap();
        canvas.clear(Color::BLACK);
        let layer = TextLayerConfig {
            animation: TextAnimation::None,
            ..Default::default()
        };
        draw_text_mask(&mut canvas, &bar_mask(), &layer, &TextAnimationState::default());

        // 10x4 block centred on (20, 10).
        assert_eq!(canvas.pixel(15, 8), Some(Color::WHITE));
        assert_eq!(canvas.pixel(24, 11), Some(Color::WHITE));
        assert_eq!(canvas.pixel(14, 10), Some(Color::BLACK));
        assert_eq!(canvas.pixel(20, 12), Some(Color::BLACK));
        assert_eq!(canvas.state(), canvas.base_state());
    }

    #[test]
    fn glow_and_outline_reach_past_the_glyphs() {
        let mut canvas = Canvas::new(40, 20, 1.0).unwrap();
        canvas.clear(Color::BLACK);
        let layer = TextLayerConfig {
            style: TextStyle {
                stroke_color: Some(Color::rgb(0, 0, 255)),
                stroke_width: 2.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let state = TextAnimationState {
            glow_blur: 6.0,
            glow_color: Color::rgb(255, 0, 0),
            ..Default::default()
        };
        draw_text_mask(&mut canvas, &bar_mask(), &layer, &state);

        assert_eq!(canvas.pixel(14, 10), Some(Color::rgb(0, 0, 255)));
        assert!(canvas.pixel(12, 10).unwrap().r > 0);
        assert_eq!(canvas.pixel(20, 10), Some(Color::WHITE));
    }

    #[test]
    fn overlay_without_font_draws_nothing() {
        let mut overlay = TextOverlay::new(
            vec![TextLayerConfig {
                content: "HELLO".into(),
                ..Default::default()
            }],
            0.0,
        );
        let mut canvas = Canvas::new(16, 16, 1.0).unwrap();
        canvas.clear(Color::BLACK);
        overlay.render(&mut canvas, 500.0, 1.0);
        assert!(!overlay.has_font());
        assert!(canvas.to_rgba().chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
        assert_eq!(overlay.states(500.0, 1.0).len(), 1);
    }

    #[test]
    fn intro_restarts_when_layers_change() {
        let mut overlay = TextOverlay::new(vec![TextLayerConfig::default()], 0.0);
        assert!((overlay.states(5_000.0, 0.0)[0].opacity - 1.0).abs() < 1e-9);
        overlay.set_layers(vec![TextLayerConfig::default()], 5_000.0);
        assert!(overlay.states(5_000.0, 0.0)[0].opacity < 0.01);
    }
}
