use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tiny_skia::{
    FillRule, FilterQuality, GradientStop, IntSize, LineCap, LineJoin, LinearGradient, Paint,
    PathBuilder, Pattern, Pixmap, Point, RadialGradient, Rect, Shader, SpreadMode, Stroke,
};

use crate::BeatVizError;

pub use tiny_skia::Transform;

/// 8-bit RGBA colour. Serialised as `#rrggbb` or `#rrggbbaa`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn with_alpha(self, alpha: f32) -> Self {
        Self {
            a: (alpha.clamp(0.0, 1.0) * 255.0).round() as u8,
            ..self
        }
    }

    /// Hue in degrees, saturation and lightness in `[0, 1]`.
    pub fn from_hsl(hue: f32, saturation: f32, lightness: f32) -> Self {
        let s = saturation.clamp(0.0, 1.0);
        let l = lightness.clamp(0.0, 1.0);
        let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let h = hue.rem_euclid(360.0) / 60.0;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = l - c / 2.0;
        let to_byte = |v: f32| ((v + m).clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::rgb(to_byte(r), to_byte(g), to_byte(b))
    }

    pub fn lerp(self, other: Color, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Color::rgba(
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
            mix(self.a, other.a),
        )
    }
}

impl FromStr for Color {
    type Err = BeatVizError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let hex = value.strip_prefix('#').ok_or_else(|| {
            BeatVizError::InvalidConfig(format!("colour `{value}` must start with #"))
        })?;
        let byte = |i: usize| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| BeatVizError::InvalidConfig(format!("invalid colour `{value}`")))
        };
        match hex.len() {
            6 => Ok(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Ok(Color::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => Err(BeatVizError::InvalidConfig(format!(
                "colour `{value}` must be #rrggbb or #rrggbbaa"
            ))),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = BeatVizError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)?;
        if self.a != 255 {
            write!(f, "{:02x}", self.a)?;
        }
        Ok(())
    }
}

/// Drawing state captured by [`Canvas::save`] and restored by
/// [`Canvas::restore`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawState {
    pub transform: Transform,
    pub alpha: f32,
    pub fill: Color,
}

impl Color {
    fn to_skia(self, opacity: f32) -> tiny_skia::Color {
        let mut color = tiny_skia::Color::from_rgba8(self.r, self.g, self.b, self.a);
        color.apply_opacity(opacity.clamp(0.0, 1.0));
        color
    }
}

/// Decoded RGBA image handed in by the host, kept premultiplied so it can be
/// sampled directly as a pattern.
#[derive(Clone)]
pub struct ImageData {
    pixmap: Pixmap,
}

impl ImageData {
    /// `pixels` must hold `width * height` row-major straight-alpha RGBA quads.
    pub fn new(width: u32, height: u32, mut pixels: Vec<u8>) -> Result<Self, BeatVizError> {
        if pixels.len() != width as usize * height as usize * 4 {
            return Err(BeatVizError::msg(format!(
                "image buffer of {} bytes does not match {width}x{height}",
                pixels.len()
            )));
        }
        for px in pixels.chunks_exact_mut(4) {
            let alpha = u16::from(px[3]);
            for channel in &mut px[..3] {
                *channel = ((u16::from(*channel) * alpha + 127) / 255) as u8;
            }
        }
        let pixmap = IntSize::from_wh(width, height)
            .and_then(|size| Pixmap::from_vec(pixels, size))
            .ok_or_else(|| {
                BeatVizError::msg(format!("{width}x{height} is not a drawable image size"))
            })?;
        Ok(Self { pixmap })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// RGBA surface backed by a [`tiny_skia::Pixmap`]. Callers draw in logical
/// pixels; the base transform scales them by the device pixel ratio.
pub struct Canvas {
    logical_width: u32,
    logical_height: u32,
    device_pixel_ratio: f32,
    pixmap: Pixmap,
    state: DrawState,
    stack: Vec<DrawState>,
}

impl Canvas {
    pub fn new(
        logical_width: u32,
        logical_height: u32,
        device_pixel_ratio: f32,
    ) -> Result<Self, BeatVizError> {
        let ratio = sanitize_ratio(device_pixel_ratio);
        let pixmap = allocate(logical_width, logical_height, ratio)?;
        let state = DrawState {
            transform: Transform::from_scale(ratio, ratio),
            alpha: 1.0,
            fill: Color::BLACK,
        };
        Ok(Self {
            logical_width,
            logical_height,
            device_pixel_ratio: ratio,
            pixmap,
            state,
            stack: Vec::new(),
        })
    }

    /// Reallocates the pixmap for `logical × ratio` physical pixels and resets
    /// the drawing state. On failure the canvas keeps its previous size.
    pub fn resize(
        &mut self,
        logical_width: u32,
        logical_height: u32,
        device_pixel_ratio: f32,
    ) -> Result<(), BeatVizError> {
        let ratio = sanitize_ratio(device_pixel_ratio);
        self.pixmap = allocate(logical_width, logical_height, ratio)?;
        self.logical_width = logical_width;
        self.logical_height = logical_height;
        self.device_pixel_ratio = ratio;
        self.stack.clear();
        self.state = self.base_state();
        Ok(())
    }

    /// State every frame and every callback starts from.
    pub fn base_state(&self) -> DrawState {
        DrawState {
            transform: Transform::from_scale(self.device_pixel_ratio, self.device_pixel_ratio),
            alpha: 1.0,
            fill: Color::BLACK,
        }
    }

    pub fn state(&self) -> DrawState {
        self.state
    }

    /// Replaces the current state without touching the save stack.
    pub fn set_state(&mut self, state: DrawState) {
        self.state = state;
    }

    pub fn save(&mut self) {
        self.stack.push(self.state);
    }

    pub fn restore(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Pops saved states until `depth` remain, discarding unbalanced saves.
    pub fn restore_to_depth(&mut self, depth: usize) {
        while self.stack.len() > depth {
            self.restore();
        }
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.state.alpha = alpha.clamp(0.0, 1.0);
    }

    pub fn set_fill(&mut self, color: Color) {
        self.state.fill = color;
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.state.transform = self.state.transform.pre_translate(dx, dy);
    }

    pub fn scale(&mut self, kx: f32, ky: f32) {
        self.state.transform = self.state.transform.pre_scale(kx, ky);
    }

    /// Rotates subsequent drawing clockwise by `degrees` around the current
    /// origin.
    pub fn rotate(&mut self, degrees: f32) {
        self.state.transform = self.state.transform.pre_concat(Transform::from_rotate(degrees));
    }

    /// Overwrites every pixel, ignoring transform and alpha.
    pub fn clear(&mut self, color: Color) {
        self.pixmap.fill(color.to_skia(1.0));
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32) {
        let (right, bottom) = (x + width, y + height);
        let Some(rect) = Rect::from_ltrb(x.min(right), y.min(bottom), x.max(right), y.max(bottom))
        else {
            return;
        };
        let paint = self.solid_paint();
        self.pixmap.fill_rect(rect, &paint, self.state.transform, None);
    }

    pub fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32) {
        if radius <= 0.0 {
            return;
        }
        let Some(path) = PathBuilder::from_circle(cx, cy, radius) else {
            return;
        };
        let paint = self.solid_paint();
        self.pixmap
            .fill_path(&path, &paint, FillRule::Winding, self.state.transform, None);
    }

    /// Strokes connected segments with round caps and joins in the fill colour.
    pub fn stroke_polyline(&mut self, points: &[(f32, f32)], width: f32) {
        let [(x0, y0), rest @ ..] = points else {
            return;
        };
        if rest.is_empty() || width <= 0.0 {
            return;
        }
        let mut builder = PathBuilder::new();
        builder.move_to(*x0, *y0);
        for (x, y) in rest {
            builder.line_to(*x, *y);
        }
        if let Some(path) = builder.finish() {
            self.stroke(&path, width, LineCap::Round);
        }
    }

    pub fn stroke_circle(&mut self, cx: f32, cy: f32, radius: f32, width: f32) {
        if radius <= 0.0 || width <= 0.0 {
            return;
        }
        if let Some(path) = PathBuilder::from_circle(cx, cy, radius) {
            self.stroke(&path, width, LineCap::Butt);
        }
    }

    /// Radial gradient over the whole surface. `stops` are `(offset, colour)`
    /// pairs sorted by offset in `[0, 1]`, measured from the centre to
    /// `radius` logical pixels.
    pub fn fill_radial(&mut self, cx: f32, cy: f32, radius: f32, stops: &[(f32, Color)]) {
        if stops.is_empty() || radius <= 0.0 {
            return;
        }
        let t = self.state.transform;
        let centre = Point::from_xy(t.sx * cx + t.kx * cy + t.tx, t.ky * cx + t.sy * cy + t.ty);
        let scaled = radius * t.sx.hypot(t.ky);
        let shader = RadialGradient::new(
            centre,
            0.0,
            centre,
            scaled,
            self.gradient_stops(stops),
            SpreadMode::Pad,
            Transform::identity(),
        );
        if let Some(shader) = shader {
            self.fill_surface(shader);
        }
    }

    /// Linear gradient over the whole surface. An angle of 0 runs top to
    /// bottom; angles rotate clockwise.
    pub fn fill_linear(&mut self, angle_degrees: f32, stops: &[(f32, Color)]) {
        if stops.is_empty() {
            return;
        }
        let radians = angle_degrees.to_radians();
        let (dir_x, dir_y) = (-radians.sin(), radians.cos());
        let (w, h) = (self.width() as f32, self.height() as f32);
        let half_span = ((dir_x.abs() * w + dir_y.abs() * h) / 2.0).max(f32::EPSILON);
        let start = Point::from_xy(w / 2.0 - dir_x * half_span, h / 2.0 - dir_y * half_span);
        let end = Point::from_xy(w / 2.0 + dir_x * half_span, h / 2.0 + dir_y * half_span);
        let shader = LinearGradient::new(
            start,
            end,
            self.gradient_stops(stops),
            SpreadMode::Pad,
            Transform::identity(),
        );
        if let Some(shader) = shader {
            self.fill_surface(shader);
        }
    }

    /// Draws `image` scaled into the logical rectangle with nearest-neighbour
    /// sampling, honouring the current alpha.
    pub fn draw_image(&mut self, image: &ImageData, x: f32, y: f32, width: f32, height: f32) {
        if width <= 0.0 || height <= 0.0 {
            return;
        }
        let Some(rect) = Rect::from_xywh(x, y, width, height) else {
            return;
        };
        let placement = Transform::from_row(
            width / image.width() as f32,
            0.0,
            0.0,
            height / image.height() as f32,
            x,
            y,
        );
        let paint = Paint {
            shader: Pattern::new(
                image.pixmap.as_ref(),
                SpreadMode::Pad,
                FilterQuality::Nearest,
                self.state.alpha,
                placement,
            ),
            ..Paint::default()
        };
        self.pixmap.fill_rect(rect, &paint, self.state.transform, None);
    }

    /// Straight-alpha colour of one physical pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        self.pixmap.pixel(x, y).map(|px| {
            let px = px.demultiply();
            Color::rgba(px.red(), px.green(), px.blue(), px.alpha())
        })
    }

    /// Row-major premultiplied RGBA bytes of the physical surface.
    pub fn pixels(&self) -> &[u8] {
        self.pixmap.data()
    }

    /// Row-major straight-alpha RGBA copy of the surface, the layout image
    /// encoders expect.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.pixmap.data().len());
        for px in self.pixmap.pixels() {
            let px = px.demultiply();
            bytes.extend_from_slice(&[px.red(), px.green(), px.blue(), px.alpha()]);
        }
        bytes
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn logical_width(&self) -> u32 {
        self.logical_width
    }

    pub fn logical_height(&self) -> u32 {
        self.logical_height
    }

    pub fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio
    }

    fn solid_paint(&self) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color(self.state.fill.to_skia(self.state.alpha));
        paint
    }

    fn stroke(&mut self, path: &tiny_skia::Path, width: f32, line_cap: LineCap) {
        let stroke = Stroke {
            width,
            line_cap,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        let paint = self.solid_paint();
        self.pixmap
            .stroke_path(path, &paint, &stroke, self.state.transform, None);
    }

    fn gradient_stops(&self, stops: &[(f32, Color)]) -> Vec<GradientStop> {
        stops
            .iter()
            .map(|(offset, color)| {
                GradientStop::new(offset.clamp(0.0, 1.0), color.to_skia(self.state.alpha))
            })
            .collect()
    }

    fn fill_surface(&mut self, shader: Shader<'_>) {
        let Some(rect) = Rect::from_xywh(0.0, 0.0, self.width() as f32, self.height() as f32) else {
            return;
        };
        let paint = Paint {
            shader,
            ..Paint::default()
        };
        self.pixmap.fill_rect(rect, &paint, Transform::identity(), None);
    }
}

impl fmt::Debug for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canvas")
            .field("logical_width", &self.logical_width)
            .field("logical_height", &self.logical_height)
            .field("device_pixel_ratio", &self.device_pixel_ratio)
            .field("state", &self.state)
            .field("depth", &self.stack.len())
            .finish()
    }
}

fn sanitize_ratio(ratio: f32) -> f32 {
    if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        1.0
    }
}

fn allocate(logical_width: u32, logical_height: u32, ratio: f32) -> Result<Pixmap, BeatVizError> {
    let width = (logical_width as f32 * ratio).round() as u32;
    let height = (logical_height as f32 * ratio).round() as u32;
    Pixmap::new(width, height)
        .ok_or_else(|| {
            BeatVizError::InvalidConfig(format!("cannot allocate a {width}x{height} canvas"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats_hex_colours() {
        let color: Color = "#1a1a1a".parse().unwrap();
        assert_eq!(color, Color::rgb(0x1a, 0x1a, 0x1a));
        assert_eq!(color.to_string(), "#1a1a1a");

        let translucent: Color = "#ff000080".parse().unwrap();
        assert_eq!(translucent.a, 0x80);
        assert!("1a1a1a".parse::<Color>().is_err());
        assert!("#12345".parse::<Color>().is_err());
    }

    #[test]
    fn draw_image_stretches_nearest() {
        let image = ImageData::new(2, 1, vec![255, 0, 0, 255, 0, 0, 255, 255]).unwrap();
        let mut canvas = Canvas::new(4, 2, 1.0).unwrap();
        canvas.draw_image(&image, 0.0, 0.0, 4.0, 2.0);
        assert_eq!(canvas.pixel(0, 1), Some(Color::rgb(255, 0, 0)));
        assert_eq!(canvas.pixel(3, 0), Some(Color::rgb(0, 0, 255)));
        assert!(ImageData::new(2, 2, vec![0; 4]).is_err());
    }

    #[test]
    fn physical_size_follows_pixel_ratio() {
        let canvas = Canvas::new(100, 50, 2.0).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (200, 100));
        assert_eq!(canvas.pixels().len(), 200 * 100 * 4);
        assert_eq!(canvas.state().transform, Transform::from_scale(2.0, 2.0));
    }

    #[test]
    fn fill_rect_is_scaled_and_translated() {
        let mut canvas = Canvas::new(10, 10, 2.0).unwrap();
        canvas.clear(Color::BLACK);
        canvas.translate(1.0, 1.0);
        canvas.set_fill(Color::WHITE);
        canvas.fill_rect(0.0, 0.0, 2.0, 2.0);

        assert_eq!(canvas.pixel(1, 1), Some(Color::BLACK));
        assert_eq!(canvas.pixel(2, 2), Some(Color::WHITE));
        assert_eq!(canvas.pixel(5, 5), Some(Color::WHITE));
        assert_eq!(canvas.pixel(6, 6), Some(Color::BLACK));
    }

    #[test]
    fn alpha_blends_over_existing_pixels() {
        let mut canvas = Canvas::new(4, 4, 1.0).unwrap();
        canvas.clear(Color::BLACK);
        canvas.set_alpha(0.5);
        canvas.set_fill(Color::WHITE);
        canvas.fill_rect(0.0, 0.0, 4.0, 4.0);

        let px = canvas.pixel(0, 0).unwrap();
        assert!((127..=128).contains(&px.r));
    }

    #[test]
    fn restore_to_depth_discards_unbalanced_saves() {
        let mut canvas = Canvas::new(4, 4, 1.0).unwrap();
        let base = canvas.state();
        canvas.save();
        canvas.set_alpha(0.2);
        canvas.save();
        canvas.scale(3.0, 3.0);
        canvas.restore_to_depth(0);
        assert_eq!(canvas.state(), base);
    }

    #[test]
    fn strokes_follow_the_polyline() {
        let mut canvas = Canvas::new(20, 20, 1.0).unwrap();
        canvas.clear(Color::BLACK);
        canvas.set_fill(Color::WHITE);
        canvas.stroke_polyline(&[(2.0, 10.0), (18.0, 10.0)], 4.0);
        assert_eq!(canvas.pixel(10, 10), Some(Color::WHITE));
        assert_eq!(canvas.pixel(10, 2), Some(Color::BLACK));

        canvas.clear(Color::BLACK);
        canvas.stroke_circle(10.0, 10.0, 6.0, 2.0);
        assert_eq!(canvas.pixel(10, 10), Some(Color::BLACK));
        assert!(canvas.pixel(16, 10).unwrap().r > 100);
        canvas.stroke_polyline(&[(1.0, 1.0)], 4.0);
    }

    #[test]
    fn set_state_leaves_the_stack_alone() {
        let mut canvas = Canvas::new(4, 4, 1.0).unwrap();
        let base = canvas.base_state();
        canvas.save();
        canvas.set_alpha(0.3);
        canvas.translate(2.0, 2.0);
        canvas.set_state(base);
        assert_eq!(canvas.state(), base);
        assert_eq!(canvas.depth(), 1);
    }

    #[test]
    fn rotation_turns_a_bar_sideways() {
        let mut canvas = Canvas::new(20, 20, 1.0).unwrap();
        canvas.clear(Color::BLACK);
        canvas.set_fill(Color::WHITE);
        canvas.translate(10.0, 10.0);
        canvas.rotate(90.0);
        // A bar pointing down from the centre now points left.
        canvas.fill_rect(-1.0, 0.0, 2.0, 8.0);
        assert_eq!(canvas.pixel(5, 10), Some(Color::WHITE));
        assert_eq!(canvas.pixel(10, 15), Some(Color::BLACK));
    }

    #[test]
    fn translucent_pixels_are_exported_straight() {
        let mut canvas = Canvas::new(2, 2, 1.0).unwrap();
        canvas.clear(Color::rgba(200, 100, 0, 128));
        let rgba = canvas.to_rgba();
        assert_eq!(rgba.len(), canvas.pixels().len());
        assert!((199..=201).contains(&rgba[0]));
        assert_eq!(rgba[3], 128);
        assert!(canvas.pixels()[0] < 110);
    }

    #[test]
    fn zero_sized_canvas_is_rejected() {
        assert!(Canvas::new(0, 10, 1.0).is_err());
        let mut canvas = Canvas::new(4, 4, 1.0).unwrap();
        assert!(canvas.resize(10, 0, 1.0).is_err());
        assert_eq!(canvas.width(), 4);
    }

    #[test]
    fn hsl_primaries() {
        assert_eq!(Color::from_hsl(0.0, 1.0, 0.5), Color::rgb(255, 0, 0));
        assert_eq!(Color::from_hsl(120.0, 1.0, 0.5), Color::rgb(0, 255, 0));
        assert_eq!(Color::from_hsl(240.0, 1.0, 0.5), Color::rgb(0, 0, 255));
    }
}
