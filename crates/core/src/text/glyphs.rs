use fontdue::{Font, FontSettings};

use crate::{
    render::{Color, ImageData},
    BeatVizError, Result,
};

/// Single-channel coverage bitmap of a line of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphMask {
    width: usize,
    height: usize,
    coverage: Vec<u8>,
}

impl GlyphMask {
    pub fn new(width: usize, height: usize, coverage: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 || coverage.len() != width * height {
            return Err(BeatVizError::msg(format!(
                "coverage of {} bytes does not match {width}x{height}",
                coverage.len()
            )));
        }
        Ok(Self {
            width,
            height,
            coverage,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.coverage[y * self.width + x]
    }

    /// Copy with `pad` empty pixels on every side.
    pub fn padded(&self, pad: usize) -> Self {
        let width = self.width + pad * 2;
        let height = self.height + pad * 2;
        let mut coverage = vec![0; width * height];
        for (y, row) in self.coverage.chunks_exact(self.width).enumerate() {
            let start = (y + pad) * width + pad;
            coverage[start..start + self.width].copy_from_slice(row);
        }
        Self {
            width,
            height,
            coverage,
        }
    }

    /// Two box-blur passes per axis; spreads ink up to `2 * radius` pixels,
    /// so pad first.
    pub fn blurred(&self, radius: usize) -> Self {
        if radius == 0 {
            return self.clone();
        }
        let mut values: Vec<u32> = self.coverage.iter().map(|&v| u32::from(v)).collect();
        for _ in 0..2 {
            values = box_pass(&values, self.width, self.height, radius, Axis::Horizontal);
            values = box_pass(&values, self.width, self.height, radius, Axis::Vertical);
        }
        Self {
            width: self.width,
            height: self.height,
            coverage: values.into_iter().map(|v| v.min(255) as u8).collect(),
        }
    }

    /// Grows the ink by `radius` pixels in every direction; used for outlines.
    pub fn dilated(&self, radius: usize) -> Self {
        if radius == 0 {
            return self.clone();
        }
        let mut coverage = vec![0u8; self.coverage.len()];
        for y in 0..self.height {
            for x in 0..self.width {
                let mut peak = 0;
                for sy in y.saturating_sub(radius)..(y + radius + 1).min(self.height) {
                    for sx in x.saturating_sub(radius)..(x + radius + 1).min(self.width) {
                        peak = peak.max(self.get(sx, sy));
                    }
                }
                coverage[y * self.width + x] = peak;
            }
        }
        Self {
            width: self.width,
            height: self.height,
            coverage,
        }
    }

    /// Tints the mask into an RGBA image; coverage scales the colour's alpha.
    pub fn to_image(&self, color: Color) -> Result<ImageData> {
        let mut pixels = Vec::with_capacity(self.coverage.len() * 4);
        for &ink in &self.coverage {
            let alpha = (u32::from(ink) * u32::from(color.a) + 127) / 255;
            pixels.extend_from_slice(&[color.r, color.g, color.b, alpha as u8]);
        }
        ImageData::new(self.width as u32, self.height as u32, pixels)
    }
}

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

fn box_pass(values: &[u32], width: usize, height: usize, radius: usize, axis: Axis) -> Vec<u32> {
    let (lines, len) = match axis {
        Axis::Horizontal => (height, width),
        Axis::Vertical => (width, height),
    };
    let index = |line: usize, i: usize| match axis {
        Axis::Horizontal => line * width + i,
        Axis::Vertical => i * width + line,
    };
    let window = (radius * 2 + 1) as u32;
    let mut out = vec![0; values.len()];
    for line in 0..lines {
        let mut sum: u32 = (0..=radius.min(len - 1)).map(|i| values[index(line, i)]).sum();
        for i in 0..len {
            out[index(line, i)] = sum / window;
            if i + radius + 1 < len {
                sum += values[index(line, i + radius + 1)];
            }
            if i >= radius {
                sum -= values[index(line, i - radius)];
            }
        }
    }
    out
}

/// Rasterises strings with a host-supplied TrueType or OpenType font.
pub struct TextRasterizer {
    font: Font,
}

impl TextRasterizer {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|err| BeatVizError::msg(format!("font could not be parsed: {err}")))?;
        Ok(Self { font })
    }

    /// Lays `content` out on one line at `px` pixels per em. `None` for text
    /// with no visible extent.
    pub fn rasterize(&self, content: &str, px: f32) -> Option<GlyphMask> {
        let (ascent, descent) = self
            .font
            .horizontal_line_metrics(px)
            .map(|line| (line.ascent, line.descent))
            .unwrap_or((px * 0.8, -px * 0.2));

        let mut glyphs = Vec::new();
        let mut pen = 0.0f32;
        let mut previous = None;
        for ch in content.chars() {
            if let Some(kern) = previous.and_then(|prev| self.font.horizontal_kern(prev, ch, px)) {
                pen += kern;
            }
            let (metrics, bitmap) = self.font.rasterize(ch, px);
            glyphs.push((pen, metrics, bitmap));
            pen += metrics.advance_width;
            previous = Some(ch);
        }

        let width = pen.ceil() as usize;
        let height = (ascent - descent).ceil() as usize;
        if width == 0 || height == 0 {
            return None;
        }
        let mut coverage = vec![0u8; width * height];
        for (origin, metrics, bitmap) in glyphs {
            let left = (origin + metrics.xmin as f32).round() as i64;
            let top = (ascent - metrics.ymin as f32 - metrics.height as f32).round() as i64;
            for (row, line) in bitmap.chunks_exact(metrics.width.max(1)).enumerate() {
                let y = top + row as i64;
                if y < 0 || y >= height as i64 {
                    continue;
                }
                for (col, ink) in line.iter().enumerate() {
                    let x = left + col as i64;
                    if x < 0 || x >= width as i64 {
                        continue;
                    }
                    let cell = &mut coverage[y as usize * width + x as usize];
                    *cell = (*cell).max(*ink);
                }
            }
        }
        GlyphMask::new(width, height, coverage).ok()
    }
}

impl std::fmt::Debug for TextRasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextRasterizer")
            .field("glyphs", &self.font.glyph_count())
            .finish()
    }
}
