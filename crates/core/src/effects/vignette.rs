use super::VignetteConfig;
use crate::render::{Canvas, Color};

/// Darkens the edges with a radial gradient reaching the corners. Drawn in
/// the overlay layer.
pub fn render_vignette(canvas: &mut Canvas, config: &VignetteConfig) {
    if !config.enabled || config.intensity < 0.01 {
        return;
    }
    let cx = canvas.logical_width() as f32 / 2.0;
    let cy = canvas.logical_height() as f32 / 2.0;
    let radius = (cx * cx + cy * cy).sqrt();
    let edge = Color::BLACK.with_alpha(config.intensity);
    canvas.fill_radial(
        cx,
        cy,
        radius,
        &[
            (0.0, Color::TRANSPARENT),
            (config.softness, Color::TRANSPARENT),
            (1.0, edge),
        ],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn darkens_corners_not_centre() {
        let mut canvas = Canvas::new(40, 30, 1.0).unwrap();
        canvas.clear(Color::WHITE);
        render_vignette(&mut canvas, &VignetteConfig::default());

        assert_eq!(canvas.pixel(20, 15), Some(Color::WHITE));
        let corner = canvas.pixel(0, 0).unwrap();
        assert!(corner.r < 200);
    }

    #[test]
    fn negligible_intensity_is_skipped() {
        let mut canvas = Canvas::new(10, 10, 1.0).unwrap();
        canvas.clear(Color::WHITE);
        let config = VignetteConfig {
            intensity: 0.005,
            ..Default::default()
        };
        render_vignette(&mut canvas, &config);
        assert_eq!(canvas.pixel(0, 0), Some(Color::WHITE));
    }
}
