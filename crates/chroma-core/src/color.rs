//! Mean color of a pixel sample and its relative luminance.

// Rec. 709 relative-luminance weights.
const LUMA_R: f64 = 0.2126;
const LUMA_G: f64 = 0.7152;
const LUMA_B: f64 = 0.0722;

/// Relative luminance of an 8-bit color, normalized to [0, 1].
pub fn luminance(r: f64, g: f64, b: f64) -> f64 {
    (LUMA_R * r + LUMA_G * g + LUMA_B * b) / 255.0
}

/// Per-channel mean of a pixel sample (each channel 0.0–255.0).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// Build from a triple in red, green, blue order.
    pub fn from_rgb([r, g, b]: [f64; 3]) -> Self {
        Self { r, g, b }
    }

    /// Build from a triple in capture-native blue, green, red order.
    pub fn from_bgr([b, g, r]: [f64; 3]) -> Self {
        Self { r, g, b }
    }

    pub fn luminance(&self) -> f64 {
        luminance(self.r, self.g, self.b)
    }

    /// Integer channels `(r, g, b)`, truncated toward zero and saturated to 0–255.
    pub fn channels_u8(&self) -> (u8, u8, u8) {
        // `as` on f64 -> u8 truncates and saturates (NaN maps to 0).
        (self.r as u8, self.g as u8, self.b as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luminance_black() {
        assert_eq!(luminance(0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_luminance_white() {
        assert!((luminance(255.0, 255.0, 255.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_luminance_primaries() {
        assert!((luminance(255.0, 0.0, 0.0) - 0.2126).abs() < 1e-12);
        assert!((luminance(0.0, 255.0, 0.0) - 0.7152).abs() < 1e-12);
        assert!((luminance(0.0, 0.0, 255.0) - 0.0722).abs() < 1e-12);
    }

    #[test]
    fn test_luminance_matches_formula_across_grid() {
        for r in (0..=255).step_by(51) {
            for g in (0..=255).step_by(51) {
                for b in (0..=255).step_by(51) {
                    let (r, g, b) = (r as f64, g as f64, b as f64);
                    let expected = (0.2126 * r + 0.7152 * g + 0.0722 * b) / 255.0;
                    let c = Color::new(r, g, b);
                    assert!((c.luminance() - expected).abs() < 1e-12);
                    assert!((0.0..=1.0 + 1e-12).contains(&c.luminance()));
                }
            }
        }
    }

    #[test]
    fn test_from_bgr_reverses_order() {
        let c = Color::from_bgr([10.0, 20.0, 30.0]);
        assert_eq!(c, Color::new(30.0, 20.0, 10.0));
        assert_eq!(Color::from_rgb([30.0, 20.0, 10.0]), c);
    }

    #[test]
    fn test_channels_truncate() {
        let c = Color::new(30.9, 20.5, 10.01);
        assert_eq!(c.channels_u8(), (30, 20, 10));
    }

    #[test]
    fn test_channels_saturate() {
        let c = Color::new(300.0, -4.0, f64::NAN);
        assert_eq!(c.channels_u8(), (255, 0, 0));
    }
}
