//! Region-of-interest color sampling.
//!
//! The ROI is a fixed square at the frame center. Its mean color is either
//! computed exactly over every pixel or approximated from a uniform random
//! subsample, drawn with replacement, when a sampling ratio in (0, 1) is
//! configured.

use crate::color::Color;
use rand::Rng;
use thiserror::Error;

/// Bytes per packed RGB24 pixel.
const CHANNELS: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SamplerError {
    #[error("ROI size must be non-zero")]
    EmptyRoi,
    #[error("ROI of {size}px does not fit in a {width}x{height} frame")]
    RoiOutOfFrame { size: u32, width: u32, height: u32 },
    #[error("frame buffer too short: expected at least {expected} bytes, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },
}

/// Square region of interest in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub size: u32,
}

impl Roi {
    /// Center a `size`x`size` square in a `width`x`height` frame.
    pub fn centered(width: u32, height: u32, size: u32) -> Result<Self, SamplerError> {
        if size == 0 {
            return Err(SamplerError::EmptyRoi);
        }
        if size > width || size > height {
            return Err(SamplerError::RoiOutOfFrame {
                size,
                width,
                height,
            });
        }
        Ok(Self {
            x: width / 2 - size / 2,
            y: height / 2 - size / 2,
            size,
        })
    }

    /// Number of pixels covered by the ROI.
    pub fn area(&self) -> usize {
        self.size as usize * self.size as usize
    }
}

/// How many ROI pixels contribute to the mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStrategy {
    /// Every ROI pixel, exactly once.
    Exact,
    /// `count` independent uniform draws with replacement.
    Random { count: usize },
}

impl SampleStrategy {
    /// Strategy for a sampling ratio over an ROI of `area` pixels.
    ///
    /// Ratios outside the open interval (0, 1), and non-finite ratios, fall
    /// back to the exact mean. Inside it the count is `round(ratio * area)`,
    /// never less than one draw.
    pub fn from_ratio(ratio: f64, area: usize) -> Self {
        if !ratio.is_finite() || ratio <= 0.0 || ratio >= 1.0 {
            return SampleStrategy::Exact;
        }
        let count = (ratio * area as f64).round() as usize;
        SampleStrategy::Random {
            count: count.max(1),
        }
    }

    /// Pixels consumed per cycle for an ROI of `area` pixels.
    pub fn pixel_count(&self, area: usize) -> usize {
        match *self {
            SampleStrategy::Exact => area,
            SampleStrategy::Random { count } => count,
        }
    }
}

/// Samples the mean color of a fixed ROI, drawing from its own RNG.
pub struct RoiSampler<R> {
    roi: Roi,
    strategy: SampleStrategy,
    rng: R,
}

impl<R: Rng> RoiSampler<R> {
    pub fn new(roi: Roi, ratio: f64, rng: R) -> Self {
        let strategy = SampleStrategy::from_ratio(ratio, roi.area());
        tracing::debug!(?roi, ?strategy, ratio, "ROI sampler configured");
        Self {
            roi,
            strategy,
            rng,
        }
    }

    pub fn roi(&self) -> Roi {
        self.roi
    }

    pub fn strategy(&self) -> SampleStrategy {
        self.strategy
    }

    /// Mean color of the ROI in a packed RGB24 frame of the given width.
    pub fn sample(&mut self, pixels: &[u8], frame_width: u32) -> Result<Color, SamplerError> {
        self.sample_with(self.strategy, pixels, frame_width)
    }

    /// Like [`sample`](Self::sample) but with an explicit strategy.
    pub fn sample_with(
        &mut self,
        strategy: SampleStrategy,
        pixels: &[u8],
        frame_width: u32,
    ) -> Result<Color, SamplerError> {
        let (sum, n) = self.accumulate(strategy, pixels, frame_width)?;
        let n = n as f64;
        Ok(Color::new(sum[0] / n, sum[1] / n, sum[2] / n))
    }

    /// Channel sums and the number of pixels that went into them.
    fn accumulate(
        &mut self,
        strategy: SampleStrategy,
        pixels: &[u8],
        frame_width: u32,
    ) -> Result<([f64; 3], usize), SamplerError> {
        check_geometry(&self.roi, pixels, frame_width)?;

        let stride = frame_width as usize * CHANNELS;
        let size = self.roi.size as usize;
        let (x0, y0) = (self.roi.x as usize, self.roi.y as usize);
        let mut sum = [0f64; 3];
        let mut add = |px: usize, py: usize| {
            let idx = py * stride + px * CHANNELS;
            sum[0] += pixels[idx] as f64;
            sum[1] += pixels[idx + 1] as f64;
            sum[2] += pixels[idx + 2] as f64;
        };

        let n = match strategy {
            SampleStrategy::Exact => {
                for py in y0..y0 + size {
                    for px in x0..x0 + size {
                        add(px, py);
                    }
                }
                size * size
            }
            SampleStrategy::Random { count } => {
                let count = count.max(1);
                for _ in 0..count {
                    let dx = self.rng.gen_range(0..size);
                    let dy = self.rng.gen_range(0..size);
                    add(x0 + dx, y0 + dy);
                }
                count
            }
        };

        Ok((sum, n))
    }
}

fn check_geometry(roi: &Roi, pixels: &[u8], frame_width: u32) -> Result<(), SamplerError> {
    if roi.size == 0 {
        return Err(SamplerError::EmptyRoi);
    }
    let stride = frame_width as usize * CHANNELS;
    if roi.x as usize + roi.size as usize > frame_width as usize {
        return Err(SamplerError::RoiOutOfFrame {
            size: roi.size,
            width: frame_width,
            height: pixels.len().checked_div(stride).unwrap_or(0) as u32,
        });
    }
    let expected = (roi.y as usize + roi.size as usize) * stride;
    if pixels.len() < expected {
        return Err(SamplerError::BufferTooShort {
            expected,
            actual: pixels.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};
    use std::cell::Cell;
    use std::rc::Rc;

    /// RNG wrapper that counts how often it is consulted.
    struct CountingRng {
        inner: StdRng,
        calls: Rc<Cell<usize>>,
    }

    impl RngCore for CountingRng {
        fn next_u32(&mut self) -> u32 {
            self.calls.set(self.calls.get() + 1);
            self.inner.next_u32()
        }
        fn next_u64(&mut self) -> u64 {
            self.calls.set(self.calls.get() + 1);
            self.inner.next_u64()
        }
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            self.calls.set(self.calls.get() + 1);
            self.inner.fill_bytes(dest)
        }
        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            self.calls.set(self.calls.get() + 1);
            self.inner.try_fill_bytes(dest)
        }
    }

    fn solid_frame(w: u32, h: u32, rgb: [u8; 3]) -> Vec<u8> {
        rgb.iter()
            .copied()
            .cycle()
            .take((w * h) as usize * CHANNELS)
            .collect()
    }

    fn inside_roi(roi: &Roi, x: u32, y: u32) -> bool {
        x >= roi.x && x < roi.x + roi.size && y >= roi.y && y < roi.y + roi.size
    }

    /// Frame whose pixels inside `roi` are `inside`, elsewhere `outside`.
    fn framed(w: u32, h: u32, roi: Roi, inside: [u8; 3], outside: [u8; 3]) -> Vec<u8> {
        let mut data = Vec::with_capacity((w * h) as usize * CHANNELS);
        for y in 0..h {
            for x in 0..w {
                let px = if inside_roi(&roi, x, y) { inside } else { outside };
                data.extend_from_slice(&px);
            }
        }
        data
    }

    #[test]
    fn test_roi_centered() {
        let roi = Roi::centered(640, 480, 100).unwrap();
        assert_eq!(roi, Roi { x: 270, y: 190, size: 100 });
        assert_eq!(roi.area(), 10_000);
    }

    #[test]
    fn test_roi_centered_odd_sizes() {
        let roi = Roi::centered(641, 481, 101).unwrap();
        assert_eq!(roi, Roi { x: 270, y: 190, size: 101 });
    }

    #[test]
    fn test_roi_full_frame() {
        let roi = Roi::centered(8, 8, 8).unwrap();
        assert_eq!(roi, Roi { x: 0, y: 0, size: 8 });
    }

    #[test]
    fn test_roi_too_large() {
        assert_eq!(
            Roi::centered(64, 48, 50),
            Err(SamplerError::RoiOutOfFrame { size: 50, width: 64, height: 48 })
        );
    }

    #[test]
    fn test_roi_zero() {
        assert_eq!(Roi::centered(64, 48, 0), Err(SamplerError::EmptyRoi));
    }

    #[test]
    fn test_strategy_exact_outside_open_interval() {
        for ratio in [0.0, -0.5, 1.0, 1.5, f64::NAN, f64::INFINITY] {
            assert_eq!(SampleStrategy::from_ratio(ratio, 10_000), SampleStrategy::Exact);
        }
    }

    #[test]
    fn test_strategy_count_is_rounded() {
        assert_eq!(
            SampleStrategy::from_ratio(0.25, 10_000),
            SampleStrategy::Random { count: 2_500 }
        );
        // 0.333 * 100 = 33.3 -> 33; 0.335 * 100 = 33.5 -> 34
        assert_eq!(SampleStrategy::from_ratio(0.333, 100), SampleStrategy::Random { count: 33 });
        assert_eq!(SampleStrategy::from_ratio(0.335, 100), SampleStrategy::Random { count: 34 });
    }

    #[test]
    fn test_strategy_never_zero_draws() {
        assert_eq!(
            SampleStrategy::from_ratio(0.00001, 100),
            SampleStrategy::Random { count: 1 }
        );
    }

    #[test]
    fn test_exact_mean_ignores_pixels_outside_roi() {
        let roi = Roi::centered(20, 10, 4).unwrap();
        let frame = framed(20, 10, roi, [10, 20, 30], [255, 255, 255]);
        let mut sampler = RoiSampler::new(roi, 0.0, StdRng::seed_from_u64(1));
        let color = sampler.sample(&frame, 20).unwrap();
        assert_eq!(color, Color::new(10.0, 20.0, 30.0));
    }

    #[test]
    fn test_exact_mean_of_gradient() {
        // 4x4 ROI covering the whole frame, red channel = x, green = y.
        let mut frame = Vec::new();
        for y in 0..4u8 {
            for x in 0..4u8 {
                frame.extend_from_slice(&[x, y, 100]);
            }
        }
        let roi = Roi::centered(4, 4, 4).unwrap();
        let mut sampler = RoiSampler::new(roi, 1.0, StdRng::seed_from_u64(1));
        let color = sampler.sample(&frame, 4).unwrap();
        assert!((color.r - 1.5).abs() < 1e-12);
        assert!((color.g - 1.5).abs() < 1e-12);
        assert!((color.b - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_exact_mode_makes_no_random_draws() {
        let calls = Rc::new(Cell::new(0));
        let rng = CountingRng {
            inner: StdRng::seed_from_u64(7),
            calls: calls.clone(),
        };
        let roi = Roi::centered(32, 32, 16).unwrap();
        let frame = solid_frame(32, 32, [1, 2, 3]);
        let mut sampler = RoiSampler::new(roi, 0.0, rng);

        let (_, n) = sampler.accumulate(SampleStrategy::Exact, &frame, 32).unwrap();
        assert_eq!(n, roi.area());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_random_mode_uses_configured_count() {
        let roi = Roi::centered(64, 64, 40).unwrap();
        let frame = solid_frame(64, 64, [9, 9, 9]);
        let mut sampler = RoiSampler::new(roi, 0.1, StdRng::seed_from_u64(3));
        assert_eq!(sampler.strategy(), SampleStrategy::Random { count: 160 });

        let strategy = sampler.strategy();
        let (_, n) = sampler.accumulate(strategy, &frame, 64).unwrap();
        assert_eq!(n, 160);
    }

    #[test]
    fn test_random_draws_stay_inside_roi() {
        let roi = Roi::centered(50, 40, 10).unwrap();
        let frame = framed(50, 40, roi, [40, 80, 120], [255, 0, 255]);
        let mut sampler = RoiSampler::new(roi, 0.5, StdRng::seed_from_u64(11));
        for _ in 0..20 {
            let color = sampler.sample(&frame, 50).unwrap();
            assert_eq!(color, Color::new(40.0, 80.0, 120.0));
        }
    }

    #[test]
    fn test_random_mean_is_reproducible_with_seed() {
        let mut frame = Vec::new();
        for i in 0..(32 * 32) {
            let v = (i % 251) as u8;
            frame.extend_from_slice(&[v, 255 - v, v / 2]);
        }
        let roi = Roi::centered(32, 32, 16).unwrap();
        let a = RoiSampler::new(roi, 0.2, StdRng::seed_from_u64(42))
            .sample(&frame, 32)
            .unwrap();
        let b = RoiSampler::new(roi, 0.2, StdRng::seed_from_u64(42))
            .sample(&frame, 32)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_random_mean_approximates_exact() {
        let mut frame = Vec::new();
        for y in 0..100u32 {
            for x in 0..100u32 {
                frame.extend_from_slice(&[(x * 2) as u8, (y * 2) as u8, 128]);
            }
        }
        let roi = Roi::centered(100, 100, 100).unwrap();
        let mut sampler = RoiSampler::new(roi, 0.5, StdRng::seed_from_u64(5));
        let exact = sampler.sample_with(SampleStrategy::Exact, &frame, 100).unwrap();
        let approx = sampler.sample(&frame, 100).unwrap();
        assert!((exact.r - approx.r).abs() < 3.0, "exact={exact:?} approx={approx:?}");
        assert!((exact.g - approx.g).abs() < 3.0, "exact={exact:?} approx={approx:?}");
        assert_eq!(approx.b, 128.0);
    }

    #[test]
    fn test_short_buffer_rejected() {
        let roi = Roi::centered(10, 10, 4).unwrap(); // rows 3..7
        let frame = vec![0u8; 10 * 3 * 5];
        let mut sampler = RoiSampler::new(roi, 0.0, StdRng::seed_from_u64(1));
        assert_eq!(
            sampler.sample(&frame, 10),
            Err(SamplerError::BufferTooShort { expected: 210, actual: 150 })
        );
    }

    #[test]
    fn test_narrow_frame_rejected() {
        let roi = Roi::centered(10, 10, 4).unwrap();
        let frame = vec![0u8; 5 * 3 * 10];
        let mut sampler = RoiSampler::new(roi, 0.0, StdRng::seed_from_u64(1));
        assert!(matches!(
            sampler.sample(&frame, 5),
            Err(SamplerError::RoiOutOfFrame { size: 4, width: 5, .. })
        ));
    }
}
