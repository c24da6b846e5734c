//! Debug preview: a side-by-side composite written to disk each cycle.
//!
//! Left half is the live frame with the ROI outlined. The right half holds
//! a copy of the ROI, a swatch of the sampled color, and a strip of
//! swatches sampled at decreasing ratios to show how far the sample count
//! can drop before the mean drifts.

use chroma_core::{Color, Roi, RoiSampler, SampleStrategy};
use chroma_hw::Frame;
use image::{ImageFormat, Rgb, RgbImage};
use rand::Rng;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SWATCH_SIZE: u32 = 100;
const STRIP_RATIOS: [f64; 10] = [1.0, 0.9, 0.75, 0.5, 0.2, 0.1, 0.01, 0.001, 0.0001, 0.00001];
const ROI_OUTLINE: Rgb<u8> = Rgb([0, 0, 255]);
const SWATCH_OUTLINE: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("frame is {got_w}x{got_h}, preview was laid out for {want_w}x{want_h}")]
    FrameSize {
        got_w: u32,
        got_h: u32,
        want_w: u32,
        want_h: u32,
    },
    #[error("sampling failed: {0}")]
    Sampler(#[from] chroma_core::SamplerError),
    #[error("failed to write preview: {0}")]
    Image(#[from] image::ImageError),
    #[error("failed to replace preview file: {0}")]
    Io(#[from] std::io::Error),
}

/// Axis-aligned rectangle on the canvas; may hang off its edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rect {
    x: i64,
    y: i64,
    w: i64,
    h: i64,
}

/// Where everything goes on a canvas twice the frame width.
#[derive(Debug, Clone, PartialEq)]
struct Layout {
    roi: Rect,
    roi_copy: Rect,
    swatch: Rect,
    strip: Vec<(Rect, SampleStrategy)>,
}

impl Layout {
    fn new(width: u32, height: u32, roi: Roi) -> Self {
        let (w, h) = (width as i64, height as i64);
        let size = roi.size as i64;
        let swatch = SWATCH_SIZE as i64;

        let roi_copy = Rect {
            x: w + w / 2 - size / 2,
            y: h / 3 - size / 2,
            w: size,
            h: size,
        };
        let swatch_rect = Rect {
            x: w + w / 2 - swatch / 2,
            y: h * 2 / 3 - swatch / 2,
            w: swatch,
            h: swatch,
        };

        let n = STRIP_RATIOS.len() as i64;
        let swatch_bottom = swatch_rect.y + swatch;
        let strip_y = swatch_bottom + (h - swatch_bottom) / 2;
        let strip = STRIP_RATIOS
            .iter()
            .enumerate()
            .map(|(i, &ratio)| {
                let count = (ratio * roi.area() as f64).round() as usize;
                let rect = Rect {
                    x: w + w / n * i as i64,
                    y: strip_y,
                    w: w / n,
                    h: (h - strip_y) / 2,
                };
                (rect, SampleStrategy::Random { count: count.max(1) })
            })
            .collect();

        Self {
            roi: Rect {
                x: roi.x as i64,
                y: roi.y as i64,
                w: size,
                h: size,
            },
            roi_copy,
            swatch: swatch_rect,
            strip,
        }
    }
}

pub struct Preview {
    path: PathBuf,
    canvas: RgbImage,
    frame_width: u32,
    frame_height: u32,
    layout: Layout,
}

impl Preview {
    pub fn new(path: impl Into<PathBuf>, frame_width: u32, frame_height: u32, roi: Roi) -> Self {
        Self {
            path: path.into(),
            canvas: RgbImage::new(frame_width * 2, frame_height),
            frame_width,
            frame_height,
            layout: Layout::new(frame_width, frame_height, roi),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Redraw the composite for this frame and write it out.
    pub fn render<R: Rng>(
        &mut self,
        frame: &Frame,
        sampler: &mut RoiSampler<R>,
        color: &Color,
    ) -> Result<(), PreviewError> {
        self.compose(frame, sampler, color)?;
        self.write()
    }

    fn compose<R: Rng>(
        &mut self,
        frame: &Frame,
        sampler: &mut RoiSampler<R>,
        color: &Color,
    ) -> Result<(), PreviewError> {
        if frame.width != self.frame_width || frame.height != self.frame_height {
            return Err(PreviewError::FrameSize {
                got_w: frame.width,
                got_h: frame.height,
                want_w: self.frame_width,
                want_h: self.frame_height,
            });
        }

        for px in self.canvas.pixels_mut() {
            *px = Rgb([0, 0, 0]);
        }

        for y in 0..frame.height {
            for x in 0..frame.width {
                self.canvas.put_pixel(x, y, Rgb(frame.pixel(x, y)));
            }
        }

        let roi = self.layout.roi;
        let copy = self.layout.roi_copy;
        for dy in 0..roi.h {
            for dx in 0..roi.w {
                let px = Rgb(frame.pixel((roi.x + dx) as u32, (roi.y + dy) as u32));
                self.put(copy.x + dx, copy.y + dy, px);
            }
        }
        self.outline(roi, ROI_OUTLINE);

        self.fill(self.layout.swatch, swatch_color(color));

        for i in 0..self.layout.strip.len() {
            let (rect, strategy) = self.layout.strip[i];
            let strip_color = sampler.sample_with(strategy, &frame.data, frame.width)?;
            self.fill(rect, swatch_color(&strip_color));
            self.outline(rect, SWATCH_OUTLINE);
        }

        Ok(())
    }

    /// Write via a temporary file so viewers never see a partial image.
    fn write(&self) -> Result<(), PreviewError> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        self.canvas.save_with_format(&tmp, ImageFormat::Png)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn put(&mut self, x: i64, y: i64, px: Rgb<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < self.canvas.width() && (y as u32) < self.canvas.height() {
            self.canvas.put_pixel(x as u32, y as u32, px);
        }
    }

    fn fill(&mut self, rect: Rect, px: Rgb<u8>) {
        for y in rect.y..rect.y + rect.h {
            for x in rect.x..rect.x + rect.w {
                self.put(x, y, px);
            }
        }
    }

    fn outline(&mut self, rect: Rect, px: Rgb<u8>) {
        if rect.w <= 0 || rect.h <= 0 {
            return;
        }
        for x in rect.x..rect.x + rect.w {
            self.put(x, rect.y, px);
            self.put(x, rect.y + rect.h - 1, px);
        }
        for y in rect.y..rect.y + rect.h {
            self.put(rect.x, y, px);
            self.put(rect.x + rect.w - 1, y, px);
        }
    }
}

fn swatch_color(color: &Color) -> Rgb<u8> {
    let (r, g, b) = color.channels_u8();
    Rgb([r, g, b])
}
