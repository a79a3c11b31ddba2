//! Multi-resolution grayscale pyramid for coarse-to-fine motion search.
//!
//! Level 0 is the alignment plane: each 2x2 Bayer quad of the mosaic is
//! averaged into one grayscale sample, giving a half-resolution plane that
//! is free of CFA phase structure. Each deeper level is a 2x2 box filter
//! followed by 2x decimation of the previous one. Levels are stored finest
//! first; building is pure and deterministic.

use tracing::debug;

use crate::burst_pipeline::common::error::{PipelineError, Result};
use crate::burst_pipeline::raw::RawFrame;

/// Row-major single-channel f32 plane.
#[derive(Debug, Clone)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl GrayImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: f32) {
        self.data[y * self.width + x] = v;
    }

    /// Sample with replicated borders; coordinates may lie outside the plane.
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> f32 {
        let xc = x.clamp(0, self.width as isize - 1) as usize;
        let yc = y.clamp(0, self.height as isize - 1) as usize;
        self.data[yc * self.width + xc]
    }
}

/// Grayscale pyramid of one frame, `levels[0]` finest.
#[derive(Debug, Clone)]
pub struct Pyramid {
    pub levels: Vec<GrayImage>,
}

impl Pyramid {
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> &GrayImage {
        &self.levels[level]
    }
}

/// Build a `num_levels` pyramid from a frame's Bayer mosaic.
///
/// Fails with `InvalidDimensions` when the mosaic is empty, has odd
/// dimensions (Bayer quads must tile it), or is too small for the requested
/// number of levels.
pub fn build_pyramid(frame: &RawFrame, num_levels: usize) -> Result<Pyramid> {
    if num_levels == 0 {
        return Err(PipelineError::Configuration(
            "num_pyramid_levels must be at least 1".to_string(),
        ));
    }
    if frame.width == 0
        || frame.height == 0
        || frame.width % 2 != 0
        || frame.height % 2 != 0
        || frame.data.len() != frame.width * frame.height
    {
        return Err(PipelineError::InvalidDimensions(frame.width, frame.height));
    }

    let mut levels = Vec::with_capacity(num_levels);
    levels.push(bayer_to_gray(frame));

    for _ in 1..num_levels {
        let prev = levels.last().unwrap();
        if prev.width / 2 == 0 || prev.height / 2 == 0 {
            return Err(PipelineError::InvalidDimensions(frame.width, frame.height));
        }
        levels.push(downsample_2x(prev));
    }

    debug!(
        "Built pyramid: {} levels, finest {}x{}",
        levels.len(),
        levels[0].width,
        levels[0].height
    );

    Ok(Pyramid { levels })
}

/// Average each 2x2 Bayer quad into one grayscale sample.
fn bayer_to_gray(frame: &RawFrame) -> GrayImage {
    let w = frame.width / 2;
    let h = frame.height / 2;
    let mut gray = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let i = 2 * y * frame.width + 2 * x;
            let sum = frame.data[i] as f32
                + frame.data[i + 1] as f32
                + frame.data[i + frame.width] as f32
                + frame.data[i + frame.width + 1] as f32;
            gray.set(x, y, sum * 0.25);
        }
    }
    gray
}

/// 2x2 box filter + decimation. Odd trailing rows/columns are dropped.
fn downsample_2x(src: &GrayImage) -> GrayImage {
    let w = src.width / 2;
    let h = src.height / 2;
    let mut dst = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let sum = src.get(2 * x, 2 * y)
                + src.get(2 * x + 1, 2 * y)
                + src.get(2 * x, 2 * y + 1)
                + src.get(2 * x + 1, 2 * y + 1);
            dst.set(x, y, sum * 0.25);
        }
    }
    dst
}
