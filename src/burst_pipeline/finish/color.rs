//! Color math for the finishing stages: white balance, the camera color
//! matrix, luminance/chroma transforms, and the sRGB transfer curve.

use crate::burst_pipeline::finish::types::RgbPlanes;
use crate::burst_pipeline::raw::CameraMetadata;

pub(crate) fn white_balance(rgb: &mut RgbPlanes, metadata: &CameraMetadata) {
    let gain_r = metadata.wb_r;
    let gain_g = 0.5 * (metadata.wb_g0 + metadata.wb_g1);
    let gain_b = metadata.wb_b;
    for i in 0..rgb.len() {
        rgb.r[i] *= gain_r;
        rgb.g[i] *= gain_g;
        rgb.b[i] *= gain_b;
    }
}

pub(crate) fn color_correct(rgb: &mut RgbPlanes, matrix: &[[f32; 3]; 3]) {
    for i in 0..rgb.len() {
        let (r, g, b) = (rgb.r[i], rgb.g[i], rgb.b[i]);
        rgb.r[i] = matrix[0][0] * r + matrix[0][1] * g + matrix[0][2] * b;
        rgb.g[i] = matrix[1][0] * r + matrix[1][1] * g + matrix[1][2] * b;
        rgb.b[i] = matrix[2][0] * r + matrix[2][1] * g + matrix[2][2] * b;
    }
}

/// Rec. 709 luminance of linear RGB.
#[inline]
pub(crate) fn luminance(r: f32, g: f32, b: f32) -> f32 {
    0.2126 * r + 0.7152 * g + 0.0722 * b
}

/// Full-range BT.601 RGB -> YCbCr.
#[inline]
pub(crate) fn rgb_to_ycbcr(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = (b - y) / 1.772;
    let cr = (r - y) / 1.402;
    (y, cb, cr)
}

/// Exact inverse of `rgb_to_ycbcr`.
#[inline]
pub(crate) fn ycbcr_to_rgb(y: f32, cb: f32, cr: f32) -> (f32, f32, f32) {
    let r = y + 1.402 * cr;
    let b = y + 1.772 * cb;
    let g = (y - 0.299 * r - 0.114 * b) / 0.587;
    (r, g, b)
}

/// sRGB transfer curve for a linear value in [0, 1].
#[inline]
pub(crate) fn srgb_encode(v: f32) -> f32 {
    if v <= 0.003_130_8 {
        12.92 * v
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}
