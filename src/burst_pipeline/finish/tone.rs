//! Tone mapping: global gain plus dynamic-range compression on luminance,
//! with a local-contrast pass that restores detail the compression flattens.

use crate::burst_pipeline::finish::color::luminance;
use crate::burst_pipeline::finish::filter::box_blur;
use crate::burst_pipeline::finish::types::RgbPlanes;

/// Low-pass radius for the local contrast pass.
const LOCAL_CONTRAST_RADIUS: usize = 8;
/// How much of the high-pass detail is added back.
const LOCAL_CONTRAST_STRENGTH: f32 = 0.25;

const LUMA_EPS: f32 = 1e-6;

/// Compress luminance with `y' = (1+c)*g*y / (1 + c*g*y)` and scale the
/// channels by the luminance ratio, preserving hue. `c = 0` degenerates to
/// a pure gain.
pub(crate) fn tone_map(rgb: &mut RgbPlanes, gain: f32, strength: f32) {
    let n = rgb.len();

    let mut mapped = vec![0.0f32; n];
    let mut original = vec![0.0f32; n];
    for i in 0..n {
        let y = luminance(rgb.r[i], rgb.g[i], rgb.b[i]).max(0.0);
        let gy = gain * y;
        original[i] = y;
        mapped[i] = (1.0 + strength) * gy / (1.0 + strength * gy);
    }

    // local contrast: add back high-pass detail of the compressed luminance
    let mut lowpass = mapped.clone();
    box_blur(&mut lowpass, rgb.width, rgb.height, LOCAL_CONTRAST_RADIUS);
    for i in 0..n {
        let detail = mapped[i] - lowpass[i];
        let target = (mapped[i] + LOCAL_CONTRAST_STRENGTH * detail).max(0.0);
        let scale = target / (original[i] + LUMA_EPS);
        rgb.r[i] *= scale;
        rgb.g[i] *= scale;
        rgb.b[i] *= scale;
    }
}
