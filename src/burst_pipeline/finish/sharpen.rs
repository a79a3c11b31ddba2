//! Unsharp-mask sharpening on luminance, applied after denoise so noise is
//! not re-amplified.

use crate::burst_pipeline::finish::color::{rgb_to_ycbcr, ycbcr_to_rgb};
use crate::burst_pipeline::finish::filter::box_blur;
use crate::burst_pipeline::finish::types::RgbPlanes;

const SHARPEN_RADIUS: usize = 1;
const SHARPEN_AMOUNT: f32 = 0.5;

pub(crate) fn sharpen(rgb: &mut RgbPlanes) {
    let n = rgb.len();
    let mut y = vec![0.0f32; n];
    let mut cb = vec![0.0f32; n];
    let mut cr = vec![0.0f32; n];

    for i in 0..n {
        let (yi, cbi, cri) = rgb_to_ycbcr(rgb.r[i], rgb.g[i], rgb.b[i]);
        y[i] = yi;
        cb[i] = cbi;
        cr[i] = cri;
    }

    let mut blurred = y.clone();
    box_blur(&mut blurred, rgb.width, rgb.height, SHARPEN_RADIUS);

    for i in 0..n {
        let sharp = (y[i] + SHARPEN_AMOUNT * (y[i] - blurred[i])).max(0.0);
        let (r, g, b) = ycbcr_to_rgb(sharp, cb[i], cr[i]);
        rgb.r[i] = r;
        rgb.g[i] = g;
        rgb.b[i] = b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_region_is_untouched() {
        let mut rgb = RgbPlanes::new(8, 8);
        rgb.r.fill(0.5);
        rgb.g.fill(0.5);
        rgb.b.fill(0.5);
        sharpen(&mut rgb);
        for &v in &rgb.g {
            assert!((v - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn edges_gain_contrast() {
        let mut rgb = RgbPlanes::new(16, 16);
        for y in 0..16 {
            for x in 0..16 {
                let v = if x < 8 { 0.2 } else { 0.8 };
                let i = y * 16 + x;
                rgb.r[i] = v;
                rgb.g[i] = v;
                rgb.b[i] = v;
            }
        }
        sharpen(&mut rgb);
        // overshoot on both sides of the edge
        let bright_side = rgb.g[8 * 16 + 8];
        let dark_side = rgb.g[8 * 16 + 7];
        assert!(bright_side > 0.8);
        assert!(dark_side < 0.2);
    }
}
