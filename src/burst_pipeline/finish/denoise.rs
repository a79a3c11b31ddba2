//! Chroma-selective denoise: blur the color difference channels while
//! leaving luminance detail untouched.

use crate::burst_pipeline::finish::color::{rgb_to_ycbcr, ycbcr_to_rgb};
use crate::burst_pipeline::finish::filter::box_blur;
use crate::burst_pipeline::finish::types::RgbPlanes;

const CHROMA_BLUR_RADIUS: usize = 2;

pub(crate) fn chroma_denoise(rgb: &mut RgbPlanes) {
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

    box_blur(&mut cb, rgb.width, rgb.height, CHROMA_BLUR_RADIUS);
    box_blur(&mut cr, rgb.width, rgb.height, CHROMA_BLUR_RADIUS);

    for i in 0..n {
        let (r, g, b) = ycbcr_to_rgb(y[i], cb[i], cr[i]);
        rgb.r[i] = r;
        rgb.g[i] = g;
        rgb.b[i] = b;
    }
}
