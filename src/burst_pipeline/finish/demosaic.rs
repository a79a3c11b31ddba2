//! Demosaic stage: reconstruct full-color planes from the merged mosaic.
//!
//! Uses the bayer crate's 16-bit linear interpolation path on the
//! normalized mosaic re-quantized to u16.

use std::io::Cursor;

use anyhow::{Result, bail};
use bayer::{BayerDepth, CFA, Demosaic, RasterDepth, RasterMut};

use crate::burst_pipeline::finish::types::RgbPlanes;
use crate::burst_pipeline::raw::CfaPattern;

const SCALE: f32 = u16::MAX as f32;

pub(crate) fn demosaic(
    normalized: &[f32],
    width: usize,
    height: usize,
    cfa: CfaPattern,
) -> Result<RgbPlanes> {
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        bail!("mosaic dimensions {width}x{height} are not demosaicable");
    }
    if normalized.len() != width * height {
        bail!(
            "mosaic buffer holds {} samples, expected {}",
            normalized.len(),
            width * height
        );
    }

    let mosaic_bytes: Vec<u8> = normalized
        .iter()
        .flat_map(|&v| (((v * SCALE).round()).clamp(0.0, SCALE) as u16).to_le_bytes())
        .collect();

    let mut output = vec![0u8; width * height * 3 * 2];
    let mut raster = RasterMut::new(width, height, RasterDepth::Depth16, &mut output);

    bayer::run_demosaic(
        &mut Cursor::new(&mosaic_bytes[..]),
        BayerDepth::Depth16LE,
        cfa_for(cfa),
        Demosaic::Linear,
        &mut raster,
    )
    .map_err(|e| anyhow::anyhow!("Demosaic failed: {:?}", e))?;

    let mut planes = RgbPlanes::new(width, height);
    for (i, pixel) in output.chunks_exact(6).enumerate() {
        planes.r[i] = u16::from_le_bytes([pixel[0], pixel[1]]) as f32 / SCALE;
        planes.g[i] = u16::from_le_bytes([pixel[2], pixel[3]]) as f32 / SCALE;
        planes.b[i] = u16::from_le_bytes([pixel[4], pixel[5]]) as f32 / SCALE;
    }

    Ok(planes)
}

fn cfa_for(pattern: CfaPattern) -> CFA {
    match pattern {
        CfaPattern::Rggb => CFA::RGGB,
        CfaPattern::Grbg => CFA::GRBG,
        CfaPattern::Bggr => CFA::BGGR,
        CfaPattern::Gbrg => CFA::GBRG,
    }
}
