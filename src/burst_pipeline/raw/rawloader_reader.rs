//! Raw frame reader implementation using the rawloader library.
//!
//! Decodes any raw format rawloader supports (DNG, ARW, NEF, CR2, ...) and
//! extracts the sensor metadata the pipeline needs: black/white levels,
//! white balance, CFA layout, and the camera-to-sRGB color matrix.

use std::io::Cursor;

use rawloader::RawImageData as RawloaderImageData;
use tracing::{debug, warn};

use crate::burst_pipeline::common::error::{PipelineError, Result};
use crate::burst_pipeline::raw::reader::RawFrameReader;
use crate::burst_pipeline::raw::types::{CameraMetadata, CfaPattern, RawFrame};

/// Raw frame reader that uses the rawloader library for decoding.
pub struct RawLoaderReader;

/// sRGB (D65) to CIE XYZ, used to derive the camera-to-sRGB matrix from the
/// camera profile rawloader exposes.
const XYZ_FROM_SRGB: [[f32; 3]; 3] = [
    [0.4124564, 0.3575761, 0.1804375],
    [0.2126729, 0.7151522, 0.0721750],
    [0.0193339, 0.1191920, 0.9503041],
];

impl RawFrameReader for RawLoaderReader {
    fn read_frame(&self, data: &[u8], index: usize) -> Result<RawFrame> {
        debug!("Decoding raw frame {}, {} bytes", index, data.len());

        let decoded = rawloader::decode(&mut Cursor::new(data))
            .map_err(|e| PipelineError::DecodeError(e.to_string()))?;

        let width = decoded.width;
        let height = decoded.height;

        debug!("Decoded frame {}: {}x{}", index, width, height);

        // Integer data is cast directly, float data (normalized 0.0-1.0) is
        // scaled to u16 range.
        let data: Vec<u16> = match decoded.data {
            RawloaderImageData::Integer(values) => values.iter().map(|&v| v as u16).collect(),
            RawloaderImageData::Float(values) => values
                .iter()
                .map(|&v| (v * u16::MAX as f32) as u16)
                .collect(),
        };

        let cfa = match decoded.cfa.name.as_str() {
            "RGGB" => CfaPattern::Rggb,
            "GRBG" => CfaPattern::Grbg,
            "BGGR" => CfaPattern::Bggr,
            "GBRG" => CfaPattern::Gbrg,
            other => {
                warn!("Unrecognized CFA pattern '{}', assuming RGGB", other);
                CfaPattern::Rggb
            }
        };

        // Green-normalized white balance gains, RGGB site order.
        let wb_g = if decoded.wb_coeffs[1].is_finite() && decoded.wb_coeffs[1] > 0.0 {
            decoded.wb_coeffs[1]
        } else {
            1.0
        };
        let wb_gain = |c: f32| {
            if c.is_finite() && c > 0.0 { c / wb_g } else { 1.0 }
        };

        let metadata = CameraMetadata {
            black_level: decoded.blacklevels[0],
            white_level: decoded.whitelevels.iter().max().copied().unwrap_or(u16::MAX),
            iso_gain: 1.0,
            wb_r: wb_gain(decoded.wb_coeffs[0]),
            wb_g0: 1.0,
            wb_g1: 1.0,
            wb_b: wb_gain(decoded.wb_coeffs[2]),
            cfa,
            color_matrix: srgb_from_cam(&decoded.xyz_to_cam),
        };

        Ok(RawFrame {
            width,
            height,
            data,
            metadata,
            index,
        })
    }
}

/// Derive the linear camera-RGB to linear sRGB matrix from the profile's
/// XYZ-to-camera matrix, dcraw style: compose with sRGB-to-XYZ, normalize
/// rows so white maps to white, then invert.
fn srgb_from_cam(xyz_to_cam: &[[f32; 3]; 4]) -> [[f32; 3]; 3] {
    const IDENTITY: [[f32; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    if xyz_to_cam.iter().all(|row| row[..3].iter().all(|&v| v == 0.0)) {
        return IDENTITY;
    }

    let mut cam_from_srgb = [[0.0f32; 3]; 3];
    for r in 0..3 {
        for c in 0..3 {
            let mut sum = 0.0;
            for k in 0..3 {
                sum += xyz_to_cam[r][k] * XYZ_FROM_SRGB[k][c];
            }
            cam_from_srgb[r][c] = sum;
        }
    }

    for row in &mut cam_from_srgb {
        let sum: f32 = row.iter().sum();
        if sum.abs() < 1e-8 {
            warn!("Degenerate camera color profile, using identity matrix");
            return IDENTITY;
        }
        for v in row.iter_mut() {
            *v /= sum;
        }
    }

    match invert3(&cam_from_srgb) {
        Some(m) => m,
        None => {
            warn!("Singular camera color profile, using identity matrix");
            IDENTITY
        }
    }
}

fn invert3(m: &[[f32; 3]; 3]) -> Option<[[f32; 3]; 3]> {
    let det = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);
    if det.abs() < 1e-8 {
        return None;
    }
    let inv_det = 1.0 / det;
    let mut out = [[0.0f32; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            let a = m[(i + 1) % 3][(j + 1) % 3] * m[(i + 2) % 3][(j + 2) % 3];
            let b = m[(i + 1) % 3][(j + 2) % 3] * m[(i + 2) % 3][(j + 1) % 3];
            // transpose of the cofactor matrix
            out[j][i] = (a - b) * inv_det;
        }
    }
    Some(out)
}
