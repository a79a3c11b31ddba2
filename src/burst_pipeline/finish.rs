//! Finishing: turn the merged raw mosaic into a displayable sRGB image.
//!
//! A fixed chain of stages, each deterministic and all-or-nothing: black-
//! and white-level normalization, demosaic, white balance, color
//! correction, tone mapping with local contrast, chroma denoise,
//! sharpening, and sRGB gamma encoding. Any stage failure aborts the pass
//! and names the stage.

mod color;
mod demosaic;
mod denoise;
mod filter;
mod sharpen;
mod tone;
pub mod types;

pub use types::{ColorSpace, FinishedImage};

use tracing::{debug, info};

use crate::burst_pipeline::common::error::{PipelineError, Result};
use crate::burst_pipeline::merge::MergedMosaic;
use crate::burst_pipeline::raw::CameraMetadata;

/// Rendering knobs of the finishing pass.
#[derive(Debug, Clone)]
pub struct FinishOptions {
    /// Dynamic range compression strength; 0 disables compression.
    pub tone_mapping_strength: f32,
    /// Global exposure gain applied during tone mapping.
    pub gain: f32,
    /// Output contrast; 1.0 is neutral.
    pub contrast: f32,
}

impl Default for FinishOptions {
    fn default() -> Self {
        Self {
            tone_mapping_strength: 3.8,
            gain: 1.1,
            contrast: 1.0,
        }
    }
}

impl FinishOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if !self.tone_mapping_strength.is_finite() || self.tone_mapping_strength < 0.0 {
            return Err(PipelineError::Configuration(format!(
                "tone_mapping_strength {} must be finite and non-negative",
                self.tone_mapping_strength
            )));
        }
        if !self.gain.is_finite() || self.gain <= 0.0 {
            return Err(PipelineError::Configuration(format!(
                "gain {} must be finite and positive",
                self.gain
            )));
        }
        if !self.contrast.is_finite() || self.contrast <= 0.0 {
            return Err(PipelineError::Configuration(format!(
                "contrast {} must be finite and positive",
                self.contrast
            )));
        }
        Ok(())
    }
}

/// Finish a merged mosaic into a gamma-encoded sRGB image.
pub fn finish(
    mosaic: &MergedMosaic,
    metadata: &CameraMetadata,
    options: &FinishOptions,
) -> Result<FinishedImage> {
    options.validate()?;
    info!("Finishing {}x{} mosaic", mosaic.width, mosaic.height);

    let normalized = {
        let _span = tracing::info_span!("black_white_level").entered();
        black_white_level(mosaic, metadata).map_err(|reason| PipelineError::Finishing {
            stage: "black_white_level",
            reason,
        })?
    };

    let mut rgb = {
        let _span = tracing::info_span!("demosaic").entered();
        demosaic::demosaic(&normalized, mosaic.width, mosaic.height, metadata.cfa).map_err(
            |e| PipelineError::Finishing {
                stage: "demosaic",
                reason: e.to_string(),
            },
        )?
    };

    {
        let _span = tracing::info_span!("white_balance").entered();
        color::white_balance(&mut rgb, metadata);
    }
    {
        let _span = tracing::info_span!("color_correction").entered();
        color::color_correct(&mut rgb, &metadata.color_matrix);
    }
    {
        let _span = tracing::info_span!("tone_map").entered();
        tone::tone_map(&mut rgb, options.gain, options.tone_mapping_strength);
    }
    {
        let _span = tracing::info_span!("chroma_denoise").entered();
        denoise::chroma_denoise(&mut rgb);
    }
    {
        let _span = tracing::info_span!("sharpen").entered();
        sharpen::sharpen(&mut rgb);
    }

    let image = {
        let _span = tracing::info_span!("gamma_encode").entered();
        gamma_encode(&rgb, options.contrast)
    };

    debug!("Finishing complete: {}x{} sRGB", image.width, image.height);
    Ok(image)
}

/// Normalize the mosaic to linear [0, 1] above the black level.
fn black_white_level(mosaic: &MergedMosaic, metadata: &CameraMetadata) -> std::result::Result<Vec<f32>, String> {
    let black = metadata.black_level as f32;
    let white = metadata.white_level as f32;
    if white <= black {
        return Err(format!(
            "white level {white} does not exceed black level {black}"
        ));
    }
    let range = white - black;
    Ok(mosaic
        .data
        .iter()
        .map(|&v| ((v as f32 - black).max(0.0) / range).min(1.0))
        .collect())
}

/// Clamp, apply the sRGB transfer curve and the output contrast curve,
/// then quantize to 16 bits.
fn gamma_encode(rgb: &types::RgbPlanes, contrast: f32) -> FinishedImage {
    let scale = u16::MAX as f32;
    let encode = |v: f32| {
        let e = color::srgb_encode(v.clamp(0.0, 1.0));
        let c = ((e - 0.5) * contrast + 0.5).clamp(0.0, 1.0);
        (c * scale).round() as u16
    };

    let mut data = Vec::with_capacity(rgb.len() * 3);
    for i in 0..rgb.len() {
        data.push(encode(rgb.r[i]));
        data.push(encode(rgb.g[i]));
        data.push(encode(rgb.b[i]));
    }

    FinishedImage {
        width: rgb.width,
        height: rgb.height,
        data,
        color_space: ColorSpace::Srgb,
    }
}
