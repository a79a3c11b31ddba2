//! Robustness-weighted temporal merge of an aligned burst.
//!
//! The reference mosaic is fused with motion-compensated alternate tiles.
//! Tiles overlap by half their size and are blended under a raised-cosine
//! window so tile boundaries never show; per-tile robustness weights keep
//! misaligned or occluded content out of the average. The reference always
//! contributes with weight 1, so the fused weight mass per pixel is >= 1
//! and the merge can never amplify or zero out a pixel.

pub mod noise;
mod robustness;

pub use noise::NoiseModel;
pub use robustness::robustness_weight;

use rayon::prelude::*;
use tracing::debug;

use crate::burst_pipeline::align::TileMotionField;
use crate::burst_pipeline::common::error::{PipelineError, Result};
use crate::burst_pipeline::progress::CancelToken;
use crate::burst_pipeline::raw::RawFrame;

/// Merge tile geometry, in mosaic pixels.
#[derive(Debug, Clone)]
pub struct MergeParams {
    pub tile_size: usize,
}

/// Noise-reduced raw mosaic with the reference frame's geometry.
#[derive(Debug, Clone)]
pub struct MergedMosaic {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u16>,
}

impl MergedMosaic {
    /// A single-frame burst merges to the reference itself.
    pub fn from_frame(frame: &RawFrame) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            data: frame.data.clone(),
        }
    }
}

struct TilePatch {
    x0: usize,
    y0: usize,
    fused: Vec<f32>,
}

/// Fuse `reference` with the motion-compensated `alternates`.
///
/// All-or-nothing: configuration mismatches (field count, field grid) fail
/// before any pixel is produced and no partial output exists.
pub fn merge_burst(
    reference: &RawFrame,
    alternates: &[&RawFrame],
    motion_fields: &[TileMotionField],
    noise: &NoiseModel,
    params: &MergeParams,
    cancel: &CancelToken,
) -> Result<MergedMosaic> {
    if motion_fields.len() != alternates.len() {
        return Err(PipelineError::Configuration(format!(
            "{} motion fields for {} alternate frames",
            motion_fields.len(),
            alternates.len()
        )));
    }
    if params.tile_size < 2 || params.tile_size % 2 != 0 {
        return Err(PipelineError::Configuration(format!(
            "merge tile size {} must be even and at least 2",
            params.tile_size
        )));
    }
    if params.tile_size > reference.width || params.tile_size > reference.height {
        return Err(PipelineError::Configuration(format!(
            "merge tile size {} exceeds the {}x{} frame",
            params.tile_size, reference.width, reference.height
        )));
    }
    let plane_w = reference.width / 2;
    let plane_h = reference.height / 2;
    for field in motion_fields {
        let (tiles_x, tiles_y) = TileMotionField::grid_for(field.width, field.height, field.tile_size);
        if field.width != plane_w
            || field.height != plane_h
            || field.tiles_x != tiles_x
            || field.tiles_y != tiles_y
            || field.vectors.len() != tiles_x * tiles_y
        {
            return Err(PipelineError::Configuration(format!(
                "motion field grid {}x{} does not match the reference tile grid",
                field.tiles_x, field.tiles_y
            )));
        }
    }
    for alt in alternates {
        if alt.width != reference.width || alt.height != reference.height {
            return Err(PipelineError::DimensionMismatch {
                frame_index: alt.index,
                expected_width: reference.width,
                expected_height: reference.height,
                got_width: alt.width,
                got_height: alt.height,
            });
        }
    }

    let t = params.tile_size;
    let stride = t / 2;
    let nx = tile_count(reference.width, t, stride);
    let ny = tile_count(reference.height, t, stride);
    let window = raised_cosine(t);

    debug!(
        "Merging {} alternates into {}x{} reference, {}x{} overlapping tiles",
        alternates.len(),
        reference.width,
        reference.height,
        nx,
        ny
    );

    let patches: Vec<TilePatch> = (0..nx * ny)
        .into_par_iter()
        .map(|idx| {
            if cancel.is_cancelled() {
                // remaining tiles become no-ops; the run aborts below
                return TilePatch { x0: 0, y0: 0, fused: Vec::new() };
            }
            let tx = idx % nx;
            let ty = idx / nx;
            let x0 = (tx * stride).min(reference.width.saturating_sub(t));
            let y0 = (ty * stride).min(reference.height.saturating_sub(t));
            fuse_tile(reference, alternates, motion_fields, noise, x0, y0, t)
        })
        .collect();

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    // Overlapping tiles were computed independently; accumulation is the
    // only place their output regions intersect, so it runs serially.
    let mut acc = vec![0.0f32; reference.width * reference.height];
    let mut wacc = vec![0.0f32; reference.width * reference.height];
    for patch in &patches {
        for j in 0..t {
            let y = patch.y0 + j;
            for i in 0..t {
                let x = patch.x0 + i;
                let w = window[i] * window[j];
                acc[y * reference.width + x] += w * patch.fused[j * t + i];
                wacc[y * reference.width + x] += w;
            }
        }
    }

    let data = acc
        .iter()
        .zip(&wacc)
        .map(|(&a, &w)| (a / w).round().clamp(0.0, u16::MAX as f32) as u16)
        .collect();

    Ok(MergedMosaic {
        width: reference.width,
        height: reference.height,
        data,
    })
}

/// Number of stride-spaced tiles covering `dim`.
fn tile_count(dim: usize, tile: usize, stride: usize) -> usize {
    if dim <= tile {
        1
    } else {
        (dim - tile).div_ceil(stride) + 1
    }
}

/// Raised-cosine tile window. At half-tile stride, opposing samples sum to
/// exactly 1, so interior tile overlaps partition unity.
fn raised_cosine(tile: usize) -> Vec<f32> {
    use std::f32::consts::PI;
    (0..tile)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * (i as f32 + 0.5) / tile as f32).cos())
        .collect()
}

/// Fuse one output tile across all frames.
///
/// Each alternate contributes through a single robustness weight derived
/// from its tile-mean dissimilarity against the reference; the reference
/// itself always carries weight 1.
fn fuse_tile(
    reference: &RawFrame,
    alternates: &[&RawFrame],
    motion_fields: &[TileMotionField],
    noise: &NoiseModel,
    x0: usize,
    y0: usize,
    t: usize,
) -> TilePatch {
    let pixels = (t * t) as f32;

    let mut ref_tile = vec![0.0f32; t * t];
    let mut mean = 0.0f32;
    for j in 0..t {
        for i in 0..t {
            let v = reference.sample_clamped((x0 + i) as isize, (y0 + j) as isize) as f32;
            ref_tile[j * t + i] = v;
            mean += v;
        }
    }
    mean /= pixels;
    let variance = noise.variance(mean);

    // Motion vectors live on the half-resolution alignment plane; the tile
    // center indexes the field and the displacement doubles back to mosaic
    // coordinates.
    let center_x = (x0 + t / 2) / 2;
    let center_y = (y0 + t / 2) / 2;

    let mut fused = ref_tile.clone();
    let mut total_weight = 1.0f32;

    for (alt, field) in alternates.iter().zip(motion_fields) {
        let mv = field.vector_for_pos(center_x, center_y);
        let dx = 2 * mv.dx as isize;
        let dy = 2 * mv.dy as isize;

        let mut mse = 0.0f32;
        let mut alt_tile = vec![0.0f32; t * t];
        for j in 0..t {
            for i in 0..t {
                let v = alt.sample_clamped((x0 + i) as isize + dx, (y0 + j) as isize + dy) as f32;
                alt_tile[j * t + i] = v;
                let d = ref_tile[j * t + i] - v;
                mse += d * d;
            }
        }
        mse /= pixels;

        let weight = robustness_weight(mse, variance);
        if weight > 0.0 {
            for (f, &a) in fused.iter_mut().zip(&alt_tile) {
                *f += weight * a;
            }
            total_weight += weight;
        }
    }

    for f in fused.iter_mut() {
        *f /= total_weight;
    }

    TilePatch { x0, y0, fused }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::burst_pipeline::align::MotionVector;
    use crate::burst_pipeline::raw::CameraMetadata;

    fn frame(width: usize, height: usize, data: Vec<u16>, index: usize) -> RawFrame {
        RawFrame {
            width,
            height,
            data,
            metadata: CameraMetadata::default(),
            index,
        }
    }

    fn zero_field(width: usize, height: usize, tile_size: usize) -> TileMotionField {
        let (tiles_x, tiles_y) = TileMotionField::grid_for(width / 2, height / 2, tile_size);
        TileMotionField {
            tile_size,
            width: width / 2,
            height: height / 2,
            tiles_x,
            tiles_y,
            vectors: vec![MotionVector::ZERO; tiles_x * tiles_y],
        }
    }

    fn test_noise() -> NoiseModel {
        NoiseModel::new(2.0, 16.0, 1.0, 0.0)
    }

    #[test]
    fn window_partitions_unity_at_half_stride() {
        let t = 16;
        let w = raised_cosine(t);
        for i in 0..t / 2 {
            assert!((w[i] + w[i + t / 2] - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn identical_frames_merge_to_reference() {
        let width = 48;
        let height = 32;
        let data: Vec<u16> = (0..width * height).map(|i| (i * 13 % 4000) as u16).collect();
        let reference = frame(width, height, data.clone(), 0);
        let alt1 = frame(width, height, data.clone(), 1);
        let alt2 = frame(width, height, data, 2);
        let fields = vec![zero_field(width, height, 8), zero_field(width, height, 8)];

        let merged = merge_burst(
            &reference,
            &[&alt1, &alt2],
            &fields,
            &test_noise(),
            &MergeParams { tile_size: 16 },
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(merged.data, reference.data);
    }

    #[test]
    fn single_reference_round_trips() {
        let reference = frame(32, 32, (0..1024).map(|i| i as u16).collect(), 0);
        let merged = merge_burst(
            &reference,
            &[],
            &[],
            &test_noise(),
            &MergeParams { tile_size: 16 },
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(merged.data, reference.data);
    }

    #[test]
    fn fused_weight_mass_has_floor_of_one() {
        let width = 32;
        let height = 32;
        let reference = frame(width, height, vec![1000; width * height], 0);
        // grossly different alternate: weight must drop to 0, never negative
        let alt = frame(width, height, vec![60000; width * height], 1);
        let fields = vec![zero_field(width, height, 8)];

        let patch = fuse_tile(&reference, &[&alt], &fields, &test_noise(), 0, 0, 16);
        // with zero alternate weight the fusion is exactly the reference
        for &v in &patch.fused {
            assert!((v - 1000.0).abs() < 1e-3);
        }
    }

    #[test]
    fn misaligned_content_is_suppressed() {
        let width = 32;
        let height = 32;
        let reference = frame(width, height, vec![1000; width * height], 0);
        let matching = frame(width, height, vec![1002; width * height], 1);
        let ghosting = frame(width, height, vec![9000; width * height], 2);
        let fields = vec![zero_field(width, height, 8), zero_field(width, height, 8)];

        let merged = merge_burst(
            &reference,
            &[&matching, &ghosting],
            &fields,
            &test_noise(),
            &MergeParams { tile_size: 16 },
            &CancelToken::new(),
        )
        .unwrap();

        // the ghosting frame is rejected; output stays near the reference
        for &v in &merged.data {
            assert!((999..=1003).contains(&v), "ghost leaked into merge: {v}");
        }
    }

    #[test]
    fn motion_compensated_fetch_follows_vectors() {
        let width = 32;
        let height = 32;
        let mut ref_data = vec![500u16; width * height];
        // bright block in the reference at (8..16, 8..16)
        for y in 8..16 {
            for x in 8..16 {
                ref_data[y * width + x] = 3000;
            }
        }
        let reference = frame(width, height, ref_data.clone(), 0);

        // alternate has the same block shifted by (+4, 0) mosaic pixels
        let mut alt_data = vec![500u16; width * height];
        for y in 8..16 {
            for x in 12..20 {
                alt_data[y * width + x] = 3000;
            }
        }
        let alternate = frame(width, height, alt_data, 1);

        // field says: fetch alternate at +4 mosaic px (= +2 plane px)
        let mut field = zero_field(width, height, 8);
        for v in field.vectors.iter_mut() {
            *v = MotionVector { dx: 2, dy: 0 };
        }

        let merged = merge_burst(
            &reference,
            &[&alternate],
            &[field],
            &test_noise(),
            &MergeParams { tile_size: 16 },
            &CancelToken::new(),
        )
        .unwrap();

        // compensated alternate matches the reference, so the block must
        // stay put and sharp
        assert!(merged.data[10 * width + 10] > 2900);
        assert!(merged.data[10 * width + 20] < 600);
    }

    #[test]
    fn extreme_motion_vectors_are_bounds_safe() {
        let width = 32;
        let height = 32;
        let reference = frame(width, height, vec![1000; width * height], 0);
        let alt = frame(width, height, vec![1000; width * height], 1);

        let mut field = zero_field(width, height, 8);
        for (i, v) in field.vectors.iter_mut().enumerate() {
            // far outside the frame in alternating directions
            let sign = if i % 2 == 0 { 1 } else { -1 };
            *v = MotionVector {
                dx: sign * 100_000,
                dy: -sign * 100_000,
            };
        }

        let merged = merge_burst(
            &reference,
            &[&alt],
            &[field],
            &test_noise(),
            &MergeParams { tile_size: 16 },
            &CancelToken::new(),
        )
        .unwrap();

        // clamped sampling reads the border; flat frames still merge flat
        assert_eq!(merged.data, reference.data);
    }

    #[test]
    fn field_count_mismatch_is_configuration_error() {
        let reference = frame(32, 32, vec![0; 1024], 0);
        let alt = frame(32, 32, vec![0; 1024], 1);
        let result = merge_burst(
            &reference,
            &[&alt],
            &[],
            &test_noise(),
            &MergeParams { tile_size: 16 },
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn wrong_field_grid_is_configuration_error() {
        let reference = frame(64, 64, vec![0; 4096], 0);
        let alt = frame(64, 64, vec![0; 4096], 1);
        let field = zero_field(32, 32, 8);
        let result = merge_burst(
            &reference,
            &[&alt],
            &[field],
            &test_noise(),
            &MergeParams { tile_size: 16 },
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn tile_larger_than_frame_is_configuration_error() {
        let reference = frame(8, 8, vec![0; 64], 0);
        let result = merge_burst(
            &reference,
            &[],
            &[],
            &test_noise(),
            &MergeParams { tile_size: 16 },
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn cancellation_yields_no_output() {
        let reference = frame(32, 32, vec![0; 1024], 0);
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = merge_burst(
            &reference,
            &[],
            &[],
            &test_noise(),
            &MergeParams { tile_size: 16 },
            &cancel,
        );
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }

    #[test]
    fn merge_reduces_noise_variance() {
        let width = 64;
        let height = 64;
        let base = 2000u16;

        // deterministic pseudo-noise, different per frame
        let noisy = |seed: u64| -> Vec<u16> {
            let mut state = seed.wrapping_mul(0x9E3779B97F4A7C15).max(1);
            (0..width * height)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    let n = (state % 41) as i32 - 20;
                    (base as i32 + n) as u16
                })
                .collect()
        };

        let reference = frame(width, height, noisy(1), 0);
        let alts: Vec<RawFrame> = (1..4).map(|i| frame(width, height, noisy(i + 1), i as usize)).collect();
        let alt_refs: Vec<&RawFrame> = alts.iter().collect();
        let fields: Vec<TileMotionField> =
            (0..3).map(|_| zero_field(width, height, 8)).collect();

        let merged = merge_burst(
            &reference,
            &alt_refs,
            &fields,
            &NoiseModel::new(2.0, 200.0, 1.0, 0.0),
            &MergeParams { tile_size: 16 },
            &CancelToken::new(),
        )
        .unwrap();

        let variance = |data: &[u16]| {
            let n = data.len() as f64;
            let mean = data.iter().map(|&v| v as f64).sum::<f64>() / n;
            data.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n
        };

        let before = variance(&reference.data);
        let after = variance(&merged.data);
        assert!(
            after < before * 0.5,
            "expected noise reduction, got {before:.1} -> {after:.1}"
        );
    }
}
