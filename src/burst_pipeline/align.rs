//! Coarse-to-fine tile alignment between a reference and an alternate frame.
//!
//! Block matching starts at the coarsest pyramid level with an exhaustive
//! window search around zero displacement. Each finer level inherits the
//! enclosing coarse tile's vector scaled by the pyramid factor and refines
//! it in a small window, so information only ever flows coarse to fine.
//! Identical inputs always produce identical motion fields.

mod search;
pub mod types;

pub use types::{MotionVector, TileMotionField};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::burst_pipeline::common::error::{PipelineError, Result};
use crate::burst_pipeline::progress::CancelToken;
use crate::burst_pipeline::pyramid::Pyramid;

/// Search geometry for one alignment pass.
#[derive(Debug, Clone)]
pub struct AlignmentParams {
    /// Tile edge length in level-0 alignment-plane pixels.
    pub tile_size: usize,
    /// Search window half-width per level, coarsest first. Length must
    /// equal the pyramid depth.
    pub search_radius_per_level: Vec<i32>,
}

/// Estimate per-tile motion of `alternate` against `reference`.
///
/// Tiles whose level-0 search cannot beat zero displacement fall back to
/// zero motion and are only reported as a warning; alignment never fails
/// for individual tiles.
pub fn align_frames(
    reference: &Pyramid,
    alternate: &Pyramid,
    alt_index: usize,
    params: &AlignmentParams,
    cancel: &CancelToken,
) -> Result<TileMotionField> {
    let num_levels = reference.num_levels();
    if alternate.num_levels() != num_levels
        || reference.level(0).width != alternate.level(0).width
        || reference.level(0).height != alternate.level(0).height
    {
        return Err(PipelineError::DimensionMismatch {
            frame_index: alt_index,
            expected_width: reference.level(0).width,
            expected_height: reference.level(0).height,
            got_width: alternate.level(0).width,
            got_height: alternate.level(0).height,
        });
    }
    if params.search_radius_per_level.len() != num_levels {
        return Err(PipelineError::Configuration(format!(
            "search_radius_per_level has {} entries but the pyramid has {} levels",
            params.search_radius_per_level.len(),
            num_levels
        )));
    }

    let tile_size = params.tile_size;
    let mut coarse: Option<TileMotionField> = None;
    let mut degraded_tiles = 0usize;

    for level in (0..num_levels).rev() {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let radius = params.search_radius_per_level[num_levels - 1 - level];
        let ref_level = reference.level(level);
        let alt_level = alternate.level(level);
        let (tiles_x, tiles_y) =
            TileMotionField::grid_for(ref_level.width, ref_level.height, tile_size);

        let results: Vec<(MotionVector, bool)> = (0..tiles_x * tiles_y)
            .into_par_iter()
            .map(|idx| {
                let tx = idx % tiles_x;
                let ty = idx / tiles_x;
                let ox = TileMotionField::tile_origin(tx, tile_size, ref_level.width);
                let oy = TileMotionField::tile_origin(ty, tile_size, ref_level.height);

                let initial = match &coarse {
                    Some(field) => {
                        let v = field.vector_for_pos((ox + tile_size / 2) / 2, (oy + tile_size / 2) / 2);
                        MotionVector { dx: v.dx * 2, dy: v.dy * 2 }
                    }
                    None => MotionVector::ZERO,
                };

                let (best, best_dist) =
                    search::search_tile(ref_level, alt_level, ox, oy, tile_size, initial, radius);

                // At the finest level, a vector that cannot beat zero
                // displacement degrades to zero motion instead of failing.
                if level == 0 && best != MotionVector::ZERO {
                    let zero_dist = search::patch_distance(
                        ref_level,
                        alt_level,
                        ox,
                        oy,
                        tile_size,
                        MotionVector::ZERO,
                    );
                    if zero_dist <= best_dist {
                        return (MotionVector::ZERO, true);
                    }
                }
                (best, false)
            })
            .collect();

        degraded_tiles = results.iter().filter(|(_, d)| *d).count();
        coarse = Some(TileMotionField {
            tile_size,
            width: ref_level.width,
            height: ref_level.height,
            tiles_x,
            tiles_y,
            vectors: results.into_iter().map(|(v, _)| v).collect(),
        });
    }

    let field = coarse.expect("pyramid has at least one level");
    if degraded_tiles > 0 {
        warn!(
            "Alignment degraded for frame {}: {} of {} tiles fell back to zero motion",
            alt_index,
            degraded_tiles,
            field.vectors.len()
        );
    }
    debug!(
        "Aligned frame {}: {}x{} tiles",
        alt_index, field.tiles_x, field.tiles_y
    );

    Ok(field)
}
