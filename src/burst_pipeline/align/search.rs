//! Block-matching search at a single pyramid level.

use crate::burst_pipeline::align::types::MotionVector;
use crate::burst_pipeline::pyramid::GrayImage;

/// Sum of squared differences between the reference tile at `(ox, oy)` and
/// the alternate tile displaced by `disp`. Both planes are sampled with
/// replicated borders, so any displacement magnitude is safe.
pub(crate) fn patch_distance(
    reference: &GrayImage,
    alternate: &GrayImage,
    ox: usize,
    oy: usize,
    tile_size: usize,
    disp: MotionVector,
) -> f64 {
    let mut sum = 0.0f64;
    for j in 0..tile_size {
        let ry = (oy + j) as isize;
        let ay = ry + disp.dy as isize;
        for i in 0..tile_size {
            let rx = (ox + i) as isize;
            let ax = rx + disp.dx as isize;
            let d = reference.get_clamped(rx, ry) as f64 - alternate.get_clamped(ax, ay) as f64;
            sum += d * d;
        }
    }
    sum
}

/// Exhaustive search in a `±radius` window around `initial`.
///
/// Candidates are visited in row-major order; ties resolve to the smaller
/// squared displacement magnitude, then to the earlier candidate, so the
/// result is fully deterministic.
pub(crate) fn search_tile(
    reference: &GrayImage,
    alternate: &GrayImage,
    ox: usize,
    oy: usize,
    tile_size: usize,
    initial: MotionVector,
    radius: i32,
) -> (MotionVector, f64) {
    let mut best = initial;
    let mut best_dist = f64::INFINITY;
    let mut best_mag2 = i64::MAX;

    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let candidate = MotionVector {
                dx: initial.dx + dx,
                dy: initial.dy + dy,
            };
            let dist = patch_distance(reference, alternate, ox, oy, tile_size, candidate);
            let mag2 = candidate.mag2();
            if dist < best_dist || (dist == best_dist && mag2 < best_mag2) {
                best = candidate;
                best_dist = dist;
                best_mag2 = mag2;
            }
        }
    }

    (best, best_dist)
}
